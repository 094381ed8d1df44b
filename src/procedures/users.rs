//! Profile and admin procedures. Everything here requires a resolved
//! identity; the listing and activation toggles additionally require the
//! admin role.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::identity::RequestContext;
use crate::policy;
use crate::security;
use crate::storage::{Status, StoreError, UserPatch};

use super::{require_admin, require_user, Ack, Procedures, PublicUser};

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateProfileInput {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangePasswordInput {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListInput {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListOutput {
    pub users: Vec<PublicUser>,
    pub total: usize,
    pub page: u32,
    pub limit: u32,
    pub pages: usize,
}

impl Procedures {
    /// The caller's own record.
    pub async fn profile(&self, ctx: &RequestContext) -> AppResult<PublicUser> {
        let user = require_user(ctx)?;
        Ok(PublicUser::from(user))
    }

    pub async fn update_profile(&self, ctx: &RequestContext, input: UpdateProfileInput) -> AppResult<PublicUser> {
        let user = require_user(ctx)?;
        policy::validate_name(&input.name)?;
        policy::validate_email(&input.email)?;

        // only probe uniqueness when the email actually changes
        if !input.email.eq_ignore_ascii_case(&user.email)
            && self.store().find_by_email(&input.email)?.is_some()
        {
            return Err(AppError::conflict("email_exists", "Email already in use"));
        }

        let updated = self
            .store()
            .update_fields(
                user.id,
                UserPatch {
                    name: Some(input.name.trim().to_string()),
                    email: Some(input.email),
                    ..Default::default()
                },
            )
            .map_err(|e| match e {
                StoreError::DuplicateEmail => AppError::conflict("email_exists", "Email already in use"),
                other => other.into(),
            })?;
        Ok(PublicUser::from(&updated))
    }

    pub async fn change_password(&self, ctx: &RequestContext, input: ChangePasswordInput) -> AppResult<Ack> {
        let caller = require_user(ctx)?;

        // re-fetch by email; the context copy may be stale
        let user = self
            .store()
            .find_by_email(&caller.email)?
            .ok_or_else(|| AppError::not_found("user_not_found", "User not found"))?;

        if !security::verify_password(user.password_hash.as_deref(), &input.current_password) {
            return Err(AppError::unauthenticated("invalid_credentials", "Current password is incorrect"));
        }
        policy::validate_password_strength(&input.new_password)?;

        let password_hash = security::hash_password(&input.new_password)?;
        self.store().update_fields(
            user.id,
            UserPatch { password_hash: Some(password_hash), ..Default::default() },
        )?;
        Ok(Ack::ok())
    }

    /// Admin-only paginated directory, id ascending.
    pub async fn list(&self, ctx: &RequestContext, input: ListInput) -> AppResult<ListOutput> {
        require_admin(ctx, "Only admins can view all users")?;

        let page = input.page.unwrap_or(1);
        let limit = input.limit.unwrap_or(10);
        if page < 1 {
            return Err(AppError::invalid("invalid_page", "Page must be a positive integer"));
        }
        if limit < 1 {
            return Err(AppError::invalid("invalid_limit", "Limit must be a positive integer"));
        }

        let offset = (page as usize - 1) * limit as usize;
        let users = self.store().list_page(limit as usize, offset)?;
        let total = self.store().count()?;
        let pages = (total + limit as usize - 1) / limit as usize;
        Ok(ListOutput {
            users: users.iter().map(PublicUser::from).collect(),
            total,
            page,
            limit,
            pages,
        })
    }

    pub async fn activate(&self, ctx: &RequestContext, user_id: i64) -> AppResult<Ack> {
        require_admin(ctx, "Only admins can activate users")?;
        self.set_status(user_id, Status::Active)
    }

    pub async fn deactivate(&self, ctx: &RequestContext, user_id: i64) -> AppResult<Ack> {
        require_admin(ctx, "Only admins can deactivate users")?;
        self.set_status(user_id, Status::Inactive)
    }

    // no-op-safe: setting the status a user already has still succeeds
    fn set_status(&self, user_id: i64, status: Status) -> AppResult<Ack> {
        if user_id < 1 {
            return Err(AppError::invalid("invalid_user_id", "User id must be a positive integer"));
        }
        self.store()
            .update_fields(user_id, UserPatch { status: Some(status), ..Default::default() })?;
        Ok(Ack::ok())
    }
}
