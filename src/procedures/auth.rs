//! Public account procedures: signup, login, logout, me, and the
//! identity-provider upsert. None of these require a resolved identity.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::identity::{role_for_new_identity, RequestContext};
use crate::policy;
use crate::security;
use crate::storage::{NewUser, Role, Status, StoreError, UpsertUser, UserPatch};
use crate::tprintln;

use super::{Ack, Procedures, PublicUser};

#[derive(Debug, Clone, Deserialize)]
pub struct SignupInput {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginOutput {
    pub user: PublicUser,
    /// Opaque session token; the transport layer decides how it travels.
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpsertExternalInput {
    pub identity: String,
    pub email: String,
    pub name: Option<String>,
    pub login_method: Option<String>,
}

/// Unknown email and failed verification produce byte-identical failures so
/// a caller cannot probe which half was wrong.
fn invalid_credentials() -> AppError {
    AppError::unauthenticated("invalid_credentials", "Invalid email or password")
}

impl Procedures {
    pub async fn signup(&self, input: SignupInput) -> AppResult<PublicUser> {
        policy::validate_name(&input.name)?;
        policy::validate_email(&input.email)?;
        policy::validate_password_strength(&input.password)?;

        if self.store().find_by_email(&input.email)?.is_some() {
            return Err(AppError::conflict("email_exists", "Email already registered"));
        }

        let password_hash = security::hash_password(&input.password)?;
        let identity = format!("email:{}", Uuid::new_v4());
        let created = self
            .store()
            .insert(NewUser {
                identity,
                email: input.email,
                name: Some(input.name.trim().to_string()),
                password_hash: Some(password_hash),
                login_method: Some("email".to_string()),
                role: Role::User,
                status: Status::Active,
            })
            .map_err(|e| match e {
                // lost the race between the existence check and the insert
                StoreError::DuplicateEmail => AppError::conflict("email_exists", "Email already registered"),
                other => other.into(),
            })?;
        tprintln!("auth.signup user_id={} email={}", created.id, created.email);
        Ok(PublicUser::from(&created))
    }

    pub async fn login(&self, input: LoginInput) -> AppResult<LoginOutput> {
        let user = self
            .store()
            .find_by_email(&input.email)?
            .ok_or_else(invalid_credentials)?;

        if !security::verify_password(user.password_hash.as_deref(), &input.password) {
            return Err(invalid_credentials());
        }

        // checked only after the password verifies, so an inactive account
        // reveals nothing extra to a caller without the credentials
        if user.status != Status::Active {
            return Err(AppError::forbidden("account_inactive", "User account is inactive"));
        }

        let user = self.store().update_fields(
            user.id,
            UserPatch { last_signed_in: Some(chrono::Utc::now()), ..Default::default() },
        )?;
        let session = self.sessions().issue(user.id);
        tprintln!("auth.login user_id={} email={}", user.id, user.email);
        Ok(LoginOutput { user: PublicUser::from(&user), token: session.token })
    }

    /// Unconditionally succeeds; dropping a session that does not exist is
    /// not an error.
    pub async fn logout(&self, ctx: &RequestContext) -> AppResult<Ack> {
        if let Some(token) = ctx.token.as_deref() {
            self.sessions().logout(token);
        }
        Ok(Ack::ok())
    }

    /// The resolved identity, verbatim. Pure read, callable anonymously.
    pub async fn me(&self, ctx: &RequestContext) -> AppResult<Option<PublicUser>> {
        Ok(ctx.user.as_ref().map(PublicUser::from))
    }

    /// Idempotent identity-provider write, keyed on `identity`. The owner
    /// identity is auto-promoted to admin here and only here.
    pub async fn upsert_external(&self, input: UpsertExternalInput) -> AppResult<PublicUser> {
        if input.identity.trim().is_empty() {
            return Err(AppError::invalid("identity_required", "Identity is required for upsert"));
        }
        policy::validate_email(&input.email)?;

        let role = match role_for_new_identity(&input.identity, self.owner_identity()) {
            Role::Admin => Some(Role::Admin),
            Role::User => None, // leave an existing role untouched on update
        };
        let user = self.store().upsert_by_identity(UpsertUser {
            identity: input.identity,
            email: input.email,
            name: input.name,
            login_method: input.login_method,
            role,
            last_signed_in: None,
        })?;
        Ok(PublicUser::from(&user))
    }
}
