//! User record model and the narrow store interface the procedure layer
//! depends on. Backends live in the sub-modules: a parquet-backed store for
//! the server process and an in-memory store for tests and demos.
//!
//! The store is constructed once at startup and injected into the procedure
//! layer; nothing in this crate reaches for a process-global handle.
//! Uniqueness of `email` and `identity` is enforced inside each backend
//! under its own lock, so the check-then-insert pattern in the procedures is
//! advisory only and a concurrent duplicate still surfaces as a typed
//! conflict instead of corrupting the table.

pub mod memory;
pub mod parquet;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    Inactive,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Option<Status> {
        match s {
            "active" => Some(Status::Active),
            "inactive" => Some(Status::Inactive),
            _ => None,
        }
    }
}

/// A full user row as the store sees it. `password_hash` never leaves the
/// procedure layer; success payloads carry [`crate::procedures::PublicUser`]
/// projections instead.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub identity: String,
    pub email: String,
    pub name: Option<String>,
    pub password_hash: Option<String>,
    pub login_method: Option<String>,
    pub role: Role,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_signed_in: DateTime<Utc>,
}

/// Fields for a fresh insert. Id and timestamps are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub identity: String,
    pub email: String,
    pub name: Option<String>,
    pub password_hash: Option<String>,
    pub login_method: Option<String>,
    pub role: Role,
    pub status: Status,
}

/// Fields for the idempotent identity-provider write. `role` is only
/// honoured when `Some`; absent fields keep their stored values on update.
#[derive(Debug, Clone)]
pub struct UpsertUser {
    pub identity: String,
    pub email: String,
    pub name: Option<String>,
    pub login_method: Option<String>,
    pub role: Option<Role>,
    pub last_signed_in: Option<DateTime<Utc>>,
}

/// Partial update applied by `update_fields`. `updated_at` is bumped by the
/// store whenever any field is set.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub status: Option<Status>,
    pub last_signed_in: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already exists")]
    DuplicateEmail,
    #[error("identity already exists")]
    DuplicateIdentity,
    #[error("user not found")]
    NotFound,
    #[error("storage backend error: {0}")]
    Backend(anyhow::Error),
}

impl From<anyhow::Error> for StoreError {
    fn from(e: anyhow::Error) -> Self {
        StoreError::Backend(e)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateEmail => AppError::conflict("email_exists", "Email already in use"),
            StoreError::DuplicateIdentity => AppError::conflict("identity_exists", "Identity already in use"),
            StoreError::NotFound => AppError::not_found("user_not_found", "User not found"),
            StoreError::Backend(err) => AppError::Internal { code: "store_error".into(), message: err.to_string() },
        }
    }
}

/// Current time truncated to millisecond precision, matching what the
/// parquet timestamp columns can represent, so rows survive a save/load
/// unchanged.
pub(crate) fn now_ms() -> DateTime<Utc> {
    let ms = Utc::now().timestamp_millis();
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

/// Narrow query interface over the single user table. Methods are
/// synchronous; callers in the async procedure layer invoke them directly,
/// the same way the HTTP handlers drive the parquet store.
pub trait UserStore: Send + Sync {
    fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    fn find_by_id(&self, id: i64) -> StoreResult<Option<User>>;
    fn find_by_identity(&self, identity: &str) -> StoreResult<Option<User>>;
    fn insert(&self, user: NewUser) -> StoreResult<User>;
    fn upsert_by_identity(&self, user: UpsertUser) -> StoreResult<User>;
    fn update_fields(&self, id: i64, patch: UserPatch) -> StoreResult<User>;
    /// Page of users in id-ascending order, so pages are stable absent writes.
    fn list_page(&self, limit: usize, offset: usize) -> StoreResult<Vec<User>>;
    fn count(&self) -> StoreResult<usize>;
}

/// Shared row-mutation logic used by both backends.
///
/// Applies `patch` to `user`, bumping `updated_at`. Email uniqueness against
/// the rest of the table is the caller's responsibility (it holds the lock).
pub(crate) fn apply_patch(user: &mut User, patch: UserPatch, now: DateTime<Utc>) {
    if let Some(name) = patch.name {
        user.name = Some(name);
    }
    if let Some(email) = patch.email {
        user.email = email;
    }
    if let Some(hash) = patch.password_hash {
        user.password_hash = Some(hash);
    }
    if let Some(status) = patch.status {
        user.status = status;
    }
    if let Some(ts) = patch.last_signed_in {
        user.last_signed_in = ts;
    }
    user.updated_at = now;
}

/// Merge an identity-provider upsert into an existing row. Mirrors the
/// insert-or-update semantics: provided fields overwrite, absent fields are
/// kept, and `last_signed_in` is refreshed even when nothing else changed.
pub(crate) fn apply_upsert(user: &mut User, up: &UpsertUser, now: DateTime<Utc>) {
    user.email = up.email.clone();
    if let Some(name) = &up.name {
        user.name = Some(name.clone());
    }
    if let Some(method) = &up.login_method {
        user.login_method = Some(method.clone());
    }
    if let Some(role) = up.role {
        user.role = role;
    }
    user.last_signed_in = up.last_signed_in.unwrap_or(now);
    user.updated_at = now;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_and_status_are_closed_enums() {
        assert_eq!(Role::parse("user"), Some(Role::User));
        assert_eq!(Role::parse("admin"), Some(Role::Admin));
        assert_eq!(Role::parse("superuser"), None);
        assert_eq!(Status::parse("active"), Some(Status::Active));
        assert_eq!(Status::parse("inactive"), Some(Status::Inactive));
        assert_eq!(Status::parse("banned"), None);
    }

    #[test]
    fn enum_round_trip_through_str() {
        for r in [Role::User, Role::Admin] {
            assert_eq!(Role::parse(r.as_str()), Some(r));
        }
        for s in [Status::Active, Status::Inactive] {
            assert_eq!(Status::parse(s.as_str()), Some(s));
        }
    }
}
