//! The account & access-control procedure layer.
//!
//! Every operation validates its input, enforces its authentication and
//! authorization preconditions against the request context, and only then
//! touches the injected store. Failures are typed [`AppError`] values; no
//! partial writes occur because validation and gating run before any
//! mutation.

mod auth;
mod users;

pub use auth::{LoginInput, LoginOutput, SignupInput, UpsertExternalInput};
pub use users::{ChangePasswordInput, ListInput, ListOutput, UpdateProfileInput};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::identity::{RequestContext, SessionManager};
use crate::storage::{Role, Status, User, UserStore};

/// A user record as returned to callers: the password hash is stripped at
/// the type level, so no success payload can ever carry it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublicUser {
    pub id: i64,
    pub identity: String,
    pub email: String,
    pub name: Option<String>,
    pub login_method: Option<String>,
    pub role: Role,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_signed_in: DateTime<Utc>,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        PublicUser {
            id: u.id,
            identity: u.identity.clone(),
            email: u.email.clone(),
            name: u.name.clone(),
            login_method: u.login_method.clone(),
            role: u.role,
            status: u.status,
            created_at: u.created_at,
            updated_at: u.updated_at,
            last_signed_in: u.last_signed_in,
        }
    }
}

/// Uniform success acknowledgement for side-effect-only operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
}

impl Ack {
    pub fn ok() -> Self {
        Ack { success: true }
    }
}

/// The procedure layer. Owns its collaborators by injection: the store, the
/// session manager and the owner-identity policy input are all passed in at
/// construction, so tests can substitute an in-memory store without
/// patching anything.
#[derive(Clone)]
pub struct Procedures {
    store: Arc<dyn UserStore>,
    sessions: SessionManager,
    owner_identity: Option<String>,
}

impl Procedures {
    pub fn new(store: Arc<dyn UserStore>, sessions: SessionManager, owner_identity: Option<String>) -> Self {
        Self { store, sessions, owner_identity }
    }

    pub fn store(&self) -> &dyn UserStore {
        self.store.as_ref()
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub(crate) fn owner_identity(&self) -> Option<&str> {
        self.owner_identity.as_deref()
    }
}

pub(crate) fn require_user(ctx: &RequestContext) -> AppResult<&User> {
    ctx.user
        .as_ref()
        .ok_or_else(|| AppError::unauthenticated("not_authenticated", "Not authenticated"))
}

pub(crate) fn require_admin<'a>(ctx: &'a RequestContext, message: &str) -> AppResult<&'a User> {
    let user = require_user(ctx)?;
    if user.role != Role::Admin {
        return Err(AppError::forbidden("admin_only", message));
    }
    Ok(user)
}
