use crate::storage::User;

/// Read-only per-request context. Built once by the resolver before any
/// procedure body runs; procedures never re-resolve identity themselves.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// The authenticated caller, or `None` for anonymous requests.
    pub user: Option<User>,
    /// The session token the caller presented, valid or not. Logout uses it.
    pub token: Option<String>,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn for_user(user: User) -> Self {
        Self { user: Some(user), token: None }
    }
}
