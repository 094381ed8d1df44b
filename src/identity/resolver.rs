use tracing::error;

use super::request_context::RequestContext;
use super::session::SessionManager;
use crate::storage::{Status, UserStore};

/// Resolve the caller's identity for one request.
///
/// A token claim alone is never trusted: the user record is re-fetched from
/// the store because role and status may have changed since the session was
/// issued. A user that has been deactivated, or deleted out from under a
/// live session, resolves to anonymous.
pub fn resolve_identity(
    store: &dyn UserStore,
    sessions: &SessionManager,
    token: Option<&str>,
) -> RequestContext {
    let token = match token {
        Some(t) => t.to_string(),
        None => return RequestContext::anonymous(),
    };
    let Some(user_id) = sessions.validate(&token) else {
        return RequestContext { user: None, token: Some(token) };
    };
    let user = match store.find_by_id(user_id) {
        Ok(u) => u,
        Err(e) => {
            error!("identity resolution failed for user_id={}: {}", user_id, e);
            None
        }
    };
    let user = user.filter(|u| u.status == Status::Active);
    RequestContext { user, token: Some(token) }
}
