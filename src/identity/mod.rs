//! Central identity and session management.
//! Keep the public surface thin and split implementation across sub-modules.

mod owner;
mod request_context;
mod resolver;
mod session;

pub use owner::role_for_new_identity;
pub use request_context::RequestContext;
pub use resolver::resolve_identity;
pub use session::{Session, SessionManager, SessionToken};
