//! Bearer-token authentication
//!
//! Handles:
//! - Signed session tokens
//! - Authentication middleware and extractors
//! - Admin role check

mod middleware;
pub mod session;

pub use middleware::{AdminUser, CurrentUser, require_auth};
pub use session::{ADMIN_ROLE, Session, create_session_token, verify_session_token};
