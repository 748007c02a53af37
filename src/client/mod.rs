//! Client side of the notification mechanism
//!
//! - `ApiClient`: notification source over the REST API
//! - `ClientSession`: login/logout lifecycle of a feed and its poller

mod api;
mod session;

pub use api::ApiClient;
pub use session::ClientSession;
