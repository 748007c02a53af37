//! Data layer module
//!
//! Handles all data persistence and caching:
//! - SQLite database operations
//! - View deduplication cache (volatile)

mod cache;
mod database;
mod models;

pub use cache::{ViewCache, session_fingerprint, view_key};
pub use database::Database;
pub use models::*;
