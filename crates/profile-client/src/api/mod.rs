mod auth;
mod client;

pub use auth::StoredSession;
pub use client::{ApiClient, ApiError};
