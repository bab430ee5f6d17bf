pub mod auth;
pub mod request_log;

pub use auth::{require_auth, AuthUser};
pub use request_log::log_failures;
