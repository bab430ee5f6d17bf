pub mod auth;
pub mod logs;
pub mod sessions;
pub mod users;
