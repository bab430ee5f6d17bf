pub mod connection;
pub mod error;
pub mod repositories;
pub mod store;

#[cfg(feature = "test-utils")]
pub mod mocks;

pub use connection::{Database, DatabaseConfig};
pub use error::{DatabaseError, Result};
pub use repositories::{auth::PgAuthRepository, logs::PgLogRepository};
pub use store::{AuthStore, LogStore};
