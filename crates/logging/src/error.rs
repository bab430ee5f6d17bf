use thiserror::Error;
use ticketing_database::DatabaseError;

pub type Result<T> = std::result::Result<T, LogError>;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("Log store error: {0}")]
    Store(#[from] DatabaseError),

    /// Deleting without any condition would wipe the table.
    #[error("At least one filter is required")]
    EmptyFilter,
}
