use thiserror::Error;

pub type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Entity not found: {0}")]
    NotFound(String),

    /// Unique constraint hit; carries the offending field when it can be told
    /// from the constraint name.
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    Other(String),
}

impl DatabaseError {
    pub fn not_found(entity: &str, id: &str) -> Self {
        Self::NotFound(format!("{} with id {} not found", entity, id))
    }

    pub fn duplicate(field: &str) -> Self {
        Self::DuplicateEntry(field.to_string())
    }

    /// Turn unique-constraint violations into `DuplicateEntry`, naming the
    /// column when the constraint name mentions it.
    pub fn classify(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                let field = match db_err.constraint() {
                    Some(name) if name.contains("username") => "username",
                    Some(name) if name.contains("email") => "email",
                    Some(name) => name,
                    None => "record",
                };
                return Self::duplicate(field);
            }
        }
        Self::ConnectionError(err)
    }
}
