//! Error types for pgplus

use thiserror::Error;

/// Result type alias for pgplus operations
pub type PgResult<T> = Result<T, PgError>;

/// Error types for database operations
#[derive(Debug, Error)]
pub enum PgError {
    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution error reported by the driver
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// Zero rows where one or more were required
    #[error("Not found: {0}")]
    NotFound(String),

    /// A caller precondition was violated (nothing was sent to the database)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unique constraint violation
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation
    #[error("Check constraint violation: {0}")]
    CheckViolation(String),

    /// Column decode error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Row decode into a typed value failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Pool error
    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl PgError {
    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is an invalid input error
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }

    /// Check if this is a unique violation error
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }

    /// Whether the error came from the database or the transport rather than
    /// from the wrapper's own row-count and input checks.
    pub fn is_driver_failure(&self) -> bool {
        match self {
            Self::Connection(_)
            | Self::Query(_)
            | Self::UniqueViolation(_)
            | Self::ForeignKeyViolation(_)
            | Self::CheckViolation(_) => true,
            #[cfg(feature = "pool")]
            Self::Pool(_) => true,
            _ => false,
        }
    }

    /// SQLSTATE code, when the error carries or implies one.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Self::UniqueViolation(_) => Some("23505"),
            Self::ForeignKeyViolation(_) => Some("23503"),
            Self::CheckViolation(_) => Some("23514"),
            Self::Query(err) => err.as_db_error().map(|db| db.code().code()),
            _ => None,
        }
    }

    /// Parse a tokio_postgres error into a more specific PgError
    pub fn from_db_error(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let constraint = db_err.constraint().unwrap_or("unknown");
            let message = db_err.message();

            match db_err.code().code() {
                "23505" => return Self::UniqueViolation(format!("{}: {}", constraint, message)),
                "23503" => {
                    return Self::ForeignKeyViolation(format!("{}: {}", constraint, message));
                }
                "23514" => return Self::CheckViolation(format!("{}: {}", constraint, message)),
                _ => {}
            }
        }
        Self::Query(err)
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for PgError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}
