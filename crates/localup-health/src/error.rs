use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HealthError {
    #[error("cluster not healthy after {0:?}")]
    Timeout(Duration),

    #[error("invalid table name: {0:?}")]
    InvalidTable(String),

    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for HealthError {
    fn from(e: sqlx::Error) -> Self {
        HealthError::Database(e.to_string())
    }
}
