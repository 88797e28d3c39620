use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to connect to the database")]
    ConnectionError(#[from] sqlx::Error),

    #[error("database operation failed: {0}")]
    OperationFailed(sqlx::Error),

    #[error("failed to decode column {column}: {value}")]
    Decode { column: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, Error>;
