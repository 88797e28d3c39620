use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Database(#[from] database::Error),

    #[error("invalid position: {0}")]
    InvalidPosition(String),
}

pub type Result<T> = std::result::Result<T, Error>;
