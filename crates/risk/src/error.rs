use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("risk check vetoed: {reason}")]
    Vetoed { reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
