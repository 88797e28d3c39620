use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to load configuration")]
    LoadError(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;
