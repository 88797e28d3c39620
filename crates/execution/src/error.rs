use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("no price available for {0}")]
    PriceUnavailable(String),

    #[error(transparent)]
    Exchange(#[from] exchange_client::Error),

    #[error(transparent)]
    Database(#[from] database::Error),

    #[error(transparent)]
    Portfolio(#[from] portfolio::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
