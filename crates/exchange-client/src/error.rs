use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("deserialization failed: {0}")]
    DeserializationFailed(#[from] serde_json::Error),
    #[error("exchange error: code {code}, msg: {msg}")]
    ApiError { code: i64, msg: String },
    #[error("missing field in exchange response: {0}")]
    MissingField(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
