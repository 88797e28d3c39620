use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unknown {kind} value: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, Error>;
