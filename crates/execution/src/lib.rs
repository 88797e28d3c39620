pub mod error;
pub mod executor;

pub use error::{Error, Result};
pub use executor::OrderExecutor;
