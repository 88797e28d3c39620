pub mod error;
pub mod manager;
pub mod stats;

pub use error::{Error, Result};
pub use manager::{NewPosition, PortfolioManager};
pub use stats::PortfolioStats;
