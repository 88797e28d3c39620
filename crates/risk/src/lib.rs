pub mod error;
pub mod manager;
pub mod settings;

pub use error::{Error, Result};
pub use manager::RiskManager;
pub use settings::{RiskSettings, SizingMethod};
