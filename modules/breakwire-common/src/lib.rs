pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, EngineConfig, KudosConfig, MatchConfig, ViralityConfig};
pub use error::BreakwireError;
pub use types::*;
