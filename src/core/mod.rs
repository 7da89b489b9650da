pub mod config;
pub mod text;
pub mod types;

pub use config::{load_scout_config, ConfigError, ScoutConfig};
