pub mod core;
pub mod features;
pub mod scraping;
pub mod tools;

// --- Primary core exports ---
pub use self::core::types;
pub use self::core::types::*;
pub use self::core::{load_scout_config, ConfigError, ScoutConfig};

// --- Short module paths ---
pub use features::{antibot, persistence};
pub use tools::{discover, filter, merge, queries, score, search, store, verify};

pub use discover::{DiscoveryPipeline, PipelineSettings, QueryStatus, RunReport, ScoutError};
pub use persistence::{JsonFileGateway, MemoryGateway, PersistenceGateway};
