use crate::tools::filter::FilterLists;
use crate::tools::verify::{ClaimVocabulary, Platform};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

// ---------------------------------------------------------------------------
// ScoutConfig: file-based config loader (sourdough-scout.json) with env-var fallback
// ---------------------------------------------------------------------------

pub const CONFIG_FILE_NAME: &str = "sourdough-scout.json";
pub const ENV_CONFIG_PATH: &str = "SOURDOUGH_SCOUT_CONFIG";
pub const ENV_API_KEY: &str = "OUTSCRAPER_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing credentials: set `provider.api_key` in sourdough-scout.json or {0}")]
    MissingCredentials(&'static str),

    #[error("config parse error at {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid setting {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.trim().parse().ok())
}

fn non_blank(v: &Option<String>) -> Option<String> {
    v.as_ref().filter(|s| !s.trim().is_empty()).map(|s| s.trim().to_string())
}

/// Places-search provider sub-config (`provider` key).
#[derive(serde::Deserialize, Default, Clone, Debug)]
#[serde(default)]
pub struct ProviderConfig {
    /// Never logged.
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub language: Option<String>,
    pub region: Option<String>,
    /// Results requested per query. Default: 20.
    pub results_per_query: Option<u32>,
    /// Submits + polls per second across all workers. Default: 2.
    pub requests_per_second: Option<f64>,
    pub poll_initial_delay_secs: Option<f64>,
    pub poll_max_delay_secs: Option<f64>,
    pub poll_multiplier: Option<f64>,
    pub poll_max_attempts: Option<u32>,
    /// Hard cap on provider submissions per run.
    pub search_budget: Option<usize>,
}

impl ProviderConfig {
    /// API key: JSON field → `OUTSCRAPER_API_KEY` → error.
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        non_blank(&self.api_key)
            .or_else(|| env_string(ENV_API_KEY))
            .ok_or(ConfigError::MissingCredentials(ENV_API_KEY))
    }

    /// Base URL: JSON field → `OUTSCRAPER_BASE_URL` → public API.
    pub fn resolve_base_url(&self) -> String {
        non_blank(&self.base_url)
            .or_else(|| env_string("OUTSCRAPER_BASE_URL"))
            .unwrap_or_else(|| crate::tools::search::outscraper::DEFAULT_BASE_URL.to_string())
    }

    pub fn resolve_language(&self) -> String {
        non_blank(&self.language).unwrap_or_else(|| "en".to_string())
    }

    pub fn resolve_region(&self) -> Option<String> {
        non_blank(&self.region).or_else(|| env_string("SCOUT_REGION"))
    }

    pub fn resolve_results_per_query(&self) -> u32 {
        self.results_per_query
            .or_else(|| env_parse("SCOUT_RESULTS_PER_QUERY"))
            .unwrap_or(20)
    }

    pub fn resolve_requests_per_second(&self) -> f64 {
        self.requests_per_second
            .or_else(|| env_parse("SCOUT_SEARCH_RPS"))
            .unwrap_or(2.0)
    }

    pub fn resolve_poll_policy(&self) -> crate::tools::search::PollPolicy {
        let d = crate::tools::search::PollPolicy::default();
        crate::tools::search::PollPolicy {
            initial_delay: self
                .poll_initial_delay_secs
                .and_then(|s| Duration::try_from_secs_f64(s).ok())
                .unwrap_or(d.initial_delay),
            max_delay: self
                .poll_max_delay_secs
                .and_then(|s| Duration::try_from_secs_f64(s).ok())
                .unwrap_or(d.max_delay),
            multiplier: self.poll_multiplier.unwrap_or(d.multiplier),
            max_attempts: self.poll_max_attempts.unwrap_or(d.max_attempts),
        }
    }

    pub fn resolve_search_budget(&self) -> Option<usize> {
        self.search_budget.or_else(|| env_parse("SCOUT_SEARCH_BUDGET"))
    }
}

/// Website evidence sub-config (`website` key).
#[derive(serde::Deserialize, Default, Clone, Debug)]
#[serde(default)]
pub struct WebsiteConfig {
    pub enabled: Option<bool>,
    pub timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub max_redirects: Option<usize>,
    pub requests_per_second: Option<f64>,
}

impl WebsiteConfig {
    pub fn resolve_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// Fetch timeout: JSON field → `SCOUT_WEBSITE_TIMEOUT_SECS` → 10.
    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(
            self.timeout_secs
                .or_else(|| env_parse("SCOUT_WEBSITE_TIMEOUT_SECS"))
                .unwrap_or(10),
        )
    }

    pub fn resolve_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.unwrap_or(5))
    }

    pub fn resolve_max_redirects(&self) -> usize {
        self.max_redirects.unwrap_or(5)
    }

    pub fn resolve_requests_per_second(&self) -> f64 {
        self.requests_per_second
            .or_else(|| env_parse("SCOUT_WEBSITE_RPS"))
            .unwrap_or(4.0)
    }
}

/// Social-media probe sub-config (`social` key).
#[derive(serde::Deserialize, Default, Clone, Debug)]
#[serde(default)]
pub struct SocialConfig {
    pub enabled: Option<bool>,
    pub platforms: Option<Vec<Platform>>,
    pub max_usernames: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub requests_per_second: Option<f64>,
    pub serp_endpoint: Option<String>,
}

impl SocialConfig {
    pub fn resolve_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// Default: Instagram, then Facebook.
    pub fn resolve_platforms(&self) -> Vec<Platform> {
        match &self.platforms {
            Some(p) if !p.is_empty() => p.clone(),
            _ => vec![Platform::Instagram, Platform::Facebook],
        }
    }

    pub fn resolve_max_usernames(&self) -> usize {
        self.max_usernames.unwrap_or(3)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(10))
    }

    /// Kept low: the search engine blocks bursty clients quickly.
    pub fn resolve_requests_per_second(&self) -> f64 {
        self.requests_per_second
            .or_else(|| env_parse("SCOUT_SOCIAL_RPS"))
            .unwrap_or(0.5)
    }

    pub fn resolve_serp_endpoint(&self) -> String {
        non_blank(&self.serp_endpoint)
            .unwrap_or_else(|| crate::tools::verify::social::DEFAULT_SERP_ENDPOINT.to_string())
    }
}

/// Worker pools and deadlines (`pipeline` key).
#[derive(serde::Deserialize, Default, Clone, Debug)]
#[serde(default)]
pub struct PipelineConfig {
    pub query_workers: Option<usize>,
    pub verify_workers: Option<usize>,
    pub verify_timeout_secs: Option<u64>,
    /// Whole-run deadline. Unset means no deadline.
    pub run_deadline_secs: Option<u64>,
}

impl PipelineConfig {
    pub fn resolve_query_workers(&self) -> usize {
        self.query_workers
            .or_else(|| env_parse("SCOUT_QUERY_WORKERS"))
            .unwrap_or(8)
            .max(1)
    }

    pub fn resolve_verify_workers(&self) -> usize {
        self.verify_workers
            .or_else(|| env_parse("SCOUT_VERIFY_WORKERS"))
            .unwrap_or(10)
            .max(1)
    }

    pub fn resolve_verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_secs.unwrap_or(45))
    }

    pub fn resolve_run_deadline(&self) -> Option<Duration> {
        self.run_deadline_secs
            .or_else(|| env_parse("SCOUT_RUN_DEADLINE_SECS"))
            .map(Duration::from_secs)
    }
}

/// Query expansion inputs (`queries` key).
#[derive(serde::Deserialize, Default, Clone, Debug)]
#[serde(default)]
pub struct QueryConfig {
    pub terms: Option<Vec<String>>,
    pub city: Option<String>,
    pub neighborhoods: Vec<String>,
}

impl QueryConfig {
    pub fn resolve_city(&self) -> Option<String> {
        non_blank(&self.city).or_else(|| env_string("SCOUT_CITY"))
    }
}

/// Top-level config loaded from `sourdough-scout.json`.
#[derive(serde::Deserialize, Default, Clone, Debug)]
#[serde(default)]
pub struct ScoutConfig {
    pub provider: ProviderConfig,
    pub website: WebsiteConfig,
    pub social: SocialConfig,
    pub pipeline: PipelineConfig,
    pub queries: QueryConfig,
    pub filter: Option<FilterLists>,
    pub vocabulary: Option<ClaimVocabulary>,
    pub store_path: Option<String>,
}

impl ScoutConfig {
    pub fn resolve_filter(&self) -> FilterLists {
        self.filter.clone().unwrap_or_default()
    }

    pub fn resolve_vocabulary(&self) -> Result<ClaimVocabulary, ConfigError> {
        let vocab = self.vocabulary.clone().unwrap_or_default();
        if vocab.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "vocabulary.keywords",
                message: "at least one keyword is required".to_string(),
            });
        }
        Ok(vocab)
    }

    /// Store path: JSON field → `SCOUT_STORE_PATH` → `~/.sourdough-scout/records.json`
    /// → `./sourdough-records.json` when there is no home directory.
    pub fn resolve_store_path(&self) -> PathBuf {
        non_blank(&self.store_path)
            .or_else(|| env_string("SCOUT_STORE_PATH"))
            .map(PathBuf::from)
            .or_else(crate::features::persistence::default_store_path)
            .unwrap_or_else(|| PathBuf::from("sourdough-records.json"))
    }
}

/// Load `sourdough-scout.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `SOURDOUGH_SCOUT_CONFIG` env var path
/// 2. `./sourdough-scout.json`
/// 3. `../sourdough-scout.json`
///
/// Missing file → `ScoutConfig::default()` (all env-var fallbacks apply).
/// Parse error → `ConfigError::Parse`.
pub fn load_scout_config() -> Result<ScoutConfig, ConfigError> {
    let mut candidates = vec![
        PathBuf::from(CONFIG_FILE_NAME),
        PathBuf::from("..").join(CONFIG_FILE_NAME),
    ];
    if let Some(env_path) = env_string(ENV_CONFIG_PATH) {
        candidates.insert(0, PathBuf::from(env_path));
    }

    for path in &candidates {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let cfg = parse_config(&contents).map_err(|message| ConfigError::Parse {
                    path: path.display().to_string(),
                    message,
                })?;
                tracing::info!("{} loaded from {}", CONFIG_FILE_NAME, path.display());
                return Ok(cfg);
            }
            Err(_) => continue,
        }
    }

    tracing::debug!("no {} found; using defaults", CONFIG_FILE_NAME);
    Ok(ScoutConfig::default())
}

pub fn parse_config(contents: &str) -> Result<ScoutConfig, String> {
    serde_json::from_str::<ScoutConfig>(contents).map_err(|e| e.to_string())
}
