pub mod normalize;
pub mod outscraper;

use crate::antibot::Pacer;
use crate::types::SearchQuery;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub use normalize::{normalize_payload, parse_candidate};
pub use outscraper::OutscraperProvider;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("provider reported failure: {0}")]
    Provider(String),
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        SearchError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::Parse(err.to_string())
    }
}

/// Provider-assigned id of a job that did not resolve synchronously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub id: String,
    pub query: String,
}

/// Result of submitting a query.
#[derive(Debug, Clone)]
pub enum Submission {
    /// The provider answered inline; no polling needed.
    Completed(Value),
    Pending(JobHandle),
}

/// What one status poll reported.
#[derive(Debug, Clone)]
pub enum JobState {
    Pending,
    Succeeded(Value),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobFailure {
    /// Still pending after the attempt ceiling.
    Timeout { attempts: u32 },
    /// Provider returned a terminal `Error` status.
    Provider(String),
    /// Submission itself failed (network, HTTP status, unparseable envelope).
    Submit(String),
    QuotaExhausted(String),
}

impl std::fmt::Display for JobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobFailure::Timeout { attempts } => {
                write!(f, "timeout: still pending after {} polls", attempts)
            }
            JobFailure::Provider(e) => write!(f, "provider error: {}", e),
            JobFailure::Submit(e) => write!(f, "submit failed: {}", e),
            JobFailure::QuotaExhausted(e) => write!(f, "quota exhausted: {}", e),
        }
    }
}

/// Terminal outcome of one query, as reported to the pipeline.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Succeeded(Value),
    Failed(JobFailure),
}

/// External places/business-search provider with an async job API.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn submit(&self, query: &SearchQuery) -> Result<Submission, SearchError>;

    async fn poll(&self, job: &JobHandle) -> Result<JobState, SearchError>;
}

/// Increasing delay between status polls, with a hard attempt ceiling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(8),
            max_delay: Duration::from_secs(15),
            multiplier: 1.5,
            max_attempts: 7,
        }
    }
}

impl PollPolicy {
    /// Delay before poll number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(64) as i32);
        let secs = self.initial_delay.as_secs_f64() * factor;
        Duration::try_from_secs_f64(secs)
            .map(|d| d.min(self.max_delay))
            .unwrap_or(self.max_delay)
    }
}

/// Submits a query and drives the provider's job to a terminal state.
#[derive(Clone)]
pub struct AsyncSearchClient {
    provider: Arc<dyn SearchProvider>,
    policy: PollPolicy,
    pacer: Option<Pacer>,
}

impl AsyncSearchClient {
    pub fn new(provider: Arc<dyn SearchProvider>, policy: PollPolicy) -> Self {
        Self {
            provider,
            policy,
            pacer: None,
        }
    }

    /// Every submit and every poll draws a token from `pacer`.
    pub fn with_pacer(mut self, pacer: Pacer) -> Self {
        self.pacer = Some(pacer);
        self
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    async fn pace(&self) {
        if let Some(p) = &self.pacer {
            p.ready().await;
        }
    }

    pub async fn search(&self, query: &SearchQuery) -> JobOutcome {
        self.pace().await;
        let handle = match self.provider.submit(query).await {
            Ok(Submission::Completed(payload)) => {
                debug!(query = %query.text, "provider answered inline");
                return JobOutcome::Succeeded(payload);
            }
            Ok(Submission::Pending(handle)) => handle,
            Err(SearchError::QuotaExhausted(msg)) => {
                return JobOutcome::Failed(JobFailure::QuotaExhausted(msg));
            }
            Err(SearchError::Provider(msg)) => {
                return JobOutcome::Failed(JobFailure::Provider(msg));
            }
            Err(e) => return JobOutcome::Failed(JobFailure::Submit(e.to_string())),
        };

        info!(query = %query.text, job_id = %handle.id, "search job pending, polling");
        self.wait_for_job(&handle).await
    }

    /// Poll until the job leaves `Pending` or the attempt ceiling is reached.
    /// Transport errors on a poll consume an attempt and are otherwise ignored.
    pub async fn wait_for_job(&self, handle: &JobHandle) -> JobOutcome {
        for attempt in 0..self.policy.max_attempts {
            tokio::time::sleep(self.policy.delay_for(attempt)).await;
            self.pace().await;

            match self.provider.poll(handle).await {
                Ok(JobState::Succeeded(payload)) => {
                    debug!(job_id = %handle.id, polls = attempt + 1, "search job succeeded");
                    return JobOutcome::Succeeded(payload);
                }
                Ok(JobState::Failed(reason)) => {
                    warn!(job_id = %handle.id, query = %handle.query, "search job failed: {}", reason);
                    return JobOutcome::Failed(JobFailure::Provider(reason));
                }
                Ok(JobState::Pending) => {
                    debug!(job_id = %handle.id, attempt = attempt + 1, "search job still pending");
                }
                Err(SearchError::QuotaExhausted(msg)) => {
                    return JobOutcome::Failed(JobFailure::QuotaExhausted(msg));
                }
                Err(e) => {
                    warn!(job_id = %handle.id, attempt = attempt + 1, "poll failed: {}", e);
                }
            }
        }

        warn!(
            job_id = %handle.id,
            query = %handle.query,
            attempts = self.policy.max_attempts,
            "search job timed out"
        );
        JobOutcome::Failed(JobFailure::Timeout {
            attempts: self.policy.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a scripted sequence of poll results.
    struct ScriptedProvider {
        submit: Mutex<Option<Result<Submission, SearchError>>>,
        polls: Mutex<VecDeque<Result<JobState, SearchError>>>,
        poll_count: Mutex<u32>,
    }

    impl ScriptedProvider {
        fn pending_then(polls: Vec<Result<JobState, SearchError>>) -> Self {
            Self {
                submit: Mutex::new(Some(Ok(Submission::Pending(JobHandle {
                    id: "job-1".into(),
                    query: "sourdough pizza".into(),
                })))),
                polls: Mutex::new(polls.into()),
                poll_count: Mutex::new(0),
            }
        }

        fn polls_made(&self) -> u32 {
            *self.poll_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl SearchProvider for ScriptedProvider {
        async fn submit(&self, _query: &SearchQuery) -> Result<Submission, SearchError> {
            self.submit
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(SearchError::Provider("submitted twice".into())))
        }

        async fn poll(&self, _job: &JobHandle) -> Result<JobState, SearchError> {
            *self.poll_count.lock().unwrap() += 1;
            self.polls
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(JobState::Pending))
        }
    }

    fn query() -> SearchQuery {
        SearchQuery::new("sourdough pizza", 20)
    }

    #[test]
    fn test_delay_schedule_grows_and_caps() {
        let p = PollPolicy::default();
        assert_eq!(p.delay_for(0), Duration::from_secs(8));
        assert_eq!(p.delay_for(1), Duration::from_secs(12));
        assert_eq!(p.delay_for(2), Duration::from_secs(15));
        assert_eq!(p.delay_for(6), Duration::from_secs(15));
    }

    #[test]
    fn test_delay_schedule_survives_extreme_values() {
        let p = PollPolicy {
            initial_delay: Duration::ZERO,
            max_delay: Duration::from_secs(15),
            multiplier: f64::INFINITY,
            max_attempts: 7,
        };
        // 0 * inf is NaN; the cap still applies.
        assert_eq!(p.delay_for(3), Duration::from_secs(15));

        let p = PollPolicy {
            initial_delay: Duration::from_secs(u64::MAX / 2),
            multiplier: 1e300,
            ..PollPolicy::default()
        };
        assert_eq!(p.delay_for(64), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inline_results_short_circuit() {
        let provider = Arc::new(ScriptedProvider {
            submit: Mutex::new(Some(Ok(Submission::Completed(json!([{"name": "A"}]))))),
            polls: Mutex::new(VecDeque::new()),
            poll_count: Mutex::new(0),
        });
        let client = AsyncSearchClient::new(provider.clone(), PollPolicy::default());
        let start = tokio::time::Instant::now();

        let outcome = client.search(&query()).await;

        assert!(matches!(outcome, JobOutcome::Succeeded(_)));
        assert_eq!(provider.polls_made(), 0);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_success_with_backoff() {
        let provider = Arc::new(ScriptedProvider::pending_then(vec![
            Ok(JobState::Pending),
            Err(SearchError::Network("connection reset".into())),
            Ok(JobState::Succeeded(json!([[{"name": "A"}]]))),
        ]));
        let client = AsyncSearchClient::new(provider.clone(), PollPolicy::default());
        let start = tokio::time::Instant::now();

        let outcome = client.search(&query()).await;

        assert!(matches!(outcome, JobOutcome::Succeeded(_)));
        assert_eq!(provider.polls_made(), 3);
        // 8s + 12s + 15s of backoff before the third poll.
        assert!(start.elapsed() >= Duration::from_secs(35));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_ceiling_yields_timeout() {
        let provider = Arc::new(ScriptedProvider::pending_then(Vec::new()));
        let policy = PollPolicy {
            max_attempts: 6,
            ..PollPolicy::default()
        };
        let client = AsyncSearchClient::new(provider.clone(), policy);

        let outcome = client.search(&query()).await;

        match outcome {
            JobOutcome::Failed(JobFailure::Timeout { attempts }) => assert_eq!(attempts, 6),
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(provider.polls_made(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_error_is_terminal_and_not_retried() {
        let provider = Arc::new(ScriptedProvider::pending_then(vec![Ok(JobState::Failed(
            "invalid query".into(),
        ))]));
        let client = AsyncSearchClient::new(provider.clone(), PollPolicy::default());

        let outcome = client.search(&query()).await;

        match outcome {
            JobOutcome::Failed(JobFailure::Provider(reason)) => assert_eq!(reason, "invalid query"),
            other => panic!("expected provider failure, got {:?}", other),
        }
        assert_eq!(provider.polls_made(), 1);
    }

    #[tokio::test]
    async fn test_quota_on_submit_is_reported() {
        let provider = Arc::new(ScriptedProvider {
            submit: Mutex::new(Some(Err(SearchError::QuotaExhausted("402".into())))),
            polls: Mutex::new(VecDeque::new()),
            poll_count: Mutex::new(0),
        });
        let client = AsyncSearchClient::new(provider, PollPolicy::default());

        let outcome = client.search(&query()).await;

        assert!(matches!(
            outcome,
            JobOutcome::Failed(JobFailure::QuotaExhausted(_))
        ));
    }
}
