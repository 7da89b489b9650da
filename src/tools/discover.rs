use crate::antibot::RateLimiters;
use crate::core::config::{ConfigError, ScoutConfig};
use crate::features::persistence::{record_key, PersistError, PersistenceGateway};
use crate::tools::filter::CandidateFilter;
use crate::tools::merge::DuplicateMerger;
use crate::tools::search::{
    normalize_payload, AsyncSearchClient, JobFailure, JobOutcome, OutscraperProvider, SearchError,
};
use crate::tools::store::CandidateStore;
use crate::tools::verify::{
    within_deadline, ClaimVerifier, HttpPageFetcher, SearchEngineProber, SocialSource,
    WebsiteSource,
};
use crate::types::{SearchQuery, VerifiedRecord};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ScoutError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error("HTTP client setup failed: {0}")]
    Http(String),
}

impl From<reqwest::Error> for ScoutError {
    fn from(err: reqwest::Error) -> Self {
        ScoutError::Http(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub query_workers: usize,
    pub verify_workers: usize,
    /// Per-candidate verification budget.
    pub verify_timeout: Duration,
    /// Whole-run budget; remaining units are abandoned and partial results kept.
    pub run_deadline: Option<Duration>,
    /// Maximum provider submissions per run.
    pub search_budget: Option<usize>,
    pub persist: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            query_workers: 8,
            verify_workers: 10,
            verify_timeout: Duration::from_secs(45),
            run_deadline: None,
            search_budget: None,
            persist: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryStatus {
    Completed {
        raw_results: usize,
        filtered_out: usize,
        new_candidates: usize,
    },
    Failed {
        reason: String,
    },
    /// Never submitted: the run halted or its deadline passed first.
    Skipped {
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    pub query: String,
    #[serde(flatten)]
    pub status: QueryStatus,
}

/// Everything one run did, returned to the caller instead of kept in globals.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub queries_total: usize,
    pub queries_succeeded: usize,
    pub queries_failed: usize,
    pub queries_skipped: usize,
    pub raw_results: usize,
    pub filtered_out: usize,
    /// Unique candidates admitted to the store.
    pub discovered: usize,
    /// Merged records with at least one piece of evidence.
    pub verified: usize,
    /// Candidates whose every source was checked without finding a claim.
    pub rejected: usize,
    /// Units that ran out of their own budget. Whatever they found is kept.
    pub verify_timeouts: usize,
    pub verify_abandoned: usize,
    pub persisted: usize,
    pub already_persisted: usize,
    pub persist_failures: usize,
    pub halted_reason: Option<String>,
    pub deadline_reached: bool,
    pub queries: Vec<QueryReport>,
    pub records: Vec<VerifiedRecord>,
}

enum VerifyOutcome {
    /// Every source finished; `found` is false for a negative result.
    Done { found: bool },
    /// The unit's own budget ran out; partial evidence was kept.
    TimedOut,
    /// The run deadline cut the unit short or it never started.
    Abandoned,
}

fn past(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

/// Discover → filter → store → verify → merge → persist.
pub struct DiscoveryPipeline {
    search: AsyncSearchClient,
    filter: CandidateFilter,
    verifier: ClaimVerifier,
    merger: DuplicateMerger,
    gateway: Arc<dyn PersistenceGateway>,
    settings: PipelineSettings,
}

impl DiscoveryPipeline {
    pub fn new(
        search: AsyncSearchClient,
        verifier: ClaimVerifier,
        gateway: Arc<dyn PersistenceGateway>,
    ) -> Self {
        Self {
            search,
            filter: CandidateFilter::default(),
            verifier,
            merger: DuplicateMerger::default(),
            gateway,
            settings: PipelineSettings::default(),
        }
    }

    pub fn with_filter(mut self, filter: CandidateFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_merger(mut self, merger: DuplicateMerger) -> Self {
        self.merger = merger;
        self
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Wire the production collaborators from configuration. Fails only on
    /// configuration problems (missing API key, bad vocabulary, bad URLs).
    pub fn from_config(
        cfg: &ScoutConfig,
        gateway: Arc<dyn PersistenceGateway>,
    ) -> Result<Self, ScoutError> {
        let api_key = cfg.provider.resolve_api_key()?;
        let vocabulary = cfg.resolve_vocabulary()?;
        let limits = RateLimiters::new(
            cfg.provider.resolve_requests_per_second(),
            cfg.website.resolve_requests_per_second(),
            cfg.social.resolve_requests_per_second(),
        );

        let api_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        let provider = OutscraperProvider::new(
            api_client,
            &cfg.provider.resolve_base_url(),
            api_key,
            cfg.provider.resolve_language(),
            cfg.provider.resolve_region(),
        )?;
        let search = AsyncSearchClient::new(Arc::new(provider), cfg.provider.resolve_poll_policy())
            .with_pacer(limits.search.clone());

        let mut verifier = ClaimVerifier::new(vocabulary.matcher());
        if cfg.website.resolve_enabled() {
            let fetcher = HttpPageFetcher::new(
                cfg.website.resolve_timeout(),
                cfg.website.resolve_connect_timeout(),
                cfg.website.resolve_max_redirects(),
            )
            .map_err(|e| ScoutError::Http(e.to_string()))?;
            verifier = verifier.with_website(
                WebsiteSource::new(Arc::new(fetcher), cfg.website.resolve_timeout())
                    .with_pacer(limits.website.clone()),
            );
        }
        if cfg.social.resolve_enabled() {
            let serp_client = reqwest::Client::builder()
                .timeout(cfg.social.resolve_timeout())
                .connect_timeout(Duration::from_secs(5))
                .build()?;
            let prober = SearchEngineProber::new(serp_client, &cfg.social.resolve_serp_endpoint())
                .map_err(|e| ScoutError::Http(e.to_string()))?;
            verifier = verifier.with_social(
                SocialSource::new(
                    Arc::new(prober),
                    cfg.social.resolve_platforms(),
                    cfg.social.resolve_max_usernames(),
                )
                .with_timeout(cfg.social.resolve_timeout())
                .with_pacer(limits.social.clone()),
            );
        }

        let settings = PipelineSettings {
            query_workers: cfg.pipeline.resolve_query_workers(),
            verify_workers: cfg.pipeline.resolve_verify_workers(),
            verify_timeout: cfg.pipeline.resolve_verify_timeout(),
            run_deadline: cfg.pipeline.resolve_run_deadline(),
            search_budget: cfg.provider.resolve_search_budget(),
            persist: true,
        };

        Ok(Self::new(search, verifier, gateway)
            .with_filter(CandidateFilter::new(&cfg.resolve_filter()))
            .with_settings(settings))
    }

    pub async fn run(&self, queries: Vec<SearchQuery>) -> RunReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();
        let deadline = self.settings.run_deadline.map(|d| clock + d);
        let queries_total = queries.len();

        info!(
            %run_id,
            queries = queries_total,
            query_workers = self.settings.query_workers,
            verify_workers = self.settings.verify_workers,
            "discovery run starting"
        );

        let store = CandidateStore::shared();
        let halt: Mutex<Option<String>> = Mutex::new(None);
        let submitted = AtomicUsize::new(0);

        // Phase 1: discover.
        let query_reports: Vec<QueryReport> = {
            let (store, halt, submitted) = (&store, &halt, &submitted);
            stream::iter(queries)
                .map(|query| async move {
                    let status = self.discover_one(&query, store, halt, submitted, deadline).await;
                    QueryReport {
                        query: query.text,
                        status,
                    }
                })
                .buffer_unordered(self.settings.query_workers.max(1))
                .collect()
                .await
        };

        let mut report = RunReport {
            run_id,
            started_at,
            duration_ms: 0,
            queries_total,
            queries_succeeded: 0,
            queries_failed: 0,
            queries_skipped: 0,
            raw_results: 0,
            filtered_out: 0,
            discovered: 0,
            verified: 0,
            rejected: 0,
            verify_timeouts: 0,
            verify_abandoned: 0,
            persisted: 0,
            already_persisted: 0,
            persist_failures: 0,
            halted_reason: current_halt(&halt),
            deadline_reached: false,
            queries: Vec::new(),
            records: Vec::new(),
        };
        for q in &query_reports {
            match &q.status {
                QueryStatus::Completed {
                    raw_results,
                    filtered_out,
                    ..
                } => {
                    report.queries_succeeded += 1;
                    report.raw_results += raw_results;
                    report.filtered_out += filtered_out;
                }
                QueryStatus::Failed { .. } => report.queries_failed += 1,
                QueryStatus::Skipped { .. } => report.queries_skipped += 1,
            }
        }
        report.queries = query_reports;

        // Phase 2: verify.
        let work = store.lock().await.work_items();
        report.discovered = work.len();
        info!(%run_id, candidates = work.len(), "verifying candidates");

        let outcomes: Vec<VerifyOutcome> = {
            let store = &store;
            stream::iter(work)
                .map(|(key, candidate)| async move {
                    if past(deadline) {
                        return VerifyOutcome::Abandoned;
                    }
                    let own = Instant::now() + self.settings.verify_timeout;
                    let cut_by_run = deadline.is_some_and(|d| d <= own);
                    let until = deadline.map_or(own, |d| d.min(own));

                    let verification = self.verifier.verify_until(&candidate, until).await;
                    let found = !verification.evidence.is_empty();
                    store.lock().await.attach_evidence(&key, verification.evidence);

                    if verification.complete {
                        VerifyOutcome::Done { found }
                    } else if cut_by_run {
                        VerifyOutcome::Abandoned
                    } else {
                        warn!(name = %candidate.name, found, "verification timed out; keeping partial evidence");
                        VerifyOutcome::TimedOut
                    }
                })
                .buffer_unordered(self.settings.verify_workers.max(1))
                .collect()
                .await
        };
        for o in &outcomes {
            match o {
                VerifyOutcome::Done { found: true } => {}
                VerifyOutcome::Done { found: false } => report.rejected += 1,
                VerifyOutcome::TimedOut => report.verify_timeouts += 1,
                VerifyOutcome::Abandoned => report.verify_abandoned += 1,
            }
        }
        report.deadline_reached = past(deadline);
        if report.deadline_reached {
            warn!(%run_id, abandoned = report.verify_abandoned, "run deadline reached; keeping partial results");
        }

        // Phase 3: merge.
        let snapshot = store.lock().await.snapshot();
        let records = self.merger.merge(&snapshot);
        report.verified = records.len();

        // Phase 4: persist.
        if self.settings.persist {
            self.persist(&records, &mut report).await;
        }

        report.records = records;
        report.duration_ms = clock.elapsed().as_millis() as u64;

        info!(
            %run_id,
            discovered = report.discovered,
            verified = report.verified,
            rejected = report.rejected,
            persisted = report.persisted,
            duration_ms = report.duration_ms,
            "discovery run finished"
        );
        report
    }

    async fn discover_one(
        &self,
        query: &SearchQuery,
        store: &crate::tools::store::SharedStore,
        halt: &Mutex<Option<String>>,
        submitted: &AtomicUsize,
        deadline: Option<Instant>,
    ) -> QueryStatus {
        if let Some(reason) = current_halt(halt) {
            return QueryStatus::Skipped { reason };
        }
        if past(deadline) {
            return QueryStatus::Skipped {
                reason: "run deadline reached".to_string(),
            };
        }
        if let Some(budget) = self.settings.search_budget {
            if submitted.fetch_add(1, Ordering::SeqCst) >= budget {
                let reason = format!("search budget of {} submissions spent", budget);
                set_halt(halt, &reason);
                return QueryStatus::Skipped { reason };
            }
        }

        let outcome = match within_deadline(deadline, self.search.search(query)).await {
            Some(o) => o,
            None => {
                return QueryStatus::Failed {
                    reason: "run deadline reached".to_string(),
                }
            }
        };

        match outcome {
            JobOutcome::Succeeded(payload) => {
                let candidates = normalize_payload(&payload, Some(&query.text));
                let raw_results = candidates.len();
                let mut filtered_out = 0;
                let mut new_candidates = 0;

                let mut store = store.lock().await;
                for candidate in candidates {
                    if !self.filter.is_relevant(&candidate) {
                        filtered_out += 1;
                    } else if store.upsert(candidate) {
                        new_candidates += 1;
                    }
                }

                info!(
                    query = %query.text,
                    raw_results,
                    filtered_out,
                    new_candidates,
                    "query completed"
                );
                QueryStatus::Completed {
                    raw_results,
                    filtered_out,
                    new_candidates,
                }
            }
            JobOutcome::Failed(JobFailure::QuotaExhausted(msg)) => {
                warn!(query = %query.text, "provider quota exhausted; halting submissions: {}", msg);
                set_halt(halt, &format!("quota exhausted: {}", msg));
                QueryStatus::Failed {
                    reason: JobFailure::QuotaExhausted(msg).to_string(),
                }
            }
            JobOutcome::Failed(failure) => {
                warn!(query = %query.text, "query abandoned: {}", failure);
                QueryStatus::Failed {
                    reason: failure.to_string(),
                }
            }
        }
    }

    /// At most one upsert per record name per run. Existing rows are
    /// refreshed, not duplicated.
    async fn persist(&self, records: &[VerifiedRecord], report: &mut RunReport) {
        let mut seen = HashSet::new();
        for record in records {
            let name = &record.candidate.name;
            if !seen.insert(record_key(name)) {
                warn!(name = %name, "another record with this name was already persisted this run; skipping");
                continue;
            }

            let existed = match self.gateway.exists(name).await {
                Ok(e) => e,
                Err(e) => {
                    warn!(name = %name, "persistence lookup failed: {}", e);
                    report.persist_failures += 1;
                    continue;
                }
            };

            match self.gateway.upsert(record).await {
                Ok(()) if existed => report.already_persisted += 1,
                Ok(()) => report.persisted += 1,
                Err(e) => {
                    warn!(name = %name, "persisting record failed: {}", e);
                    report.persist_failures += 1;
                }
            }
        }
    }
}

fn current_halt(halt: &Mutex<Option<String>>) -> Option<String> {
    halt.lock().ok().and_then(|h| h.clone())
}

fn set_halt(halt: &Mutex<Option<String>>, reason: &str) {
    if let Ok(mut h) = halt.lock() {
        if h.is_none() {
            *h = Some(reason.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_past_deadline() {
        let deadline = Some(Instant::now() + Duration::from_secs(5));
        assert!(!past(deadline));
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(past(deadline));
        assert!(!past(None));
    }

    #[test]
    fn test_halt_reason_is_sticky() {
        let halt = Mutex::new(None);
        set_halt(&halt, "quota exhausted: 402");
        set_halt(&halt, "search budget of 3 submissions spent");
        assert_eq!(current_halt(&halt).as_deref(), Some("quota exhausted: 402"));
    }

    #[test]
    fn test_query_status_serializes_tagged() {
        let r = QueryReport {
            query: "sourdough pizza in Austin".into(),
            status: QueryStatus::Skipped {
                reason: "quota exhausted: 402".into(),
            },
        };
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["status"], "skipped");
        assert_eq!(v["reason"], "quota exhausted: 402");
    }
}
