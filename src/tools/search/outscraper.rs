use super::{JobHandle, JobState, SearchError, SearchProvider, Submission};
use crate::types::SearchQuery;
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.app.outscraper.com";

/// Envelope returned by both the search and the request-status endpoints.
#[derive(Debug, Clone, Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default, rename = "errorMessage")]
    error_message: Option<String>,
}

impl Envelope {
    fn error_text(&self) -> String {
        if let Some(msg) = &self.error_message {
            return msg.clone();
        }
        match &self.error {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "unspecified provider error".to_string(),
        }
    }
}

/// Places search over the Outscraper-style async job API.
pub struct OutscraperProvider {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
    language: String,
    region: Option<String>,
}

impl OutscraperProvider {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        api_key: String,
        language: String,
        region: Option<String>,
    ) -> Result<Self, SearchError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| SearchError::Parse(format!("invalid provider base URL {}: {}", base_url, e)))?;
        Ok(Self {
            client,
            base_url,
            api_key,
            language,
            region,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, SearchError> {
        let joined = format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path);
        Url::parse(&joined).map_err(|e| SearchError::Parse(e.to_string()))
    }

    fn search_url(&self, query: &SearchQuery) -> Result<Url, SearchError> {
        let mut url = self.endpoint("/maps/search-v3")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("query", &query.text);
            pairs.append_pair("limit", &query.limit.to_string());
            pairs.append_pair("language", &self.language);
            if let Some(region) = &self.region {
                pairs.append_pair("region", region);
            }
            pairs.append_pair("async", "true");
        }
        Ok(url)
    }

    /// GET with bounded exponential retry on transport errors. HTTP error
    /// statuses are not retried here; they are classified by the caller.
    async fn get_envelope(&self, url: Url) -> Result<Envelope, SearchError> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(250))
            .with_max_interval(Duration::from_secs(2))
            .with_max_elapsed_time(Some(Duration::from_secs(6)))
            .build();

        let resp = retry(policy, || async {
            self.client
                .get(url.clone())
                .header("X-API-KEY", &self.api_key)
                .header("Accept", "application/json")
                .send()
                .await
                .map_err(backoff::Error::transient)
        })
        .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let text = resp.text().await?;
        Ok(serde_json::from_str::<Envelope>(&text)?)
    }
}

fn classify_status(status: StatusCode, body: String) -> SearchError {
    if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::PAYMENT_REQUIRED {
        return SearchError::QuotaExhausted(format!("HTTP {}: {}", status.as_u16(), body));
    }
    SearchError::Api {
        status: status.as_u16(),
        message: body,
    }
}

#[async_trait]
impl SearchProvider for OutscraperProvider {
    async fn submit(&self, query: &SearchQuery) -> Result<Submission, SearchError> {
        let url = self.search_url(query)?;
        debug!(query = %query.text, limit = query.limit, "submitting places search");
        let env = self.get_envelope(url).await?;

        match (env.status.as_deref(), env.data, env.id) {
            (Some(s), _, _) if s.eq_ignore_ascii_case("error") => {
                Err(SearchError::Provider(env.error_message.unwrap_or_else(|| {
                    env.error
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "unspecified provider error".to_string())
                })))
            }
            (_, Some(data), _) => Ok(Submission::Completed(data)),
            (_, None, Some(id)) => {
                info!(query = %query.text, job_id = %id, "places search queued");
                Ok(Submission::Pending(JobHandle {
                    id,
                    query: query.text.clone(),
                }))
            }
            (_, None, None) => Err(SearchError::Parse(
                "search response had neither data nor a job id".to_string(),
            )),
        }
    }

    async fn poll(&self, job: &JobHandle) -> Result<JobState, SearchError> {
        let url = self.endpoint(&format!("/requests/{}", job.id))?;
        let env = self.get_envelope(url).await?;
        Ok(job_state(env))
    }
}

fn job_state(env: Envelope) -> JobState {
    let status = env.status.clone().unwrap_or_default();
    if status.eq_ignore_ascii_case("success") {
        return JobState::Succeeded(env.data.unwrap_or(Value::Array(Vec::new())));
    }
    if status.eq_ignore_ascii_case("error") || status.eq_ignore_ascii_case("failed") {
        return JobState::Failed(env.error_text());
    }
    JobState::Pending
}
