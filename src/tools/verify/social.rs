use super::keywords::ClaimMatcher;
use super::within_deadline;
use crate::antibot::{get_browser_headers, get_random_user_agent, Pacer};
use crate::scraping::serp::{detect_block_reason, parse_ddg_results};
use crate::tools::merge::merge_name;
use crate::types::{Candidate, EvidenceSet, EvidenceSource};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_SERP_ENDPOINT: &str = "https://html.duckduckgo.com/html/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Instagram,
    Facebook,
    Tiktok,
    X,
}

impl Platform {
    pub fn domain(&self) -> &'static str {
        match self {
            Platform::Instagram => "instagram.com",
            Platform::Facebook => "facebook.com",
            Platform::Tiktok => "tiktok.com",
            Platform::X => "x.com",
        }
    }

    fn hosts(&self) -> &'static [&'static str] {
        match self {
            Platform::Instagram => &["instagram.com"],
            Platform::Facebook => &["facebook.com", "fb.com"],
            Platform::Tiktok => &["tiktok.com"],
            Platform::X => &["x.com", "twitter.com"],
        }
    }

    /// TikTok handles appear as `/@name`.
    fn handle<'a>(&self, segment: &'a str) -> &'a str {
        match self {
            Platform::Tiktok => segment.trim_start_matches('@'),
            _ => segment,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("search engine blocked the probe: {0}")]
    Blocked(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        ProbeError::Network(err.to_string())
    }
}

/// Looks up one username on one platform. `Ok(Some(text))` is the profile's
/// bio or snippet text; `Ok(None)` means no matching profile was found.
#[async_trait]
pub trait SocialProber: Send + Sync {
    async fn probe(&self, platform: Platform, username: &str) -> Result<Option<String>, ProbeError>;
}

/// Probes profiles through a site-restricted DuckDuckGo HTML query, e.g.
/// `site:instagram.com "tonyspizza"`.
pub struct SearchEngineProber {
    client: reqwest::Client,
    endpoint: Url,
    max_results: usize,
}

impl SearchEngineProber {
    pub fn new(client: reqwest::Client, endpoint: &str) -> Result<Self, ProbeError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| ProbeError::Network(format!("invalid SERP endpoint {}: {}", endpoint, e)))?;
        Ok(Self {
            client,
            endpoint,
            max_results: 10,
        })
    }

    fn query_url(&self, platform: Platform, username: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("q", &format!("site:{} \"{}\"", platform.domain(), username));
        url
    }
}

#[async_trait]
impl SocialProber for SearchEngineProber {
    async fn probe(&self, platform: Platform, username: &str) -> Result<Option<String>, ProbeError> {
        let mut req = self
            .client
            .get(self.query_url(platform, username))
            .header("User-Agent", get_random_user_agent());
        for (name, value) in get_browser_headers() {
            req = req.header(name, value);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();

        if let Some(reason) = detect_block_reason(status, &body) {
            return Err(ProbeError::Blocked(reason));
        }
        if !status.is_success() {
            return Err(ProbeError::Status(status.as_u16()));
        }

        let hit = parse_ddg_results(&body, self.max_results)
            .into_iter()
            .find(|h| profile_matches(platform, &h.url, username));

        Ok(hit.map(|h| format!("{} {}", h.title, h.snippet)))
    }
}

/// A result counts only when it is hosted on the platform and its first path
/// segment is the username.
pub fn profile_matches(platform: Platform, url: &str, username: &str) -> bool {
    let Ok(url) = Url::parse(url) else {
        return false;
    };
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    let on_platform = platform
        .hosts()
        .iter()
        .any(|d| host == *d || host.ends_with(&format!(".{}", d)));
    if !on_platform {
        return false;
    }

    url.path_segments()
        .and_then(|mut segs| segs.next())
        .map(|seg| platform.handle(seg).eq_ignore_ascii_case(username))
        .unwrap_or(false)
}

/// Plausible handles for a business name, most specific first.
///
/// `"Tony's Pizza"` → `["tonyspizza", "tonys_pizza", "tonys"]`
pub fn candidate_usernames(name: &str, max: usize) -> Vec<String> {
    let words = |s: &str| -> Vec<String> {
        s.split_whitespace()
            .map(|w| w.chars().filter(char::is_ascii_alphanumeric).collect::<String>())
            .filter(|w| !w.is_empty())
            .collect()
    };

    let full = words(&crate::core::text::normalize_name(name));
    let core = words(&merge_name(name));

    let options = [
        full.concat(),
        full.join("_"),
        core.concat(),
        format!("{}pizza", core.concat()),
    ];

    let mut out: Vec<String> = Vec::new();
    for u in options {
        if u.len() >= 3 && !out.contains(&u) {
            out.push(u);
        }
        if out.len() >= max {
            break;
        }
    }
    out
}

/// Social-media evidence source.
#[derive(Clone)]
pub struct SocialSource {
    prober: Arc<dyn SocialProber>,
    platforms: Vec<Platform>,
    max_usernames: usize,
    timeout: Duration,
    pacer: Option<Pacer>,
}

impl SocialSource {
    pub fn new(prober: Arc<dyn SocialProber>, platforms: Vec<Platform>, max_usernames: usize) -> Self {
        Self {
            prober,
            platforms,
            max_usernames,
            timeout: Duration::from_secs(10),
            pacer: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_pacer(mut self, pacer: Pacer) -> Self {
        self.pacer = Some(pacer);
        self
    }

    /// Probe each derived username on each platform in order, stopping at the
    /// first platform with a matching profile. Every failure is local.
    pub async fn evidence(&self, candidate: &Candidate, matcher: &ClaimMatcher) -> EvidenceSet {
        self.evidence_until(candidate, matcher, None).await.0
    }

    /// [`evidence`](Self::evidence) bounded by `deadline`, limiter waits
    /// included. Returns the hits so far and whether every probe ran.
    pub async fn evidence_until(
        &self,
        candidate: &Candidate,
        matcher: &ClaimMatcher,
        deadline: Option<Instant>,
    ) -> (EvidenceSet, bool) {
        let mut evidence = EvidenceSet::new();

        for username in candidate_usernames(&candidate.name, self.max_usernames) {
            for platform in &self.platforms {
                let attempt = async {
                    if let Some(p) = &self.pacer {
                        p.ready().await;
                    }
                    tokio::time::timeout(self.timeout, self.prober.probe(*platform, &username)).await
                };
                let Some(result) = within_deadline(deadline, attempt).await else {
                    warn!(
                        name = %candidate.name,
                        username = %username,
                        found = evidence.len(),
                        "social probing out of time; keeping what was found"
                    );
                    return (evidence, false);
                };

                match result {
                    Ok(Ok(Some(text))) => {
                        let found = matcher.scan(EvidenceSource::SocialMedia, &text);
                        debug!(
                            name = %candidate.name,
                            username = %username,
                            platform = platform.domain(),
                            keywords = found.len(),
                            "social profile found"
                        );
                        evidence.extend(found);
                        break;
                    }
                    Ok(Ok(None)) => {}
                    Ok(Err(e)) => {
                        warn!(name = %candidate.name, username = %username, platform = platform.domain(), "social probe failed: {}", e);
                    }
                    Err(_) => {
                        warn!(name = %candidate.name, username = %username, platform = platform.domain(), "social probe timed out");
                    }
                }
            }
        }

        (evidence, true)
    }
}
