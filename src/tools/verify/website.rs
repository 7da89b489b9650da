use crate::antibot::{get_browser_headers, get_random_user_agent, Pacer};
use crate::scraping::text::visible_text;
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Hosts that are profiles or listings rather than the business's own site.
pub const BLOCKED_WEBSITE_DOMAINS: &[&str] = &[
    "facebook.com",
    "instagram.com",
    "twitter.com",
    "x.com",
    "tiktok.com",
    "yelp.com",
    "doordash.com",
    "ubereats.com",
    "grubhub.com",
    "postmates.com",
    "seamless.com",
    "slicelife.com",
    "google.com",
    "goo.gl",
    "linktr.ee",
    "tripadvisor.com",
];

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("network error: {0}")]
    Network(String),

    #[error("unsupported content type: {0}")]
    UnsupportedContent(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            FetchError::Status(status.as_u16())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// Retrieves the raw HTML of a page.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_html(&self, url: &Url) -> Result<String, FetchError>;
}

/// reqwest-backed fetcher with browser-like headers and bounded redirects.
pub struct HttpPageFetcher {
    client: reqwest::Client,
}

impl HttpPageFetcher {
    pub fn new(
        timeout: Duration,
        connect_timeout: Duration,
        max_redirects: usize,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .redirect(reqwest::redirect::Policy::limited(max_redirects))
            .build()?;
        Ok(Self { client })
    }

    /// Use a preconfigured client (proxy settings, custom TLS).
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_html(&self, url: &Url) -> Result<String, FetchError> {
        let mut req = self
            .client
            .get(url.clone())
            .header("User-Agent", get_random_user_agent());
        for (name, value) in get_browser_headers() {
            req = req.header(name, value);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        if let Some(ct) = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            let ct = ct.to_ascii_lowercase();
            if !(ct.contains("html") || ct.starts_with("text/")) {
                return Err(FetchError::UnsupportedContent(ct));
            }
        }

        Ok(resp.text().await?)
    }
}

/// Turn a provider website field into a fetchable URL.
///
/// Bare domains get `https://`. Returns `None` for non-http(s) schemes,
/// host-less strings, and social or aggregator hosts (including subdomains).
pub fn normalize_website_url(raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let with_scheme = if has_scheme(raw) {
        raw.to_string()
    } else {
        format!("https://{}", raw.trim_start_matches("//"))
    };

    let url = Url::parse(&with_scheme).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let host = url.host_str()?.to_ascii_lowercase();
    if !host.contains('.') {
        return None;
    }
    let host = host.trim_start_matches("www.");
    let blocked = BLOCKED_WEBSITE_DOMAINS
        .iter()
        .any(|d| host == *d || host.ends_with(&format!(".{}", d)));
    if blocked {
        return None;
    }
    Some(url)
}

/// `scheme:` prefix check. A dotted prefix is a host with a port, not a scheme.
fn has_scheme(raw: &str) -> bool {
    match raw.split_once(':') {
        Some((prefix, _)) => {
            !prefix.is_empty()
                && !prefix.contains('.')
                && prefix
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-'))
        }
        None => false,
    }
}

/// Website evidence source: validity filter, paced fetch, text extraction.
///
/// Page text is cached per URL for the lifetime of the source, failures
/// included, so duplicate sightings sharing a site fetch it once.
#[derive(Clone)]
pub struct WebsiteSource {
    fetcher: Arc<dyn PageFetcher>,
    pacer: Option<Pacer>,
    timeout: Duration,
    cache: Cache<String, Option<Arc<String>>>,
}

impl WebsiteSource {
    pub fn new(fetcher: Arc<dyn PageFetcher>, timeout: Duration) -> Self {
        Self {
            fetcher,
            pacer: None,
            timeout,
            cache: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(Duration::from_secs(60 * 60))
                .build(),
        }
    }

    pub fn with_pacer(mut self, pacer: Pacer) -> Self {
        self.pacer = Some(pacer);
        self
    }

    /// Extracted page text for a candidate's website field, or `None` when the
    /// field is unusable or the fetch failed.
    pub async fn page_text(&self, raw_website: &str) -> Option<Arc<String>> {
        let url = normalize_website_url(raw_website)?;
        let key = url.as_str().to_string();

        if let Some(cached) = self.cache.get(&key).await {
            debug!(url = %key, "website text served from cache");
            return cached;
        }

        let text = self.fetch_text(&url).await.map(Arc::new);
        self.cache.insert(key, text.clone()).await;
        text
    }

    async fn fetch_text(&self, url: &Url) -> Option<String> {
        if let Some(p) = &self.pacer {
            p.ready().await;
        }

        match tokio::time::timeout(self.timeout, self.fetcher.fetch_html(url)).await {
            Ok(Ok(html)) => Some(visible_text(&html)),
            Ok(Err(e)) => {
                warn!(url = %url, "website fetch failed: {}", e);
                None
            }
            Err(_) => {
                warn!(url = %url, timeout_secs = self.timeout.as_secs(), "website fetch timed out");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_bare_domain_gets_https() {
        let url = normalize_website_url("tonyspizza.com").unwrap();
        assert_eq!(url.as_str(), "https://tonyspizza.com/");
    }

    #[test]
    fn test_social_and_aggregator_hosts_rejected() {
        for raw in [
            "https://www.facebook.com/tonyspizza",
            "instagram.com/tonyspizza",
            "https://m.yelp.com/biz/tonys",
            "https://linktr.ee/tonys",
            "https://order.ubereats.com/x",
        ] {
            assert!(normalize_website_url(raw).is_none(), "{}", raw);
        }
    }

    #[test]
    fn test_invalid_schemes_and_hosts_rejected() {
        assert!(normalize_website_url("mailto:info@tonys.example").is_none());
        assert!(normalize_website_url("ftp://tonys.example").is_none());
        assert!(normalize_website_url("   ").is_none());
        assert!(normalize_website_url("localhost").is_none());
    }

    #[test]
    fn test_lookalike_host_is_not_blocked() {
        assert!(normalize_website_url("https://notfacebook.com.example").is_some());
        assert!(normalize_website_url("https://box.com").is_some());
    }

    struct CountingFetcher {
        calls: AtomicUsize,
        result: Result<&'static str, u16>,
    }

    #[async_trait]
    impl PageFetcher for CountingFetcher {
        async fn fetch_html(&self, _url: &Url) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
                .map(str::to_string)
                .map_err(FetchError::Status)
        }
    }

    #[tokio::test]
    async fn test_page_text_is_cached_per_url() {
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
            result: Ok("<html><body><p>Naturally leavened pies</p></body></html>"),
        });
        let source = WebsiteSource::new(fetcher.clone(), Duration::from_secs(5));

        let first = source.page_text("tonys.example").await.unwrap();
        let second = source.page_text("https://tonys.example").await.unwrap();

        assert!(first.contains("naturally leavened"));
        assert_eq!(first, second);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_cached_as_none() {
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
            result: Err(404),
        });
        let source = WebsiteSource::new(fetcher.clone(), Duration::from_secs(5));

        assert!(source.page_text("tonys.example").await.is_none());
        assert!(source.page_text("tonys.example").await.is_none());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_blocked_site_never_fetched() {
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
            result: Ok("sourdough"),
        });
        let source = WebsiteSource::new(fetcher.clone(), Duration::from_secs(5));
        assert!(source.page_text("https://www.yelp.com/biz/tonys").await.is_none());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }
}
