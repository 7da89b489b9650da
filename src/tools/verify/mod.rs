//! Claim verification: independent, best-effort keyword scans over profile
//! text, the business website, and social-media bios.

pub mod keywords;
pub mod social;
pub mod website;

use crate::types::{Candidate, EvidenceSet, EvidenceSource};
use std::future::Future;
use tokio::time::Instant;
use tracing::{debug, warn};

pub use keywords::{ClaimMatcher, ClaimVocabulary};
pub use social::{Platform, ProbeError, SearchEngineProber, SocialProber, SocialSource};
pub use website::{FetchError, HttpPageFetcher, PageFetcher, WebsiteSource};

/// Await `fut`, or give up at `deadline`.
pub(crate) async fn within_deadline<F: Future>(deadline: Option<Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(d) => tokio::time::timeout_at(d, fut).await.ok(),
        None => Some(fut.await),
    }
}

/// Evidence gathered for one candidate. `complete` is false when a source ran
/// out of time; whatever it and its siblings found is still kept.
#[derive(Debug, Clone, Default)]
pub struct Verification {
    pub evidence: EvidenceSet,
    pub complete: bool,
}

#[derive(Clone)]
pub struct ClaimVerifier {
    matcher: ClaimMatcher,
    website: Option<WebsiteSource>,
    social: Option<SocialSource>,
}

impl ClaimVerifier {
    pub fn new(matcher: ClaimMatcher) -> Self {
        Self {
            matcher,
            website: None,
            social: None,
        }
    }

    pub fn with_website(mut self, website: WebsiteSource) -> Self {
        self.website = Some(website);
        self
    }

    pub fn with_social(mut self, social: SocialSource) -> Self {
        self.social = Some(social);
        self
    }

    pub fn matcher(&self) -> &ClaimMatcher {
        &self.matcher
    }

    /// Description and category tags already in memory. No network.
    pub fn profile_evidence(&self, candidate: &Candidate) -> EvidenceSet {
        let mut text = candidate.description.clone().unwrap_or_default();
        for category in &candidate.categories {
            text.push_str(" | ");
            text.push_str(category);
        }
        self.matcher.scan(EvidenceSource::ProfileText, &text)
    }

    pub async fn website_evidence(&self, candidate: &Candidate) -> EvidenceSet {
        let (Some(source), Some(raw)) = (&self.website, candidate.website.as_deref()) else {
            return EvidenceSet::new();
        };
        match source.page_text(raw).await {
            Some(text) => self.matcher.scan(EvidenceSource::Website, &text),
            None => EvidenceSet::new(),
        }
    }

    pub async fn social_evidence(&self, candidate: &Candidate) -> EvidenceSet {
        match &self.social {
            Some(source) => source.evidence(candidate, &self.matcher).await,
            None => EvidenceSet::new(),
        }
    }

    /// All three sources; website and social run concurrently. A failing
    /// source contributes nothing and never affects the others.
    pub async fn verify(&self, candidate: &Candidate) -> EvidenceSet {
        self.collect(candidate, None).await.evidence
    }

    /// Like [`verify`](Self::verify), but each network source stops at
    /// `deadline` on its own. Profile evidence, website text already fetched
    /// and social hits already found survive a cut-off.
    pub async fn verify_until(&self, candidate: &Candidate, deadline: Instant) -> Verification {
        self.collect(candidate, Some(deadline)).await
    }

    async fn collect(&self, candidate: &Candidate, deadline: Option<Instant>) -> Verification {
        let mut evidence = self.profile_evidence(candidate);

        let website = within_deadline(deadline, self.website_evidence(candidate));
        let social = async {
            match &self.social {
                Some(source) => source.evidence_until(candidate, &self.matcher, deadline).await,
                None => (EvidenceSet::new(), true),
            }
        };
        let (web, (social, social_complete)) = tokio::join!(website, social);

        let web_complete = web.is_some();
        if !web_complete {
            warn!(name = %candidate.name, "website check ran out of time");
        }
        evidence.extend(web.unwrap_or_default());
        evidence.extend(social);

        debug!(
            name = %candidate.name,
            hits = evidence.len(),
            vocabulary = self.matcher.version(),
            "verification finished"
        );
        Verification {
            evidence,
            complete: web_complete && social_complete,
        }
    }
}
