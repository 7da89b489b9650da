use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// One provider query: free text plus a result-count limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    pub limit: u32,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>, limit: u32) -> Self {
        Self {
            text: text.into(),
            limit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// Returns `None` for out-of-range or non-finite coordinates, and for the
    /// (0, 0) placeholder some providers emit when they have no fix.
    pub fn new(lat: f64, lng: f64) -> Option<Self> {
        if !lat.is_finite() || !lng.is_finite() {
            return None;
        }
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return None;
        }
        if lat == 0.0 && lng == 0.0 {
            return None;
        }
        Some(Self { lat, lng })
    }

    /// Geohash cell of the given precision (7 ≈ 150 m, 6 ≈ 1.2 km × 0.6 km).
    pub fn bucket(&self, precision: usize) -> Option<String> {
        geohash::encode(
            geohash::Coord {
                x: self.lng,
                y: self.lat,
            },
            precision,
        )
        .ok()
    }
}

/// A normalized business record produced from one raw search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub review_count: Option<u64>,
    #[serde(default)]
    pub place_id: Option<String>,
    /// Query text that first surfaced this business.
    #[serde(default)]
    pub found_by: Option<String>,
}

impl Candidate {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: None,
            phone: None,
            website: None,
            location: None,
            description: None,
            categories: Vec::new(),
            rating: None,
            review_count: None,
            place_id: None,
            found_by: None,
        }
    }

    pub fn with_location(mut self, lat: f64, lng: f64) -> Self {
        self.location = GeoPoint::new(lat, lng);
        self
    }

    pub fn with_website(mut self, website: impl Into<String>) -> Self {
        self.website = Some(website.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    /// Number of populated address/contact/profile fields.
    pub fn completeness(&self) -> usize {
        [
            self.address.is_some(),
            self.phone.is_some(),
            self.website.is_some(),
            self.location.is_some(),
            self.description.is_some(),
            !self.categories.is_empty(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }

    /// Fill every empty field from `other`; populated fields are left alone.
    pub fn absorb(&mut self, other: &Candidate) {
        fn fill<T: Clone>(slot: &mut Option<T>, from: &Option<T>) {
            if slot.is_none() {
                slot.clone_from(from);
            }
        }
        fill(&mut self.address, &other.address);
        fill(&mut self.phone, &other.phone);
        fill(&mut self.website, &other.website);
        fill(&mut self.location, &other.location);
        fill(&mut self.description, &other.description);
        fill(&mut self.rating, &other.rating);
        fill(&mut self.review_count, &other.review_count);
        fill(&mut self.place_id, &other.place_id);
        fill(&mut self.found_by, &other.found_by);
        for category in &other.categories {
            if !self
                .categories
                .iter()
                .any(|c| c.eq_ignore_ascii_case(category))
            {
                self.categories.push(category.clone());
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EvidenceSource {
    ProfileText,
    Website,
    SocialMedia,
}

impl EvidenceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceSource::ProfileText => "ProfileText",
            EvidenceSource::Website => "Website",
            EvidenceSource::SocialMedia => "SocialMedia",
        }
    }

    /// Fixed confidence weight of a keyword hit from this source.
    pub fn weight(&self) -> f32 {
        match self {
            EvidenceSource::Website => 1.0,
            EvidenceSource::SocialMedia => 0.8,
            EvidenceSource::ProfileText => 0.6,
        }
    }
}

impl fmt::Display for EvidenceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A claim keyword found in one source. Identity is (source, keyword); the
/// weight is derived from the source.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Evidence {
    pub source: EvidenceSource,
    pub keyword: String,
}

impl Evidence {
    pub fn new(source: EvidenceSource, keyword: impl Into<String>) -> Self {
        Self {
            source,
            keyword: keyword.into(),
        }
    }

    pub fn weight(&self) -> f32 {
        self.source.weight()
    }
}

pub type EvidenceSet = BTreeSet<Evidence>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

impl ConfidenceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceTier::Low => "low",
            ConfidenceTier::Medium => "medium",
            ConfidenceTier::High => "high",
        }
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final output of a run: a merged candidate plus the evidence that supports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedRecord {
    #[serde(flatten)]
    pub candidate: Candidate,
    pub keywords: BTreeSet<String>,
    pub sources: BTreeSet<EvidenceSource>,
    pub confidence: ConfidenceTier,
    pub evidence: EvidenceSet,
    /// Sum of evidence weights.
    pub support: f32,
    /// Raw sightings folded into this record.
    pub sightings: usize,
    pub verified_at: DateTime<Utc>,
}
