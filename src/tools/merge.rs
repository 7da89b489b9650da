use crate::core::text::normalize_name;
use crate::tools::score::{distinct_sources, score, support};
use crate::tools::store::StoredCandidate;
use crate::types::{EvidenceSet, VerifiedRecord};
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Geohash precision of the merge bucket (~1.2 km × 0.6 km cells).
pub const MERGE_GEOHASH_PRECISION: usize = 6;

const LEADING_NOISE: &[&str] = &["the"];
const TRAILING_NOISE: &[&str] = &[
    "pizza",
    "pizzeria",
    "restaurant",
    "bakery",
    "kitchen",
    "co",
    "llc",
    "inc",
];

/// Looser name used for merge grouping.
///
/// `"The Tony's Pizza Co."` → `"tonys"`. Falls back to the full normalized name
/// when stripping would leave nothing (`"Pizza Restaurant"`).
pub fn merge_name(name: &str) -> String {
    let full = normalize_name(name);
    let mut words: Vec<&str> = full.split(' ').filter(|w| !w.is_empty()).collect();

    while words.first().is_some_and(|w| LEADING_NOISE.contains(w)) {
        words.remove(0);
    }
    while words.last().is_some_and(|w| TRAILING_NOISE.contains(w)) {
        words.pop();
    }

    if words.is_empty() {
        full
    } else {
        words.join(" ")
    }
}

/// The cell itself and its eight neighbours.
fn cell_and_neighbors(cell: &str) -> Vec<String> {
    let mut out = vec![cell.to_string()];
    if let Ok(n) = geohash::neighbors(cell) {
        out.extend([n.n, n.ne, n.e, n.se, n.s, n.sw, n.w, n.nw]);
    }
    out
}

/// Union-find over entry indices.
struct Groups {
    parent: Vec<usize>,
}

impl Groups {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, i: usize) -> usize {
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = i;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    /// The lower index stays root, so a group is named by its earliest member.
    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra.max(rb)] = ra.min(rb);
        }
    }
}

/// Batch grouping of near-duplicate sightings into final records.
#[derive(Debug, Clone)]
pub struct DuplicateMerger {
    precision: usize,
}

impl Default for DuplicateMerger {
    fn default() -> Self {
        Self {
            precision: MERGE_GEOHASH_PRECISION,
        }
    }
}

impl DuplicateMerger {
    pub fn new(precision: usize) -> Self {
        Self { precision }
    }

    /// Group, merge, and re-score. Entries without evidence are dropped.
    /// Output order follows each group's earliest member.
    pub fn merge(&self, entries: &[StoredCandidate]) -> Vec<VerifiedRecord> {
        let evidenced: Vec<&StoredCandidate> =
            entries.iter().filter(|e| !e.evidence.is_empty()).collect();

        let names: Vec<String> = evidenced
            .iter()
            .map(|e| merge_name(&e.candidate.name))
            .collect();
        let cells: Vec<Option<String>> = evidenced
            .iter()
            .map(|e| e.candidate.location.and_then(|p| p.bucket(self.precision)))
            .collect();

        let mut groups = Groups::new(evidenced.len());

        // Same loose name in the same or an adjacent cell, so sightings a few
        // metres apart across a cell edge still meet.
        let mut first_in_cell: HashMap<&str, HashMap<&str, usize>> = HashMap::new();
        for (i, cell) in cells.iter().enumerate() {
            let Some(cell) = cell else { continue };
            let name = names[i].as_str();
            for near in cell_and_neighbors(cell) {
                let earlier = first_in_cell
                    .get(name)
                    .and_then(|by_cell| by_cell.get(near.as_str()))
                    .copied();
                if let Some(j) = earlier {
                    groups.union(i, j);
                }
            }
            first_in_cell
                .entry(name)
                .or_default()
                .entry(cell.as_str())
                .or_insert(i);
        }

        // A coordinate-less sighting joins the name's geo cluster only when
        // there is exactly one; otherwise it groups with other bare sightings.
        let mut clusters_by_name: HashMap<&str, BTreeSet<usize>> = HashMap::new();
        for (i, cell) in cells.iter().enumerate() {
            if cell.is_some() {
                let root = groups.find(i);
                clusters_by_name.entry(names[i].as_str()).or_default().insert(root);
            }
        }
        let mut first_bare: HashMap<&str, usize> = HashMap::new();
        for (i, cell) in cells.iter().enumerate() {
            if cell.is_some() {
                continue;
            }
            let name = names[i].as_str();
            match clusters_by_name.get(name) {
                Some(roots) if roots.len() == 1 => {
                    if let Some(&root) = roots.iter().next() {
                        groups.union(i, root);
                    }
                }
                _ => {
                    let first = *first_bare.entry(name).or_insert(i);
                    groups.union(i, first);
                }
            }
        }

        let mut order: Vec<Vec<usize>> = Vec::new();
        let mut slot_of_root: HashMap<usize, usize> = HashMap::new();
        for i in 0..evidenced.len() {
            let root = groups.find(i);
            let slot = *slot_of_root.entry(root).or_insert_with(|| {
                order.push(Vec::new());
                order.len() - 1
            });
            order[slot].push(i);
        }

        let verified_at = Utc::now();
        let mut records = Vec::with_capacity(order.len());
        for members in order {
            let members: Vec<&StoredCandidate> = members.iter().map(|&i| evidenced[i]).collect();
            if let Some(record) = merge_group(&members, verified_at) {
                records.push(record);
            }
        }

        debug!(
            entries = entries.len(),
            evidenced = evidenced.len(),
            records = records.len(),
            "merge pass complete"
        );
        records
    }
}

fn merge_group(
    members: &[&StoredCandidate],
    verified_at: chrono::DateTime<Utc>,
) -> Option<VerifiedRecord> {
    // Most complete member wins; the first one on ties.
    let mut base_idx = 0;
    for (i, m) in members.iter().enumerate().skip(1) {
        if m.candidate.completeness() > members[base_idx].candidate.completeness() {
            base_idx = i;
        }
    }

    let mut candidate = members[base_idx].candidate.clone();
    for (i, m) in members.iter().enumerate() {
        if i != base_idx {
            candidate.absorb(&m.candidate);
        }
    }

    let evidence: EvidenceSet = members
        .iter()
        .flat_map(|m| m.evidence.iter().cloned())
        .collect();
    let confidence = score(&evidence)?;

    Some(VerifiedRecord {
        candidate,
        keywords: evidence.iter().map(|e| e.keyword.clone()).collect(),
        sources: distinct_sources(&evidence),
        confidence,
        support: support(&evidence),
        sightings: members.len(),
        evidence,
        verified_at,
    })
}
