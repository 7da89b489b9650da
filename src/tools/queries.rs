use crate::core::config::QueryConfig;
use crate::core::text::fold_text;
use crate::types::SearchQuery;
use std::collections::HashSet;

/// Phrasings that tend to surface sourdough pizzerias. Overlap is intended:
/// the store absorbs the duplicates.
pub const DEFAULT_TERMS: &[&str] = &[
    "sourdough pizza",
    "naturally leavened pizza",
    "wild yeast pizza",
    "wood fired sourdough pizza",
    "neapolitan pizza",
    "artisan pizza",
    "pizzeria",
];

/// Cross product of search terms and areas.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub terms: Vec<String>,
    pub areas: Vec<String>,
    pub limit: u32,
}

impl QueryPlan {
    pub fn new(terms: Vec<String>, areas: Vec<String>, limit: u32) -> Self {
        Self {
            terms,
            areas,
            limit,
        }
    }

    /// Areas are the city itself plus `"{neighborhood}, {city}"` for each
    /// neighborhood. Without a city, neighborhoods stand alone.
    pub fn from_config(cfg: &QueryConfig, limit: u32) -> Self {
        let terms = match &cfg.terms {
            Some(t) if !t.is_empty() => t.clone(),
            _ => DEFAULT_TERMS.iter().map(|t| t.to_string()).collect(),
        };

        let city = cfg.resolve_city();
        let mut areas: Vec<String> = city.iter().cloned().collect();
        for hood in cfg.neighborhoods.iter().map(|h| h.trim()).filter(|h| !h.is_empty()) {
            areas.push(match &city {
                Some(c) => format!("{}, {}", hood, c),
                None => hood.to_string(),
            });
        }

        Self::new(terms, areas, limit)
    }

    /// Every `"{term} in {area}"`, area-major, duplicates (ignoring case and
    /// spacing) removed. No areas means the bare terms.
    pub fn build(&self) -> Vec<SearchQuery> {
        let terms = self.terms.iter().map(|t| t.trim()).filter(|t| !t.is_empty());

        let texts: Vec<String> = if self.areas.is_empty() {
            terms.map(str::to_string).collect()
        } else {
            let terms: Vec<&str> = terms.collect();
            self.areas
                .iter()
                .flat_map(|area| terms.iter().map(move |t| format!("{} in {}", t, area.trim())))
                .collect()
        };

        let mut seen = HashSet::new();
        texts
            .into_iter()
            .filter(|t| seen.insert(fold_text(t)))
            .map(|t| SearchQuery::new(t, self.limit))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cross_product_area_major() {
        let plan = QueryPlan::new(
            vec!["sourdough pizza".into(), "pizzeria".into()],
            vec!["Austin, TX".into(), "East Austin, Austin, TX".into()],
            20,
        );
        let texts: Vec<String> = plan.build().into_iter().map(|q| q.text).collect();
        assert_eq!(
            texts,
            vec![
                "sourdough pizza in Austin, TX",
                "pizzeria in Austin, TX",
                "sourdough pizza in East Austin, Austin, TX",
                "pizzeria in East Austin, Austin, TX",
            ]
        );
    }

    #[test]
    fn test_case_insensitive_dedup() {
        let plan = QueryPlan::new(
            vec!["Sourdough Pizza".into(), "sourdough  pizza".into(), " ".into()],
            vec![],
            10,
        );
        let queries = plan.build();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0], SearchQuery::new("Sourdough Pizza", 10));
    }

    #[test]
    fn test_from_config_uses_defaults_and_neighborhoods() {
        let cfg = QueryConfig {
            terms: None,
            city: Some("Portland, OR".into()),
            neighborhoods: vec!["Alberta".into(), "".into()],
        };
        let plan = QueryPlan::from_config(&cfg, 20);
        assert_eq!(plan.areas, vec!["Portland, OR", "Alberta, Portland, OR"]);
        assert_eq!(plan.build().len(), DEFAULT_TERMS.len() * 2);
    }
}
