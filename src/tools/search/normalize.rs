//! Provider payload → `Candidate`.
//!
//! All field-name guessing lives here. Nothing in this module returns an
//! error: malformed entries are skipped, never propagated.

use crate::types::{Candidate, GeoPoint};
use serde_json::{Map, Value};
use tracing::debug;

const NAME_FIELDS: &[&str] = &["name", "title"];
const ADDRESS_FIELDS: &[&str] = &[
    "full_address",
    "address",
    "formatted_address",
    "street",
    "vicinity",
];
const PHONE_FIELDS: &[&str] = &["phone", "phone_number", "international_phone_number"];
const WEBSITE_FIELDS: &[&str] = &["site", "website"];
const DESCRIPTION_FIELDS: &[&str] = &["description", "about"];
const CATEGORY_FIELDS: &[&str] = &["category", "type", "subtypes", "categories"];
const LAT_FIELDS: &[&str] = &["latitude", "lat"];
const LNG_FIELDS: &[&str] = &["longitude", "lng", "lon"];
const REVIEW_FIELDS: &[&str] = &["reviews", "reviews_count", "user_ratings_total"];
const PLACE_ID_FIELDS: &[&str] = &["place_id", "google_id"];

/// Flatten the payload exactly one level and parse every record.
///
/// `[[a, b], [c]]` and `[a, b, c]` both yield three candidates; deeper
/// nesting is not unwrapped. A non-array payload yields nothing.
pub fn normalize_payload(payload: &Value, found_by: Option<&str>) -> Vec<Candidate> {
    let Some(items) = payload.as_array() else {
        debug!("provider payload is not an array; ignoring");
        return Vec::new();
    };

    let mut out = Vec::new();
    let mut skipped = 0usize;
    for item in items {
        let records: Box<dyn Iterator<Item = &Value>> = match item {
            Value::Array(inner) => Box::new(inner.iter()),
            other => Box::new(std::iter::once(other)),
        };
        for record in records {
            match parse_candidate(record) {
                Some(mut c) => {
                    if c.found_by.is_none() {
                        c.found_by = found_by.map(str::to_string);
                    }
                    out.push(c);
                }
                None => skipped += 1,
            }
        }
    }

    if skipped > 0 {
        debug!(skipped, kept = out.len(), "dropped malformed provider records");
    }
    out
}

/// One raw record → `Candidate`, or `None` when it has no usable name.
pub fn parse_candidate(record: &Value) -> Option<Candidate> {
    let obj = record.as_object()?;
    let name = first_string(obj, NAME_FIELDS)?;

    let location = match (first_f64(obj, LAT_FIELDS), first_f64(obj, LNG_FIELDS)) {
        (Some(lat), Some(lng)) => GeoPoint::new(lat, lng),
        _ => None,
    };

    Some(Candidate {
        name,
        address: first_string(obj, ADDRESS_FIELDS),
        phone: first_string(obj, PHONE_FIELDS),
        website: first_string(obj, WEBSITE_FIELDS),
        location,
        description: first_string(obj, DESCRIPTION_FIELDS),
        categories: categories(obj),
        rating: first_f64(obj, &["rating"]),
        review_count: first_f64(obj, REVIEW_FIELDS)
            .filter(|n| *n >= 0.0)
            .map(|n| n as u64),
        place_id: first_string(obj, PLACE_ID_FIELDS),
        found_by: None,
    })
}

/// First field that holds a non-blank string. Non-string values are skipped.
fn first_string(obj: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|f| {
        obj.get(*f)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

/// First field that holds a number or a numeric string.
fn first_f64(obj: &Map<String, Value>, fields: &[&str]) -> Option<f64> {
    fields.iter().find_map(|f| match obj.get(*f)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
    .filter(|n| n.is_finite())
}

/// Union of every category-ish field: plain strings, comma lists, or arrays.
fn categories(obj: &Map<String, Value>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |raw: &str| {
        for part in raw.split(',') {
            let part = part.trim();
            if !part.is_empty() && !out.iter().any(|c| c.eq_ignore_ascii_case(part)) {
                out.push(part.to_string());
            }
        }
    };

    for field in CATEGORY_FIELDS {
        match obj.get(*field) {
            Some(Value::String(s)) => push(s),
            Some(Value::Array(values)) => {
                for v in values {
                    if let Some(s) = v.as_str() {
                        push(s);
                    }
                }
            }
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names(cs: &[Candidate]) -> Vec<&str> {
        cs.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_nested_payload_flattens_once() {
        let out = normalize_payload(&json!([[{"name": "A"}, {"name": "B"}]]), None);
        assert_eq!(names(&out), vec!["A", "B"]);
    }

    #[test]
    fn test_flat_payload_unchanged() {
        let out = normalize_payload(&json!([{"name": "A"}]), None);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0], Candidate::named("A"));
    }

    #[test]
    fn test_flatten_is_not_recursive() {
        let out = normalize_payload(&json!([[[{"name": "Deep"}]], [{"name": "Shallow"}]]), None);
        assert_eq!(names(&out), vec!["Shallow"]);
    }

    #[test]
    fn test_malformed_records_are_skipped() {
        let payload = json!([
            {"name": "  "},
            {"address": "1 Main St"},
            "not an object",
            42,
            null,
            {"name": 17},
            {"name": "Keeper"}
        ]);
        let out = normalize_payload(&payload, None);
        assert_eq!(names(&out), vec!["Keeper"]);
        assert!(normalize_payload(&json!({"name": "object payload"}), None).is_empty());
    }

    #[test]
    fn test_first_non_empty_address_wins() {
        let c = parse_candidate(&json!({
            "name": "Tony's Pizza",
            "full_address": "",
            "address": "123 Court St, Brooklyn, NY",
            "formatted_address": "ignored"
        }))
        .unwrap();
        assert_eq!(c.address.as_deref(), Some("123 Court St, Brooklyn, NY"));
    }

    #[test]
    fn test_full_outscraper_record() {
        let c = parse_candidate(&json!({
            "name": "Lucali",
            "full_address": "575 Henry St, Brooklyn, NY 11231",
            "phone": "+1 718-858-4086",
            "site": "https://www.lucali.com/",
            "latitude": 40.6819,
            "longitude": "-73.9995",
            "rating": 4.6,
            "reviews": 3187,
            "description": "Candlelit BYOB spot for wood-fired pies",
            "category": "Pizza restaurant",
            "subtypes": "Pizza restaurant, Italian restaurant",
            "google_id": "0x89c25a4f0b8ac5a7:0x1"
        }))
        .unwrap();

        assert_eq!(c.phone.as_deref(), Some("+1 718-858-4086"));
        assert_eq!(c.website.as_deref(), Some("https://www.lucali.com/"));
        let loc = c.location.unwrap();
        assert!((loc.lat - 40.6819).abs() < 1e-9);
        assert!((loc.lng + 73.9995).abs() < 1e-9);
        assert_eq!(c.review_count, Some(3187));
        assert_eq!(c.categories, vec!["Pizza restaurant", "Italian restaurant"]);
        assert_eq!(c.place_id.as_deref(), Some("0x89c25a4f0b8ac5a7:0x1"));
    }

    #[test]
    fn test_bad_coordinates_dropped() {
        let c = parse_candidate(&json!({"name": "X", "latitude": 0, "longitude": 0})).unwrap();
        assert!(c.location.is_none());
        let c = parse_candidate(&json!({"name": "X", "latitude": "n/a", "longitude": 3.0})).unwrap();
        assert!(c.location.is_none());
    }

    #[test]
    fn test_found_by_is_recorded() {
        let out = normalize_payload(&json!([{"name": "A"}]), Some("sourdough pizza in Austin"));
        assert_eq!(out[0].found_by.as_deref(), Some("sourdough pizza in Austin"));
    }
}
