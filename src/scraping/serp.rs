use reqwest::StatusCode;
use scraper::{Html, Selector};

/// One organic result from a search-engine results page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerpHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

pub fn detect_block_reason(status: StatusCode, body: &str) -> Option<String> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Some("http_429".to_string());
    }
    if status == StatusCode::FORBIDDEN {
        return Some("http_403".to_string());
    }
    if status == StatusCode::SERVICE_UNAVAILABLE {
        return Some("http_503".to_string());
    }

    let lower = body.to_lowercase();
    let maybe = [
        ("unusual traffic", "unusual_traffic"),
        ("captcha", "captcha"),
        ("verify you are human", "captcha"),
        ("anomaly-modal", "anomaly_challenge"),
        ("access denied", "access_denied"),
    ];

    for (needle, label) in maybe {
        if lower.contains(needle) {
            return Some(label.to_string());
        }
    }

    None
}

fn normalize_ddg_href(href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }

    let candidate = if href.starts_with("//") {
        format!("https:{}", href)
    } else if href.starts_with('/') {
        format!("https://duckduckgo.com{}", href)
    } else {
        href.to_string()
    };

    // DuckDuckGo wraps destinations in /l/?uddg=<target>.
    if let Ok(url) = url::Url::parse(&candidate) {
        if matches!(url.host_str(), Some("duckduckgo.com")) && url.path().starts_with("/l/") {
            for (k, v) in url.query_pairs() {
                if k == "uddg" && !v.trim().is_empty() {
                    return Some(v.to_string());
                }
            }
        }
    }

    if candidate.starts_with("http://") || candidate.starts_with("https://") {
        return Some(candidate);
    }

    None
}

fn element_text(el: scraper::ElementRef<'_>) -> String {
    el.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse the DuckDuckGo HTML endpoint's result list.
pub fn parse_ddg_results(html: &str, max_results: usize) -> Vec<SerpHit> {
    let doc = Html::parse_document(html);
    let (Ok(sel_item), Ok(sel_link), Ok(sel_snip)) = (
        Selector::parse("div.result, div.results_links"),
        Selector::parse("a.result__a"),
        Selector::parse("a.result__snippet, div.result__snippet"),
    ) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for item in doc.select(&sel_item) {
        if out.len() >= max_results {
            break;
        }

        let Some(link) = item.select(&sel_link).next() else {
            continue;
        };
        let Some(url) = link.value().attr("href").and_then(normalize_ddg_href) else {
            continue;
        };
        // Nested result containers would otherwise yield the same link twice.
        if out.iter().any(|h: &SerpHit| h.url == url) {
            continue;
        }

        let snippet = item
            .select(&sel_snip)
            .next()
            .map(element_text)
            .unwrap_or_default();

        out.push(SerpHit {
            url,
            title: element_text(link),
            snippet,
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERP: &str = r##"
<div class="results">
  <div class="result results_links results_links_deep web-result">
    <h2 class="result__title">
      <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.instagram.com%2Ftonyspizza%2F&amp;rut=abc">Tony's Pizza (@tonyspizza) • Instagram</a>
    </h2>
    <a class="result__snippet" href="#">Naturally leavened   sourdough pies. Brooklyn, NY.</a>
  </div>
  <div class="result results_links web-result">
    <a class="result__a" href="https://example.com/menu">Menu</a>
    <div class="result__snippet">Pizza menu</div>
  </div>
  <div class="result results_links"><a class="result__a" href="javascript:void(0)">Bad</a></div>
</div>"##;

    #[test]
    fn test_parse_unwraps_redirects_and_snippets() {
        let hits = parse_ddg_results(SERP, 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url, "https://www.instagram.com/tonyspizza/");
        assert_eq!(hits[0].title, "Tony's Pizza (@tonyspizza) • Instagram");
        assert_eq!(hits[0].snippet, "Naturally leavened sourdough pies. Brooklyn, NY.");
        assert_eq!(hits[1].url, "https://example.com/menu");
    }

    #[test]
    fn test_parse_respects_max_results() {
        assert_eq!(parse_ddg_results(SERP, 1).len(), 1);
    }

    #[test]
    fn test_detect_block_reason() {
        assert_eq!(
            detect_block_reason(StatusCode::TOO_MANY_REQUESTS, ""),
            Some("http_429".to_string())
        );
        assert_eq!(
            detect_block_reason(StatusCode::OK, "<form id=challenge>Please complete the CAPTCHA</form>"),
            Some("captcha".to_string())
        );
        assert_eq!(detect_block_reason(StatusCode::OK, SERP), None);
    }
}
