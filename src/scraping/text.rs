use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;

fn block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?is)<(?:script|style|noscript|svg|canvas|iframe|template)[^>]*?>.*?</(?:script|style|noscript|svg|canvas|iframe|template)>",
        )
        .expect("valid block regex")
    })
}

fn structural_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<(?:nav|header|footer|aside)[^>]*?>.*?</(?:nav|header|footer|aside)>")
            .expect("valid structural regex")
    })
}

fn interactive_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<(?:form|button|select)[^>]*?>.*?</(?:form|button|select)>")
            .expect("valid interactive regex")
    })
}

fn comment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<!--.*?-->").expect("valid comment regex"))
}

/// Strip markup that never carries claim text: scripts, styles, embedded
/// media, navigation chrome, forms, and comments.
pub fn strip_noise(html: &str) -> String {
    let s = comment_regex().replace_all(html, " ");
    let s = block_regex().replace_all(&s, " ");
    let s = structural_regex().replace_all(&s, " ");
    interactive_regex().replace_all(&s, " ").into_owned()
}

/// Lowercased, whitespace-collapsed readable text of a page: title, meta
/// descriptions, and body text after noise stripping.
pub fn visible_text(html: &str) -> String {
    let cleaned = strip_noise(html);
    let doc = Html::parse_document(&cleaned);

    let mut parts: Vec<String> = Vec::new();

    if let Ok(sel) = Selector::parse("title") {
        if let Some(title) = doc.select(&sel).next() {
            parts.push(title.text().collect::<Vec<_>>().join(" "));
        }
    }

    if let Ok(sel) = Selector::parse(
        r#"meta[name="description"], meta[property="og:description"], meta[name="twitter:description"]"#,
    ) {
        for meta in doc.select(&sel) {
            if let Some(content) = meta.value().attr("content") {
                parts.push(content.to_string());
            }
        }
    }

    let body_text = match Selector::parse("body") {
        Ok(sel) => doc
            .select(&sel)
            .next()
            .map(|body| body.text().collect::<Vec<_>>().join(" ")),
        Err(_) => None,
    };
    parts.push(body_text.unwrap_or_else(|| doc.root_element().text().collect::<Vec<_>>().join(" ")));

    collapse_whitespace(&parts.join(" ")).to_lowercase()
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!doctype html>
<html><head>
  <title>Tony's Pizza | Brooklyn</title>
  <meta name="description" content="Naturally-leavened pies since 1998">
  <style>.sourdough-banner { color: red }</style>
  <script>var sourdough = "tracking";</script>
</head>
<body>
  <nav><a href="/">Home</a><a href="/sourdough">Sourdough Menu</a></nav>
  <header><h1>WELCOME</h1></header>
  <main>
    <p>Every pie starts with our   Wild   Yeast starter.</p>
    <!-- sourdough coming soon -->
  </main>
  <footer>© Tony's Pizza</footer>
</body></html>"#;

    #[test]
    fn test_visible_text_strips_noise_and_lowercases() {
        let text = visible_text(PAGE);
        assert!(text.contains("every pie starts with our wild yeast starter."));
        assert!(text.contains("naturally-leavened pies since 1998"));
        assert!(text.contains("tony's pizza | brooklyn"));
        assert!(!text.contains("sourdough"), "noise leaked: {text}");
        assert!(!text.contains("welcome"));
    }

    #[test]
    fn test_visible_text_handles_fragments() {
        let text = visible_text("<p>Levain  BREAD</p>");
        assert_eq!(text, "levain bread");
    }

    #[test]
    fn test_visible_text_on_empty_input() {
        assert_eq!(visible_text(""), "");
    }
}
