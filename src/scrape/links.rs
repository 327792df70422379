use scraper::{Html, Selector};
use std::sync::OnceLock;
use url::Url;

static ANCHOR_SELECTOR: OnceLock<Selector> = OnceLock::new();

/// Collect attachment links from an HTML page.
///
/// Keeps every `<a href>` containing `pattern`, in document order. The href is
/// cut at the first `"` (some forum markup leaks attribute junk into it),
/// trimmed, and resolved against `base` when relative.
pub fn extract_attachment_links(html: &str, base: &Url, pattern: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let selector = ANCHOR_SELECTOR
        .get_or_init(|| Selector::parse("a[href]").expect("static anchor CSS selector is valid"));

    document
        .select(selector)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| href.contains(pattern))
        .filter_map(|href| {
            let href = href.split('"').next().unwrap_or("").trim();
            if href.is_empty() {
                return None;
            }
            match base.join(href) {
                Ok(url) => Some(url.to_string()),
                Err(e) => {
                    tracing::debug!(href = %href, error = %e, "Skipping unresolvable link");
                    None
                }
            }
        })
        .collect()
}
