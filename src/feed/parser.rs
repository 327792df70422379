use crate::model::FeedItem;
use feed_rs::parser;

/// Items parsed from a feed document, plus how many entries were unusable.
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// Usable items in document order (newest first for RSS).
    pub items: Vec<FeedItem>,
    /// Entries dropped for lacking a link or a date.
    pub skipped: usize,
}

/// Parse an RSS/Atom document into feed items.
///
/// A channel with a single `<item>` yields a one-element list.
pub fn parse_feed(bytes: &[u8]) -> Result<ParseResult, parser::ParseFeedError> {
    let feed = parser::parse(bytes)?;

    let total = feed.entries.len();
    let items: Vec<FeedItem> = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let link = entry.links.first().map(|l| l.href.trim().to_string())?;
            if link.is_empty() {
                return None;
            }
            let published = entry.published.or(entry.updated)?;
            Some(FeedItem { link, published })
        })
        .collect();

    Ok(ParseResult {
        skipped: total - items.len(),
        items,
    })
}
