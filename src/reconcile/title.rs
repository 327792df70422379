//! Release-name heuristics shared by duplicate grouping and catalog lookup.
//!
//! Release names look like `<marker> - <Title> (<year>) <junk>`, e.g.
//! `www.1TamilMV.pink - Foo Bar (2020) Tamil HQ HDRip - 1080p.mkv`.
//! The site marker is required: names without it fall back to the raw name.

use regex::Regex;
use std::sync::OnceLock;

/// Site marker of release names from the default forum, any mirror TLD.
pub const DEFAULT_RELEASE_MARKER: &str = r"www\.1TamilMV\.\w+";

static YEAR_PAREN: OnceLock<Regex> = OnceLock::new();
static DEFAULT_RELEASE: OnceLock<Regex> = OnceLock::new();

fn year_paren() -> &'static Regex {
    YEAR_PAREN.get_or_init(|| Regex::new(r"\(\d{4}\)").expect("static year regex is valid"))
}

fn release_regex(marker: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"(?i)(?:{})\s*-\s*([^(]+?)\s*\((\d{{4}})\)",
        marker
    ))
}

/// Title and year parsed out of a release name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseTitle<'a> {
    pub title: &'a str,
    pub year: u16,
}

/// Parses `<marker> - <Title> (<year>)` for one site marker pattern.
#[derive(Debug, Clone)]
pub struct TitleParser {
    release: Regex,
}

impl Default for TitleParser {
    fn default() -> Self {
        let release = DEFAULT_RELEASE.get_or_init(|| {
            release_regex(DEFAULT_RELEASE_MARKER).expect("default release marker is valid")
        });
        Self {
            release: release.clone(),
        }
    }
}

impl TitleParser {
    /// `marker` is a regex matched case-insensitively before the ` - `.
    pub fn new(marker: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            release: release_regex(marker)?,
        })
    }

    pub fn parse<'a>(&self, name: &'a str) -> Option<ReleaseTitle<'a>> {
        let caps = self.release.captures(name)?;
        let title = caps.get(1)?.as_str().trim();
        if title.is_empty() {
            return None;
        }
        let year = caps.get(2)?.as_str().parse().ok()?;
        Some(ReleaseTitle { title, year })
    }

    /// Catalog search term: `"<Title> (<year>)"`, or the raw name on no match.
    pub fn movie_name(&self, name: &str) -> String {
        match self.parse(name) {
            Some(release) => format!("{} ({})", release.title, release.year),
            None => name.to_string(),
        }
    }
}

/// Duplicate-group key: everything before the first `(yyyy)`, trimmed.
///
/// Names without a parenthesised year key on the raw name.
pub fn group_key(name: &str) -> &str {
    match year_paren().find(name) {
        Some(m) => name[..m.start()].trim(),
        None => name,
    }
}
