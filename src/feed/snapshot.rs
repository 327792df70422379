//! The last fetched feed document, kept on disk to seed `last_seen` across
//! restarts.

use super::parser::parse_feed;
use chrono::{DateTime, Duration, Utc};
use std::io::Write;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Snapshot is not a valid feed: {0}")]
    Parse(String),
    #[error("Snapshot contains no dated items")]
    Empty,
}

/// Publish time of the newest item in the snapshot at `path`.
pub fn newest_published(path: &Path) -> Result<DateTime<Utc>, SnapshotError> {
    let bytes = std::fs::read(path)?;
    let parsed = parse_feed(&bytes).map_err(|e| SnapshotError::Parse(e.to_string()))?;
    parsed
        .items
        .iter()
        .map(|item| item.published)
        .max()
        .ok_or(SnapshotError::Empty)
}

/// Initial `last_seen` for a watcher.
///
/// - no snapshot configured, or no file yet: `now - 2 days`
/// - readable snapshot: newest item's publish time
/// - unreadable or unparseable snapshot: `now - 30 days`
pub fn seed_last_seen(path: Option<&Path>, now: DateTime<Utc>) -> DateTime<Utc> {
    let Some(path) = path.filter(|p| p.exists()) else {
        let seed = now - Duration::days(2);
        tracing::info!(last_seen = %seed, "No feed snapshot, seeding last_seen two days back");
        return seed;
    };

    match newest_published(path) {
        Ok(seed) => {
            tracing::info!(last_seen = %seed, path = %path.display(), "Seeded last_seen from feed snapshot");
            seed
        }
        Err(e) => {
            let seed = now - Duration::days(30);
            tracing::warn!(
                path = %path.display(),
                error = %e,
                last_seen = %seed,
                "Unusable feed snapshot, seeding last_seen thirty days back"
            );
            seed
        }
    }
}

/// Replace the snapshot with `bytes` using write-to-temp-then-rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SnapshotError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut temp = tempfile::Builder::new()
        .prefix(".feed-snapshot")
        .tempfile_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| SnapshotError::Io(e.error))?;
    Ok(())
}
