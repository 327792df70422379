//! Pure selection rules for the size and duplicate stages.

use super::title::group_key;
use crate::model::{Decision, QueueAction, QueuedDownload, GIB};
use std::collections::HashMap;

pub const REASON_SIZE: &str = "inappropriate size";
pub const REASON_DUPLICATE: &str = "duplicate";

const DELETE_WITH_FILES: QueueAction = QueueAction::Delete { delete_files: true };

/// Accepted download sizes. Both ends are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeBounds {
    pub min_bytes: u64,
    pub max_bytes: u64,
}

impl Default for SizeBounds {
    fn default() -> Self {
        Self {
            min_bytes: GIB,
            max_bytes: 3 * GIB,
        }
    }
}

impl SizeBounds {
    pub fn contains(&self, size_bytes: u64) -> bool {
        size_bytes >= self.min_bytes && size_bytes <= self.max_bytes
    }
}

/// Delete decisions for every entry whose size falls outside `bounds`.
pub fn size_violations(entries: Vec<QueuedDownload>, bounds: SizeBounds) -> Vec<Decision> {
    entries
        .into_iter()
        .filter(|d| !bounds.contains(d.size_bytes))
        .map(|download| Decision {
            download,
            action: DELETE_WITH_FILES,
            reason: REASON_SIZE,
        })
        .collect()
}

/// Group entries by normalized title, preserving first-seen order.
pub fn group_by_title(entries: Vec<QueuedDownload>) -> Vec<Vec<QueuedDownload>> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Vec<QueuedDownload>> = Vec::new();

    for entry in entries {
        let key = group_key(&entry.name).to_string();
        match index.get(&key) {
            Some(&i) => groups[i].push(entry),
            None => {
                index.insert(key, groups.len());
                groups.push(vec![entry]);
            }
        }
    }
    groups
}

/// Index of the canonical candidate of a duplicate group.
///
/// If any member has started, the one with the highest progress wins;
/// otherwise the largest one. The first member wins ties. `None` only for an
/// empty group.
pub fn select_survivor(group: &[QueuedDownload]) -> Option<usize> {
    let any_started = group.iter().any(|d| d.progress > 0.0);
    let mut best: Option<usize> = None;

    for (i, candidate) in group.iter().enumerate() {
        if any_started && candidate.progress <= 0.0 {
            continue;
        }
        let better = match best {
            None => true,
            Some(b) if any_started => candidate.progress > group[b].progress,
            Some(b) => candidate.size_bytes > group[b].size_bytes,
        };
        if better {
            best = Some(i);
        }
    }
    best
}

/// Delete decisions for every non-survivor of every multi-member group.
pub fn duplicate_losers(entries: Vec<QueuedDownload>) -> Vec<Decision> {
    let mut decisions = Vec::new();
    for group in group_by_title(entries) {
        if group.len() < 2 {
            continue;
        }
        let Some(survivor) = select_survivor(&group) else {
            continue;
        };
        tracing::debug!(
            title = %group_key(&group[survivor].name),
            members = group.len(),
            survivor = %group[survivor].id,
            "Resolved duplicate group"
        );
        decisions.extend(
            group
                .into_iter()
                .enumerate()
                .filter(|(i, _)| *i != survivor)
                .map(|(_, download)| Decision {
                    download,
                    action: DELETE_WITH_FILES,
                    reason: REASON_DUPLICATE,
                }),
        );
    }
    decisions
}
