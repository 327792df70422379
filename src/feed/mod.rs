//! Feed watching: fetch the release feed, find what is new, hand it on.
//!
//! - [`parser`] - RSS/Atom parsing into [`FeedItem`](crate::model::FeedItem)s via `feed-rs`
//! - [`source`] - where feed documents come from
//! - [`snapshot`] - the on-disk copy of the last fetched document
//! - [`watcher`] - the polling state machine around `last_seen`

mod parser;
pub mod snapshot;
mod source;
mod watcher;

pub use parser::{parse_feed, ParseResult};
pub use snapshot::{seed_last_seen, SnapshotError};
pub use source::{FeedSource, HttpFeedSource};
pub use watcher::{newer_than, FeedWatcher, PollOutcome};
