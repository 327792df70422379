//! Release-feed automation: watches a feed, queues every attachment it links
//! to in qBittorrent, and reconciles the queue against a Radarr library.

pub mod config;
pub mod feed;
pub mod fetch;
pub mod ingest;
pub mod model;
pub mod reconcile;
pub mod scrape;
pub mod services;
pub mod util;
