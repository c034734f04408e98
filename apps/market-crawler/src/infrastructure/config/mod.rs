//! Configuration Module
//!
//! Settings and crawl-target loading from environment variables.

mod settings;

pub use settings::{ConfigError, CrawlTarget, CrawlerSettings};
