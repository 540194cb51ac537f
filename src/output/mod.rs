//! Output module for crawl reporting
//!
//! This module handles recording crawl statistics and printing them.

pub mod stats;

pub use stats::{print_statistics, CrawlStatistics, CrawlStats};
