//! ecgfeed - simulated live ECG feed
//!
//! Serves a rolling window of numeric samples from a fixed CSV file. Every
//! request advances a cursor through the file and wraps around, so repeated
//! polling looks like a live sensor stream.
//!
//! # Modules
//!
//! - [`catalog`] - Source directory scan and active source selection
//! - [`window`] - Cursor state machine and line-range readers
//! - [`feed`] - Actor that serializes advance-then-read per request
//! - [`server`] - HTTP surface (`/getECGData`, `/status`)
//! - [`analysis`] - Band-pass filter, peak detection, heart rate
//! - [`client`] - Polling client for a running server
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod analysis;
pub mod catalog;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod feed;
pub mod server;
pub mod window;

// Re-export commonly used types
pub use analysis::{Analysis, analyze, analyze_recording};
pub use catalog::{ActiveSource, Catalog, SourceSelection};
pub use client::FeedClient;
pub use config::Config;
pub use error::{FeedError, FeedResult};
pub use feed::{FeedManager, FeedSource, FeedStatus, FeedWindow};
pub use window::{Cursor, LineRange, ReadStrategy, Window, WindowGeometry, WindowSource};

/// Build the feed actor from configuration
///
/// Loads the catalog and selects the active source. Fails when the directory
/// cannot be read or a non-empty catalog cannot satisfy the selection policy;
/// an empty catalog still yields a running feed that answers "not found".
pub fn start_feed(config: &Config) -> eyre::Result<(Catalog, FeedManager)> {
    use eyre::Context;

    config.validate().context("Invalid configuration")?;

    let catalog =
        Catalog::load(&config.source.directory, &config.source.extension).context("Failed to load source catalog")?;
    let active = catalog
        .select(&config.source.selection)
        .context("Failed to select active source")?;

    let source = active
        .as_ref()
        .map(|a| FeedSource::open(a, config.window.read_strategy, config.source.field_index));
    let cursor = Cursor::new(config.window.geometry())?;
    let feed = FeedManager::spawn(cursor, source, &catalog);

    Ok((catalog, feed))
}
