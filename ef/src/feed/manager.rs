//! FeedManager - actor that owns the cursor and the active source
//!
//! Processes commands via a channel; the cursor is never touched outside the
//! actor task.

use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::messages::FeedCommand;
use crate::catalog::{ActiveSource, Catalog};
use crate::error::{FeedError, FeedResult};
use crate::window::{Cursor, LineRange, ReadStrategy, Window, WindowSource, open_source};

/// Command channel depth
const CHANNEL_CAPACITY: usize = 256;

/// Active source paired with the reader that serves it
pub struct FeedSource {
    pub name: String,
    pub reader: Box<dyn WindowSource>,
}

impl FeedSource {
    /// Open `active` with the configured read strategy
    pub fn open(active: &ActiveSource, strategy: ReadStrategy, field_index: usize) -> Self {
        Self {
            name: active.name.clone(),
            reader: open_source(strategy, &active.path, field_index),
        }
    }
}

/// One served window and the range it was read from
#[derive(Debug, Clone, PartialEq)]
pub struct FeedWindow {
    pub range: LineRange,
    pub values: Window,
}

/// Snapshot of feed progress
#[derive(Debug, Clone, Serialize)]
pub struct FeedStatus {
    /// Name of the active source, if the catalog was not empty
    pub source: Option<String>,
    pub catalog_size: usize,
    pub range: LineRange,
    /// Cursor advances so far, including those whose read failed
    pub advances: u64,
    pub read_failures: u64,
}

struct FeedActor {
    cursor: Cursor,
    source: Option<FeedSource>,
    directory: PathBuf,
    catalog_size: usize,
    read_failures: u64,
}

impl FeedActor {
    fn next_window(&mut self) -> FeedResult<FeedWindow> {
        let Some(source) = self.source.as_mut() else {
            // Nothing to serve; the cursor does not move
            return Err(FeedError::EmptyCatalog {
                directory: self.directory.clone(),
            });
        };

        let range = self.cursor.advance();
        info!(start = range.start, end = range.end, "Serving window");

        match source.reader.read_window(range) {
            Ok(values) => Ok(FeedWindow { range, values }),
            Err(e) => {
                self.read_failures += 1;
                warn!(error = %e, start = range.start, end = range.end, "Window read failed");
                Err(e)
            }
        }
    }

    fn status(&self) -> FeedStatus {
        FeedStatus {
            source: self.source.as_ref().map(|s| s.name.clone()),
            catalog_size: self.catalog_size,
            range: self.cursor.current_range(),
            advances: self.cursor.advances(),
            read_failures: self.read_failures,
        }
    }
}

/// Handle to send commands to the FeedManager
#[derive(Clone)]
pub struct FeedManager {
    tx: mpsc::Sender<FeedCommand>,
}

impl FeedManager {
    /// Spawn a new FeedManager actor
    ///
    /// `source` is `None` when the catalog was empty; every window request
    /// then fails with [`FeedError::EmptyCatalog`].
    pub fn spawn(cursor: Cursor, source: Option<FeedSource>, catalog: &Catalog) -> Self {
        debug!(
            source = ?source.as_ref().map(|s| s.name.as_str()),
            catalog_size = catalog.len(),
            "FeedManager::spawn: called"
        );
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        let actor = FeedActor {
            cursor,
            source,
            directory: catalog.directory().to_path_buf(),
            catalog_size: catalog.len(),
            read_failures: 0,
        };
        tokio::spawn(actor_loop(actor, rx));

        info!("FeedManager spawned");
        Self { tx }
    }

    /// Advance the cursor and read the new window
    pub async fn next_window(&self) -> FeedResult<FeedWindow> {
        debug!("next_window: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(FeedCommand::NextWindow { reply: reply_tx })
            .await
            .map_err(|_| FeedError::ChannelClosed)?;
        reply_rx.await.map_err(|_| FeedError::ChannelClosed)?
    }

    /// Range of the most recent window, `[0, size]` before the first request
    pub async fn current_range(&self) -> FeedResult<LineRange> {
        debug!("current_range: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(FeedCommand::CurrentRange { reply: reply_tx })
            .await
            .map_err(|_| FeedError::ChannelClosed)?;
        reply_rx.await.map_err(|_| FeedError::ChannelClosed)
    }

    pub async fn status(&self) -> FeedResult<FeedStatus> {
        debug!("status: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(FeedCommand::Status { reply: reply_tx })
            .await
            .map_err(|_| FeedError::ChannelClosed)?;
        reply_rx.await.map_err(|_| FeedError::ChannelClosed)
    }

    /// Shutdown the FeedManager
    pub async fn shutdown(&self) -> FeedResult<()> {
        debug!("shutdown: called");
        self.tx
            .send(FeedCommand::Shutdown)
            .await
            .map_err(|_| FeedError::ChannelClosed)
    }
}

async fn actor_loop(mut actor: FeedActor, mut rx: mpsc::Receiver<FeedCommand>) {
    debug!("FeedManager actor started");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            FeedCommand::NextWindow { reply } => {
                debug!("actor_loop: NextWindow command");
                let _ = reply.send(actor.next_window());
            }

            FeedCommand::CurrentRange { reply } => {
                debug!("actor_loop: CurrentRange command");
                let _ = reply.send(actor.cursor.current_range());
            }

            FeedCommand::Status { reply } => {
                debug!("actor_loop: Status command");
                let _ = reply.send(actor.status());
            }

            FeedCommand::Shutdown => {
                debug!("actor_loop: Shutdown command");
                info!("FeedManager shutting down");
                break;
            }
        }
    }

    debug!("FeedManager actor stopped");
}
