//! Feed actor messages
//!
//! Commands and replies for the actor pattern.

use tokio::sync::oneshot;

use super::manager::{FeedStatus, FeedWindow};
use crate::error::FeedResult;
use crate::window::LineRange;

/// Commands sent to the FeedManager actor
#[derive(Debug)]
pub enum FeedCommand {
    /// Advance the cursor, then read the new window
    NextWindow {
        reply: oneshot::Sender<FeedResult<FeedWindow>>,
    },

    /// Range the most recent advance produced
    CurrentRange { reply: oneshot::Sender<LineRange> },

    Status { reply: oneshot::Sender<FeedStatus> },

    Shutdown,
}
