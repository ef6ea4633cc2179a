//! Feed actor
//!
//! FeedManager owns the cursor and the active source and processes commands
//! one at a time, so each request's advance-then-read pair is atomic with
//! respect to every other request.

mod manager;
mod messages;

pub use manager::{FeedManager, FeedSource, FeedStatus, FeedWindow};
pub use messages::FeedCommand;
