//! Transcript tailing and discovery
//!
//! - [`TranscriptTail`]: the offset-based read routine. It is the only place
//!   bytes are consumed, so a notification and a poll tick racing for the
//!   same bytes deliver them once.
//! - [`FileWatch`]: filesystem notifications plus an interval poll, both
//!   feeding the same read routine through the event loop.
//! - [`scan`]: locating transcript files for a provider and working dir.

pub mod scan;
mod tail;
mod watch;

pub use tail::TranscriptTail;
pub use watch::{ticker, FileWatch};
