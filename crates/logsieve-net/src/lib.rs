//! TCP ingestion for logsieve
//!
//! This crate provides the frame decoder for the unframed JSON wire format
//! and the TCP listener that feeds decoded records into the sink.

mod decoder;
mod listener;

pub use decoder::{DEFAULT_MAX_FRAME_LEN, DecodeError, FeedResult, FrameDecoder};
pub use listener::{ListenError, LogListener};

// Re-export types used in our public API
pub use logsieve_types::Record;
