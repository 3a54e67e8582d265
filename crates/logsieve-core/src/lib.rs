//! Record buffering and namespace filtering for logsieve
//!
//! This crate provides the logger namespace tree, the bounded record
//! buffer, and combined filter evaluation.

mod filter;
mod sink;
mod tree;

pub use filter::RecordFilter;
pub use sink::{DEFAULT_CAPACITY, EventSink, SinkStats};
pub use tree::{LoggerTree, NodeView};

// Re-export types used in our public API
pub use logsieve_types::{ChangeEvent, NodeState, Record};
