//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `egress` - Zone and confusion events to file (JSONL), session snapshot export
//! - `trace` - JSONL point trace replay into the pipeline channel

pub mod egress;
pub mod trace;

// Re-export commonly used types
pub use egress::{write_snapshot, EventEgress};
pub use trace::{parse_trace_line, ReplayStats, TraceReader};
