//! Alert lifecycle management
//!
//! This module owns alert identity and the open-alert set:
//! - Deduplication on (type, subject)
//! - Raise / update / auto-resolve transitions per cycle
//! - Acknowledgement as a flag orthogonal to resolution

mod engine;

pub use engine::{alert_id, AlertEngine, AlertFilter, AlertTransition, TransitionKind};
