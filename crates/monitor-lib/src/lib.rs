//! Fleet health-monitoring core
//!
//! This crate provides the core functionality for:
//! - Health signal collection (host resources, container runtime, CI runners)
//! - Threshold evaluation and alert lifecycle
//! - Aggregation into a single overall status
//! - Alert notification with suppression
//! - Health checks and observability

pub mod aggregator;
pub mod alert;
pub mod clock;
pub mod collector;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod health;
pub mod models;
pub mod monitor;
pub mod notify;
pub mod observability;

pub use alert::{AlertEngine, AlertFilter, AlertTransition, TransitionKind};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::MonitorSettings;
pub use error::{AlertNotFound, CollectionError, DeliveryError, EvaluationError};
pub use health::{ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse};
pub use models::*;
pub use monitor::{ApplicationErrorReport, MonitorRuntime, MonitorState};
pub use observability::{MonitorMetrics, StructuredLogger};
