//! Health signal collection
//!
//! Each signal family (host resources, container runtime, CI runner
//! registry) is sampled by its own `HealthSource` on its own cadence. A
//! `CollectionLoop` drives one source: it bounds every poll with a timeout,
//! never overlaps polls of the same source, and forwards the outcome to the
//! monitor pipeline. Accepted snapshots live in the `SnapshotStore`.

mod docker;
mod github;
mod host;
mod r#loop;
mod store;

#[cfg(test)]
mod tests;

pub use docker::DockerCliSource;
pub use github::GitHubRunnerSource;
pub use host::{read_power_supply, HostSource};
pub use r#loop::{CollectionLoop, CollectionLoopBuilder, PollOutcome};
pub use store::{AcceptedSnapshot, CollectorState, SnapshotStore};

use crate::error::CollectionError;
use crate::models::{CollectorKind, Snapshot};
use std::time::Duration;

pub use async_trait::async_trait;

/// Capability interface for one signal family's backing source
#[async_trait]
pub trait HealthSource: Send + Sync {
    /// Family this source produces snapshots for
    fn kind(&self) -> CollectorKind;

    /// Sample the source once. `timeout` is the budget the caller will
    /// enforce; sources use it to bound their own transports.
    async fn poll(&self, timeout: Duration) -> Result<Snapshot, CollectionError>;
}
