//! Host resource source backed by sysinfo
//!
//! CPU, memory and disk come from sysinfo. Battery state is read from the
//! Linux power-supply class directory and is absent on hosts without one.
//!
//! sysinfo refreshes are plain syscalls (`statvfs` can hang on a dead network
//! mount), so they run on the blocking pool. The poll stays cancellable by the
//! loop timeout and at most one sample of each kind is ever outstanding.

use super::{async_trait, HealthSource};
use crate::clock::Clock;
use crate::error::CollectionError;
use crate::models::{CollectorKind, Snapshot, SystemMetrics};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sysinfo::{Disks, System};
use tracing::{debug, warn};

const POWER_SUPPLY_ROOT: &str = "/sys/class/power_supply";

/// Runs a blocking sample on the blocking pool, one at a time.
///
/// A sample abandoned by the caller keeps its slot until the syscall returns,
/// so a hung mount costs one pool thread rather than one per poll.
struct BlockingSampler {
    name: &'static str,
    in_flight: Arc<AtomicBool>,
}

/// Clears the in-flight flag even if the sample panics
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl BlockingSampler {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    async fn run<T, F>(&self, sample: F) -> Result<T, CollectionError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            warn!(sampler = self.name, "Previous sample still blocked, skipping");
            return Err(CollectionError::Unreachable(format!(
                "{} sample from an earlier poll has not returned",
                self.name
            )));
        }

        let guard = InFlightGuard(self.in_flight.clone());
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            sample()
        })
        .await
        .map_err(|e| CollectionError::Unreachable(format!("{} sample failed: {}", self.name, e)))
    }
}

pub struct HostSource {
    system: Arc<Mutex<System>>,
    cpu_sampler: BlockingSampler,
    disk_sampler: BlockingSampler,
    clock: Arc<dyn Clock>,
}

impl HostSource {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new())),
            cpu_sampler: BlockingSampler::new("cpu/memory"),
            disk_sampler: BlockingSampler::new("disk"),
            clock,
        }
    }

    async fn refresh_cpu(&self) -> Result<(), CollectionError> {
        let system = self.system.clone();
        self.cpu_sampler
            .run(move || {
                system
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .refresh_cpu();
            })
            .await
    }

    /// (cpu ratio, total memory, used memory)
    async fn sample_cpu_memory(&self) -> Result<(f64, u64, u64), CollectionError> {
        let system = self.system.clone();
        self.cpu_sampler
            .run(move || {
                let mut system = system.lock().unwrap_or_else(|e| e.into_inner());
                system.refresh_cpu();
                system.refresh_memory();

                let cpu = f64::from(system.global_cpu_info().cpu_usage()) / 100.0;
                let total = system.total_memory();
                let used = total.saturating_sub(system.available_memory());
                (cpu.clamp(0.0, 1.0), total, used)
            })
            .await
    }

    /// (total, used) bytes across every disk reporting a size
    async fn sample_disks(&self) -> Result<(u64, u64), CollectionError> {
        self.disk_sampler
            .run(|| {
                Disks::new_with_refreshed_list()
                    .list()
                    .iter()
                    .filter(|disk| disk.total_space() > 0)
                    .fold((0u64, 0u64), |(total, used), disk| {
                        (
                            total.saturating_add(disk.total_space()),
                            used.saturating_add(
                                disk.total_space().saturating_sub(disk.available_space()),
                            ),
                        )
                    })
            })
            .await
    }
}

fn ratio(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (used as f64 / total as f64).clamp(0.0, 1.0)
    }
}

#[async_trait]
impl HealthSource for HostSource {
    fn kind(&self) -> CollectorKind {
        CollectorKind::Host
    }

    async fn poll(&self, _timeout: Duration) -> Result<Snapshot, CollectionError> {
        // CPU usage is a delta between two refreshes
        self.refresh_cpu().await?;
        tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
        let (cpu_usage, ram_total, ram_used) = self.sample_cpu_memory().await?;

        if ram_total == 0 {
            return Err(CollectionError::Unreachable(
                "host memory statistics unavailable".to_string(),
            ));
        }

        let (ssd_total, ssd_used) = self.sample_disks().await?;

        let (battery_level, is_power_connected) =
            read_power_supply(Path::new(POWER_SUPPLY_ROOT)).await;

        let metrics = SystemMetrics {
            cpu_usage,
            ram_usage: ratio(ram_used, ram_total),
            ram_total,
            ram_used,
            ssd_usage: ratio(ssd_used, ssd_total),
            ssd_total,
            ssd_used,
            battery_level,
            is_power_connected,
            timestamp: self.clock.now(),
        };

        debug!(
            cpu = metrics.cpu_usage,
            ram = metrics.ram_usage,
            ssd = metrics.ssd_usage,
            battery = ?metrics.battery_level,
            "Collected host metrics"
        );

        Ok(Snapshot::Host(metrics))
    }
}

async fn read_trimmed(path: &Path) -> Option<String> {
    tokio::fs::read_to_string(path)
        .await
        .ok()
        .map(|s| s.trim().to_string())
}

/// Battery level and mains state from a power-supply class directory.
///
/// Returns `(None, None)` when no battery is present. Mains state falls back
/// to the battery's charging status when no mains adapter is listed.
pub async fn read_power_supply(root: &Path) -> (Option<u8>, Option<bool>) {
    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(_) => return (None, None),
    };

    let mut battery_level = None;
    let mut battery_status = None;
    let mut mains_online = None;

    while let Ok(Some(entry)) = entries.next_entry().await {
        let dir = entry.path();
        match read_trimmed(&dir.join("type")).await.as_deref() {
            Some("Battery") if battery_level.is_none() => {
                battery_level = read_trimmed(&dir.join("capacity"))
                    .await
                    .and_then(|v| v.parse::<u8>().ok())
                    .map(|v| v.min(100));
                battery_status = read_trimmed(&dir.join("status")).await;
            }
            Some("Mains") => {
                let online = read_trimmed(&dir.join("online")).await.as_deref() == Some("1");
                mains_online = Some(mains_online.unwrap_or(false) || online);
            }
            _ => {}
        }
    }

    if battery_level.is_none() {
        return (None, None);
    }

    let power_connected =
        mains_online.or_else(|| battery_status.map(|status| status != "Discharging"));
    (battery_level, power_connected)
}
