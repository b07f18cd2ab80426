//! Per-collector polling loop
//!
//! Polls one source on its own interval. Polls of the same source never
//! overlap: a tick that comes due while a poll is still running is skipped,
//! not queued. Every poll is bounded by a timeout that resolves to
//! `CollectionError::Timeout`.

use super::HealthSource;
use crate::clock::{Clock, SystemClock};
use crate::config::CollectorSchedule;
use crate::error::CollectionError;
use crate::models::{CollectorKind, Snapshot};
use crate::observability::MonitorMetrics;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Result of one poll, forwarded to the pipeline
#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub kind: CollectorKind,
    pub result: Result<Snapshot, CollectionError>,
    pub at: DateTime<Utc>,
    pub elapsed: Duration,
}

/// Polling loop for a single source
pub struct CollectionLoop {
    source: Arc<dyn HealthSource>,
    interval: Duration,
    timeout: Duration,
    outcomes_tx: mpsc::Sender<PollOutcome>,
    clock: Arc<dyn Clock>,
    metrics: MonitorMetrics,
}

impl CollectionLoop {
    pub fn new(
        source: Arc<dyn HealthSource>,
        schedule: &CollectorSchedule,
        outcomes_tx: mpsc::Sender<PollOutcome>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            source,
            interval: schedule.interval(),
            timeout: schedule.timeout(),
            outcomes_tx,
            clock,
            metrics: MonitorMetrics::new(),
        }
    }

    pub fn kind(&self) -> CollectorKind {
        self.source.kind()
    }

    /// Run until shutdown is signalled or the pipeline goes away.
    ///
    /// An in-flight poll is allowed to finish (it is bounded by the timeout)
    /// before the shutdown signal is observed.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let kind = self.kind();
        info!(
            collector = %kind,
            interval_secs = self.interval.as_secs(),
            timeout_secs = self.timeout.as_secs(),
            "Starting collection loop"
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!(collector = %kind, "Shutting down collection loop");
                    break;
                }
                _ = ticker.tick() => {
                    let outcome = self.poll_once().await;

                    let skipped = skipped_ticks(outcome.elapsed, self.interval);
                    if skipped > 0 {
                        debug!(
                            collector = %kind,
                            elapsed_ms = outcome.elapsed.as_millis(),
                            skipped,
                            "Poll overran its interval, skipping ticks"
                        );
                        self.metrics.inc_skipped_ticks(kind, skipped);
                    }

                    if self.outcomes_tx.send(outcome).await.is_err() {
                        info!(collector = %kind, "Pipeline closed, stopping collection loop");
                        break;
                    }
                }
            }
        }
    }

    /// Poll the source once, bounded by the timeout
    pub async fn poll_once(&self) -> PollOutcome {
        let kind = self.kind();
        let start = Instant::now();

        let result = match timeout(self.timeout, self.source.poll(self.timeout)).await {
            Ok(result) => result,
            Err(_) => Err(CollectionError::Timeout(self.timeout)),
        };
        let elapsed = start.elapsed();

        self.metrics
            .observe_poll_latency(kind, elapsed.as_secs_f64());
        match &result {
            Ok(_) => debug!(collector = %kind, elapsed_ms = elapsed.as_millis(), "Poll complete"),
            Err(e) => {
                self.metrics.inc_collection_errors(kind);
                warn!(collector = %kind, error = %e, "Poll failed");
            }
        }

        PollOutcome {
            kind,
            result,
            at: self.clock.now(),
            elapsed,
        }
    }
}

/// Number of whole intervals a poll overran by
fn skipped_ticks(elapsed: Duration, interval: Duration) -> u64 {
    if interval.is_zero() {
        return 0;
    }
    (elapsed.as_nanos() / interval.as_nanos()) as u64
}

/// Builder for creating a collection loop
pub struct CollectionLoopBuilder {
    source: Option<Arc<dyn HealthSource>>,
    outcomes_tx: Option<mpsc::Sender<PollOutcome>>,
    clock: Arc<dyn Clock>,
    schedule: CollectorSchedule,
}

impl CollectionLoopBuilder {
    /// Create a new builder with the default schedule and the wall clock
    pub fn new() -> Self {
        Self {
            source: None,
            outcomes_tx: None,
            clock: Arc::new(SystemClock),
            schedule: CollectorSchedule::default(),
        }
    }

    pub fn source(mut self, source: Arc<dyn HealthSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn outcomes(mut self, tx: mpsc::Sender<PollOutcome>) -> Self {
        self.outcomes_tx = Some(tx);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn schedule(mut self, schedule: CollectorSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.schedule.interval_secs = interval.as_secs();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.schedule.timeout_secs = timeout.as_secs();
        self
    }

    pub fn build(self) -> Result<CollectionLoop> {
        let source = self
            .source
            .ok_or_else(|| anyhow::anyhow!("Source is required"))?;
        let outcomes_tx = self
            .outcomes_tx
            .ok_or_else(|| anyhow::anyhow!("Outcome channel is required"))?;
        if self.schedule.interval_secs == 0 || self.schedule.timeout_secs == 0 {
            anyhow::bail!("Interval and timeout must be at least one second");
        }

        Ok(CollectionLoop::new(
            source,
            &self.schedule,
            outcomes_tx,
            self.clock,
        ))
    }
}

impl Default for CollectionLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SystemMetrics;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Source that succeeds after an optional delay
    struct MockSource {
        delay: Duration,
        call_count: AtomicUsize,
    }

    impl MockSource {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                call_count: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl HealthSource for MockSource {
        fn kind(&self) -> CollectorKind {
            CollectorKind::Host
        }

        async fn poll(&self, _timeout: Duration) -> Result<Snapshot, CollectionError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(Snapshot::Host(SystemMetrics {
                cpu_usage: 0.1,
                ram_usage: 0.2,
                ram_total: 100,
                ram_used: 20,
                ssd_usage: 0.3,
                ssd_total: 100,
                ssd_used: 30,
                battery_level: None,
                is_power_connected: None,
                timestamp: chrono::Utc::now(),
            }))
        }
    }

    #[test]
    fn test_skipped_ticks() {
        let interval = Duration::from_secs(10);
        assert_eq!(skipped_ticks(Duration::from_secs(3), interval), 0);
        assert_eq!(skipped_ticks(Duration::from_secs(25), interval), 2);
        assert_eq!(skipped_ticks(Duration::from_secs(5), Duration::ZERO), 0);
    }

    #[tokio::test]
    async fn test_builder_requires_source() {
        let (tx, _rx) = mpsc::channel(1);
        let result = CollectionLoopBuilder::new().outcomes(tx).build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_builder_rejects_zero_timeout() {
        let (tx, _rx) = mpsc::channel(1);
        let result = CollectionLoopBuilder::new()
            .source(Arc::new(MockSource::new(Duration::ZERO)))
            .outcomes(tx)
            .timeout(Duration::from_millis(10))
            .build();
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_times_out() {
        let (tx, _rx) = mpsc::channel(1);
        let collection_loop = CollectionLoopBuilder::new()
            .source(Arc::new(MockSource::new(Duration::from_secs(30))))
            .outcomes(tx)
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();

        let outcome = collection_loop.poll_once().await;
        assert_eq!(
            outcome.result,
            Err(CollectionError::Timeout(Duration::from_secs(5)))
        );
        assert_eq!(outcome.kind, CollectorKind::Host);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_polls_do_not_overlap() {
        let source = Arc::new(MockSource::new(Duration::from_secs(25)));
        let (tx, mut rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let collection_loop = CollectionLoopBuilder::new()
            .source(source.clone())
            .outcomes(tx)
            .interval(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap();
        let handle = tokio::spawn(collection_loop.run(shutdown_rx));

        // Polls at t=0 and t=30 (ticks at 10 and 20 skipped), each taking 25s
        let first = rx.recv().await.unwrap();
        assert!(first.result.is_ok());
        let second = rx.recv().await.unwrap();
        assert!(second.result.is_ok());

        assert_eq!(source.call_count.load(Ordering::SeqCst), 2);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
