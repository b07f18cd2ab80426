//! Startup and shutdown of the monitoring tasks

use super::{run_pipeline, MonitorState};
use crate::clock::Clock;
use crate::collector::{
    CollectionLoop, DockerCliSource, GitHubRunnerSource, HealthSource, HostSource,
};
use crate::config::MonitorSettings;
use crate::models::CollectorKind;
use crate::notify::{Dispatcher, LogSink, NotificationSink, SlackSink};
use crate::observability::StructuredLogger;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

const OUTCOME_QUEUE: usize = 64;
const NOTIFICATION_QUEUE: usize = 256;

/// Concrete sources for every enabled family. The runner source is only
/// built when GitHub credentials are configured.
pub fn build_sources(
    settings: &MonitorSettings,
    clock: Arc<dyn Clock>,
) -> Result<Vec<Arc<dyn HealthSource>>> {
    let mut sources: Vec<Arc<dyn HealthSource>> = Vec::new();

    if settings.collectors.host.enabled {
        sources.push(Arc::new(HostSource::new(clock.clone())));
    }
    if settings.collectors.docker.enabled {
        sources.push(Arc::new(DockerCliSource::new(&settings.docker, clock.clone())));
    }
    if settings.collectors.runners.enabled {
        if settings.github.is_configured() {
            let source = GitHubRunnerSource::new(
                &settings.github,
                settings.collectors.runners.timeout(),
                clock,
            )
            .context("Failed to build GitHub runner source")?;
            sources.push(Arc::new(source));
        } else {
            info!("GitHub runner collector disabled: token, owner or repo not set");
        }
    }

    Ok(sources)
}

/// Slack when a webhook is configured, the log otherwise
pub fn build_sink(settings: &MonitorSettings) -> Result<Arc<dyn NotificationSink>> {
    let notifications = &settings.notifications;
    if notifications.slack.is_configured() {
        let sink = SlackSink::new(&notifications.slack, notifications.delivery_timeout())
            .context("Failed to build Slack sink")?;
        Ok(Arc::new(sink))
    } else {
        Ok(Arc::new(LogSink))
    }
}

/// Running monitor: collection loops, the pipeline and the dispatcher
pub struct MonitorRuntime {
    state: Arc<MonitorState>,
    shutdown_tx: broadcast::Sender<()>,
    loops: Vec<JoinHandle<()>>,
    pipeline: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

impl MonitorRuntime {
    /// Validate settings and spawn every task
    pub fn start(
        settings: MonitorSettings,
        sources: Vec<Arc<dyn HealthSource>>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        logger: StructuredLogger,
    ) -> Result<Self> {
        settings.validate().context("Invalid monitor settings")?;

        let (notify_tx, notify_rx) = mpsc::channel(NOTIFICATION_QUEUE);
        let dispatcher = Dispatcher::new(
            sink,
            &settings.notifications,
            clock.clone(),
            logger.clone(),
        );
        let dispatcher = tokio::spawn(dispatcher.run(notify_rx));

        let state = Arc::new(MonitorState::new(
            settings,
            clock.clone(),
            logger.clone(),
            notify_tx,
        ));

        let (shutdown_tx, _) = broadcast::channel(1);
        let (outcome_tx, outcome_rx) = mpsc::channel(OUTCOME_QUEUE);
        let mut loops = Vec::new();
        let mut kinds: Vec<CollectorKind> = Vec::new();

        for source in sources {
            let kind = source.kind();
            let schedule = state.settings().collectors.schedule(kind).clone();
            if !schedule.enabled {
                continue;
            }
            if kinds.contains(&kind) {
                warn!(collector = %kind, "Duplicate source for collector, ignoring");
                continue;
            }

            state.store().register(kind);
            kinds.push(kind);

            let collection_loop =
                CollectionLoop::new(source, &schedule, outcome_tx.clone(), clock.clone());
            loops.push(tokio::spawn(collection_loop.run(shutdown_tx.subscribe())));
        }
        // The pipeline stops once every loop has dropped its sender
        drop(outcome_tx);

        let pipeline = tokio::spawn(run_pipeline(state.clone(), outcome_rx));

        logger.log_startup(env!("CARGO_PKG_VERSION"), &kinds);

        Ok(Self {
            state,
            shutdown_tx,
            loops,
            pipeline,
            dispatcher,
        })
    }

    pub fn state(&self) -> Arc<MonitorState> {
        self.state.clone()
    }

    /// Stop the collection timers, let in-flight polls finish (each bounded
    /// by its timeout), then drain the pipeline and the notification queue
    pub async fn shutdown(self, reason: &str) {
        self.state.logger().log_shutdown(reason);
        let _ = self.shutdown_tx.send(());

        for handle in self.loops {
            if let Err(e) = handle.await {
                warn!(error = %e, "Collection loop task failed");
            }
        }
        if let Err(e) = self.pipeline.await {
            warn!(error = %e, "Pipeline task failed");
        }

        self.state.close_notifications();
        if let Err(e) = self.dispatcher.await {
            warn!(error = %e, "Dispatcher task failed");
        }
    }
}
