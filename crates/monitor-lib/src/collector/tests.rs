//! Integration tests for collection
//!
//! These use scripted sources to exercise the loop, the timeout and the
//! snapshot store together without touching the host, docker or GitHub.

#[cfg(test)]
mod scripted_source_tests {
    use crate::collector::{
        async_trait, CollectionLoopBuilder, HealthSource, PollOutcome, SnapshotStore,
    };
    use crate::error::CollectionError;
    use crate::models::{CollectorKind, GitHubRunnerStatus, Snapshot};
    use chrono::Utc;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::{broadcast, mpsc};

    enum Step {
        Ok(usize),
        Fail,
        Hang,
    }

    /// Runner source that replays a script, then repeats the last step
    struct ScriptedSource {
        steps: Mutex<VecDeque<Step>>,
    }

    impl ScriptedSource {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: Mutex::new(steps.into()),
            }
        }

        fn next_step(&self) -> Step {
            let mut steps = self.steps.lock().unwrap();
            if steps.len() > 1 {
                steps.pop_front().unwrap()
            } else {
                match steps.front() {
                    Some(Step::Ok(n)) => Step::Ok(*n),
                    Some(Step::Fail) => Step::Fail,
                    _ => Step::Hang,
                }
            }
        }
    }

    fn runners(count: usize) -> Vec<GitHubRunnerStatus> {
        (0..count)
            .map(|i| GitHubRunnerStatus {
                id: i as u64 + 1,
                name: format!("runner-{}", i + 1),
                status: "online".to_string(),
                is_online: true,
                is_busy: false,
                labels: vec!["self-hosted".to_string()],
                timestamp: Utc::now(),
            })
            .collect()
    }

    #[async_trait]
    impl HealthSource for ScriptedSource {
        fn kind(&self) -> CollectorKind {
            CollectorKind::Runners
        }

        async fn poll(&self, _timeout: Duration) -> Result<Snapshot, CollectionError> {
            match self.next_step() {
                Step::Ok(n) => Ok(Snapshot::Runners(runners(n))),
                Step::Fail => Err(CollectionError::Unreachable("connection refused".to_string())),
                Step::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(Snapshot::Runners(vec![]))
                }
            }
        }
    }

    fn record(store: &SnapshotStore, outcome: PollOutcome) {
        match outcome.result {
            Ok(snapshot) => store.record_success(snapshot, outcome.at),
            Err(e) => store.record_failure(outcome.kind, e.to_string(), outcome.at),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_feeds_store_through_failures() {
        let source = Arc::new(ScriptedSource::new(vec![
            Step::Ok(2),
            Step::Fail,
            Step::Hang,
            Step::Ok(3),
        ]));
        let (tx, mut rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let collection_loop = CollectionLoopBuilder::new()
            .source(source)
            .outcomes(tx)
            .interval(Duration::from_secs(300))
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap();
        let handle = tokio::spawn(collection_loop.run(shutdown_rx));

        let store = SnapshotStore::new();
        store.register(CollectorKind::Runners);

        // success
        record(&store, rx.recv().await.unwrap());
        let state = store.state(CollectorKind::Runners).unwrap();
        assert!(state.has_succeeded());
        assert!(!state.is_stale());

        // failure keeps the snapshot
        record(&store, rx.recv().await.unwrap());
        let state = store.state(CollectorKind::Runners).unwrap();
        assert!(state.is_stale());
        match state.latest.as_deref() {
            Some(Snapshot::Runners(kept)) => assert_eq!(kept.len(), 2),
            other => panic!("unexpected snapshot: {:?}", other),
        }

        // hang resolves to a timeout
        let outcome = rx.recv().await.unwrap();
        assert_eq!(
            outcome.result,
            Err(CollectionError::Timeout(Duration::from_secs(10)))
        );
        record(&store, outcome);
        assert_eq!(
            store.state(CollectorKind::Runners).unwrap().consecutive_failures,
            2
        );

        // recovery clears staleness
        record(&store, rx.recv().await.unwrap());
        let state = store.state(CollectorKind::Runners).unwrap();
        assert!(!state.is_stale());
        assert_eq!(state.consecutive_failures, 0);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_in_flight_poll() {
        let source = Arc::new(ScriptedSource::new(vec![Step::Hang]));
        let (tx, mut rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let collection_loop = CollectionLoopBuilder::new()
            .source(source)
            .outcomes(tx)
            .interval(Duration::from_secs(60))
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        let handle = tokio::spawn(collection_loop.run(shutdown_rx));

        // Let the first poll start, then signal shutdown mid-flight
        tokio::time::sleep(Duration::from_secs(1)).await;
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();

        // The in-flight poll finished with its timeout before the loop exited
        let outcome = rx.recv().await.unwrap();
        assert!(matches!(outcome.result, Err(CollectionError::Timeout(_))));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_loop_stops_when_pipeline_closes() {
        let source = Arc::new(ScriptedSource::new(vec![Step::Ok(1)]));
        let (tx, rx) = mpsc::channel(1);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let collection_loop = CollectionLoopBuilder::new()
            .source(source)
            .outcomes(tx)
            .build()
            .unwrap();

        drop(rx);
        // Returns after the first send fails
        collection_loop.run(shutdown_rx).await;
    }
}
