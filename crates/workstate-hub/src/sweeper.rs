use std::{sync::Arc, time::Duration};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, info};
use workstate_core::{SessionStore, SweepReport};

/// Runs [`SessionStore::sweep`] every `interval` until `shutdown` flips to true
/// or its sender goes away.
pub fn spawn_sweeper(
    store: Arc<SessionStore>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let tick = std::cmp::max(Duration::from_millis(10), interval);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    sweep_once(&store).await;
                }
            }
        }
        debug!(event = "sweeper_stop");
    })
}

pub async fn sweep_once(store: &SessionStore) -> SweepReport {
    let report = store.sweep().await;
    if report.expired_threads > 0 || report.purged_departed > 0 {
        info!(
            event = "sweep",
            expired_threads = report.expired_threads,
            purged_departed = report.purged_departed
        );
    } else {
        debug!(event = "sweep", expired_threads = 0, purged_departed = 0);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use workstate_core::ReportFields;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sweeper_reaps_abandoned_threads_and_stops_on_shutdown() {
        let store = Arc::new(SessionStore::default());
        let long_ago = Utc::now() - chrono::Duration::minutes(11);
        store
            .upsert_session_at("s1", ReportFields::default(), long_ago)
            .await;
        store
            .upsert_thread_at("s1", "t1", ReportFields::default(), long_ago)
            .await;
        store
            .upsert_thread("s1", "t2", ReportFields::default())
            .await;

        let (tx, rx) = watch::channel(false);
        let handle = spawn_sweeper(store.clone(), Duration::from_millis(20), rx);

        let mut threads = Vec::new();
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let snapshot = store.snapshot().await;
            threads = snapshot.sessions[0]
                .threads
                .iter()
                .map(|thread| thread.thread_id.clone())
                .collect();
            if threads.len() == 1 {
                break;
            }
        }
        assert_eq!(threads, vec!["t2".to_string()]);
        assert_eq!(store.snapshot().await.counts.sessions, 1);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn sweeper_stops_when_sender_is_dropped() {
        let store = Arc::new(SessionStore::default());
        let (tx, rx) = watch::channel(false);
        let handle = spawn_sweeper(store, Duration::from_secs(60), rx);
        drop(tx);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn sweep_once_reports_nothing_on_empty_store() {
        let store = SessionStore::default();
        assert_eq!(sweep_once(&store).await, SweepReport::default());
    }
}
