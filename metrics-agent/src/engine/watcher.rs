//! Background task that logs health verdict changes.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Engine, HealthStatus};

/// Spawn a task that re-evaluates health every `interval` and logs each
/// transition of the verdict. Stops when `cancel` fires.
pub fn spawn_health_watcher(
    engine: Arc<Engine>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut previous: Option<HealthStatus> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let report = engine.health().await;
                    if previous != Some(report.status) {
                        log_transition(previous, &report);
                        previous = Some(report.status);
                    }
                }
            }
        }
        debug!("Health watcher stopped");
    })
}

fn log_transition(previous: Option<HealthStatus>, report: &super::HealthReport) {
    let failing: Vec<&str> = report
        .components()
        .filter(|c| !c.healthy)
        .map(|c| c.name.as_str())
        .collect();
    let from = previous.map(|s| s.as_str()).unwrap_or("unknown");

    match report.status {
        HealthStatus::Healthy => info!(from, to = %report.status, "Agent health changed"),
        HealthStatus::Degraded | HealthStatus::Unhealthy => warn!(
            from,
            to = %report.status,
            failing = ?failing,
            "Agent health changed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_watcher_stops_on_cancel() {
        let engine = Arc::new(Engine::default());
        let cancel = CancellationToken::new();
        let handle = spawn_health_watcher(engine, Duration::from_millis(10), cancel.clone());

        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("watcher did not stop")
            .unwrap();
    }
}
