use std::time::Duration;

use crate::counter::RecordCounter;
use crate::error::HealthError;

/// Default pause between two polls.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Poll `table` every `interval` until it holds exactly `target` rows.
///
/// The first poll happens after one interval. Failed polls are logged and
/// retried; this never returns on its own while the count differs.
pub async fn wait_for_records(
    counter: &dyn RecordCounter,
    table: &str,
    target: i64,
    interval: Duration,
) -> Result<(), HealthError> {
    let mut last = None;
    loop {
        tokio::time::sleep(interval).await;
        match counter.count(table).await {
            Ok(count) => {
                if last != Some(count) {
                    tracing::info!(table, count, target, "Record count changed");
                    last = Some(count);
                }
                if count == target {
                    return Ok(());
                }
            }
            Err(HealthError::InvalidTable(name)) => return Err(HealthError::InvalidTable(name)),
            Err(e) => tracing::warn!(table, error = %e, "Health poll failed"),
        }
    }
}

/// [`wait_for_records`] bounded by an optional deadline.
///
/// On timeout the pending poll is dropped and [`HealthError::Timeout`] is
/// returned. `None` waits indefinitely.
pub async fn check_health(
    counter: &dyn RecordCounter,
    table: &str,
    target: i64,
    interval: Duration,
    timeout: Option<Duration>,
) -> Result<(), HealthError> {
    tracing::info!(table, target, ?timeout, "Waiting for cluster");
    let wait = wait_for_records(counter, table, target, interval);
    match timeout {
        Some(limit) => tokio::time::timeout(limit, wait)
            .await
            .map_err(|_| HealthError::Timeout(limit))?,
        None => wait.await,
    }?;
    tracing::info!(table, target, "Cluster is healthy");
    Ok(())
}
