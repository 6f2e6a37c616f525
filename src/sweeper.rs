use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::engine::Engine;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}

/// Background task that periodically completes elapsed confirmed bookings.
/// Fire-and-forget: completion is idempotent and its precondition is purely
/// time-based, so the sweep needs no ordering relative to request traffic.
/// Storage errors are left for the next tick.
pub async fn run_sweeper(engine: Arc<Engine>) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        interval.tick().await;
        let elapsed = engine.collect_elapsed(now_ms());
        for (booking_id, _property_id) in elapsed {
            match engine.complete_booking(booking_id).await {
                Ok(_) => info!("completed elapsed booking {booking_id}"),
                Err(e) => {
                    // May have been completed or cancelled since collection
                    debug!("sweep skip {booking_id}: {e}");
                }
            }
        }
    }
}

/// Background task that rewrites the WAL once enough appends accumulate.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_CHECK_INTERVAL);
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => info!("compacted WAL after {appends} appends"),
            Err(e) => tracing::warn!("WAL compaction failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use crate::notify::NotifyHub;
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("perch_test_sweeper");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn rates() -> RateTable {
        RateTable { hourly: 100, daily: 1000, monthly: 20_000 }
    }

    #[tokio::test]
    async fn sweep_collects_and_completes_elapsed() {
        let path = test_wal_path("sweep_collect.wal");
        let notify = Arc::new(NotifyHub::new());
        let engine = Arc::new(Engine::new(path, notify).unwrap());

        let pid = Ulid::new();
        let owner = Ulid::new();
        engine
            .list_property(pid, owner, rates(), Discounts::default(), None)
            .await
            .unwrap();

        let now = now_ms();
        let bid = Ulid::new();

        // Booking that ended an hour ago
        engine
            .create_booking(bid, pid, Ulid::new(), now - 7_200_000, now - 3_600_000, BookingType::Hourly)
            .await
            .unwrap();
        engine.confirm_booking(bid, owner).await.unwrap();

        let elapsed = engine.collect_elapsed(now);
        assert_eq!(elapsed.len(), 1);
        assert_eq!(elapsed[0], (bid, pid));

        let completed = engine.complete_booking(bid).await.unwrap();
        assert_eq!(completed.status, BookingStatus::Completed);

        // Completed bookings are no longer collected
        assert!(engine.collect_elapsed(now).is_empty());
    }

    #[tokio::test]
    async fn sweep_ignores_pending_and_future() {
        let path = test_wal_path("sweep_ignore.wal");
        let notify = Arc::new(NotifyHub::new());
        let engine = Arc::new(Engine::new(path, notify).unwrap());

        let pid = Ulid::new();
        let owner = Ulid::new();
        engine
            .list_property(pid, owner, rates(), Discounts::default(), None)
            .await
            .unwrap();

        let now = now_ms();

        // Elapsed but still pending — not the sweep's business
        let pending = Ulid::new();
        engine
            .create_booking(pending, pid, Ulid::new(), now - 7_200_000, now - 3_600_000, BookingType::Hourly)
            .await
            .unwrap();

        // Confirmed but still in the future
        let future = Ulid::new();
        engine
            .create_booking(future, pid, Ulid::new(), now + 3_600_000, now + 7_200_000, BookingType::Hourly)
            .await
            .unwrap();
        engine.confirm_booking(future, owner).await.unwrap();

        assert!(engine.collect_elapsed(now).is_empty());
    }
}
