use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use skyfare_booking::SeatLockManager;
use skyfare_payment::SagaOrchestrator;

/// Periodic reconciliation loop: expired durable holds lose their advisory
/// entries and sagas past their deadline are compensated. Safe to run on
/// every instance concurrently; both sweeps are idempotent.
pub async fn start_sweeper(
    interval: Duration,
    locks: Arc<SeatLockManager>,
    sagas: Arc<SagaOrchestrator>,
) {
    info!("Sweeper started (interval {:?})", interval);
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;

        match locks.cleanup_expired_locks().await {
            Ok(0) => {}
            Ok(n) => info!("Sweeper expired {} seat lock(s)", n),
            Err(e) => error!("Seat lock sweep failed: {}", e),
        }

        match sagas.reap_stalled_sagas().await {
            Ok(0) => {}
            Ok(n) => info!("Sweeper compensated {} stalled saga(s)", n),
            Err(e) => error!("Saga sweep failed: {}", e),
        }
    }
}
