use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use skyfare_core::repository::{LockStore, SeatLockRepository};
use skyfare_core::seat_map::SeatMapProvider;
use skyfare_core::{BookingError, BookingResult, SeatLock};

/// Acquires, releases, extends and confirms per-seat holds.
///
/// The advisory store's check-and-set is the single arbiter of "who holds this
/// seat right now"; the durable row is the audit trail and recovery source of
/// truth. `cleanup_expired_locks` is the seam that re-synchronizes the two.
pub struct SeatLockManager {
    store: Arc<dyn LockStore>,
    repo: Arc<dyn SeatLockRepository>,
    seat_map: Arc<dyn SeatMapProvider>,
    hold_duration: Duration,
}

impl SeatLockManager {
    pub fn new(
        store: Arc<dyn LockStore>,
        repo: Arc<dyn SeatLockRepository>,
        seat_map: Arc<dyn SeatMapProvider>,
        hold_duration: Duration,
    ) -> Self {
        Self {
            store,
            repo,
            seat_map,
            hold_duration,
        }
    }

    pub fn hold_duration(&self) -> Duration {
        self.hold_duration
    }

    fn seat_key(flight_id: Uuid, seat_number: &str) -> String {
        format!("seat:{}:{}", flight_id, seat_number)
    }

    fn hold_ttl(&self) -> std::time::Duration {
        self.hold_duration.to_std().unwrap_or_default()
    }

    /// All-or-nothing hold on every seat in `seat_numbers`. A second call by
    /// the same user on the same flight replaces their previous hold set.
    pub async fn lock_seats(
        &self,
        flight_id: Uuid,
        seat_numbers: &[String],
        user_id: &str,
        session_id: &str,
    ) -> BookingResult<Vec<SeatLock>> {
        // Re-selection path: one active hold set per (user, flight).
        self.release_user_locks(flight_id, user_id).await?;

        let now = Utc::now();
        let mut acquired: Vec<String> = Vec::new();

        for seat in seat_numbers {
            if let Err(err) = self.try_acquire(flight_id, seat, user_id, session_id, now).await {
                // Roll back anything we grabbed so far; no seat stays locked.
                self.unwind_partial(&acquired, &[]).await;
                return Err(err);
            }
            acquired.push(Self::seat_key(flight_id, seat));
        }

        // Advisory entries are in place; persist the durable rows.
        let mut locks: Vec<SeatLock> = Vec::with_capacity(seat_numbers.len());
        for seat in seat_numbers {
            let lock = SeatLock::new(
                flight_id,
                seat.clone(),
                user_id.to_string(),
                session_id.to_string(),
                self.hold_duration,
            );
            if let Err(e) = self.repo.insert(&lock).await {
                self.unwind_partial(&acquired, &locks).await;
                return Err(BookingError::store(e));
            }
            locks.push(lock);
        }

        info!(
            "Locked {} seat(s) on flight {} for user {}",
            locks.len(),
            flight_id,
            user_id
        );
        Ok(locks)
    }

    /// Undo a half-finished acquisition: drop every advisory entry this call
    /// won and release any durable rows it already inserted. Best-effort; the
    /// sweep reconciles whatever a store outage leaves behind.
    async fn unwind_partial(&self, keys: &[String], rows: &[SeatLock]) {
        for key in keys {
            if let Err(e) = self.store.remove(key).await {
                warn!("Failed to roll back advisory entry {}: {}", key, e);
            }
        }
        for row in rows {
            if let Err(e) = self.repo.mark_released(row.id).await {
                warn!("Failed to roll back seat lock row {}: {}", row.id, e);
            }
        }
    }

    async fn try_acquire(
        &self,
        flight_id: Uuid,
        seat: &str,
        user_id: &str,
        session_id: &str,
        now: chrono::DateTime<Utc>,
    ) -> BookingResult<()> {
        let unavailable = || BookingError::SeatUnavailable {
            flight_id,
            seat: seat.to_string(),
        };

        if !self
            .seat_map
            .is_valid_seat(flight_id, seat)
            .await
            .map_err(BookingError::store)?
        {
            return Err(unavailable());
        }
        if self
            .seat_map
            .is_seat_booked(flight_id, seat)
            .await
            .map_err(BookingError::store)?
        {
            return Err(unavailable());
        }

        // Drift guard: a durable ACTIVE row whose advisory entry already timed
        // out still means "held" until it actually expires. A row past its
        // expires_at that the sweep has not reached yet is reconciled here, so
        // a seat never carries two ACTIVE rows.
        if let Some(row) = self
            .repo
            .find_active(flight_id, seat)
            .await
            .map_err(BookingError::store)?
        {
            if row.is_expired(now) {
                let key = Self::seat_key(flight_id, seat);
                if let Err(e) = self.store.remove(&key).await {
                    warn!("Failed to remove advisory entry {}: {}", key, e);
                }
                self.repo
                    .mark_expired(row.id)
                    .await
                    .map_err(BookingError::store)?;
            } else if row.holder_user_id != user_id {
                return Err(unavailable());
            }
        }

        let key = Self::seat_key(flight_id, seat);
        let won = self
            .store
            .put_if_absent(&key, session_id, self.hold_ttl())
            .await
            .map_err(BookingError::store)?;
        if !won {
            return Err(unavailable());
        }
        Ok(())
    }

    /// Fast path for the seat-selection UI: advisory store only, no table scan.
    pub async fn is_seat_locked(&self, flight_id: Uuid, seat_number: &str) -> BookingResult<bool> {
        let key = Self::seat_key(flight_id, seat_number);
        Ok(self
            .store
            .get(&key)
            .await
            .map_err(BookingError::store)?
            .is_some())
    }

    /// Best-effort, idempotent release of every ACTIVE lock this user holds on
    /// the flight.
    pub async fn release_user_locks(&self, flight_id: Uuid, user_id: &str) -> BookingResult<usize> {
        let rows = self
            .repo
            .find_active_by_user(flight_id, user_id)
            .await
            .map_err(BookingError::store)?;
        self.release_rows(rows).await
    }

    /// Same as `release_user_locks` but keyed by session, across flights.
    pub async fn release_session_locks(&self, session_id: &str) -> BookingResult<usize> {
        let rows = self
            .repo
            .find_active_by_session(session_id)
            .await
            .map_err(BookingError::store)?;
        self.release_rows(rows).await
    }

    async fn release_rows(&self, rows: Vec<SeatLock>) -> BookingResult<usize> {
        let count = rows.len();
        for row in rows {
            let key = Self::seat_key(row.flight_id, &row.seat_number);
            if let Err(e) = self.store.remove(&key).await {
                warn!("Failed to remove advisory entry {}: {}", key, e);
            }
            self.repo
                .mark_released(row.id)
                .await
                .map_err(BookingError::store)?;
        }
        Ok(count)
    }

    /// ACTIVE -> CONFIRMED for every named seat, stamping the booking id.
    /// Ownership is verified for all seats before any row is mutated, so a
    /// violation leaves every lock ACTIVE and unchanged.
    pub async fn confirm_seat_locks(
        &self,
        flight_id: Uuid,
        seat_numbers: &[String],
        user_id: &str,
        booking_id: Uuid,
    ) -> BookingResult<()> {
        let mut rows = Vec::with_capacity(seat_numbers.len());
        for seat in seat_numbers {
            let row = self
                .repo
                .find_active(flight_id, seat)
                .await
                .map_err(BookingError::store)?
                .filter(|r| r.holder_user_id == user_id)
                .ok_or_else(|| BookingError::OwnershipViolation {
                    user_id: user_id.to_string(),
                    seat: seat.clone(),
                })?;
            rows.push(row);
        }

        for row in rows {
            self.repo
                .mark_confirmed(row.id, booking_id)
                .await
                .map_err(BookingError::store)?;
            // The hold became a durable assignment; the advisory hint is done.
            let key = Self::seat_key(row.flight_id, &row.seat_number);
            if let Err(e) = self.store.remove(&key).await {
                warn!("Failed to remove advisory entry {}: {}", key, e);
            }
        }
        info!(
            "Confirmed {} seat lock(s) on flight {} for booking {}",
            seat_numbers.len(),
            flight_id,
            booking_id
        );
        Ok(())
    }

    /// CONFIRMED -> RELEASED for the seat assignments of a cancelled booking.
    /// The advisory entries were already dropped when the locks were
    /// confirmed, so only the durable rows move.
    pub async fn release_booking_locks(&self, booking_id: Uuid) -> BookingResult<usize> {
        let rows = self
            .repo
            .find_confirmed_for_booking(booking_id)
            .await
            .map_err(BookingError::store)?;
        let count = rows.len();
        for row in rows {
            self.repo
                .mark_confirmed_released(row.id)
                .await
                .map_err(BookingError::store)?;
        }
        if count > 0 {
            info!(
                "Released {} confirmed seat lock(s) for booking {}",
                count, booking_id
            );
        }
        Ok(count)
    }

    /// Push a hold's expiry forward. Only the current holder may extend.
    pub async fn extend_seat_lock(
        &self,
        flight_id: Uuid,
        seat_number: &str,
        user_id: &str,
        extra_minutes: i64,
    ) -> BookingResult<SeatLock> {
        let mut row = self
            .repo
            .find_active(flight_id, seat_number)
            .await
            .map_err(BookingError::store)?
            .ok_or_else(|| BookingError::NotFound {
                kind: "SeatLock",
                id: format!("{}:{}", flight_id, seat_number),
            })?;

        if row.holder_user_id != user_id {
            return Err(BookingError::OwnershipViolation {
                user_id: user_id.to_string(),
                seat: seat_number.to_string(),
            });
        }

        row.expires_at += Duration::minutes(extra_minutes);
        self.repo
            .update_expiry(row.id, row.expires_at)
            .await
            .map_err(BookingError::store)?;

        let key = Self::seat_key(flight_id, seat_number);
        let remaining = (row.expires_at - Utc::now()).to_std().unwrap_or_default();
        let extended = self
            .store
            .extend(&key, remaining)
            .await
            .map_err(BookingError::store)?;
        if !extended {
            // The advisory entry already timed out; reinstate it so the fast
            // path agrees with the durable row again.
            self.store
                .put(&key, &row.session_id, remaining)
                .await
                .map_err(BookingError::store)?;
        }
        Ok(row)
    }

    /// Periodic, idempotent sweep: ACTIVE rows past expires_at lose their
    /// advisory entry and are marked EXPIRED. Also covers locks whose advisory
    /// entry already timed out silently or whose owning process crashed.
    pub async fn cleanup_expired_locks(&self) -> BookingResult<usize> {
        let rows = self
            .repo
            .find_expired_active(Utc::now())
            .await
            .map_err(BookingError::store)?;
        let count = rows.len();
        for row in rows {
            let key = Self::seat_key(row.flight_id, &row.seat_number);
            if let Err(e) = self.store.remove(&key).await {
                warn!("Failed to remove advisory entry {}: {}", key, e);
            }
            self.repo
                .mark_expired(row.id)
                .await
                .map_err(BookingError::store)?;
        }
        if count > 0 {
            info!("Sweep expired {} seat lock(s)", count);
        }
        Ok(count)
    }

    /// Durable ACTIVE row for a seat, if any. Used by the booking state
    /// machine to check its create precondition.
    pub async fn active_lock(
        &self,
        flight_id: Uuid,
        seat_number: &str,
    ) -> BookingResult<Option<SeatLock>> {
        self.repo
            .find_active(flight_id, seat_number)
            .await
            .map_err(BookingError::store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::DateTime;
    use skyfare_core::memory::{MemoryLockStore, MemorySeatLockRepository, StaticSeatMap};
    use skyfare_core::repository::RepoResult;
    use skyfare_core::SeatLockStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Delegates to the in-memory repository but refuses the second insert,
    /// simulating a mid-batch storage failure (a unique-index conflict or an
    /// outage).
    struct FailSecondInsertRepo {
        inner: Arc<MemorySeatLockRepository>,
        inserts: AtomicUsize,
    }

    #[async_trait]
    impl SeatLockRepository for FailSecondInsertRepo {
        async fn insert(&self, lock: &SeatLock) -> RepoResult<()> {
            if self.inserts.fetch_add(1, Ordering::SeqCst) == 1 {
                return Err("insert refused".into());
            }
            self.inner.insert(lock).await
        }

        async fn find_active(
            &self,
            flight_id: Uuid,
            seat_number: &str,
        ) -> RepoResult<Option<SeatLock>> {
            self.inner.find_active(flight_id, seat_number).await
        }

        async fn find_active_by_user(
            &self,
            flight_id: Uuid,
            user_id: &str,
        ) -> RepoResult<Vec<SeatLock>> {
            self.inner.find_active_by_user(flight_id, user_id).await
        }

        async fn find_active_by_session(&self, session_id: &str) -> RepoResult<Vec<SeatLock>> {
            self.inner.find_active_by_session(session_id).await
        }

        async fn find_expired_active(&self, now: DateTime<Utc>) -> RepoResult<Vec<SeatLock>> {
            self.inner.find_expired_active(now).await
        }

        async fn mark_released(&self, id: Uuid) -> RepoResult<()> {
            self.inner.mark_released(id).await
        }

        async fn mark_expired(&self, id: Uuid) -> RepoResult<()> {
            self.inner.mark_expired(id).await
        }

        async fn mark_confirmed(&self, id: Uuid, booking_id: Uuid) -> RepoResult<()> {
            self.inner.mark_confirmed(id, booking_id).await
        }

        async fn mark_confirmed_released(&self, id: Uuid) -> RepoResult<()> {
            self.inner.mark_confirmed_released(id).await
        }

        async fn update_expiry(&self, id: Uuid, expires_at: DateTime<Utc>) -> RepoResult<()> {
            self.inner.update_expiry(id, expires_at).await
        }

        async fn find_confirmed_for_booking(&self, booking_id: Uuid) -> RepoResult<Vec<SeatLock>> {
            self.inner.find_confirmed_for_booking(booking_id).await
        }
    }

    fn manager_with(hold: Duration) -> (Arc<SeatLockManager>, Arc<MemorySeatLockRepository>) {
        let repo = Arc::new(MemorySeatLockRepository::new());
        let manager = SeatLockManager::new(
            Arc::new(MemoryLockStore::new()),
            repo.clone(),
            Arc::new(StaticSeatMap::new(vec!["12A", "12B", "12C", "14F"])),
            hold,
        );
        (Arc::new(manager), repo)
    }

    fn manager() -> (Arc<SeatLockManager>, Arc<MemorySeatLockRepository>) {
        manager_with(Duration::minutes(15))
    }

    #[tokio::test]
    async fn concurrent_lock_attempts_yield_one_holder() {
        let (manager, repo) = manager();
        let flight = Uuid::new_v4();

        let mut handles = Vec::new();
        for i in 0..8 {
            let m = manager.clone();
            handles.push(tokio::spawn(async move {
                m.lock_seats(
                    flight,
                    &["12A".to_string()],
                    &format!("user-{}", i),
                    &format!("session-{}", i),
                )
                .await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);

        let active: Vec<_> = repo
            .snapshot()
            .into_iter()
            .filter(|l| l.seat_number == "12A" && l.status == SeatLockStatus::Active)
            .collect();
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn lock_seats_is_all_or_nothing() {
        let (manager, repo) = manager();
        let flight = Uuid::new_v4();

        manager
            .lock_seats(flight, &["12B".to_string()], "rival", "session-r")
            .await
            .unwrap();

        let seats = vec!["12A".to_string(), "12B".to_string(), "12C".to_string()];
        let err = manager
            .lock_seats(flight, &seats, "user-1", "session-1")
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::SeatUnavailable { ref seat, .. } if seat == "12B"));

        assert!(!manager.is_seat_locked(flight, "12A").await.unwrap());
        assert!(!manager.is_seat_locked(flight, "12C").await.unwrap());
        assert!(repo
            .snapshot()
            .iter()
            .all(|l| l.holder_user_id != "user-1"));
    }

    #[tokio::test]
    async fn unknown_seat_is_rejected() {
        let (manager, _) = manager();
        let flight = Uuid::new_v4();

        let err = manager
            .lock_seats(flight, &["99Z".to_string()], "user-1", "session-1")
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::SeatUnavailable { .. }));
    }

    #[tokio::test]
    async fn confirm_by_non_owner_leaves_lock_active() {
        let (manager, repo) = manager();
        let flight = Uuid::new_v4();
        let booking_id = Uuid::new_v4();

        manager
            .lock_seats(flight, &["12A".to_string()], "owner", "session-o")
            .await
            .unwrap();

        let err = manager
            .confirm_seat_locks(flight, &["12A".to_string()], "intruder", booking_id)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::OwnershipViolation { .. }));

        let row = repo
            .snapshot()
            .into_iter()
            .find(|l| l.seat_number == "12A")
            .unwrap();
        assert_eq!(row.status, SeatLockStatus::Active);
        assert_eq!(row.holder_user_id, "owner");
        assert_eq!(row.booking_id, None);
    }

    #[tokio::test]
    async fn release_round_trip_frees_the_seats() {
        let (manager, repo) = manager();
        let flight = Uuid::new_v4();
        let seats = vec!["12A".to_string(), "12B".to_string()];

        manager
            .lock_seats(flight, &seats, "user-1", "session-1")
            .await
            .unwrap();
        let released = manager.release_user_locks(flight, "user-1").await.unwrap();
        assert_eq!(released, 2);

        assert!(repo
            .snapshot()
            .iter()
            .all(|l| l.status != SeatLockStatus::Active));

        // Releasing again is a no-op, not an error.
        assert_eq!(manager.release_user_locks(flight, "user-1").await.unwrap(), 0);

        // The seats are lockable again by a different user.
        manager
            .lock_seats(flight, &seats, "user-2", "session-2")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn release_by_session_spans_flights() {
        let (manager, _) = manager();
        let flight_a = Uuid::new_v4();
        let flight_b = Uuid::new_v4();

        manager
            .lock_seats(flight_a, &["12A".to_string()], "user-1", "session-x")
            .await
            .unwrap();
        manager
            .lock_seats(flight_b, &["12B".to_string()], "user-1", "session-x")
            .await
            .unwrap();

        assert_eq!(manager.release_session_locks("session-x").await.unwrap(), 2);
        assert!(!manager.is_seat_locked(flight_a, "12A").await.unwrap());
        assert!(!manager.is_seat_locked(flight_b, "12B").await.unwrap());
    }

    #[tokio::test]
    async fn relock_replaces_previous_hold_set() {
        let (manager, repo) = manager();
        let flight = Uuid::new_v4();

        manager
            .lock_seats(flight, &["12A".to_string()], "user-1", "session-1")
            .await
            .unwrap();
        manager
            .lock_seats(flight, &["12B".to_string()], "user-1", "session-1")
            .await
            .unwrap();

        let active: Vec<_> = repo
            .snapshot()
            .into_iter()
            .filter(|l| l.status == SeatLockStatus::Active)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].seat_number, "12B");
        assert!(!manager.is_seat_locked(flight, "12A").await.unwrap());
    }

    #[tokio::test]
    async fn extend_requires_ownership() {
        let (manager, _) = manager();
        let flight = Uuid::new_v4();

        let locks = manager
            .lock_seats(flight, &["12A".to_string()], "owner", "session-o")
            .await
            .unwrap();
        let before = locks[0].expires_at;

        let err = manager
            .extend_seat_lock(flight, "12A", "intruder", 10)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::OwnershipViolation { .. }));

        let row = manager.extend_seat_lock(flight, "12A", "owner", 10).await.unwrap();
        assert_eq!(row.expires_at, before + Duration::minutes(10));
    }

    #[tokio::test]
    async fn relock_of_expired_hold_reconciles_inline() {
        // Instantly-expiring holds: user-1's row goes stale without any sweep
        // having run.
        let (manager, repo) = manager_with(Duration::zero());
        let flight = Uuid::new_v4();

        manager
            .lock_seats(flight, &["12A".to_string()], "user-1", "session-1")
            .await
            .unwrap();
        manager
            .lock_seats(flight, &["12A".to_string()], "user-2", "session-2")
            .await
            .unwrap();

        let rows: Vec<_> = repo
            .snapshot()
            .into_iter()
            .filter(|l| l.seat_number == "12A")
            .collect();
        let active: Vec<_> = rows
            .iter()
            .filter(|l| l.status == SeatLockStatus::Active)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].holder_user_id, "user-2");
        assert!(rows
            .iter()
            .any(|l| l.holder_user_id == "user-1" && l.status == SeatLockStatus::Expired));
    }

    #[tokio::test]
    async fn failed_row_insert_unwinds_the_whole_hold() {
        let inner = Arc::new(MemorySeatLockRepository::new());
        let repo = Arc::new(FailSecondInsertRepo {
            inner: inner.clone(),
            inserts: AtomicUsize::new(0),
        });
        let manager = SeatLockManager::new(
            Arc::new(MemoryLockStore::new()),
            repo,
            Arc::new(StaticSeatMap::new(vec!["12A", "12B"])),
            Duration::minutes(15),
        );
        let flight = Uuid::new_v4();
        let seats = vec!["12A".to_string(), "12B".to_string()];

        let err = manager
            .lock_seats(flight, &seats, "user-1", "session-1")
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Store(_)));

        // Nothing stays held: both advisory entries are gone and the one
        // row that made it in is released.
        assert!(!manager.is_seat_locked(flight, "12A").await.unwrap());
        assert!(!manager.is_seat_locked(flight, "12B").await.unwrap());
        assert!(inner
            .snapshot()
            .iter()
            .all(|l| l.status != SeatLockStatus::Active));

        // The seats are immediately lockable again.
        manager
            .lock_seats(flight, &seats, "user-2", "session-2")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cancel_releases_confirmed_rows_by_booking() {
        let (manager, repo) = manager();
        let flight = Uuid::new_v4();
        let booking_id = Uuid::new_v4();
        let seats = vec!["12A".to_string(), "12B".to_string()];

        manager
            .lock_seats(flight, &seats, "user-1", "session-1")
            .await
            .unwrap();
        manager
            .confirm_seat_locks(flight, &seats, "user-1", booking_id)
            .await
            .unwrap();

        let released = manager.release_booking_locks(booking_id).await.unwrap();
        assert_eq!(released, 2);
        assert!(repo
            .snapshot()
            .iter()
            .all(|l| l.status == SeatLockStatus::Released));

        // No rows left to release on a replay.
        assert_eq!(manager.release_booking_locks(booking_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn sweep_reconciles_expired_holds() {
        // Zero hold duration: the advisory entry times out instantly, leaving
        // a durable ACTIVE row for the sweep to reconcile.
        let (manager, repo) = manager_with(Duration::zero());
        let flight = Uuid::new_v4();

        manager
            .lock_seats(flight, &["12A".to_string()], "user-1", "session-1")
            .await
            .unwrap();

        let swept = manager.cleanup_expired_locks().await.unwrap();
        assert_eq!(swept, 1);

        let row = repo
            .snapshot()
            .into_iter()
            .find(|l| l.seat_number == "12A")
            .unwrap();
        assert_eq!(row.status, SeatLockStatus::Expired);

        // Idempotent: nothing left to sweep.
        assert_eq!(manager.cleanup_expired_locks().await.unwrap(), 0);
    }
}
