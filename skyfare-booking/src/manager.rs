use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use skyfare_core::repository::{BookingRepository, EventSink};
use skyfare_core::seat_map::SeatMapProvider;
use skyfare_core::{Booking, BookingError, BookingResult, BookingStatus, PaymentState};
use skyfare_shared::events::{
    topics, BookingCancelledEvent, BookingConfirmedEvent, BookingCreatedEvent, BookingExpiredEvent,
};

use crate::lock_manager::SeatLockManager;

/// Owns the booking entity's lifecycle: LOCKED -> {CONFIRMED, CANCELLED,
/// EXPIRED}. Invoked by the request path and by saga outcomes; only this
/// manager mutates booking rows.
pub struct BookingManager {
    repo: Arc<dyn BookingRepository>,
    locks: Arc<SeatLockManager>,
    seat_map: Arc<dyn SeatMapProvider>,
    events: Arc<dyn EventSink>,
    hold_duration: Duration,
}

impl BookingManager {
    pub fn new(
        repo: Arc<dyn BookingRepository>,
        locks: Arc<SeatLockManager>,
        seat_map: Arc<dyn SeatMapProvider>,
        events: Arc<dyn EventSink>,
        hold_duration: Duration,
    ) -> Self {
        Self {
            repo,
            locks,
            seat_map,
            events,
            hold_duration,
        }
    }

    /// Event publication is best-effort; a bus hiccup must not fail a state
    /// transition that already committed.
    async fn emit<T: Serialize>(&self, topic: &str, key: &str, event: &T) {
        match serde_json::to_string(event) {
            Ok(payload) => {
                if let Err(e) = self.events.publish(topic, key, &payload).await {
                    warn!("Failed to publish {} for {}: {}", topic, key, e);
                }
            }
            Err(e) => warn!("Failed to serialize {} event: {}", topic, e),
        }
    }

    async fn load(&self, booking_id: Uuid) -> BookingResult<Booking> {
        self.repo
            .find(booking_id)
            .await
            .map_err(BookingError::store)?
            .ok_or_else(|| BookingError::NotFound {
                kind: "Booking",
                id: booking_id.to_string(),
            })
    }

    pub async fn get(&self, booking_id: Uuid) -> BookingResult<Booking> {
        self.load(booking_id).await
    }

    /// Create a LOCKED booking over seats the Seat Lock Manager must already
    /// hold for this user in the same call chain.
    pub async fn create(
        &self,
        user_id: &str,
        flight_id: Uuid,
        seats: Vec<String>,
        total_amount: i64,
        currency: &str,
        contact_email: &str,
    ) -> BookingResult<Booking> {
        for seat in &seats {
            let held_by_user = self
                .locks
                .active_lock(flight_id, seat)
                .await?
                .map(|l| l.holder_user_id == user_id)
                .unwrap_or(false);
            if !held_by_user {
                return Err(BookingError::OwnershipViolation {
                    user_id: user_id.to_string(),
                    seat: seat.clone(),
                });
            }
        }

        let booking = Booking::new(
            user_id.to_string(),
            flight_id,
            seats,
            total_amount,
            currency.to_string(),
            contact_email.to_string(),
            self.hold_duration,
        );
        self.repo.insert(&booking).await.map_err(BookingError::store)?;

        self.emit(
            topics::BOOKING_CREATED,
            &booking.id.to_string(),
            &BookingCreatedEvent {
                booking_id: booking.id,
                reference: booking.reference.clone(),
                flight_id: booking.flight_id,
                user_id: booking.user_id.clone(),
                seats: booking.selected_seats.clone(),
                total_amount: booking.total_amount,
                currency: booking.currency.clone(),
                lock_expires_at: booking.lock_expires_at,
            },
        )
        .await;

        info!("Created booking {} ({})", booking.id, booking.reference);
        Ok(booking)
    }

    /// LOCKED -> CONFIRMED, turning the holds into durable seat assignments.
    /// Calling again on a settled booking is a logged no-op; the orchestrator
    /// retries.
    pub async fn confirm(&self, booking_id: Uuid) -> BookingResult<()> {
        let mut booking = self.load(booking_id).await?;

        match booking.status {
            BookingStatus::Locked => {}
            other => {
                info!(
                    "Confirm on booking {} ignored; already {}",
                    booking_id,
                    other.as_str()
                );
                return Ok(());
            }
        }

        self.locks
            .confirm_seat_locks(
                booking.flight_id,
                &booking.selected_seats,
                &booking.user_id,
                booking.id,
            )
            .await?;

        booking.status = BookingStatus::Confirmed;
        booking.confirmed_at = Some(Utc::now());
        booking.updated_at = Utc::now();
        self.repo.update(&booking).await.map_err(BookingError::store)?;

        self.emit(
            topics::BOOKING_CONFIRMED,
            &booking.id.to_string(),
            &BookingConfirmedEvent {
                booking_id: booking.id,
                reference: booking.reference.clone(),
                flight_id: booking.flight_id,
                user_id: booking.user_id.clone(),
                confirmed_at: booking.confirmed_at.unwrap_or_else(Utc::now),
            },
        )
        .await;

        info!("Confirmed booking {}", booking_id);
        Ok(())
    }

    /// Legal from LOCKED or CONFIRMED. A paid booking flags refund_required in
    /// the emitted event; the refund itself is the payment side's job.
    pub async fn cancel(&self, booking_id: Uuid, reason: &str) -> BookingResult<()> {
        let mut booking = self.load(booking_id).await?;

        if !matches!(
            booking.status,
            BookingStatus::Locked | BookingStatus::Confirmed
        ) {
            return Err(BookingError::InvalidTransition {
                from: booking.status.as_str().to_string(),
                to: "CANCELLED".to_string(),
            });
        }

        let refund_required = booking.status == BookingStatus::Confirmed
            && booking.payment_status == PaymentState::Completed;

        self.release_and_restock(&booking).await?;

        booking.status = BookingStatus::Cancelled;
        booking.cancelled_at = Some(Utc::now());
        booking.updated_at = Utc::now();
        self.repo.update(&booking).await.map_err(BookingError::store)?;

        self.emit(
            topics::BOOKING_CANCELLED,
            &booking.id.to_string(),
            &BookingCancelledEvent {
                booking_id: booking.id,
                flight_id: booking.flight_id,
                user_id: booking.user_id.clone(),
                reason: reason.to_string(),
                refund_required,
            },
        )
        .await;

        info!("Cancelled booking {}: {}", booking_id, reason);
        Ok(())
    }

    /// Payment-timeout path, legal only from LOCKED. Expiring an already
    /// EXPIRED booking is a no-op so the sweep can re-run safely.
    pub async fn expire(&self, booking_id: Uuid) -> BookingResult<()> {
        let mut booking = self.load(booking_id).await?;

        match booking.status {
            BookingStatus::Locked => {}
            BookingStatus::Expired => {
                info!("Expire on booking {} ignored; already expired", booking_id);
                return Ok(());
            }
            other => {
                return Err(BookingError::InvalidTransition {
                    from: other.as_str().to_string(),
                    to: "EXPIRED".to_string(),
                });
            }
        }

        self.release_and_restock(&booking).await?;

        booking.status = BookingStatus::Expired;
        booking.updated_at = Utc::now();
        self.repo.update(&booking).await.map_err(BookingError::store)?;

        self.emit(
            topics::BOOKING_EXPIRED,
            &booking.id.to_string(),
            &BookingExpiredEvent {
                booking_id: booking.id,
                flight_id: booking.flight_id,
                user_id: booking.user_id.clone(),
                reason: "Payment timeout".to_string(),
            },
        )
        .await;

        info!("Expired booking {}", booking_id);
        Ok(())
    }

    async fn release_and_restock(&self, booking: &Booking) -> BookingResult<()> {
        if booking.status == BookingStatus::Confirmed {
            // The holds became seat assignments at confirm time; release
            // those rows rather than hunting for ACTIVE ones.
            self.locks.release_booking_locks(booking.id).await?;
        } else {
            self.locks
                .release_user_locks(booking.flight_id, &booking.user_id)
                .await?;
        }
        self.seat_map
            .return_inventory(booking.flight_id, booking.seat_count())
            .await
            .map_err(BookingError::store)?;
        Ok(())
    }

    /// COMPLETED flips the booking to CONFIRMED; FAILED leaves it LOCKED so a
    /// retry or an explicit expire can still happen. Failure alone never
    /// expires a booking.
    pub async fn update_payment_status(
        &self,
        booking_id: Uuid,
        status: PaymentState,
    ) -> BookingResult<()> {
        let mut booking = self.load(booking_id).await?;
        booking.payment_status = status;
        booking.updated_at = Utc::now();
        self.repo.update(&booking).await.map_err(BookingError::store)?;

        match status {
            PaymentState::Completed => self.confirm(booking_id).await?,
            PaymentState::Failed => {
                info!(
                    "Payment failed for booking {}; left LOCKED pending retry or expiry",
                    booking_id
                );
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyfare_core::memory::{
        CaptureSink, MemoryBookingRepository, MemoryLockStore, MemorySeatLockRepository,
        StaticSeatMap,
    };
    use skyfare_core::SeatLockStatus;

    struct Fixture {
        manager: BookingManager,
        lock_repo: Arc<MemorySeatLockRepository>,
        seat_map: Arc<StaticSeatMap>,
        events: Arc<CaptureSink>,
        flight: Uuid,
    }

    fn fixture() -> Fixture {
        let lock_repo = Arc::new(MemorySeatLockRepository::new());
        let seat_map = Arc::new(StaticSeatMap::new(vec!["12A", "12B", "12C"]));
        let events = Arc::new(CaptureSink::new());
        let locks = Arc::new(SeatLockManager::new(
            Arc::new(MemoryLockStore::new()),
            lock_repo.clone(),
            seat_map.clone(),
            Duration::minutes(15),
        ));
        let manager = BookingManager::new(
            Arc::new(MemoryBookingRepository::new()),
            locks,
            seat_map.clone(),
            events.clone(),
            Duration::minutes(15),
        );
        Fixture {
            manager,
            lock_repo,
            seat_map,
            events,
            flight: Uuid::new_v4(),
        }
    }

    impl Fixture {
        async fn locked_booking(&self, seats: &[&str]) -> Booking {
            let seats: Vec<String> = seats.iter().map(|s| s.to_string()).collect();
            self.manager
                .locks
                .lock_seats(self.flight, &seats, "user-1", "session-1")
                .await
                .unwrap();
            self.manager
                .create(
                    "user-1",
                    self.flight,
                    seats,
                    6_000_000,
                    "VND",
                    "user@example.com",
                )
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn create_requires_existing_holds() {
        let fx = fixture();
        let err = fx
            .manager
            .create(
                "user-1",
                fx.flight,
                vec!["12A".to_string()],
                100,
                "VND",
                "user@example.com",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::OwnershipViolation { .. }));
    }

    #[tokio::test]
    async fn confirm_transitions_locks_and_booking() {
        let fx = fixture();
        let booking = fx.locked_booking(&["12A", "12B"]).await;

        fx.manager.confirm(booking.id).await.unwrap();

        let after = fx.manager.get(booking.id).await.unwrap();
        assert_eq!(after.status, BookingStatus::Confirmed);
        assert!(after.confirmed_at.is_some());

        let confirmed: Vec<_> = fx
            .lock_repo
            .snapshot()
            .into_iter()
            .filter(|l| l.status == SeatLockStatus::Confirmed)
            .collect();
        assert_eq!(confirmed.len(), 2);
        assert!(confirmed.iter().all(|l| l.booking_id == Some(booking.id)));
    }

    #[tokio::test]
    async fn confirm_is_idempotent_and_never_restocks() {
        let fx = fixture();
        let booking = fx.locked_booking(&["12A"]).await;

        fx.manager.confirm(booking.id).await.unwrap();
        fx.manager.confirm(booking.id).await.unwrap();

        let after = fx.manager.get(booking.id).await.unwrap();
        assert_eq!(after.status, BookingStatus::Confirmed);
        // Confirm never touches flight inventory.
        assert_eq!(fx.seat_map.returned_count(fx.flight), 0);
        // Exactly one booking-confirmed event despite the double call.
        let confirmed_events = fx
            .events
            .topics()
            .into_iter()
            .filter(|t| t == topics::BOOKING_CONFIRMED)
            .count();
        assert_eq!(confirmed_events, 1);
    }

    #[tokio::test]
    async fn cancel_after_payment_flags_refund() {
        let fx = fixture();
        let booking = fx.locked_booking(&["12A"]).await;

        fx.manager
            .update_payment_status(booking.id, PaymentState::Completed)
            .await
            .unwrap();
        fx.manager.cancel(booking.id, "customer request").await.unwrap();

        let after = fx.manager.get(booking.id).await.unwrap();
        assert_eq!(after.status, BookingStatus::Cancelled);
        assert!(after.cancelled_at.is_some());
        assert_eq!(fx.seat_map.returned_count(fx.flight), 1);

        let (_, _, payload) = fx
            .events
            .published()
            .into_iter()
            .find(|(t, _, _)| t == topics::BOOKING_CANCELLED)
            .unwrap();
        let event: BookingCancelledEvent = serde_json::from_str(&payload).unwrap();
        assert!(event.refund_required);
    }

    #[tokio::test]
    async fn cancel_after_confirm_releases_the_seat_assignments() {
        let fx = fixture();
        let booking = fx.locked_booking(&["12A", "12B"]).await;

        fx.manager.confirm(booking.id).await.unwrap();
        fx.manager.cancel(booking.id, "customer request").await.unwrap();

        // The CONFIRMED rows move to RELEASED; no seat assignment survives
        // for a cancelled booking.
        assert!(fx
            .lock_repo
            .snapshot()
            .iter()
            .all(|l| l.status == SeatLockStatus::Released));
        assert_eq!(fx.seat_map.returned_count(fx.flight), 2);

        let after = fx.manager.get(booking.id).await.unwrap();
        assert_eq!(after.status, BookingStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_from_terminal_state_is_rejected() {
        let fx = fixture();
        let booking = fx.locked_booking(&["12A"]).await;

        fx.manager.expire(booking.id).await.unwrap();
        let err = fx.manager.cancel(booking.id, "too late").await.unwrap_err();
        assert!(matches!(err, BookingError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn expire_releases_locks_and_restocks() {
        let fx = fixture();
        let booking = fx.locked_booking(&["12A", "12B"]).await;

        fx.manager.expire(booking.id).await.unwrap();

        let after = fx.manager.get(booking.id).await.unwrap();
        assert_eq!(after.status, BookingStatus::Expired);
        assert_eq!(fx.seat_map.returned_count(fx.flight), 2);
        assert!(fx
            .lock_repo
            .snapshot()
            .iter()
            .all(|l| l.status != SeatLockStatus::Active));

        // Idempotent; a second sweep pass is harmless.
        fx.manager.expire(booking.id).await.unwrap();
        assert_eq!(fx.seat_map.returned_count(fx.flight), 2);
    }

    #[tokio::test]
    async fn expire_is_illegal_from_confirmed() {
        let fx = fixture();
        let booking = fx.locked_booking(&["12A"]).await;

        fx.manager.confirm(booking.id).await.unwrap();
        let err = fx.manager.expire(booking.id).await.unwrap_err();
        assert!(matches!(err, BookingError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn failed_payment_leaves_booking_locked() {
        let fx = fixture();
        let booking = fx.locked_booking(&["12A"]).await;

        fx.manager
            .update_payment_status(booking.id, PaymentState::Failed)
            .await
            .unwrap();

        let after = fx.manager.get(booking.id).await.unwrap();
        assert_eq!(after.status, BookingStatus::Locked);
        assert_eq!(after.payment_status, PaymentState::Failed);
    }

    #[tokio::test]
    async fn completed_payment_confirms_booking() {
        let fx = fixture();
        let booking = fx.locked_booking(&["12A"]).await;

        fx.manager
            .update_payment_status(booking.id, PaymentState::Completed)
            .await
            .unwrap();

        let after = fx.manager.get(booking.id).await.unwrap();
        assert_eq!(after.status, BookingStatus::Confirmed);
        assert_eq!(after.payment_status, PaymentState::Completed);
    }
}
