use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

use crate::booking::Booking;
use crate::saga::PaymentSaga;
use crate::seat_lock::SeatLock;

pub type RepoResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Shared, TTL-capable key-value store used as the advisory mutual-exclusion
/// layer. It is a performance hint, never the source of truth: the durable
/// seat-lock row wins on disagreement.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Atomic check-and-set: store `value` under `key` only if absent.
    /// Returns true when this caller won the key.
    async fn put_if_absent(&self, key: &str, value: &str, ttl: Duration) -> RepoResult<bool>;

    async fn get(&self, key: &str) -> RepoResult<Option<String>>;

    /// Overwrite unconditionally, refreshing the TTL.
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> RepoResult<()>;

    /// Idempotent; removing an absent key is a no-op.
    async fn remove(&self, key: &str) -> RepoResult<()>;

    /// Push the TTL forward. Returns false if the key no longer exists.
    async fn extend(&self, key: &str, ttl: Duration) -> RepoResult<bool>;
}

/// Durable seat-lock rows: the audit trail and recovery source of truth.
#[async_trait]
pub trait SeatLockRepository: Send + Sync {
    async fn insert(&self, lock: &SeatLock) -> RepoResult<()>;

    async fn find_active(&self, flight_id: Uuid, seat_number: &str) -> RepoResult<Option<SeatLock>>;

    async fn find_active_by_user(&self, flight_id: Uuid, user_id: &str) -> RepoResult<Vec<SeatLock>>;

    async fn find_active_by_session(&self, session_id: &str) -> RepoResult<Vec<SeatLock>>;

    /// ACTIVE rows whose expires_at has passed; input to the sweep.
    async fn find_expired_active(&self, now: DateTime<Utc>) -> RepoResult<Vec<SeatLock>>;

    async fn mark_released(&self, id: Uuid) -> RepoResult<()>;

    async fn mark_expired(&self, id: Uuid) -> RepoResult<()>;

    async fn mark_confirmed(&self, id: Uuid, booking_id: Uuid) -> RepoResult<()>;

    /// CONFIRMED -> RELEASED; a cancelled booking hands its seat assignments
    /// back. Guarded separately from `mark_released` so a concurrent release
    /// cannot clobber a row mid-confirmation.
    async fn mark_confirmed_released(&self, id: Uuid) -> RepoResult<()>;

    async fn update_expiry(&self, id: Uuid, expires_at: DateTime<Utc>) -> RepoResult<()>;

    /// CONFIRMED rows referencing a booking (invariant check + audit).
    async fn find_confirmed_for_booking(&self, booking_id: Uuid) -> RepoResult<Vec<SeatLock>>;
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn insert(&self, booking: &Booking) -> RepoResult<()>;

    async fn find(&self, id: Uuid) -> RepoResult<Option<Booking>>;

    async fn update(&self, booking: &Booking) -> RepoResult<()>;
}

#[async_trait]
pub trait SagaRepository: Send + Sync {
    async fn insert(&self, saga: &PaymentSaga) -> RepoResult<()>;

    async fn update(&self, saga: &PaymentSaga) -> RepoResult<()>;

    async fn find(&self, saga_id: Uuid) -> RepoResult<Option<PaymentSaga>>;

    /// Live-tracking lookup used by the payment callback; terminal sagas are
    /// not returned.
    async fn find_by_transaction(&self, transaction_id: &str) -> RepoResult<Option<PaymentSaga>>;

    /// Lookup including terminal sagas; tells a redelivered callback apart
    /// from one for a transaction that never existed.
    async fn find_any_by_transaction(&self, transaction_id: &str)
        -> RepoResult<Option<PaymentSaga>>;

    /// Non-terminal sagas whose deadline has passed.
    async fn find_stalled(&self, now: DateTime<Utc>) -> RepoResult<Vec<PaymentSaga>>;
}

/// Event-bus seam. Kafka in production, a capturing sink in tests.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> RepoResult<()>;
}
