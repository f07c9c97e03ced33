//! In-memory implementations of the storage and collaborator seams.
//!
//! Used by unit tests and local wiring. The lock store honours TTLs lazily:
//! an entry past its deadline is treated as absent on the next access.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::booking::Booking;
use crate::payment::{PaymentGateway, PaymentRequest};
use crate::repository::{
    BookingRepository, EventSink, LockStore, RepoResult, SagaRepository, SeatLockRepository,
};
use crate::saga::PaymentSaga;
use crate::seat_lock::{SeatLock, SeatLockStatus};
use crate::seat_map::SeatMapProvider;

#[derive(Default)]
pub struct MemoryLockStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn live<'a>(
        entries: &'a mut HashMap<String, (String, Instant)>,
        key: &str,
    ) -> Option<&'a mut (String, Instant)> {
        if let Some((_, deadline)) = entries.get(key) {
            if *deadline <= Instant::now() {
                entries.remove(key);
                return None;
            }
        }
        entries.get_mut(key)
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn put_if_absent(&self, key: &str, value: &str, ttl: Duration) -> RepoResult<bool> {
        let mut entries = self.entries.lock().unwrap();
        if Self::live(&mut entries, key).is_some() {
            return Ok(false);
        }
        entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(true)
    }

    async fn get(&self, key: &str) -> RepoResult<Option<String>> {
        let mut entries = self.entries.lock().unwrap();
        Ok(Self::live(&mut entries, key).map(|(v, _)| v.clone()))
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> RepoResult<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn remove(&self, key: &str) -> RepoResult<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn extend(&self, key: &str, ttl: Duration) -> RepoResult<bool> {
        let mut entries = self.entries.lock().unwrap();
        match Self::live(&mut entries, key) {
            Some(entry) => {
                entry.1 = Instant::now() + ttl;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct MemorySeatLockRepository {
    rows: Mutex<HashMap<Uuid, SeatLock>>,
}

impl MemorySeatLockRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<SeatLock> {
        self.rows.lock().unwrap().values().cloned().collect()
    }

    fn set_status(&self, id: Uuid, status: SeatLockStatus, booking_id: Option<Uuid>) {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.get_mut(&id) {
            row.status = status;
            if booking_id.is_some() {
                row.booking_id = booking_id;
            }
        }
    }
}

#[async_trait]
impl SeatLockRepository for MemorySeatLockRepository {
    async fn insert(&self, lock: &SeatLock) -> RepoResult<()> {
        self.rows.lock().unwrap().insert(lock.id, lock.clone());
        Ok(())
    }

    async fn find_active(&self, flight_id: Uuid, seat_number: &str) -> RepoResult<Option<SeatLock>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|l| {
                l.flight_id == flight_id
                    && l.seat_number == seat_number
                    && l.status == SeatLockStatus::Active
            })
            .cloned())
    }

    async fn find_active_by_user(&self, flight_id: Uuid, user_id: &str) -> RepoResult<Vec<SeatLock>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|l| {
                l.flight_id == flight_id
                    && l.holder_user_id == user_id
                    && l.status == SeatLockStatus::Active
            })
            .cloned()
            .collect())
    }

    async fn find_active_by_session(&self, session_id: &str) -> RepoResult<Vec<SeatLock>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|l| l.session_id == session_id && l.status == SeatLockStatus::Active)
            .cloned()
            .collect())
    }

    async fn find_expired_active(&self, now: DateTime<Utc>) -> RepoResult<Vec<SeatLock>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|l| l.is_expired(now))
            .cloned()
            .collect())
    }

    async fn mark_released(&self, id: Uuid) -> RepoResult<()> {
        self.set_status(id, SeatLockStatus::Released, None);
        Ok(())
    }

    async fn mark_expired(&self, id: Uuid) -> RepoResult<()> {
        self.set_status(id, SeatLockStatus::Expired, None);
        Ok(())
    }

    async fn mark_confirmed(&self, id: Uuid, booking_id: Uuid) -> RepoResult<()> {
        self.set_status(id, SeatLockStatus::Confirmed, Some(booking_id));
        Ok(())
    }

    async fn mark_confirmed_released(&self, id: Uuid) -> RepoResult<()> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.get_mut(&id) {
            if row.status == SeatLockStatus::Confirmed {
                row.status = SeatLockStatus::Released;
            }
        }
        Ok(())
    }

    async fn update_expiry(&self, id: Uuid, expires_at: DateTime<Utc>) -> RepoResult<()> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.get_mut(&id) {
            row.expires_at = expires_at;
        }
        Ok(())
    }

    async fn find_confirmed_for_booking(&self, booking_id: Uuid) -> RepoResult<Vec<SeatLock>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|l| l.status == SeatLockStatus::Confirmed && l.booking_id == Some(booking_id))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryBookingRepository {
    rows: Mutex<HashMap<Uuid, Booking>>,
}

impl MemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingRepository for MemoryBookingRepository {
    async fn insert(&self, booking: &Booking) -> RepoResult<()> {
        self.rows.lock().unwrap().insert(booking.id, booking.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> RepoResult<Option<Booking>> {
        Ok(self.rows.lock().unwrap().get(&id).cloned())
    }

    async fn update(&self, booking: &Booking) -> RepoResult<()> {
        self.rows.lock().unwrap().insert(booking.id, booking.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySagaRepository {
    rows: Mutex<HashMap<Uuid, PaymentSaga>>,
}

impl MemorySagaRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SagaRepository for MemorySagaRepository {
    async fn insert(&self, saga: &PaymentSaga) -> RepoResult<()> {
        self.rows.lock().unwrap().insert(saga.saga_id, saga.clone());
        Ok(())
    }

    async fn update(&self, saga: &PaymentSaga) -> RepoResult<()> {
        self.rows.lock().unwrap().insert(saga.saga_id, saga.clone());
        Ok(())
    }

    async fn find(&self, saga_id: Uuid) -> RepoResult<Option<PaymentSaga>> {
        Ok(self.rows.lock().unwrap().get(&saga_id).cloned())
    }

    async fn find_by_transaction(&self, transaction_id: &str) -> RepoResult<Option<PaymentSaga>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|s| s.transaction_id == transaction_id && !s.status.is_terminal())
            .cloned())
    }

    async fn find_any_by_transaction(
        &self,
        transaction_id: &str,
    ) -> RepoResult<Option<PaymentSaga>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|s| s.transaction_id == transaction_id)
            .cloned())
    }

    async fn find_stalled(&self, now: DateTime<Utc>) -> RepoResult<Vec<PaymentSaga>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|s| !s.status.is_terminal() && s.deadline <= now)
            .cloned()
            .collect())
    }
}

/// Records every published event in order; tests assert against the log.
#[derive(Default)]
pub struct CaptureSink {
    published: Mutex<Vec<(String, String, String)>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<(String, String, String)> {
        self.published.lock().unwrap().clone()
    }

    pub fn topics(&self) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(t, _, _)| t.clone())
            .collect()
    }
}

#[async_trait]
impl EventSink for CaptureSink {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> RepoResult<()> {
        self.published.lock().unwrap().push((
            topic.to_string(),
            key.to_string(),
            payload.to_string(),
        ));
        Ok(())
    }
}

/// Static seat map: every seat in `seats` is legal, nothing is pre-booked,
/// and returned inventory accumulates in a counter per flight.
pub struct StaticSeatMap {
    seats: Vec<String>,
    booked: Mutex<Vec<(Uuid, String)>>,
    returned: Mutex<HashMap<Uuid, u32>>,
}

impl StaticSeatMap {
    pub fn new(seats: Vec<&str>) -> Self {
        Self {
            seats: seats.into_iter().map(str::to_string).collect(),
            booked: Mutex::new(Vec::new()),
            returned: Mutex::new(HashMap::new()),
        }
    }

    pub fn mark_booked(&self, flight_id: Uuid, seat: &str) {
        self.booked.lock().unwrap().push((flight_id, seat.to_string()));
    }

    pub fn returned_count(&self, flight_id: Uuid) -> u32 {
        *self.returned.lock().unwrap().get(&flight_id).unwrap_or(&0)
    }
}

#[async_trait]
impl SeatMapProvider for StaticSeatMap {
    async fn is_valid_seat(&self, _flight_id: Uuid, seat_number: &str) -> RepoResult<bool> {
        Ok(self.seats.iter().any(|s| s == seat_number))
    }

    async fn is_seat_booked(&self, flight_id: Uuid, seat_number: &str) -> RepoResult<bool> {
        Ok(self
            .booked
            .lock()
            .unwrap()
            .iter()
            .any(|(f, s)| *f == flight_id && s == seat_number))
    }

    async fn return_inventory(&self, flight_id: Uuid, count: u32) -> RepoResult<()> {
        *self.returned.lock().unwrap().entry(flight_id).or_insert(0) += count;
        Ok(())
    }
}

/// Scriptable gateway: initiations are recorded, refunds are recorded, and the
/// test drives outcomes through the saga callback.
#[derive(Default)]
pub struct RecordingGateway {
    initiated: Mutex<Vec<PaymentRequest>>,
    refunded: Mutex<Vec<(String, i64)>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initiated(&self) -> Vec<PaymentRequest> {
        self.initiated.lock().unwrap().clone()
    }

    pub fn refunds(&self) -> Vec<(String, i64)> {
        self.refunded.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for RecordingGateway {
    async fn initiate(&self, request: &PaymentRequest) -> RepoResult<()> {
        self.initiated.lock().unwrap().push(request.clone());
        Ok(())
    }

    async fn refund(&self, transaction_id: &str, amount: i64, _currency: &str) -> RepoResult<String> {
        self.refunded
            .lock()
            .unwrap()
            .push((transaction_id.to_string(), amount));
        Ok(format!("re_{}", Uuid::new_v4().simple()))
    }
}
