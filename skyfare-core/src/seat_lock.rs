use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatLockStatus {
    Active,
    Expired,
    Released,
    Confirmed,
}

impl SeatLockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatLockStatus::Active => "ACTIVE",
            SeatLockStatus::Expired => "EXPIRED",
            SeatLockStatus::Released => "RELEASED",
            SeatLockStatus::Confirmed => "CONFIRMED",
        }
    }
}

/// One durable row per hold attempt on (flight_id, seat_number).
///
/// At most one row per seat may be ACTIVE at any instant; the advisory store
/// enforces that on the hot path and the sweep reconciles stragglers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatLock {
    pub id: Uuid,
    pub flight_id: Uuid,
    pub seat_number: String,
    pub holder_user_id: String,
    pub session_id: String,
    pub locked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: SeatLockStatus,
    /// Set only once the lock is CONFIRMED.
    pub booking_id: Option<Uuid>,
}

impl SeatLock {
    pub fn new(
        flight_id: Uuid,
        seat_number: String,
        holder_user_id: String,
        session_id: String,
        hold_duration: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            flight_id,
            seat_number,
            holder_user_id,
            session_id,
            locked_at: now,
            expires_at: now + hold_duration,
            status: SeatLockStatus::Active,
            booking_id: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == SeatLockStatus::Active && self.expires_at <= now
    }
}
