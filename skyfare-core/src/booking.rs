use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Locked,
    Confirmed,
    Cancelled,
    Expired,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Locked => "LOCKED",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Expired => "EXPIRED",
            BookingStatus::Completed => "COMPLETED",
        }
    }

    /// CANCELLED and EXPIRED admit no further transition. CONFIRMED may still
    /// reach COMPLETED post-flight.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Cancelled | BookingStatus::Expired | BookingStatus::Completed
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentState {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
    PartiallyRefunded,
}

impl PaymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentState::Pending => "PENDING",
            PaymentState::Processing => "PROCESSING",
            PaymentState::Completed => "COMPLETED",
            PaymentState::Failed => "FAILED",
            PaymentState::Refunded => "REFUNDED",
            PaymentState::PartiallyRefunded => "PARTIALLY_REFUNDED",
        }
    }
}

/// The aggregate the customer perceives. Seats are immutable after creation;
/// once CONFIRMED they must match the CONFIRMED seat-lock rows referencing
/// this booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    /// Human-facing reference, e.g. SF-4F21A9.
    pub reference: String,
    pub user_id: String,
    pub flight_id: Uuid,
    pub selected_seats: Vec<String>,
    pub total_amount: i64,
    pub currency: String,
    pub contact_email: String,
    pub status: BookingStatus,
    pub payment_status: PaymentState,
    /// Only meaningful while status is LOCKED.
    pub lock_expires_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(
        user_id: String,
        flight_id: Uuid,
        selected_seats: Vec<String>,
        total_amount: i64,
        currency: String,
        contact_email: String,
        hold_duration: Duration,
    ) -> Self {
        let now = Utc::now();
        let id = Uuid::new_v4();
        Self {
            id,
            reference: Self::reference_from(id),
            user_id,
            flight_id,
            selected_seats,
            total_amount,
            currency,
            contact_email,
            status: BookingStatus::Locked,
            payment_status: PaymentState::Pending,
            lock_expires_at: now + hold_duration,
            confirmed_at: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn reference_from(id: Uuid) -> String {
        let simple = id.simple().to_string();
        format!("SF-{}", simple[..6].to_uppercase())
    }

    pub fn seat_count(&self) -> u32 {
        self.selected_seats.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_is_human_facing() {
        let booking = Booking::new(
            "user-1".to_string(),
            Uuid::new_v4(),
            vec!["12A".to_string()],
            100,
            "VND".to_string(),
            "user@example.com".to_string(),
            Duration::minutes(15),
        );
        assert!(booking.reference.starts_with("SF-"));
        assert_eq!(booking.reference.len(), 9);
        assert_eq!(booking.status, BookingStatus::Locked);
        assert_eq!(booking.payment_status, PaymentState::Pending);
    }
}
