use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Topic names for the durable, partitioned event bus. Producers key by
/// booking_id / transaction_id / refund_id so same-entity events land on the
/// same partition.
pub mod topics {
    pub const BOOKING_CREATED: &str = "booking-created";
    pub const BOOKING_CONFIRMED: &str = "booking-confirmed";
    pub const BOOKING_CANCELLED: &str = "booking-cancelled";
    pub const BOOKING_EXPIRED: &str = "booking-expired";
    pub const PAYMENT_REQUESTED: &str = "payment-requested";
    pub const PAYMENT_INITIATED: &str = "payment-initiated";
    pub const PAYMENT_COMPLETED: &str = "payment-completed";
    pub const PAYMENT_FAILED: &str = "payment-failed";
    pub const OTP_REQUIRED: &str = "otp-required";
    pub const REFUND_INITIATED: &str = "refund-initiated";
    pub const REFUND_COMPLETED: &str = "refund-completed";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingCreatedEvent {
    pub booking_id: Uuid,
    pub reference: String,
    pub flight_id: Uuid,
    pub user_id: String,
    pub seats: Vec<String>,
    pub total_amount: i64,
    pub currency: String,
    pub lock_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfirmedEvent {
    pub booking_id: Uuid,
    pub reference: String,
    pub flight_id: Uuid,
    pub user_id: String,
    pub confirmed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingCancelledEvent {
    pub booking_id: Uuid,
    pub flight_id: Uuid,
    pub user_id: String,
    pub reason: String,
    /// Set when the booking was already paid; the refund itself belongs to the
    /// payment collaborator.
    pub refund_required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingExpiredEvent {
    pub booking_id: Uuid,
    pub flight_id: Uuid,
    pub user_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequestedEvent {
    pub booking_id: Uuid,
    pub transaction_id: String,
    pub user_id: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInitiatedEvent {
    pub transaction_id: String,
    pub booking_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub attempt: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCompletedEvent {
    pub transaction_id: String,
    pub booking_id: Uuid,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentFailedEvent {
    pub transaction_id: String,
    pub booking_id: Uuid,
    pub reason: String,
    pub retryable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpRequiredEvent {
    pub transaction_id: String,
    pub user_id: String,
    /// Delivered to the user by the notification collaborator; never logged.
    pub code: String,
    /// 1-10, derived from the amount bands. Downstream delivery uses it to
    /// order its send queue.
    pub priority: u8,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundInitiatedEvent {
    pub refund_id: String,
    pub transaction_id: String,
    pub booking_id: Uuid,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundCompletedEvent {
    pub refund_id: String,
    pub transaction_id: String,
}
