use uuid::Uuid;

/// Business-rule and fault taxonomy for the booking/payment core.
///
/// Conflicts and ownership problems are returned synchronously to the caller;
/// saga-internal failures never are (the saga runs decoupled from the request
/// that started it).
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Seat {seat} on flight {flight_id} is already held or booked")]
    SeatUnavailable { flight_id: Uuid, seat: String },

    #[error("Seat {seat} is not held by {user_id}")]
    OwnershipViolation { user_id: String, seat: String },

    #[error("OTP code is expired or invalid")]
    OtpExpiredOrInvalid,

    #[error("Saga step {step} failed: {reason}")]
    SagaStepFailed { step: String, reason: String },

    #[error("Compensation {step} failed: {reason}")]
    CompensationFailed { step: String, reason: String },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Storage error: {0}")]
    Store(String),
}

impl BookingError {
    /// True for conditions the end user can correct (pick another seat, retype
    /// the code), false for system faults.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            BookingError::SeatUnavailable { .. }
                | BookingError::OwnershipViolation { .. }
                | BookingError::OtpExpiredOrInvalid
        )
    }

    pub fn store(err: impl std::fmt::Display) -> Self {
        BookingError::Store(err.to_string())
    }
}

pub type BookingResult<T> = Result<T, BookingError>;
