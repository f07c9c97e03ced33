use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use skyfare_core::Booking;

use crate::error::AppError;
use crate::identity;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(create_booking))
        .route("/v1/bookings/{booking_id}", get(get_booking))
        .route("/v1/bookings/{booking_id}/cancel", post(cancel_booking))
}

#[derive(Debug, Deserialize)]
struct CreateBookingRequest {
    flight_id: Uuid,
    seats: Vec<String>,
    total_amount: i64,
    currency: String,
    contact_email: String,
}

#[derive(Debug, Serialize)]
struct CreateBookingResponse {
    booking_id: Uuid,
    reference: String,
    status: String,
    transaction_id: String,
    step_up_required: bool,
    lock_expires_at: DateTime<Utc>,
}

/// Creates the LOCKED booking and starts its payment saga in one call. The
/// response carries the transaction id the payment provider and the OTP
/// endpoint will refer to.
async fn create_booking(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateBookingRequest>,
) -> Result<Json<CreateBookingResponse>, AppError> {
    let user_id = identity::user_id(&headers)?;
    if req.seats.is_empty() {
        return Err(AppError::BadRequest("No seats selected".to_string()));
    }

    let booking = state
        .bookings
        .create(
            &user_id,
            req.flight_id,
            req.seats,
            req.total_amount,
            &req.currency,
            &req.contact_email,
        )
        .await?;

    let saga = state.sagas.start(booking.id).await?;

    Ok(Json(CreateBookingResponse {
        booking_id: booking.id,
        reference: booking.reference,
        status: booking.status.as_str().to_string(),
        transaction_id: saga.transaction_id,
        step_up_required: saga.step_up_required,
        lock_expires_at: booking.lock_expires_at,
    }))
}

#[derive(Debug, Serialize)]
struct BookingView {
    booking_id: Uuid,
    reference: String,
    user_id: String,
    flight_id: Uuid,
    seats: Vec<String>,
    total_amount: i64,
    currency: String,
    status: String,
    payment_status: String,
    lock_expires_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl From<Booking> for BookingView {
    fn from(b: Booking) -> Self {
        Self {
            booking_id: b.id,
            reference: b.reference,
            user_id: b.user_id,
            flight_id: b.flight_id,
            seats: b.selected_seats,
            total_amount: b.total_amount,
            currency: b.currency,
            status: b.status.as_str().to_string(),
            payment_status: b.payment_status.as_str().to_string(),
            lock_expires_at: b.lock_expires_at,
            confirmed_at: b.confirmed_at,
            cancelled_at: b.cancelled_at,
        }
    }
}

async fn get_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingView>, AppError> {
    let booking = state.bookings.get(booking_id).await?;
    Ok(Json(booking.into()))
}

#[derive(Debug, Deserialize)]
struct CancelRequest {
    #[serde(default = "default_cancel_reason")]
    reason: String,
}

fn default_cancel_reason() -> String {
    "cancelled by user".to_string()
}

#[derive(Debug, Serialize)]
struct CancelResponse {
    booking_id: Uuid,
    status: String,
}

async fn cancel_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<CancelRequest>,
) -> Result<Json<CancelResponse>, AppError> {
    let user_id = identity::user_id(&headers)?;
    let booking = state.bookings.get(booking_id).await?;
    if booking.user_id != user_id {
        return Err(AppError::Forbidden(
            "Booking does not belong to you".to_string(),
        ));
    }

    state.bookings.cancel(booking_id, &req.reason).await?;
    let booking = state.bookings.get(booking_id).await?;
    Ok(Json(CancelResponse {
        booking_id,
        status: booking.status.as_str().to_string(),
    }))
}
