use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::identity;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/flights/{flight_id}/seat-locks", post(lock_seats))
        .route("/v1/flights/{flight_id}/seat-locks", delete(release_locks))
        .route(
            "/v1/flights/{flight_id}/seats/{seat_number}/lock",
            get(seat_lock_status),
        )
        .route(
            "/v1/flights/{flight_id}/seats/{seat_number}/extend",
            post(extend_lock),
        )
        .route("/v1/sessions/{session_id}/seat-locks", delete(release_session))
}

#[derive(Debug, Deserialize)]
struct LockSeatsRequest {
    seats: Vec<String>,
    session_id: String,
}

#[derive(Debug, Serialize)]
struct SeatLockView {
    seat_number: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct LockSeatsResponse {
    flight_id: Uuid,
    locks: Vec<SeatLockView>,
}

async fn lock_seats(
    State(state): State<AppState>,
    Path(flight_id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<LockSeatsRequest>,
) -> Result<Json<LockSeatsResponse>, AppError> {
    let user_id = identity::user_id(&headers)?;
    if req.seats.is_empty() {
        return Err(AppError::BadRequest("No seats requested".to_string()));
    }

    let locks = state
        .locks
        .lock_seats(flight_id, &req.seats, &user_id, &req.session_id)
        .await?;

    Ok(Json(LockSeatsResponse {
        flight_id,
        locks: locks
            .into_iter()
            .map(|l| SeatLockView {
                seat_number: l.seat_number,
                expires_at: l.expires_at,
            })
            .collect(),
    }))
}

#[derive(Debug, Serialize)]
struct ReleaseResponse {
    released: usize,
}

async fn release_locks(
    State(state): State<AppState>,
    Path(flight_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<ReleaseResponse>, AppError> {
    let user_id = identity::user_id(&headers)?;
    let released = state.locks.release_user_locks(flight_id, &user_id).await?;
    Ok(Json(ReleaseResponse { released }))
}

async fn release_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ReleaseResponse>, AppError> {
    let released = state.locks.release_session_locks(&session_id).await?;
    Ok(Json(ReleaseResponse { released }))
}

#[derive(Debug, Serialize)]
struct SeatLockStatusResponse {
    locked: bool,
}

async fn seat_lock_status(
    State(state): State<AppState>,
    Path((flight_id, seat_number)): Path<(Uuid, String)>,
) -> Result<Json<SeatLockStatusResponse>, AppError> {
    let locked = state.locks.is_seat_locked(flight_id, &seat_number).await?;
    Ok(Json(SeatLockStatusResponse { locked }))
}

#[derive(Debug, Deserialize)]
struct ExtendRequest {
    extra_minutes: i64,
}

async fn extend_lock(
    State(state): State<AppState>,
    Path((flight_id, seat_number)): Path<(Uuid, String)>,
    headers: HeaderMap,
    Json(req): Json<ExtendRequest>,
) -> Result<Json<SeatLockView>, AppError> {
    let user_id = identity::user_id(&headers)?;
    if req.extra_minutes <= 0 {
        return Err(AppError::BadRequest(
            "extra_minutes must be positive".to_string(),
        ));
    }
    let row = state
        .locks
        .extend_seat_lock(flight_id, &seat_number, &user_id, req.extra_minutes)
        .await?;
    Ok(Json(SeatLockView {
        seat_number: row.seat_number,
        expires_at: row.expires_at,
    }))
}
