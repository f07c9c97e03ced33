use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/payments/callback", post(payment_callback))
        .route("/v1/payments/{transaction_id}/otp", post(verify_otp))
}

/// Provider webhook shape: outcome of an initiated payment attempt.
#[derive(Debug, Deserialize)]
struct PaymentCallbackRequest {
    transaction_id: String,
    success: bool,
    reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct AckResponse {
    acknowledged: bool,
}

async fn payment_callback(
    State(state): State<AppState>,
    Json(req): Json<PaymentCallbackRequest>,
) -> Result<Json<AckResponse>, AppError> {
    state
        .sagas
        .handle_payment_callback(&req.transaction_id, req.success, req.reason.as_deref())
        .await?;
    Ok(Json(AckResponse { acknowledged: true }))
}

#[derive(Debug, Deserialize)]
struct VerifyOtpRequest {
    code: String,
}

#[derive(Debug, Serialize)]
struct VerifyOtpResponse {
    verified: bool,
}

async fn verify_otp(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
    Json(req): Json<VerifyOtpRequest>,
) -> Result<Json<VerifyOtpResponse>, AppError> {
    state.sagas.confirm_step_up(&transaction_id, &req.code).await?;
    Ok(Json(VerifyOtpResponse { verified: true }))
}
