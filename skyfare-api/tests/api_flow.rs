use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Duration;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;
use uuid::Uuid;

use skyfare_api::{app, AppState};
use skyfare_booking::{BookingManager, SeatLockManager};
use skyfare_core::memory::{
    CaptureSink, MemoryBookingRepository, MemoryLockStore, MemorySagaRepository,
    MemorySeatLockRepository, RecordingGateway, StaticSeatMap,
};
use skyfare_payment::{OtpConfig, OtpGate, SagaOrchestrator};

fn test_app() -> axum::Router {
    let store = Arc::new(MemoryLockStore::new());
    let lock_repo = Arc::new(MemorySeatLockRepository::new());
    let seat_map = Arc::new(StaticSeatMap::new(vec!["12A", "12B", "12C", "14F"]));
    let events = Arc::new(CaptureSink::new());
    let hold = Duration::minutes(15);

    let locks = Arc::new(SeatLockManager::new(
        store.clone(),
        lock_repo,
        seat_map.clone(),
        hold,
    ));
    let bookings = Arc::new(BookingManager::new(
        Arc::new(MemoryBookingRepository::new()),
        locks.clone(),
        seat_map,
        events.clone(),
        hold,
    ));
    let otp = Arc::new(OtpGate::new(
        store,
        events.clone(),
        OtpConfig::default(),
    ));
    let sagas = Arc::new(SagaOrchestrator::new(
        Arc::new(MemorySagaRepository::new()),
        bookings.clone(),
        locks.clone(),
        Arc::new(RecordingGateway::new()),
        otp,
        events,
        3,
        Duration::minutes(30),
    ));

    app(AppState {
        locks,
        bookings,
        sagas,
    })
}

async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post(uri: &str, user: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn lock_seats_then_status_reports_locked() {
    let app = test_app();
    let flight = Uuid::new_v4();

    let (status, body) = send(
        &app,
        post(
            &format!("/v1/flights/{}/seat-locks", flight),
            Some("user-1"),
            json!({"seats": ["12A", "12B"], "session_id": "sess-1"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["locks"].as_array().unwrap().len(), 2);

    let (status, body) = send(
        &app,
        Request::builder()
            .uri(format!("/v1/flights/{}/seats/12A/lock", flight))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["locked"], json!(true));
}

#[tokio::test]
async fn second_user_gets_conflict_on_held_seat() {
    let app = test_app();
    let flight = Uuid::new_v4();

    let (status, _) = send(
        &app,
        post(
            &format!("/v1/flights/{}/seat-locks", flight),
            Some("user-1"),
            json!({"seats": ["12A"], "session_id": "sess-1"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        post(
            &format!("/v1/flights/{}/seat-locks", flight),
            Some("user-2"),
            json!({"seats": ["12A"], "session_id": "sess-2"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("12A"));
}

#[tokio::test]
async fn missing_identity_header_is_rejected() {
    let app = test_app();
    let flight = Uuid::new_v4();

    let (status, _) = send(
        &app,
        post(
            &format!("/v1/flights/{}/seat-locks", flight),
            None,
            json!({"seats": ["12A"], "session_id": "sess-1"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn booking_then_callback_confirms_via_api() {
    let app = test_app();
    let flight = Uuid::new_v4();

    let (status, _) = send(
        &app,
        post(
            &format!("/v1/flights/{}/seat-locks", flight),
            Some("user-1"),
            json!({"seats": ["12A"], "session_id": "sess-1"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Below the step-up threshold, so no OTP round-trip is needed.
    let (status, body) = send(
        &app,
        post(
            "/v1/bookings",
            Some("user-1"),
            json!({
                "flight_id": flight,
                "seats": ["12A"],
                "total_amount": 2_000_000,
                "currency": "VND",
                "contact_email": "user-1@example.com"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["reference"].as_str().unwrap().starts_with("SF-"));
    assert_eq!(body["step_up_required"], json!(false));
    let booking_id = body["booking_id"].as_str().unwrap().to_string();
    let transaction_id = body["transaction_id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        post(
            "/v1/payments/callback",
            None,
            json!({"transaction_id": transaction_id, "success": true}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        Request::builder()
            .uri(format!("/v1/bookings/{}", booking_id))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("CONFIRMED"));
    assert_eq!(body["payment_status"], json!("COMPLETED"));
}

#[tokio::test]
async fn cancel_by_another_user_is_forbidden() {
    let app = test_app();
    let flight = Uuid::new_v4();

    send(
        &app,
        post(
            &format!("/v1/flights/{}/seat-locks", flight),
            Some("user-1"),
            json!({"seats": ["12C"], "session_id": "sess-1"}),
        ),
    )
    .await;

    let (_, body) = send(
        &app,
        post(
            "/v1/bookings",
            Some("user-1"),
            json!({
                "flight_id": flight,
                "seats": ["12C"],
                "total_amount": 1_500_000,
                "currency": "VND",
                "contact_email": "user-1@example.com"
            }),
        ),
    )
    .await;
    let booking_id = body["booking_id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        post(
            &format!("/v1/bookings/{}/cancel", booking_id),
            Some("user-2"),
            json!({"reason": "not mine"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
