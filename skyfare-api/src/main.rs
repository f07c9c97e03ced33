use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use skyfare_api::{app, state::AppState, sweeper, worker};
use skyfare_booking::{BookingManager, SeatLockManager};
use skyfare_payment::otp::{OtpConfig, PriorityBand};
use skyfare_payment::{MockGatewayAdapter, OtpGate, SagaOrchestrator};
use skyfare_store::booking_repo::PgBookingRepository;
use skyfare_store::saga_repo::PgSagaRepository;
use skyfare_store::seat_lock_repo::PgSeatLockRepository;
use skyfare_store::seat_map_repo::PgSeatMapProvider;
use skyfare_store::{DbClient, EventProducer, RedisClient};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skyfare_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = skyfare_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Skyfare API on port {}", config.server.port);

    // Postgres
    let db = DbClient::new(&config.database.url)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");
    let pool = db.pool.clone();

    // Redis Connection
    let redis = Arc::new(
        RedisClient::new(&config.redis.url)
            .await
            .expect("Failed to connect to Redis"),
    );

    // Kafka Connection
    let kafka = Arc::new(
        EventProducer::new(&config.kafka.brokers).expect("Failed to create Kafka producer"),
    );

    let rules = config.booking_rules.clone();
    let hold = Duration::minutes(rules.hold_minutes);

    let seat_map = Arc::new(PgSeatMapProvider::new(pool.clone()));
    let locks = Arc::new(SeatLockManager::new(
        redis.clone(),
        Arc::new(PgSeatLockRepository::new(pool.clone())),
        seat_map.clone(),
        hold,
    ));
    let bookings = Arc::new(BookingManager::new(
        Arc::new(PgBookingRepository::new(pool.clone())),
        locks.clone(),
        seat_map,
        kafka.clone(),
        hold,
    ));

    let otp_config = OtpConfig {
        expiry: Duration::minutes(rules.otp_expiry_minutes),
        max_attempts: rules.otp_max_attempts,
        threshold_currency: rules.otp_threshold_currency.clone(),
        threshold_amount: rules.otp_threshold_amount,
        priority_bands: rules
            .otp_priority_bands
            .iter()
            .map(|b| PriorityBand {
                min_amount: b.min_amount,
                priority: b.priority,
            })
            .collect(),
    };
    let otp = Arc::new(OtpGate::new(redis.clone(), kafka.clone(), otp_config));

    let sagas = Arc::new(SagaOrchestrator::new(
        Arc::new(PgSagaRepository::new(pool.clone())),
        bookings.clone(),
        locks.clone(),
        Arc::new(MockGatewayAdapter),
        otp.clone(),
        kafka.clone(),
        rules.saga_max_retries,
        Duration::minutes(rules.saga_deadline_minutes),
    ));

    tokio::spawn(worker::start_payment_worker(
        config.kafka.brokers.clone(),
        config.kafka.consumer_group.clone(),
        bookings.clone(),
    ));
    tokio::spawn(sweeper::start_sweeper(
        std::time::Duration::from_secs(rules.sweep_interval_seconds),
        locks.clone(),
        sagas.clone(),
    ));

    let app_state = AppState {
        locks,
        bookings,
        sagas,
    };
    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
