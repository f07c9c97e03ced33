use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use skyfare_core::repository::{BookingRepository, RepoResult};
use skyfare_core::{Booking, BookingStatus, PaymentState};

pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct BookingRow {
    id: Uuid,
    reference: String,
    user_id: String,
    flight_id: Uuid,
    selected_seats: Vec<String>,
    total_amount: i64,
    currency: String,
    contact_email: String,
    status: String,
    payment_status: String,
    lock_expires_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn parse_status(raw: &str) -> BookingStatus {
    match raw {
        "CONFIRMED" => BookingStatus::Confirmed,
        "CANCELLED" => BookingStatus::Cancelled,
        "EXPIRED" => BookingStatus::Expired,
        "COMPLETED" => BookingStatus::Completed,
        _ => BookingStatus::Locked,
    }
}

fn parse_payment(raw: &str) -> PaymentState {
    match raw {
        "PROCESSING" => PaymentState::Processing,
        "COMPLETED" => PaymentState::Completed,
        "FAILED" => PaymentState::Failed,
        "REFUNDED" => PaymentState::Refunded,
        "PARTIALLY_REFUNDED" => PaymentState::PartiallyRefunded,
        _ => PaymentState::Pending,
    }
}

impl BookingRow {
    fn into_booking(self) -> Booking {
        Booking {
            id: self.id,
            reference: self.reference,
            user_id: self.user_id,
            flight_id: self.flight_id,
            selected_seats: self.selected_seats,
            total_amount: self.total_amount,
            currency: self.currency,
            contact_email: self.contact_email,
            status: parse_status(&self.status),
            payment_status: parse_payment(&self.payment_status),
            lock_expires_at: self.lock_expires_at,
            confirmed_at: self.confirmed_at,
            cancelled_at: self.cancelled_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn insert(&self, booking: &Booking) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bookings (id, reference, user_id, flight_id, selected_seats, total_amount, currency, contact_email, status, payment_status, lock_expires_at, confirmed_at, cancelled_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(booking.id)
        .bind(&booking.reference)
        .bind(&booking.user_id)
        .bind(booking.flight_id)
        .bind(&booking.selected_seats)
        .bind(booking.total_amount)
        .bind(&booking.currency)
        .bind(&booking.contact_email)
        .bind(booking.status.as_str())
        .bind(booking.payment_status.as_str())
        .bind(booking.lock_expires_at)
        .bind(booking.confirmed_at)
        .bind(booking.cancelled_at)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self, id: Uuid) -> RepoResult<Option<Booking>> {
        let row: Option<BookingRow> = sqlx::query_as(
            "SELECT id, reference, user_id, flight_id, selected_seats, total_amount, currency, contact_email, status, payment_status, lock_expires_at, confirmed_at, cancelled_at, created_at, updated_at FROM bookings WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(BookingRow::into_booking))
    }

    async fn update(&self, booking: &Booking) -> RepoResult<()> {
        sqlx::query(
            r#"
            UPDATE bookings
            SET status = $2, payment_status = $3, lock_expires_at = $4, confirmed_at = $5, cancelled_at = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(booking.id)
        .bind(booking.status.as_str())
        .bind(booking.payment_status.as_str())
        .bind(booking.lock_expires_at)
        .bind(booking.confirmed_at)
        .bind(booking.cancelled_at)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
