use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use skyfare_core::repository::{RepoResult, SeatLockRepository};
use skyfare_core::{SeatLock, SeatLockStatus};

pub struct PgSeatLockRepository {
    pool: PgPool,
}

impl PgSeatLockRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct SeatLockRow {
    id: Uuid,
    flight_id: Uuid,
    seat_number: String,
    holder_user_id: String,
    session_id: String,
    locked_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    status: String,
    booking_id: Option<Uuid>,
}

fn parse_status(raw: &str) -> SeatLockStatus {
    match raw {
        "EXPIRED" => SeatLockStatus::Expired,
        "RELEASED" => SeatLockStatus::Released,
        "CONFIRMED" => SeatLockStatus::Confirmed,
        _ => SeatLockStatus::Active,
    }
}

impl SeatLockRow {
    fn into_lock(self) -> SeatLock {
        SeatLock {
            id: self.id,
            flight_id: self.flight_id,
            seat_number: self.seat_number,
            holder_user_id: self.holder_user_id,
            session_id: self.session_id,
            locked_at: self.locked_at,
            expires_at: self.expires_at,
            status: parse_status(&self.status),
            booking_id: self.booking_id,
        }
    }
}

const SELECT_COLS: &str = "SELECT id, flight_id, seat_number, holder_user_id, session_id, locked_at, expires_at, status, booking_id FROM seat_locks";

#[async_trait]
impl SeatLockRepository for PgSeatLockRepository {
    async fn insert(&self, lock: &SeatLock) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO seat_locks (id, flight_id, seat_number, holder_user_id, session_id, locked_at, expires_at, status, booking_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(lock.id)
        .bind(lock.flight_id)
        .bind(&lock.seat_number)
        .bind(&lock.holder_user_id)
        .bind(&lock.session_id)
        .bind(lock.locked_at)
        .bind(lock.expires_at)
        .bind(lock.status.as_str())
        .bind(lock.booking_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_active(&self, flight_id: Uuid, seat_number: &str) -> RepoResult<Option<SeatLock>> {
        let row: Option<SeatLockRow> = sqlx::query_as(&format!(
            "{} WHERE flight_id = $1 AND seat_number = $2 AND status = 'ACTIVE'",
            SELECT_COLS
        ))
        .bind(flight_id)
        .bind(seat_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(SeatLockRow::into_lock))
    }

    async fn find_active_by_user(&self, flight_id: Uuid, user_id: &str) -> RepoResult<Vec<SeatLock>> {
        let rows: Vec<SeatLockRow> = sqlx::query_as(&format!(
            "{} WHERE flight_id = $1 AND holder_user_id = $2 AND status = 'ACTIVE'",
            SELECT_COLS
        ))
        .bind(flight_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SeatLockRow::into_lock).collect())
    }

    async fn find_active_by_session(&self, session_id: &str) -> RepoResult<Vec<SeatLock>> {
        let rows: Vec<SeatLockRow> = sqlx::query_as(&format!(
            "{} WHERE session_id = $1 AND status = 'ACTIVE'",
            SELECT_COLS
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SeatLockRow::into_lock).collect())
    }

    async fn find_expired_active(&self, now: DateTime<Utc>) -> RepoResult<Vec<SeatLock>> {
        let rows: Vec<SeatLockRow> = sqlx::query_as(&format!(
            "{} WHERE status = 'ACTIVE' AND expires_at <= $1",
            SELECT_COLS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SeatLockRow::into_lock).collect())
    }

    async fn mark_released(&self, id: Uuid) -> RepoResult<()> {
        sqlx::query("UPDATE seat_locks SET status = 'RELEASED' WHERE id = $1 AND status = 'ACTIVE'")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_expired(&self, id: Uuid) -> RepoResult<()> {
        sqlx::query("UPDATE seat_locks SET status = 'EXPIRED' WHERE id = $1 AND status = 'ACTIVE'")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_confirmed(&self, id: Uuid, booking_id: Uuid) -> RepoResult<()> {
        sqlx::query(
            "UPDATE seat_locks SET status = 'CONFIRMED', booking_id = $2 WHERE id = $1 AND status = 'ACTIVE'",
        )
        .bind(id)
        .bind(booking_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_confirmed_released(&self, id: Uuid) -> RepoResult<()> {
        sqlx::query(
            "UPDATE seat_locks SET status = 'RELEASED' WHERE id = $1 AND status = 'CONFIRMED'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_expiry(&self, id: Uuid, expires_at: DateTime<Utc>) -> RepoResult<()> {
        sqlx::query("UPDATE seat_locks SET expires_at = $2 WHERE id = $1")
            .bind(id)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_confirmed_for_booking(&self, booking_id: Uuid) -> RepoResult<Vec<SeatLock>> {
        let rows: Vec<SeatLockRow> = sqlx::query_as(&format!(
            "{} WHERE booking_id = $1 AND status = 'CONFIRMED'",
            SELECT_COLS
        ))
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SeatLockRow::into_lock).collect())
    }
}
