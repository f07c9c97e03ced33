use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use skyfare_core::repository::RepoResult;
use skyfare_core::seat_map::SeatMapProvider;

/// Seat-map read model over the flights/flight_seats tables. Seat geometry is
/// seeded at schedule load time, so validity checks are plain lookups.
pub struct PgSeatMapProvider {
    pool: PgPool,
}

impl PgSeatMapProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SeatMapProvider for PgSeatMapProvider {
    async fn is_valid_seat(&self, flight_id: Uuid, seat_number: &str) -> RepoResult<bool> {
        let exists: Option<(Uuid,)> = sqlx::query_as(
            "SELECT flight_id FROM flight_seats WHERE flight_id = $1 AND seat_number = $2",
        )
        .bind(flight_id)
        .bind(seat_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(exists.is_some())
    }

    async fn is_seat_booked(&self, flight_id: Uuid, seat_number: &str) -> RepoResult<bool> {
        let booked: Option<(bool,)> = sqlx::query_as(
            "SELECT is_booked FROM flight_seats WHERE flight_id = $1 AND seat_number = $2",
        )
        .bind(flight_id)
        .bind(seat_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(booked.map(|(b,)| b).unwrap_or(false))
    }

    async fn return_inventory(&self, flight_id: Uuid, count: u32) -> RepoResult<()> {
        sqlx::query("UPDATE flights SET seats_available = seats_available + $2 WHERE id = $1")
            .bind(flight_id)
            .bind(count as i32)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
