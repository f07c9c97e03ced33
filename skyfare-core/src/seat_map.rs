use async_trait::async_trait;
use uuid::Uuid;

use crate::repository::RepoResult;

/// The flight/seat-map read model is an external collaborator; the core only
/// needs "is this seat legal and currently free" plus a way to hand seats back
/// to inventory on cancel/expire.
#[async_trait]
pub trait SeatMapProvider: Send + Sync {
    /// Seat exists in the flight's seat geometry.
    async fn is_valid_seat(&self, flight_id: Uuid, seat_number: &str) -> RepoResult<bool>;

    /// Seat already belongs to a confirmed booking.
    async fn is_seat_booked(&self, flight_id: Uuid, seat_number: &str) -> RepoResult<bool>;

    /// Return `count` seats to the flight's sellable inventory.
    async fn return_inventory(&self, flight_id: Uuid, count: u32) -> RepoResult<()>;
}
