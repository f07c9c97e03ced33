use std::sync::Arc;

use skyfare_booking::{BookingManager, SeatLockManager};
use skyfare_payment::SagaOrchestrator;

#[derive(Clone)]
pub struct AppState {
    pub locks: Arc<SeatLockManager>,
    pub bookings: Arc<BookingManager>,
    pub sagas: Arc<SagaOrchestrator>,
}
