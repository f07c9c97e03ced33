pub mod booking;
pub mod error;
pub mod memory;
pub mod payment;
pub mod repository;
pub mod saga;
pub mod seat_lock;
pub mod seat_map;

pub use booking::{Booking, BookingStatus, PaymentState};
pub use error::{BookingError, BookingResult};
pub use saga::{PaymentSaga, SagaStatus, SagaStep, StepId, StepStatus};
pub use seat_lock::{SeatLock, SeatLockStatus};
