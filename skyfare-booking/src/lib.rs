pub mod lock_manager;
pub mod manager;

pub use lock_manager::SeatLockManager;
pub use manager::BookingManager;
