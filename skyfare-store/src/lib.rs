pub mod app_config;
pub mod booking_repo;
pub mod database;
pub mod events;
pub mod redis_repo;
pub mod saga_repo;
pub mod seat_lock_repo;
pub mod seat_map_repo;

pub use database::DbClient;
pub use events::EventProducer;
pub use redis_repo::RedisClient;
