use axum::Router;
use tower_http::trace::TraceLayer;

pub mod bookings;
pub mod error;
pub mod holds;
pub mod identity;
pub mod payments;
pub mod state;
pub mod sweeper;
pub mod worker;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(holds::routes())
        .merge(bookings::routes())
        .merge(payments::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
