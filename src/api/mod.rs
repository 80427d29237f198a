//! HTTP surface of the availability engine.

mod dto;
mod error;
mod handlers;

pub use dto::*;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::engine::Engine;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/bookings", post(handlers::create_booking))
        .route("/api/bookings/check-availability", post(handlers::check_availability))
        .route("/api/bookings/{id}", get(handlers::get_booking))
        .route("/api/bookings/{id}/confirm", post(handlers::confirm_booking))
        .route("/api/bookings/{id}/cancel", post(handlers::cancel_booking))
        .route("/api/bookings/{id}/complete", post(handlers::complete_booking))
        .route("/api/villas/{villa_id}/booked-dates", get(handlers::booked_dates))
        .route("/api/villas/{villa_id}/bookings", get(handlers::villa_bookings))
        .route("/api/villas/{villa_id}/events", get(handlers::villa_events))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { engine })
}
