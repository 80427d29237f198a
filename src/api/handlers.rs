use std::convert::Infallible;

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{
        IntoResponse,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
};
use futures::Stream;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::warn;
use ulid::Ulid;

use crate::engine::{EngineError, parse_horizon_months, parse_villa_id};
use crate::model::ConflictReport;
use crate::notify::Notification;
use crate::observability::FEED_SUBSCRIBERS_ACTIVE;

use super::AppState;
use super::dto::*;

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, EngineError> {
    payload
        .map(|Json(v)| v)
        .map_err(|rejection| EngineError::InvalidInput(rejection.body_text()))
}

fn parse_reservation_id(raw: &str) -> Result<Ulid, EngineError> {
    Ulid::from_string(raw.trim()).map_err(|_| EngineError::InvalidInput(format!("invalid booking id: {raw}")))
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn check_availability(
    State(state): State<AppState>,
    payload: Result<Json<CheckAvailabilityRequest>, JsonRejection>,
) -> Result<Json<ConflictReport>, EngineError> {
    let query = body(payload)?.into_query()?;
    let report = state.engine.check_conflict(&query.villa_id, query.stay).await?;
    Ok(Json(report))
}

pub async fn booked_dates(
    State(state): State<AppState>,
    Path(villa_id): Path<String>,
    params: Result<Query<BookedDatesParams>, QueryRejection>,
) -> Result<Json<BookedDatesResponse>, EngineError> {
    let villa_id = parse_villa_id(&villa_id)?;
    let Query(params) = params.map_err(|rejection| EngineError::InvalidInput(rejection.body_text()))?;
    let horizon = params.horizon_months.as_deref().map(parse_horizon_months).transpose()?;
    let booked_dates = state.engine.list_booked_dates(&villa_id, horizon).await?;
    Ok(Json(BookedDatesResponse { booked_dates }))
}

pub async fn villa_bookings(
    State(state): State<AppState>,
    Path(villa_id): Path<String>,
) -> Result<Json<BookingsResponse>, EngineError> {
    let villa_id = parse_villa_id(&villa_id)?;
    let bookings = state.engine.list_reservations(&villa_id).await?;
    Ok(Json(BookingsResponse {
        bookings: bookings.into_iter().map(BookingView::from).collect(),
    }))
}

pub async fn create_booking(
    State(state): State<AppState>,
    payload: Result<Json<CreateBookingRequest>, JsonRejection>,
) -> Result<impl IntoResponse, EngineError> {
    let new = body(payload)?.into_new_reservation()?;
    let reservation = state.engine.create_reservation(new).await?;
    Ok((StatusCode::CREATED, Json(BookingView::from(reservation))))
}

pub async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let reservation = state.engine.get_reservation(parse_reservation_id(&id)?).await?;
    Ok(Json(BookingView::from(reservation)))
}

pub async fn confirm_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let reservation = state.engine.confirm_reservation(parse_reservation_id(&id)?).await?;
    Ok(Json(BookingView::from(reservation)))
}

pub async fn cancel_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let reservation = state.engine.cancel_reservation(parse_reservation_id(&id)?).await?;
    Ok(Json(BookingView::from(reservation)))
}

pub async fn complete_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let reservation = state.engine.complete_reservation(parse_reservation_id(&id)?).await?;
    Ok(Json(BookingView::from(reservation)))
}

/// Decrements the subscriber gauge when the SSE stream is dropped.
struct FeedSubscription {
    rx: broadcast::Receiver<Notification>,
}

impl FeedSubscription {
    fn new(rx: broadcast::Receiver<Notification>) -> Self {
        metrics::gauge!(FEED_SUBSCRIBERS_ACTIVE).increment(1.0);
        Self { rx }
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        metrics::gauge!(FEED_SUBSCRIBERS_ACTIVE).decrement(1.0);
    }
}

/// Server-sent change feed for one villa.
pub async fn villa_events(
    State(state): State<AppState>,
    Path(villa_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, EngineError> {
    let villa_id = parse_villa_id(&villa_id)?;
    let subscription = FeedSubscription::new(state.engine.notify.subscribe(&villa_id));

    let stream = futures::stream::unfold(subscription, |mut sub| async move {
        loop {
            match sub.rx.recv().await {
                Ok(notification) => {
                    let event = SseEvent::default()
                        .event(notification.kind.as_str())
                        .id(notification.reservation_id.to_string())
                        .json_data(&notification)
                        .unwrap_or_else(|e| SseEvent::default().event("error").data(e.to_string()));
                    return Some((Ok(event), sub));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("change feed subscriber lagged, skipped {skipped} notifications");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
