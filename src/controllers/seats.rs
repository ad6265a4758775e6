use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

use crate::controllers::extract::ApiPath;
use crate::error::BookingError;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/shows/{show_id}/seats", get(get_seats))
        .route("/shows/{show_id}/seats/{seat_id}", get(get_seat_status))
}

// GET /api/shows/{show_id}/seats
async fn get_seats(
    State(state): State<Arc<AppState>>,
    ApiPath(show_id): ApiPath<i64>,
) -> Result<impl IntoResponse, BookingError> {
    let seats = state.booking.seats_for_show(show_id).await?;
    Ok((StatusCode::OK, Json(seats)))
}

// GET /api/shows/{show_id}/seats/{seat_id}
async fn get_seat_status(
    State(state): State<Arc<AppState>>,
    ApiPath((show_id, seat_id)): ApiPath<(i64, i64)>,
) -> Result<impl IntoResponse, BookingError> {
    let free = state.booking.is_free(show_id, seat_id).await?;
    Ok((StatusCode::OK, Json(json!({ "show_id": show_id, "seat_id": seat_id, "free": free }))))
}
