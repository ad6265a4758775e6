use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::controllers::extract::{ApiJson, ApiPath};
use crate::error::BookingError;
use crate::middleware::AuthUser;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/my/cart", get(get_cart).post(add_to_cart).delete(clear_cart))
        .route("/my/cart/{show_id}", delete(remove_from_cart))
}

#[derive(Debug, Deserialize, Validate)]
struct AddToCartRequest {
    #[validate(range(min = 1))]
    show_id: i64,
    #[validate(length(min = 1, max = 50))]
    seats: Vec<i64>,
}

// GET /api/my/cart
async fn get_cart(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, BookingError> {
    let cart = state
        .booking
        .get_cart(user.user_id)
        .await?
        .ok_or_else(|| BookingError::not_found("cart"))?;
    Ok((StatusCode::OK, Json(cart)))
}

// POST /api/my/cart
async fn add_to_cart(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(req): ApiJson<AddToCartRequest>,
) -> Result<impl IntoResponse, BookingError> {
    req.validate()
        .map_err(|e| BookingError::Validation(e.to_string()))?;

    state
        .booking
        .add_to_cart(user.user_id, req.show_id, &req.seats)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// DELETE /api/my/cart
async fn clear_cart(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, BookingError> {
    state.booking.clear_cart(user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// DELETE /api/my/cart/{show_id}
async fn remove_from_cart(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiPath(show_id): ApiPath<i64>,
) -> Result<impl IntoResponse, BookingError> {
    state.booking.remove_from_cart(user.user_id, show_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
