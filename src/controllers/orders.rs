use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{delete, get},
    Json, Router,
};
use std::sync::Arc;

use crate::controllers::extract::{ApiPath, ApiQuery};
use crate::error::BookingError;
use crate::middleware::{AdminUser, AuthUser, StaffUser};
use crate::models::PageRequest;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/my/orders", get(get_my_orders).post(submit_order))
        .route("/my/orders/{order_id}", get(get_my_order))
        .route("/orders", get(get_orders))
        .route("/tickets/{ticket_id}", delete(remove_ticket))
}

// POST /api/my/orders
async fn submit_order(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, BookingError> {
    let order = state.booking.submit_order(user.user_id).await?;
    let location = format!("/api/my/orders/{}", order.id);
    Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(order)))
}

// GET /api/my/orders
async fn get_my_orders(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiQuery(page): ApiQuery<PageRequest>,
) -> Result<impl IntoResponse, BookingError> {
    let orders = state.booking.orders.orders_for_user(user.user_id, page).await?;
    Ok((StatusCode::OK, Json(orders)))
}

// GET /api/my/orders/{order_id}
async fn get_my_order(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiPath(order_id): ApiPath<i64>,
) -> Result<impl IntoResponse, BookingError> {
    let order = state.booking.orders.order_for_user(user.user_id, order_id).await?;
    Ok((StatusCode::OK, Json(order)))
}

// GET /api/orders (admin, manager)
async fn get_orders(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    ApiQuery(page): ApiQuery<PageRequest>,
) -> Result<impl IntoResponse, BookingError> {
    let orders = state.booking.orders.orders(page).await?;
    Ok((StatusCode::OK, Json(orders)))
}

// DELETE /api/tickets/{ticket_id} (admin)
async fn remove_ticket(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ApiPath(ticket_id): ApiPath<i64>,
) -> Result<impl IntoResponse, BookingError> {
    tracing::warn!("admin {} removes ticket {}", admin.email, ticket_id);
    state.booking.orders.remove(ticket_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
