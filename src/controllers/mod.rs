pub mod cart;
pub mod extract;
pub mod orders;
pub mod seats;

use axum::Router;
use std::sync::Arc;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(seats::routes())
        .merge(cart::routes())
        .merge(orders::routes())
}
