use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub show_id: i64,
    pub seats: Vec<i64>,
}

/// Snapshot of a user's cart. `expiry` is fixed by the first write to the cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    pub expiry: DateTime<Utc>,
    pub items: Vec<CartItem>,
}
