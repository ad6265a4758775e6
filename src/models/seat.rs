use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A physical seat. Belongs to a theater and is reused by every show held there.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Seat {
    pub id: i64,
    pub theater_id: i64,
    pub display_num: String,
    pub display_x: i32,
    pub display_y: i32,
    pub flag_deluxe: bool,
    pub flag_wheelchair: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeatAvailability {
    #[serde(flatten)]
    pub seat: Seat,
    pub is_free: bool,
}
