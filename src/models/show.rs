use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Show {
    pub id: i64,
    pub theater_id: i64,
    pub movie_id: i64,
    pub starts_at: DateTime<Utc>,
    /// Free-form tags such as "3D" or "OV".
    pub variant: Vec<String>,
}
