pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod ledger;
pub mod middleware;
pub mod models;
pub mod redis_client;
pub mod services;
pub mod store;

use std::sync::Arc;
use tracing::info;

use crate::ledger::PgTicketLedger;
use crate::services::BookingService;
use crate::store::RedisReservationStore;

// Shared state for every request handler
#[derive(Clone)]
pub struct AppState {
    pub db: database::Database,
    pub config: config::Config,
    pub booking: BookingService,
}

impl AppState {
    pub async fn new(config: config::Config) -> anyhow::Result<Arc<Self>> {
        let db = database::Database::new(&config.database).await?;
        info!("Database connected");

        db.run_migrations().await?;

        let redis = redis_client::RedisClient::new(&config.redis).await?;
        info!("Redis connected");

        let booking = BookingService::new(
            Arc::new(PgTicketLedger::new(db.clone())),
            Arc::new(RedisReservationStore::new(redis)),
            config.reservations.cart_ttl(),
        );

        Ok(Arc::new(Self { db, config, booking }))
    }
}
