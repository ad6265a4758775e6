use async_trait::async_trait;
use sqlx::{Postgres, Transaction};
use std::collections::HashSet;
use tracing::{error, info, warn};

use crate::database::Database;
use crate::error::{BookingError, Result};
use crate::ledger::TicketLedger;
use crate::models::{
    CartItem, Order, OrderId, Page, PageRequest, Seat, SeatId, Show, ShowId, TheaterId, Ticket,
    TicketId, UserId,
};

#[derive(Clone)]
pub struct PgTicketLedger {
    db: Database,
}

impl PgTicketLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    async fn tickets_of_order(&self, order_id: OrderId) -> Result<Vec<Ticket>> {
        let tickets = sqlx::query_as::<_, Ticket>(
            "SELECT id, order_id, show_id, seat_id FROM tickets WHERE order_id = $1 ORDER BY id",
        )
        .bind(order_id)
        .fetch_all(&self.db.pool)
        .await?;
        Ok(tickets)
    }

    /// Inserts the order and its tickets inside `tx`. The caller decides
    /// whether to commit or roll back.
    async fn insert_order(
        tx: &mut Transaction<'static, Postgres>,
        user: UserId,
        items: &[CartItem],
    ) -> Result<Order> {
        let mut order = sqlx::query_as::<_, Order>(
            "INSERT INTO orders (user_id) VALUES ($1)
             RETURNING id, user_id, complete, submitted_at, completed_at",
        )
        .bind(user)
        .fetch_one(&mut **tx)
        .await?;

        for item in items {
            for seat_id in &item.seats {
                // The join rejects seats that are not part of the show's theater.
                let ticket = sqlx::query_as::<_, Ticket>(
                    r#"
                    INSERT INTO tickets (order_id, show_id, seat_id)
                    SELECT $1, sh.id, se.id
                    FROM shows sh
                    JOIN seats se ON se.theater_id = sh.theater_id
                    WHERE sh.id = $2 AND se.id = $3
                    RETURNING id, order_id, show_id, seat_id
                    "#,
                )
                .bind(order.id)
                .bind(item.show_id)
                .bind(seat_id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| classify_ticket_error(e, item.show_id, *seat_id))?
                .ok_or_else(|| {
                    BookingError::not_found(format!("seat {} of show {}", seat_id, item.show_id))
                })?;

                order.tickets.push(ticket);
            }
        }

        Ok(order)
    }

    async fn page_of_orders(
        &self,
        user: Option<UserId>,
        page: PageRequest,
    ) -> Result<Page<Order>> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders WHERE ($1::BIGINT IS NULL OR user_id = $1)",
        )
        .bind(user)
        .fetch_one(&self.db.pool)
        .await?;

        let records = sqlx::query_as::<_, Order>(
            "SELECT id, user_id, complete, submitted_at, completed_at
             FROM orders
             WHERE ($1::BIGINT IS NULL OR user_id = $1)
             ORDER BY submitted_at DESC, id DESC
             OFFSET $2 LIMIT $3",
        )
        .bind(user)
        .bind(page.offset())
        .bind(i64::from(page.size()))
        .fetch_all(&self.db.pool)
        .await?;

        Ok(Page::new(page, total, records))
    }
}

fn classify_ticket_error(err: sqlx::Error, show_id: ShowId, seat_id: SeatId) -> BookingError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return BookingError::RaceLoss { show_id, seat_id };
        }
        if db_err.is_foreign_key_violation() {
            return BookingError::not_found(format!("seat {} of show {}", seat_id, show_id));
        }
    }
    BookingError::storage("insert ticket", err)
}

#[async_trait]
impl TicketLedger for PgTicketLedger {
    async fn show(&self, show: ShowId) -> Result<Option<Show>> {
        let row = sqlx::query_as::<_, Show>(
            "SELECT id, theater_id, movie_id, starts_at, variant FROM shows WHERE id = $1",
        )
        .bind(show)
        .fetch_optional(&self.db.pool)
        .await?;
        Ok(row)
    }

    async fn theater_has_seat(&self, theater: TheaterId, seat: SeatId) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM seats WHERE id = $1 AND theater_id = $2)",
        )
        .bind(seat)
        .bind(theater)
        .fetch_one(&self.db.pool)
        .await?;
        Ok(exists)
    }

    async fn show_belongs_to_theater(&self, show: ShowId, theater: TheaterId) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM shows WHERE id = $1 AND theater_id = $2)",
        )
        .bind(show)
        .bind(theater)
        .fetch_one(&self.db.pool)
        .await?;
        Ok(exists)
    }

    async fn count_tickets_for(&self, show: ShowId, seat: SeatId) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM tickets WHERE show_id = $1 AND seat_id = $2",
        )
        .bind(show)
        .bind(seat)
        .fetch_one(&self.db.pool)
        .await?;
        Ok(count)
    }

    async fn seats_of_theater(&self, theater: TheaterId) -> Result<Vec<Seat>> {
        let seats = sqlx::query_as::<_, Seat>(
            "SELECT id, theater_id, display_num, display_x, display_y, flag_deluxe, flag_wheelchair
             FROM seats
             WHERE theater_id = $1
             ORDER BY display_y, display_x",
        )
        .bind(theater)
        .fetch_all(&self.db.pool)
        .await?;
        Ok(seats)
    }

    async fn ticketed_seats(&self, show: ShowId) -> Result<HashSet<SeatId>> {
        let seats = sqlx::query_scalar::<_, i64>("SELECT seat_id FROM tickets WHERE show_id = $1")
            .bind(show)
            .fetch_all(&self.db.pool)
            .await?;
        Ok(seats.into_iter().collect())
    }

    async fn create_order_with_tickets(&self, user: UserId, items: &[CartItem]) -> Result<Order> {
        let mut tx = self.db.pool.begin().await?;

        match Self::insert_order(&mut tx, user, items).await {
            Ok(order) => {
                if let Err(e) = tx.commit().await {
                    error!("failed to commit order for user {}: {:?}", user, e);
                    return Err(BookingError::storage("commit order", e));
                }
                info!("order {} created for user {} with {} tickets", order.id, user, order.tickets.len());
                Ok(order)
            }
            Err(e) => {
                warn!("order for user {} rolled back: {}", user, e);
                if let Err(rollback_err) = tx.rollback().await {
                    error!("rollback failed for user {}: {:?}", user, rollback_err);
                }
                Err(e)
            }
        }
    }

    async fn delete_ticket(&self, ticket: TicketId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tickets WHERE id = $1")
            .bind(ticket)
            .execute(&self.db.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn order(&self, order: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, Order>(
            "SELECT id, user_id, complete, submitted_at, completed_at FROM orders WHERE id = $1",
        )
        .bind(order)
        .fetch_optional(&self.db.pool)
        .await?;

        match row {
            Some(mut order) => {
                order.tickets = self.tickets_of_order(order.id).await?;
                Ok(Some(order))
            }
            None => Ok(None),
        }
    }

    async fn orders_page(&self, page: PageRequest) -> Result<Page<Order>> {
        self.page_of_orders(None, page).await
    }

    async fn orders_page_for_user(&self, user: UserId, page: PageRequest) -> Result<Page<Order>> {
        self.page_of_orders(Some(user), page).await
    }
}
