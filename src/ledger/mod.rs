//! Durable catalog and ticket storage.
//!
//! A (show, seat) pair appears in at most one ticket. Implementations enforce
//! this themselves (a unique constraint in Postgres) instead of trusting the
//! soft locks, and report a rejected insert as `BookingError::RaceLoss`.

use async_trait::async_trait;
use std::collections::HashSet;

use crate::error::Result;
use crate::models::{
    CartItem, Order, OrderId, Page, PageRequest, Seat, SeatId, Show, ShowId, TheaterId, TicketId,
    UserId,
};

pub mod memory;
pub mod postgres;

pub use self::memory::MemoryTicketLedger;
pub use self::postgres::PgTicketLedger;

#[async_trait]
pub trait TicketLedger: Send + Sync {
    async fn show(&self, show: ShowId) -> Result<Option<Show>>;

    async fn theater_has_seat(&self, theater: TheaterId, seat: SeatId) -> Result<bool>;

    async fn show_belongs_to_theater(&self, show: ShowId, theater: TheaterId) -> Result<bool>;

    async fn count_tickets_for(&self, show: ShowId, seat: SeatId) -> Result<i64>;

    async fn seats_of_theater(&self, theater: TheaterId) -> Result<Vec<Seat>>;

    /// Seats of `show` that already have a ticket.
    async fn ticketed_seats(&self, show: ShowId) -> Result<HashSet<SeatId>>;

    /// Creates one order and a ticket per seat in a single transaction.
    /// Nothing is persisted unless every insert succeeds.
    async fn create_order_with_tickets(&self, user: UserId, items: &[CartItem]) -> Result<Order>;

    /// `false` when no ticket matched.
    async fn delete_ticket(&self, ticket: TicketId) -> Result<bool>;

    async fn order(&self, order: OrderId) -> Result<Option<Order>>;

    async fn orders_page(&self, page: PageRequest) -> Result<Page<Order>>;

    async fn orders_page_for_user(&self, user: UserId, page: PageRequest) -> Result<Page<Order>>;
}
