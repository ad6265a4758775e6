use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{BookingError, Result};
use crate::ledger::TicketLedger;
use crate::models::{Cart, Order, SeatAvailability, SeatId, ShowId, UserId};
use crate::services::{CartManager, OrderFinalizer, SeatResolver};
use crate::store::ReservationStore;

/// The operations the HTTP layer consumes: availability, cart and order
/// submission. Stores are passed in, never global.
#[derive(Clone)]
pub struct BookingService {
    pub resolver: SeatResolver,
    pub cart: CartManager,
    pub orders: OrderFinalizer,
}

impl BookingService {
    pub fn new(
        ledger: Arc<dyn TicketLedger>,
        store: Arc<dyn ReservationStore>,
        cart_ttl: Duration,
    ) -> Self {
        Self {
            resolver: SeatResolver::new(ledger.clone(), store.clone()),
            cart: CartManager::new(store, cart_ttl),
            orders: OrderFinalizer::new(ledger),
        }
    }

    pub async fn is_free(&self, show_id: ShowId, seat: SeatId) -> Result<bool> {
        let show = self.resolver.show(show_id).await?;
        self.resolver.is_free(show.id, show.theater_id, seat).await
    }

    pub async fn seats_for_show(&self, show_id: ShowId) -> Result<Vec<SeatAvailability>> {
        self.resolver.seats_for_show(show_id).await
    }

    pub async fn get_cart(&self, user: UserId) -> Result<Option<Cart>> {
        self.cart.get(user).await
    }

    /// Checks the seats against the ledger, then writes cart and locks in
    /// one batch. The lock write itself rejects seats held by other users,
    /// so check and acquire cannot interleave with another cart.
    pub async fn add_to_cart(&self, user: UserId, show_id: ShowId, seats: &[SeatId]) -> Result<()> {
        let show = self.resolver.show(show_id).await?;
        self.resolver.ensure_claimable(&show, seats).await?;
        self.cart.add_to(user, show.id, seats).await
    }

    pub async fn remove_from_cart(&self, user: UserId, show_id: ShowId) -> Result<()> {
        let released = self.cart.remove_from(user, show_id).await?;
        debug!("user {} dropped show {} from cart ({} seats)", user, show_id, released.len());
        Ok(())
    }

    pub async fn clear_cart(&self, user: UserId) -> Result<()> {
        self.cart.clear(user).await?;
        Ok(())
    }

    /// Submits the cart as an order and then releases the ordered seats.
    /// Seats put in the cart while the order was being written stay there.
    /// The cart is kept when submission fails so the user can adjust the
    /// selection.
    pub async fn submit_order(&self, user: UserId) -> Result<Order> {
        let cart = self.cart.get(user).await?.ok_or(BookingError::EmptyState)?;
        let order = self.orders.add(user, &cart.items).await?;

        // Tickets are already committed; stale locks expire on their own.
        if let Err(e) = self.cart.release(user, &cart.items).await {
            warn!("order {} created but cart of user {} was not released: {}", order.id, user, e);
        }
        Ok(order)
    }
}
