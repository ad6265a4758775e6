use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{BookingError, Result};
use crate::models::{Cart, CartItem, SeatId, ShowId, UserId};
use crate::store::ReservationStore;

/// Per-user cart of soft reservations. A cart lives for one fixed window
/// that starts with its first write; further writes never extend it.
#[derive(Clone)]
pub struct CartManager {
    store: Arc<dyn ReservationStore>,
    ttl: Duration,
}

impl CartManager {
    pub fn new(store: Arc<dyn ReservationStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub async fn get(&self, user: UserId) -> Result<Option<Cart>> {
        self.store.cart(user).await
    }

    /// Merges `seats` into the cart entry for `show` and soft-locks them.
    /// Fails with `Conflict` if any seat is held by another user; in that
    /// case nothing is written.
    pub async fn add_to(&self, user: UserId, show: ShowId, seats: &[SeatId]) -> Result<()> {
        if seats.is_empty() {
            return Err(BookingError::Validation("at least one seat is required".to_string()));
        }

        self.store.add_to_cart(user, show, seats, self.ttl).await?;
        debug!("user {} added {:?} of show {} to cart", user, seats, show);
        Ok(())
    }

    /// Idempotent: removing a show that is not in the cart succeeds.
    pub async fn remove_from(&self, user: UserId, show: ShowId) -> Result<Vec<SeatId>> {
        self.store.remove_from_cart(user, show).await
    }

    pub async fn clear(&self, user: UserId) -> Result<Vec<(ShowId, SeatId)>> {
        let released = self.store.clear_cart(user).await?;
        if !released.is_empty() {
            info!("cart of user {} cleared, {} seats released", user, released.len());
        }
        Ok(released)
    }

    /// Releases the seats of `items` only, leaving anything added since.
    pub async fn release(
        &self,
        user: UserId,
        items: &[CartItem],
    ) -> Result<Vec<(ShowId, SeatId)>> {
        let released = self.store.release_items(user, items).await?;
        debug!("user {} released {} seats from cart", user, released.len());
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryReservationStore;

    fn manager() -> (MemoryReservationStore, CartManager) {
        let store = MemoryReservationStore::new();
        let cart = CartManager::new(Arc::new(store.clone()), Duration::from_secs(900));
        (store, cart)
    }

    #[tokio::test]
    async fn empty_seat_list_is_rejected() {
        let (_store, cart) = manager();
        let err = cart.add_to(1, 10, &[]).await.unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));
        assert!(cart.get(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_from_twice_is_a_noop_the_second_time() {
        let (store, cart) = manager();
        cart.add_to(1, 10, &[100, 101]).await.unwrap();
        cart.add_to(1, 11, &[200]).await.unwrap();

        assert_eq!(cart.remove_from(1, 10).await.unwrap(), vec![100, 101]);
        let after_first = cart.get(1).await.unwrap().unwrap();

        assert!(cart.remove_from(1, 10).await.unwrap().is_empty());
        let after_second = cart.get(1).await.unwrap().unwrap();

        assert_eq!(after_first.items, after_second.items);
        assert_eq!(after_second.items, vec![CartItem { show_id: 11, seats: vec![200] }]);
        assert_eq!(store.lock_owner(10, 100).await.unwrap(), None);
        assert_eq!(store.lock_owner(11, 200).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn removing_last_show_drops_the_cart() {
        let (_store, cart) = manager();
        cart.add_to(1, 10, &[100]).await.unwrap();
        cart.remove_from(1, 10).await.unwrap();
        assert!(cart.get(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_on_missing_cart_is_a_noop() {
        let (_store, cart) = manager();
        assert!(cart.clear(42).await.unwrap().is_empty());
    }
}
