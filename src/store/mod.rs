//! Reservation store: per-user carts and per-(show, seat) soft locks, both
//! expiring on their own through TTLs.
//!
//! Every mutation is a single atomic batch against the backing store, so a
//! crash can never leave a lock without its cart entry or the other way round.
//! Locks carry the id of the user whose cart created them.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::Result;
use crate::models::{Cart, CartItem, SeatId, ShowId, UserId};

pub mod keys;
pub mod memory;
pub mod redis_store;

pub use self::memory::MemoryReservationStore;
pub use self::redis_store::RedisReservationStore;

#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Current cart with its remaining expiry. Never touches the TTL.
    async fn cart(&self, user: UserId) -> Result<Option<Cart>>;

    /// Merges `seats` into the cart entry for `show` and locks each seat for
    /// `user`, all or nothing.
    ///
    /// The cart TTL is only set when the cart has none yet; new locks inherit
    /// the cart's remaining TTL. Fails with `Conflict` naming the first seat
    /// that is already locked by somebody else.
    async fn add_to_cart(
        &self,
        user: UserId,
        show: ShowId,
        seats: &[SeatId],
        ttl: Duration,
    ) -> Result<()>;

    /// Drops the cart entry for `show` together with the user's locks on it.
    /// Returns the released seats (empty when there was no such entry).
    async fn remove_from_cart(&self, user: UserId, show: ShowId) -> Result<Vec<SeatId>>;

    /// Deletes the whole cart and the user's locks. Returns released pairs.
    async fn clear_cart(&self, user: UserId) -> Result<Vec<(ShowId, SeatId)>>;

    /// Takes exactly the seats in `items` out of the cart and drops the
    /// user's locks on them, in one batch. Seats added after `items` was
    /// read stay in the cart and stay locked. Returns the pairs that were
    /// still in the cart.
    async fn release_items(
        &self,
        user: UserId,
        items: &[CartItem],
    ) -> Result<Vec<(ShowId, SeatId)>>;

    async fn lock_owner(&self, show: ShowId, seat: SeatId) -> Result<Option<UserId>>;

    /// All live locks of a show, seat -> owner.
    async fn locked_seats(&self, show: ShowId) -> Result<HashMap<SeatId, UserId>>;
}
