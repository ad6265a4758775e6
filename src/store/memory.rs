//! In-process reservation store.
//!
//! Mirrors the Redis store's semantics, including TTL expiry, and is driven by
//! tokio's clock so tests can pause and advance time. Each instance is fully
//! independent, which lets concurrent tests run against their own store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{BookingError, Result};
use crate::models::{Cart, CartItem, SeatId, ShowId, UserId};
use crate::store::keys::merge_seats;
use crate::store::ReservationStore;

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    wall_clock: DateTime<Utc>,
}

impl Deadline {
    fn after(ttl: Duration) -> Self {
        let wall_clock = Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero());
        Self { at: Instant::now() + ttl, wall_clock }
    }

    fn lapsed(&self) -> bool {
        self.at <= Instant::now()
    }
}

#[derive(Debug)]
struct CartEntry {
    // show -> seats, in insertion order
    items: Vec<(ShowId, Vec<SeatId>)>,
    deadline: Deadline,
}

#[derive(Debug, Clone, Copy)]
struct LockEntry {
    owner: UserId,
    deadline: Deadline,
}

#[derive(Debug, Default)]
struct Inner {
    carts: HashMap<UserId, CartEntry>,
    locks: HashMap<(ShowId, SeatId), LockEntry>,
}

impl Inner {
    fn purge_expired(&mut self) {
        self.carts.retain(|_, cart| !cart.deadline.lapsed());
        self.locks.retain(|_, lock| !lock.deadline.lapsed());
    }

    fn release(&mut self, user: UserId, show: ShowId, seat: SeatId) {
        if let Some(lock) = self.locks.get(&(show, seat)) {
            if lock.owner == user {
                self.locks.remove(&(show, seat));
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryReservationStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryReservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, Inner>> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| BookingError::storage("memory store", anyhow::anyhow!("mutex poisoned")))?;
        guard.purge_expired();
        Ok(guard)
    }

    /// Number of live locks across all shows.
    pub fn lock_count(&self) -> Result<usize> {
        Ok(self.lock_state()?.locks.len())
    }
}

#[async_trait]
impl ReservationStore for MemoryReservationStore {
    async fn cart(&self, user: UserId) -> Result<Option<Cart>> {
        let state = self.lock_state()?;
        Ok(state.carts.get(&user).map(|entry| {
            let mut items: Vec<CartItem> = entry
                .items
                .iter()
                .map(|(show_id, seats)| CartItem { show_id: *show_id, seats: seats.clone() })
                .collect();
            items.sort_by_key(|item| item.show_id);
            Cart { expiry: entry.deadline.wall_clock, items }
        }))
    }

    async fn add_to_cart(
        &self,
        user: UserId,
        show: ShowId,
        seats: &[SeatId],
        ttl: Duration,
    ) -> Result<()> {
        let mut state = self.lock_state()?;
        let inner = &mut *state;

        if let Some(seat_id) = seats.iter().copied().find(|seat| {
            inner
                .locks
                .get(&(show, *seat))
                .is_some_and(|lock| lock.owner != user)
        }) {
            return Err(BookingError::Conflict { show_id: show, seat_id });
        }

        let cart = inner.carts.entry(user).or_insert_with(|| CartEntry {
            items: Vec::new(),
            deadline: Deadline::after(ttl),
        });
        match cart.items.iter_mut().find(|(show_id, _)| *show_id == show) {
            Some((_, existing)) => *existing = merge_seats(existing, seats),
            None => cart.items.push((show, merge_seats(&[], seats))),
        }
        let deadline = cart.deadline;

        for seat in seats {
            inner
                .locks
                .entry((show, *seat))
                .or_insert(LockEntry { owner: user, deadline });
        }
        Ok(())
    }

    async fn remove_from_cart(&self, user: UserId, show: ShowId) -> Result<Vec<SeatId>> {
        let mut state = self.lock_state()?;
        let inner = &mut *state;

        let Some(cart) = inner.carts.get_mut(&user) else {
            return Ok(Vec::new());
        };
        let Some(index) = cart.items.iter().position(|(show_id, _)| *show_id == show) else {
            return Ok(Vec::new());
        };
        let (_, removed) = cart.items.remove(index);
        if cart.items.is_empty() {
            inner.carts.remove(&user);
        }

        for seat in &removed {
            inner.release(user, show, *seat);
        }
        Ok(removed)
    }

    async fn clear_cart(&self, user: UserId) -> Result<Vec<(ShowId, SeatId)>> {
        let mut state = self.lock_state()?;

        let released: Vec<(ShowId, SeatId)> = match state.carts.remove(&user) {
            Some(cart) => cart
                .items
                .into_iter()
                .flat_map(|(show, seats)| seats.into_iter().map(move |seat| (show, seat)))
                .collect(),
            None => Vec::new(),
        };

        for (show, seat) in &released {
            state.release(user, *show, *seat);
        }
        Ok(released)
    }

    async fn release_items(
        &self,
        user: UserId,
        items: &[CartItem],
    ) -> Result<Vec<(ShowId, SeatId)>> {
        let mut state = self.lock_state()?;
        let inner = &mut *state;
        let mut released = Vec::new();

        for item in items {
            if let Some(cart) = inner.carts.get_mut(&user) {
                let position = cart.items.iter().position(|(show, _)| *show == item.show_id);
                if let Some(index) = position {
                    let (gone, kept): (Vec<SeatId>, Vec<SeatId>) = cart.items[index]
                        .1
                        .iter()
                        .copied()
                        .partition(|seat| item.seats.contains(seat));
                    released.extend(gone.into_iter().map(|seat| (item.show_id, seat)));
                    if kept.is_empty() {
                        cart.items.remove(index);
                    } else {
                        cart.items[index].1 = kept;
                    }
                }
                if cart.items.is_empty() {
                    inner.carts.remove(&user);
                }
            }

            for seat in &item.seats {
                inner.release(user, item.show_id, *seat);
            }
        }
        Ok(released)
    }

    async fn lock_owner(&self, show: ShowId, seat: SeatId) -> Result<Option<UserId>> {
        let state = self.lock_state()?;
        Ok(state.locks.get(&(show, seat)).map(|lock| lock.owner))
    }

    async fn locked_seats(&self, show: ShowId) -> Result<HashMap<SeatId, UserId>> {
        let state = self.lock_state()?;
        Ok(state
            .locks
            .iter()
            .filter(|((show_id, _), _)| *show_id == show)
            .map(|((_, seat), lock)| (*seat, lock.owner))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(900);

    #[tokio::test(start_paused = true)]
    async fn add_merges_seats_and_keeps_first_expiry() {
        let store = MemoryReservationStore::new();

        store.add_to_cart(1, 10, &[100], TTL).await.unwrap();
        let first = store.cart(1).await.unwrap().unwrap();

        tokio::time::advance(Duration::from_secs(60)).await;
        store.add_to_cart(1, 10, &[101, 100], TTL).await.unwrap();
        let second = store.cart(1).await.unwrap().unwrap();

        assert_eq!(second.items, vec![CartItem { show_id: 10, seats: vec![100, 101] }]);
        assert_eq!(first.expiry, second.expiry);
    }

    #[tokio::test(start_paused = true)]
    async fn later_locks_share_the_cart_horizon() {
        let store = MemoryReservationStore::new();

        store.add_to_cart(1, 10, &[100], TTL).await.unwrap();
        tokio::time::advance(Duration::from_secs(600)).await;
        store.add_to_cart(1, 11, &[200], TTL).await.unwrap();

        tokio::time::advance(Duration::from_secs(301)).await;
        assert!(store.cart(1).await.unwrap().is_none());
        assert_eq!(store.lock_owner(11, 200).await.unwrap(), None);
        assert_eq!(store.lock_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn foreign_lock_rejects_whole_batch() {
        let store = MemoryReservationStore::new();
        store.add_to_cart(1, 10, &[100], TTL).await.unwrap();

        let err = store.add_to_cart(2, 10, &[101, 100], TTL).await.unwrap_err();
        assert!(matches!(err, BookingError::Conflict { show_id: 10, seat_id: 100 }));

        assert!(store.cart(2).await.unwrap().is_none());
        assert_eq!(store.lock_owner(10, 101).await.unwrap(), None);
    }

    #[tokio::test]
    async fn release_leaves_other_owners_locks_alone() {
        let store = MemoryReservationStore::new();
        store.add_to_cart(1, 10, &[100], TTL).await.unwrap();
        store.add_to_cart(2, 10, &[101], TTL).await.unwrap();

        let released = store.clear_cart(1).await.unwrap();
        assert_eq!(released, vec![(10, 100)]);
        assert_eq!(store.lock_owner(10, 100).await.unwrap(), None);
        assert_eq!(store.lock_owner(10, 101).await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn release_items_keeps_seats_added_later() {
        let store = MemoryReservationStore::new();
        store.add_to_cart(1, 10, &[100], TTL).await.unwrap();
        let snapshot = store.cart(1).await.unwrap().unwrap();

        store.add_to_cart(1, 10, &[101], TTL).await.unwrap();
        store.add_to_cart(1, 11, &[200], TTL).await.unwrap();

        let released = store.release_items(1, &snapshot.items).await.unwrap();
        assert_eq!(released, vec![(10, 100)]);

        let cart = store.cart(1).await.unwrap().unwrap();
        assert_eq!(
            cart.items,
            vec![
                CartItem { show_id: 10, seats: vec![101] },
                CartItem { show_id: 11, seats: vec![200] },
            ]
        );
        assert_eq!(cart.expiry, snapshot.expiry);
        assert_eq!(store.lock_owner(10, 100).await.unwrap(), None);
        assert_eq!(store.lock_owner(10, 101).await.unwrap(), Some(1));

        // releasing everything that is left drops the cart
        store.release_items(1, &cart.items).await.unwrap();
        assert!(store.cart(1).await.unwrap().is_none());
        assert_eq!(store.lock_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn locked_seats_are_scoped_to_the_show() {
        let store = MemoryReservationStore::new();
        store.add_to_cart(1, 10, &[100, 101], TTL).await.unwrap();
        store.add_to_cart(2, 11, &[100], TTL).await.unwrap();

        let locked = store.locked_seats(10).await.unwrap();
        assert_eq!(locked.len(), 2);
        assert_eq!(locked.get(&100), Some(&1));
        assert_eq!(locked.get(&101), Some(&1));
    }
}
