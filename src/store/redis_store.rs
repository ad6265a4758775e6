use async_trait::async_trait;
use chrono::Utc;
use redis::Script;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{BookingError, Result};
use crate::models::{Cart, CartItem, SeatId, ShowId, UserId};
use crate::redis_client::RedisClient;
use crate::store::keys::{
    cart_key, decode_seats, lock_key, seat_from_lock_key, show_lock_prefix, LOCK_PREFIX,
};
use crate::store::ReservationStore;

// KEYS[1] cart, KEYS[2..] locks; ARGV[1] show, ARGV[2] ttl ms, ARGV[3] owner, ARGV[4..] seats.
// Returns the first seat locked by another owner, or nil once everything is written.
const ADD_TO_CART_LUA: &str = r#"
local owner = ARGV[3]
for i = 2, #KEYS do
    local holder = redis.call('GET', KEYS[i])
    if holder and holder ~= owner then
        return ARGV[i + 2]
    end
end

local merged, seen = {}, {}
local existing = redis.call('HGET', KEYS[1], ARGV[1])
if existing then
    for seat in string.gmatch(existing, '[^&]+') do
        if not seen[seat] then
            seen[seat] = true
            merged[#merged + 1] = seat
        end
    end
end
for i = 4, #ARGV do
    if not seen[ARGV[i]] then
        seen[ARGV[i]] = true
        merged[#merged + 1] = ARGV[i]
    end
end

redis.call('HSET', KEYS[1], ARGV[1], table.concat(merged, '&'))
if redis.call('PTTL', KEYS[1]) < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
local remaining = redis.call('PTTL', KEYS[1])
for i = 2, #KEYS do
    redis.call('SET', KEYS[i], owner, 'NX', 'PX', remaining)
end
return false
"#;

// KEYS[1] cart; ARGV[1] show, ARGV[2] owner, ARGV[3] lock prefix of the show.
const REMOVE_FROM_CART_LUA: &str = r#"
local field = redis.call('HGET', KEYS[1], ARGV[1])
if not field then
    return {}
end
redis.call('HDEL', KEYS[1], ARGV[1])
local released = {}
for seat in string.gmatch(field, '[^&]+') do
    local key = ARGV[3] .. seat
    if redis.call('GET', key) == ARGV[2] then
        redis.call('DEL', key)
    end
    released[#released + 1] = seat
end
return released
"#;

// KEYS[1] cart; ARGV[1] owner, ARGV[2] lock prefix. Returns flat show, seat pairs.
const CLEAR_CART_LUA: &str = r#"
local cart = redis.call('HGETALL', KEYS[1])
if #cart == 0 then
    return {}
end
redis.call('DEL', KEYS[1])
local released = {}
for i = 1, #cart, 2 do
    local show = cart[i]
    for seat in string.gmatch(cart[i + 1], '[^&]+') do
        local key = ARGV[2] .. show .. '.' .. seat
        if redis.call('GET', key) == ARGV[1] then
            redis.call('DEL', key)
        end
        released[#released + 1] = show
        released[#released + 1] = seat
    end
end
return released
"#;

// KEYS[1] cart; ARGV[1] owner, ARGV[2] lock prefix, ARGV[3..] show, seat pairs.
// Removes only the listed seats; returns flat show, seat pairs found in the cart.
const RELEASE_ITEMS_LUA: &str = r#"
local released = {}
for i = 3, #ARGV, 2 do
    local show, seat = ARGV[i], ARGV[i + 1]
    local field = redis.call('HGET', KEYS[1], show)
    if field then
        local kept, found = {}, false
        for held in string.gmatch(field, '[^&]+') do
            if held == seat then
                found = true
            else
                kept[#kept + 1] = held
            end
        end
        if found then
            if #kept == 0 then
                redis.call('HDEL', KEYS[1], show)
            else
                redis.call('HSET', KEYS[1], show, table.concat(kept, '&'))
            end
            released[#released + 1] = show
            released[#released + 1] = seat
        end
    end
    local key = ARGV[2] .. show .. '.' .. seat
    if redis.call('GET', key) == ARGV[1] then
        redis.call('DEL', key)
    end
end
return released
"#;

const SCAN_BATCH: usize = 500;

/// Redis-backed store. Each mutation is one Lua script, so Redis applies it
/// without interleaving other clients' commands.
#[derive(Clone)]
pub struct RedisReservationStore {
    redis: RedisClient,
    add_script: Script,
    remove_script: Script,
    clear_script: Script,
    release_script: Script,
}

impl RedisReservationStore {
    pub fn new(redis: RedisClient) -> Self {
        Self {
            redis,
            add_script: Script::new(ADD_TO_CART_LUA),
            remove_script: Script::new(REMOVE_FROM_CART_LUA),
            clear_script: Script::new(CLEAR_CART_LUA),
            release_script: Script::new(RELEASE_ITEMS_LUA),
        }
    }

    async fn scan_lock_keys(&self, show: ShowId) -> Result<Vec<String>> {
        let pattern = format!("{}*", show_lock_prefix(show));
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = self
                .redis
                .with_retry("scan locks", |mut conn| {
                    let pattern = pattern.clone();
                    async move {
                        redis::cmd("SCAN")
                            .arg(cursor)
                            .arg("MATCH")
                            .arg(pattern)
                            .arg("COUNT")
                            .arg(SCAN_BATCH)
                            .query_async(&mut conn)
                            .await
                    }
                })
                .await?;

            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }
}

#[async_trait]
impl ReservationStore for RedisReservationStore {
    async fn cart(&self, user: UserId) -> Result<Option<Cart>> {
        let key = cart_key(user);
        let (fields, pttl): (HashMap<String, String>, i64) = self
            .redis
            .with_retry("get cart", |mut conn| {
                let key = key.clone();
                async move {
                    redis::pipe()
                        .atomic()
                        .hgetall(&key)
                        .pttl(&key)
                        .query_async(&mut conn)
                        .await
                }
            })
            .await?;

        if fields.is_empty() {
            return Ok(None);
        }

        let mut items: Vec<CartItem> = fields
            .into_iter()
            .filter_map(|(show, seats)| {
                let show_id = match show.parse() {
                    Ok(id) => id,
                    Err(_) => {
                        warn!("ignoring malformed cart field {:?} for user {}", show, user);
                        return None;
                    }
                };
                Some(CartItem { show_id, seats: decode_seats(&seats) })
            })
            .collect();
        items.sort_by_key(|item| item.show_id);

        let expiry = Utc::now() + chrono::Duration::milliseconds(pttl.max(0));
        Ok(Some(Cart { expiry, items }))
    }

    async fn add_to_cart(
        &self,
        user: UserId,
        show: ShowId,
        seats: &[SeatId],
        ttl: Duration,
    ) -> Result<()> {
        let mut invocation = self.add_script.prepare_invoke();
        invocation.key(cart_key(user));
        for seat in seats {
            invocation.key(lock_key(show, *seat));
        }
        invocation.arg(show).arg(ttl.as_millis() as u64).arg(user);
        for seat in seats {
            invocation.arg(*seat);
        }

        let invocation = &invocation;
        let conflict: Option<SeatId> = self
            .redis
            .with_retry("add to cart", |mut conn| async move {
                invocation.invoke_async(&mut conn).await
            })
            .await?;

        match conflict {
            Some(seat_id) => {
                debug!("user {} lost seat {} of show {} to another cart", user, seat_id, show);
                Err(BookingError::Conflict { show_id: show, seat_id })
            }
            None => {
                debug!("user {} locked {} seats of show {}", user, seats.len(), show);
                Ok(())
            }
        }
    }

    async fn remove_from_cart(&self, user: UserId, show: ShowId) -> Result<Vec<SeatId>> {
        let mut invocation = self.remove_script.prepare_invoke();
        invocation
            .key(cart_key(user))
            .arg(show)
            .arg(user)
            .arg(show_lock_prefix(show));

        let invocation = &invocation;
        let released: Vec<SeatId> = self
            .redis
            .with_retry("remove from cart", |mut conn| async move {
                invocation.invoke_async(&mut conn).await
            })
            .await?;

        debug!("user {} released {} seats of show {}", user, released.len(), show);
        Ok(released)
    }

    async fn clear_cart(&self, user: UserId) -> Result<Vec<(ShowId, SeatId)>> {
        let mut invocation = self.clear_script.prepare_invoke();
        invocation.key(cart_key(user)).arg(user).arg(LOCK_PREFIX);

        let invocation = &invocation;
        let flat: Vec<i64> = self
            .redis
            .with_retry("clear cart", |mut conn| async move {
                invocation.invoke_async(&mut conn).await
            })
            .await?;

        let released: Vec<(ShowId, SeatId)> =
            flat.chunks_exact(2).map(|pair| (pair[0], pair[1])).collect();
        debug!("user {} cleared cart, {} seats released", user, released.len());
        Ok(released)
    }

    async fn release_items(
        &self,
        user: UserId,
        items: &[CartItem],
    ) -> Result<Vec<(ShowId, SeatId)>> {
        let mut invocation = self.release_script.prepare_invoke();
        invocation.key(cart_key(user)).arg(user).arg(LOCK_PREFIX);
        for item in items {
            for seat in &item.seats {
                invocation.arg(item.show_id).arg(*seat);
            }
        }

        let invocation = &invocation;
        let flat: Vec<i64> = self
            .redis
            .with_retry("release cart items", |mut conn| async move {
                invocation.invoke_async(&mut conn).await
            })
            .await?;

        let released: Vec<(ShowId, SeatId)> =
            flat.chunks_exact(2).map(|pair| (pair[0], pair[1])).collect();
        debug!("user {} released {} ordered seats", user, released.len());
        Ok(released)
    }

    async fn lock_owner(&self, show: ShowId, seat: SeatId) -> Result<Option<UserId>> {
        let key = lock_key(show, seat);
        let owner: Option<UserId> = self
            .redis
            .with_retry("get lock", |mut conn| {
                let key = key.clone();
                async move { redis::cmd("GET").arg(key).query_async(&mut conn).await }
            })
            .await?;
        Ok(owner)
    }

    async fn locked_seats(&self, show: ShowId) -> Result<HashMap<SeatId, UserId>> {
        let keys = self.scan_lock_keys(show).await?;
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let owners: Vec<Option<UserId>> = self
            .redis
            .with_retry("read lock owners", |mut conn| {
                let keys = keys.clone();
                async move { redis::cmd("MGET").arg(keys).query_async(&mut conn).await }
            })
            .await?;

        // A lock can lapse between SCAN and MGET; those come back as nil.
        Ok(keys
            .iter()
            .zip(owners)
            .filter_map(|(key, owner)| Some((seat_from_lock_key(show, key)?, owner?)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedisConfig;
    use std::sync::atomic::{AtomicI64, Ordering};

    // These tests need a running Redis instance:
    //   docker run -d -p 6379:6379 redis:7-alpine
    // and are run with `cargo test -- --ignored`.

    const TTL: Duration = Duration::from_secs(60);

    async fn store() -> RedisReservationStore {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let client = RedisClient::new(&RedisConfig { url, retry_attempts: 1, retry_delay_ms: 10 })
            .await
            .unwrap();
        RedisReservationStore::new(client)
    }

    /// Ids that no earlier run has used, so leftovers never interfere.
    fn fresh_id() -> i64 {
        static NEXT: AtomicI64 = AtomicI64::new(0);
        let micros = Utc::now().timestamp_micros() % 1_000_000_000_000;
        micros * 1_000 + NEXT.fetch_add(1, Ordering::Relaxed) % 1_000
    }

    async fn pttl(store: &RedisReservationStore, key: String) -> i64 {
        let mut conn = store.redis.conn.clone();
        redis::cmd("PTTL").arg(key).query_async(&mut conn).await.unwrap()
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn foreign_lock_rejects_batch_without_partial_writes() {
        let store = store().await;
        let (owner, rival, show) = (fresh_id(), fresh_id(), fresh_id());

        store.add_to_cart(owner, show, &[1], TTL).await.unwrap();
        let err = store.add_to_cart(rival, show, &[2, 1, 3], TTL).await.unwrap_err();

        assert!(matches!(err, BookingError::Conflict { seat_id: 1, .. }));
        assert!(store.cart(rival).await.unwrap().is_none());
        assert_eq!(store.lock_owner(show, 2).await.unwrap(), None);
        assert_eq!(store.lock_owner(show, 3).await.unwrap(), None);
        assert_eq!(store.lock_owner(show, 1).await.unwrap(), Some(owner));

        store.clear_cart(owner).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn merge_keeps_first_expiry_and_shares_it_with_new_locks() {
        let store = store().await;
        let (user, show) = (fresh_id(), fresh_id());

        store.add_to_cart(user, show, &[1, 2], TTL).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        store.add_to_cart(user, show, &[3, 1], TTL).await.unwrap();

        let cart = store.cart(user).await.unwrap().unwrap();
        assert_eq!(cart.items, vec![CartItem { show_id: show, seats: vec![1, 2, 3] }]);

        let cart_ttl = pttl(&store, cart_key(user)).await;
        let late_lock_ttl = pttl(&store, lock_key(show, 3)).await;
        assert!(cart_ttl > 0 && cart_ttl <= TTL.as_millis() as i64 - 200);
        assert!(late_lock_ttl > 0 && late_lock_ttl <= cart_ttl);

        store.clear_cart(user).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn remove_from_cart_twice_is_a_noop() {
        let store = store().await;
        let (user, show, other_show) = (fresh_id(), fresh_id(), fresh_id());

        store.add_to_cart(user, show, &[1, 2], TTL).await.unwrap();
        store.add_to_cart(user, other_show, &[7], TTL).await.unwrap();

        assert_eq!(store.remove_from_cart(user, show).await.unwrap(), vec![1, 2]);
        assert!(store.remove_from_cart(user, show).await.unwrap().is_empty());

        let cart = store.cart(user).await.unwrap().unwrap();
        assert_eq!(cart.items, vec![CartItem { show_id: other_show, seats: vec![7] }]);
        assert_eq!(store.lock_owner(show, 1).await.unwrap(), None);
        assert_eq!(store.lock_owner(other_show, 7).await.unwrap(), Some(user));

        store.clear_cart(user).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn clear_cart_releases_both_shows_and_spares_foreign_locks() {
        let store = store().await;
        let (user, rival, show, other_show) = (fresh_id(), fresh_id(), fresh_id(), fresh_id());

        store.add_to_cart(user, show, &[1], TTL).await.unwrap();
        store.add_to_cart(user, other_show, &[1, 2], TTL).await.unwrap();
        store.add_to_cart(rival, show, &[5], TTL).await.unwrap();

        let mut released = store.clear_cart(user).await.unwrap();
        released.sort();
        let mut expected = vec![(show, 1), (other_show, 1), (other_show, 2)];
        expected.sort();
        assert_eq!(released, expected);

        assert!(store.cart(user).await.unwrap().is_none());
        assert!(store.locked_seats(other_show).await.unwrap().is_empty());
        assert_eq!(store.lock_owner(show, 1).await.unwrap(), None);
        assert_eq!(store.lock_owner(show, 5).await.unwrap(), Some(rival));
        assert!(store.clear_cart(user).await.unwrap().is_empty());

        store.clear_cart(rival).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn locked_seats_only_reports_the_requested_show() {
        let store = store().await;
        let (user, rival, show) = (fresh_id(), fresh_id(), fresh_id());
        // a show id that shares a decimal prefix with `show`
        let lookalike: ShowId = show * 10 + 1;

        store.add_to_cart(user, show, &[1, 2], TTL).await.unwrap();
        store.add_to_cart(rival, lookalike, &[3], TTL).await.unwrap();

        let locked = store.locked_seats(show).await.unwrap();
        assert_eq!(locked, HashMap::from([(1, user), (2, user)]));

        store.clear_cart(user).await.unwrap();
        store.clear_cart(rival).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn release_items_leaves_seats_added_later() {
        let store = store().await;
        let (user, show) = (fresh_id(), fresh_id());

        store.add_to_cart(user, show, &[1], TTL).await.unwrap();
        let snapshot = store.cart(user).await.unwrap().unwrap();
        store.add_to_cart(user, show, &[2], TTL).await.unwrap();

        assert_eq!(store.release_items(user, &snapshot.items).await.unwrap(), vec![(show, 1)]);

        let cart = store.cart(user).await.unwrap().unwrap();
        assert_eq!(cart.items, vec![CartItem { show_id: show, seats: vec![2] }]);
        assert_eq!(store.lock_owner(show, 1).await.unwrap(), None);
        assert_eq!(store.lock_owner(show, 2).await.unwrap(), Some(user));

        store.release_items(user, &cart.items).await.unwrap();
        assert!(store.cart(user).await.unwrap().is_none());
    }
}
