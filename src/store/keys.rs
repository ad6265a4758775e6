use crate::models::{SeatId, ShowId, UserId};

pub const CART_PREFIX: &str = "cart.";
pub const LOCK_PREFIX: &str = "lock.";
pub const SEAT_DELIMITER: char = '&';

pub fn cart_key(user: UserId) -> String {
    format!("{}{}", CART_PREFIX, user)
}

pub fn lock_key(show: ShowId, seat: SeatId) -> String {
    format!("{}{}.{}", LOCK_PREFIX, show, seat)
}

/// Prefix shared by every lock of one show, e.g. `lock.42.`
pub fn show_lock_prefix(show: ShowId) -> String {
    format!("{}{}.", LOCK_PREFIX, show)
}

/// Seat id encoded in a lock key of `show`, if the key belongs to it.
pub fn seat_from_lock_key(show: ShowId, key: &str) -> Option<SeatId> {
    key.strip_prefix(&show_lock_prefix(show))?.parse().ok()
}

pub fn encode_seats(seats: &[SeatId]) -> String {
    seats
        .iter()
        .map(|seat| seat.to_string())
        .collect::<Vec<_>>()
        .join(&SEAT_DELIMITER.to_string())
}

pub fn decode_seats(field: &str) -> Vec<SeatId> {
    field
        .split(SEAT_DELIMITER)
        .filter_map(|seat| seat.parse().ok())
        .collect()
}

/// Appends `added` to `existing`, keeping first-seen order and dropping repeats.
pub fn merge_seats(existing: &[SeatId], added: &[SeatId]) -> Vec<SeatId> {
    let mut merged: Vec<SeatId> = Vec::with_capacity(existing.len() + added.len());
    for seat in existing.iter().chain(added) {
        if !merged.contains(seat) {
            merged.push(*seat);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_keys_are_scoped_per_show() {
        assert_eq!(lock_key(7, 31), "lock.7.31");
        assert_eq!(seat_from_lock_key(7, "lock.7.31"), Some(31));
        assert_eq!(seat_from_lock_key(7, "lock.70.31"), None);
        assert_eq!(seat_from_lock_key(7, "cart.7"), None);
    }

    #[test]
    fn seat_field_uses_ampersand_delimiter() {
        assert_eq!(encode_seats(&[3, 1, 2]), "3&1&2");
        assert_eq!(decode_seats("3&1&2"), vec![3, 1, 2]);
        assert_eq!(decode_seats(""), Vec::<SeatId>::new());
    }

    #[test]
    fn merge_keeps_order_and_drops_duplicates() {
        assert_eq!(merge_seats(&[1, 2], &[2, 5, 1, 9]), vec![1, 2, 5, 9]);
        assert_eq!(merge_seats(&[], &[4, 4]), vec![4]);
    }
}
