use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{BookingError, Result};
use crate::ledger::TicketLedger;
use crate::models::{
    CartItem, Order, OrderId, Page, PageRequest, Seat, SeatId, Show, ShowId, TheaterId, Ticket,
    TicketId, UserId,
};

#[derive(Debug, Default)]
struct State {
    shows: HashMap<ShowId, Show>,
    seats: HashMap<SeatId, Seat>,
    orders: Vec<Order>,
    tickets: Vec<Ticket>,
    next_id: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn seat_in_theater(&self, theater: TheaterId, seat: SeatId) -> bool {
        self.seats.get(&seat).is_some_and(|s| s.theater_id == theater)
    }

    fn is_ticketed(&self, show: ShowId, seat: SeatId) -> bool {
        self.tickets.iter().any(|t| t.show_id == show && t.seat_id == seat)
    }

    fn page(&self, user: Option<UserId>, page: PageRequest) -> Page<Order> {
        let mut matching: Vec<&Order> = self
            .orders
            .iter()
            .filter(|order| user.map_or(true, |u| order.user_id == u))
            .collect();
        matching.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as i64;
        let records = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.size() as usize)
            .cloned()
            .collect();
        Page::new(page, total, records)
    }
}

/// In-process ledger with the same guarantees as the Postgres one:
/// (show, seat) uniqueness and all-or-nothing order creation.
#[derive(Debug, Clone, Default)]
pub struct MemoryTicketLedger {
    state: Arc<Mutex<State>>,
}

impl MemoryTicketLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| BookingError::storage("memory ledger", anyhow::anyhow!("mutex poisoned")))
    }

    pub fn add_show(&self, theater_id: TheaterId, movie_id: i64) -> Result<Show> {
        let mut state = self.state()?;
        let show = Show {
            id: state.next_id(),
            theater_id,
            movie_id,
            starts_at: Utc::now(),
            variant: Vec::new(),
        };
        state.shows.insert(show.id, show.clone());
        Ok(show)
    }

    pub fn add_seat(&self, theater_id: TheaterId, display_num: &str) -> Result<Seat> {
        let mut state = self.state()?;
        let id = state.next_id();
        let seat = Seat {
            id,
            theater_id,
            display_num: display_num.to_string(),
            display_x: id as i32,
            display_y: 0,
            flag_deluxe: false,
            flag_wheelchair: false,
        };
        state.seats.insert(seat.id, seat.clone());
        Ok(seat)
    }

    pub fn ticket_count(&self) -> Result<usize> {
        Ok(self.state()?.tickets.len())
    }

    pub fn order_count(&self) -> Result<usize> {
        Ok(self.state()?.orders.len())
    }
}

#[async_trait]
impl TicketLedger for MemoryTicketLedger {
    async fn show(&self, show: ShowId) -> Result<Option<Show>> {
        Ok(self.state()?.shows.get(&show).cloned())
    }

    async fn theater_has_seat(&self, theater: TheaterId, seat: SeatId) -> Result<bool> {
        Ok(self.state()?.seat_in_theater(theater, seat))
    }

    async fn show_belongs_to_theater(&self, show: ShowId, theater: TheaterId) -> Result<bool> {
        Ok(self.state()?.shows.get(&show).is_some_and(|s| s.theater_id == theater))
    }

    async fn count_tickets_for(&self, show: ShowId, seat: SeatId) -> Result<i64> {
        let state = self.state()?;
        Ok(state
            .tickets
            .iter()
            .filter(|t| t.show_id == show && t.seat_id == seat)
            .count() as i64)
    }

    async fn seats_of_theater(&self, theater: TheaterId) -> Result<Vec<Seat>> {
        let state = self.state()?;
        let mut seats: Vec<Seat> = state
            .seats
            .values()
            .filter(|seat| seat.theater_id == theater)
            .cloned()
            .collect();
        seats.sort_by_key(|seat| (seat.display_y, seat.display_x));
        Ok(seats)
    }

    async fn ticketed_seats(&self, show: ShowId) -> Result<HashSet<SeatId>> {
        let state = self.state()?;
        Ok(state
            .tickets
            .iter()
            .filter(|t| t.show_id == show)
            .map(|t| t.seat_id)
            .collect())
    }

    async fn create_order_with_tickets(&self, user: UserId, items: &[CartItem]) -> Result<Order> {
        let mut state = self.state()?;

        // Stage everything first; the state is only touched once all inserts pass.
        let mut staged: Vec<(ShowId, SeatId)> = Vec::new();
        for item in items {
            let theater = state
                .shows
                .get(&item.show_id)
                .map(|show| show.theater_id)
                .ok_or_else(|| BookingError::not_found(format!("show {}", item.show_id)))?;

            for seat_id in &item.seats {
                if !state.seat_in_theater(theater, *seat_id) {
                    return Err(BookingError::not_found(format!(
                        "seat {} of show {}",
                        seat_id, item.show_id
                    )));
                }
                if state.is_ticketed(item.show_id, *seat_id)
                    || staged.contains(&(item.show_id, *seat_id))
                {
                    return Err(BookingError::RaceLoss { show_id: item.show_id, seat_id: *seat_id });
                }
                staged.push((item.show_id, *seat_id));
            }
        }

        let mut order = Order {
            id: state.next_id(),
            user_id: user,
            complete: false,
            submitted_at: Utc::now(),
            completed_at: None,
            tickets: Vec::with_capacity(staged.len()),
        };
        for (show_id, seat_id) in staged {
            let ticket = Ticket { id: state.next_id(), order_id: order.id, show_id, seat_id };
            order.tickets.push(ticket);
        }

        state.tickets.extend(order.tickets.iter().cloned());
        state.orders.push(Order { tickets: Vec::new(), ..order.clone() });
        Ok(order)
    }

    async fn delete_ticket(&self, ticket: TicketId) -> Result<bool> {
        let mut state = self.state()?;
        let before = state.tickets.len();
        state.tickets.retain(|t| t.id != ticket);
        Ok(state.tickets.len() < before)
    }

    async fn order(&self, order: OrderId) -> Result<Option<Order>> {
        let state = self.state()?;
        Ok(state.orders.iter().find(|o| o.id == order).map(|o| Order {
            tickets: state.tickets.iter().filter(|t| t.order_id == o.id).cloned().collect(),
            ..o.clone()
        }))
    }

    async fn orders_page(&self, page: PageRequest) -> Result<Page<Order>> {
        Ok(self.state()?.page(None, page))
    }

    async fn orders_page_for_user(&self, user: UserId, page: PageRequest) -> Result<Page<Order>> {
        Ok(self.state()?.page(Some(user), page))
    }
}
