//! Seat availability.
//!
//! A seat is free for a show when it exists in the show's theater, has no
//! ticket and carries no soft lock. Reads only, from both the ledger and the
//! reservation store.

use std::sync::Arc;
use tracing::debug;

use crate::error::{BookingError, Result};
use crate::ledger::TicketLedger;
use crate::models::{SeatAvailability, SeatId, Show, ShowId, TheaterId};
use crate::store::ReservationStore;

#[derive(Clone)]
pub struct SeatResolver {
    ledger: Arc<dyn TicketLedger>,
    store: Arc<dyn ReservationStore>,
}

impl SeatResolver {
    pub fn new(ledger: Arc<dyn TicketLedger>, store: Arc<dyn ReservationStore>) -> Self {
        Self { ledger, store }
    }

    pub async fn is_free(&self, show: ShowId, theater: TheaterId, seat: SeatId) -> Result<bool> {
        if !self.ledger.theater_has_seat(theater, seat).await? {
            return Ok(false);
        }
        if !self.ledger.show_belongs_to_theater(show, theater).await? {
            return Ok(false);
        }
        if self.ledger.count_tickets_for(show, seat).await? > 0 {
            return Ok(false);
        }
        Ok(self.store.lock_owner(show, seat).await?.is_none())
    }

    pub async fn show(&self, show: ShowId) -> Result<Show> {
        self.ledger
            .show(show)
            .await?
            .ok_or_else(|| BookingError::not_found(format!("show {}", show)))
    }

    /// Availability of every seat in the show's theater: one ticket query and
    /// one lock scan, merged locally.
    pub async fn seats_for_show(&self, show_id: ShowId) -> Result<Vec<SeatAvailability>> {
        let show = self.show(show_id).await?;
        let seats = self.ledger.seats_of_theater(show.theater_id).await?;
        let ticketed = self.ledger.ticketed_seats(show.id).await?;
        let locked = self.store.locked_seats(show.id).await?;

        debug!(
            "show {}: {} seats, {} ticketed, {} locked",
            show.id,
            seats.len(),
            ticketed.len(),
            locked.len()
        );

        Ok(seats
            .into_iter()
            .map(|seat| {
                let is_free = !ticketed.contains(&seat.id) && !locked.contains_key(&seat.id);
                SeatAvailability { seat, is_free }
            })
            .collect())
    }

    /// Rejects seats that are missing from the show's theater or already
    /// ticketed. Soft locks are checked by the store when the cart is written.
    pub async fn ensure_claimable(&self, show: &Show, seats: &[SeatId]) -> Result<()> {
        for seat in seats {
            if !self.ledger.theater_has_seat(show.theater_id, *seat).await? {
                return Err(BookingError::not_found(format!("seat {} of show {}", seat, show.id)));
            }
        }

        let ticketed = self.ledger.ticketed_seats(show.id).await?;
        if let Some(seat) = seats.iter().find(|seat| ticketed.contains(seat)) {
            return Err(BookingError::Conflict { show_id: show.id, seat_id: *seat });
        }
        Ok(())
    }
}
