use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{BookingError, Result};
use crate::ledger::TicketLedger;
use crate::models::{CartItem, Order, OrderId, Page, PageRequest, TicketId, UserId};

/// Turns cart contents into a durable order. The ledger's transaction is
/// the only thing that decides whether a seat really becomes a ticket.
#[derive(Clone)]
pub struct OrderFinalizer {
    ledger: Arc<dyn TicketLedger>,
}

impl OrderFinalizer {
    pub fn new(ledger: Arc<dyn TicketLedger>) -> Self {
        Self { ledger }
    }

    pub async fn add(&self, user: UserId, items: &[CartItem]) -> Result<Order> {
        if items.iter().all(|item| item.seats.is_empty()) {
            return Err(BookingError::EmptyState);
        }

        match self.ledger.create_order_with_tickets(user, items).await {
            Ok(order) => {
                info!("user {} submitted order {} ({} tickets)", user, order.id, order.tickets.len());
                Ok(order)
            }
            Err(e @ BookingError::RaceLoss { .. }) => {
                warn!("order of user {} lost a seat race: {}", user, e);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn remove(&self, ticket: TicketId) -> Result<()> {
        if self.ledger.delete_ticket(ticket).await? {
            info!("ticket {} removed", ticket);
            Ok(())
        } else {
            Err(BookingError::not_found(format!("ticket {}", ticket)))
        }
    }

    /// Orders of other users are reported as missing.
    pub async fn order_for_user(&self, user: UserId, order: OrderId) -> Result<Order> {
        match self.ledger.order(order).await? {
            Some(found) if found.user_id == user => Ok(found),
            _ => Err(BookingError::not_found(format!("order {}", order))),
        }
    }

    pub async fn orders_for_user(&self, user: UserId, page: PageRequest) -> Result<Page<Order>> {
        self.ledger.orders_page_for_user(user, page).await
    }

    pub async fn orders(&self, page: PageRequest) -> Result<Page<Order>> {
        self.ledger.orders_page(page).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryTicketLedger;

    #[tokio::test]
    async fn failed_ticket_insert_leaves_no_trace() {
        let ledger = MemoryTicketLedger::new();
        let show = ledger.add_show(1, 1).unwrap();
        let a1 = ledger.add_seat(1, "A1").unwrap();
        let a2 = ledger.add_seat(1, "A2").unwrap();
        let finalizer = OrderFinalizer::new(Arc::new(ledger.clone()));

        finalizer
            .add(1, &[CartItem { show_id: show.id, seats: vec![a2.id] }])
            .await
            .unwrap();

        // a1 would succeed, a2 collides: the whole order must vanish
        let err = finalizer
            .add(2, &[CartItem { show_id: show.id, seats: vec![a1.id, a2.id] }])
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::RaceLoss { seat_id, .. } if seat_id == a2.id));
        assert_eq!(ledger.ticket_count().unwrap(), 1);
        assert_eq!(ledger.order_count().unwrap(), 1);
        assert_eq!(ledger.count_tickets_for(show.id, a1.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_seat_aborts_the_order() {
        let ledger = MemoryTicketLedger::new();
        let show = ledger.add_show(1, 1).unwrap();
        let a1 = ledger.add_seat(1, "A1").unwrap();
        let finalizer = OrderFinalizer::new(Arc::new(ledger.clone()));

        let err = finalizer
            .add(1, &[CartItem { show_id: show.id, seats: vec![a1.id, 777] }])
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::NotFound(_)));
        assert_eq!(ledger.order_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_items_are_rejected() {
        let finalizer = OrderFinalizer::new(Arc::new(MemoryTicketLedger::new()));
        assert!(matches!(finalizer.add(1, &[]).await, Err(BookingError::EmptyState)));
    }

    #[tokio::test]
    async fn remove_reports_missing_ticket() {
        let ledger = MemoryTicketLedger::new();
        let show = ledger.add_show(1, 1).unwrap();
        let a1 = ledger.add_seat(1, "A1").unwrap();
        let finalizer = OrderFinalizer::new(Arc::new(ledger.clone()));

        let order = finalizer
            .add(1, &[CartItem { show_id: show.id, seats: vec![a1.id] }])
            .await
            .unwrap();
        let ticket = order.tickets[0].id;

        finalizer.remove(ticket).await.unwrap();
        assert!(matches!(finalizer.remove(ticket).await, Err(BookingError::NotFound(_))));
    }

    #[tokio::test]
    async fn orders_are_private_to_their_owner() {
        let ledger = MemoryTicketLedger::new();
        let show = ledger.add_show(1, 1).unwrap();
        let a1 = ledger.add_seat(1, "A1").unwrap();
        let finalizer = OrderFinalizer::new(Arc::new(ledger.clone()));

        let order = finalizer
            .add(1, &[CartItem { show_id: show.id, seats: vec![a1.id] }])
            .await
            .unwrap();

        let own = finalizer.order_for_user(1, order.id).await.unwrap();
        assert_eq!(own.tickets.len(), 1);
        assert!(matches!(
            finalizer.order_for_user(2, order.id).await,
            Err(BookingError::NotFound(_))
        ));

        let page = finalizer.orders_for_user(2, PageRequest::default()).await.unwrap();
        assert_eq!(page.total_records, 0);
        let all = finalizer.orders(PageRequest::default()).await.unwrap();
        assert_eq!(all.total_records, 1);
    }
}
