//! Order status transitions.
//!
//! Transitions are data: a table of `(event, from) -> to` rows. New events
//! extend [`TRANSITIONS`] without touching the orchestration code. The machine
//! only guards the order status; preconditions such as "the offer is pending"
//! belong to the caller.
use super::error::{Conflict, Result};
use super::history::{Meta, StatusHistoryEntry};
use super::order::{Order, OrderStatus};
use super::repository::UnitOfWork;
use super::types::ActorId;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderEvent {
    AcceptOffer,
}

impl OrderEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderEvent::AcceptOffer => "accept_offer",
        }
    }
}

impl fmt::Display for OrderEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub event: OrderEvent,
    pub from: OrderStatus,
    pub to: OrderStatus,
}

pub const TRANSITIONS: &[Transition] = &[Transition {
    event: OrderEvent::AcceptOffer,
    from: OrderStatus::Open,
    to: OrderStatus::OfferSelected,
}];

#[derive(Debug, Clone, Copy)]
pub struct OrderStateMachine {
    table: &'static [Transition],
}

impl Default for OrderStateMachine {
    fn default() -> Self {
        Self { table: TRANSITIONS }
    }
}

impl OrderStateMachine {
    pub fn with_table(table: &'static [Transition]) -> Self {
        Self { table }
    }

    pub fn next_status(
        &self,
        current: OrderStatus,
        event: OrderEvent,
    ) -> std::result::Result<OrderStatus, Conflict> {
        self.table
            .iter()
            .find(|t| t.event == event && t.from == current)
            .map(|t| t.to)
            .ok_or(Conflict::InvalidTransition { current, event })
    }

    /// Applies `event` to a locked order and stages the order together with one
    /// history entry in `uow`, so both land in the same commit.
    pub fn transition(
        &self,
        uow: &mut UnitOfWork<'_>,
        order: &mut Order,
        event: OrderEvent,
        actor: Option<&ActorId>,
        meta: Meta,
    ) -> Result<()> {
        let from = order.status;
        let to = self.next_status(from, event)?;

        order.status = to;
        order.touch();
        uow.save_order(order.clone());
        uow.append_history(StatusHistoryEntry::new(
            order.id,
            Some(from),
            to,
            event,
            actor.cloned(),
            meta,
        ))?;

        tracing::debug!(order_id = %order.id, %from, %to, %event, "Order status transition staged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_offer_only_from_open() {
        let machine = OrderStateMachine::default();

        assert_eq!(
            machine.next_status(OrderStatus::Open, OrderEvent::AcceptOffer),
            Ok(OrderStatus::OfferSelected)
        );
        for current in [
            OrderStatus::OfferSelected,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(
                machine.next_status(current, OrderEvent::AcceptOffer),
                Err(Conflict::InvalidTransition {
                    current,
                    event: OrderEvent::AcceptOffer
                })
            );
        }
    }

    #[test]
    fn table_drives_the_machine() {
        static FROZEN: &[Transition] = &[];
        let machine = OrderStateMachine::with_table(FROZEN);

        assert!(
            machine
                .next_status(OrderStatus::Open, OrderEvent::AcceptOffer)
                .is_err()
        );
    }
}
