//! Offer workflow: creating, accepting, declining and withdrawing offers.
//!
//! Every mutation follows the same discipline. Authorization happens on an
//! unlocked read and fails without side effects. The unit of work then locks the
//! order, then the offer, re-reads their status and stages its writes. Any error
//! after that point drops the unit of work, so nothing partial is committed.
use super::access::{AccessPolicy, Actor, RoleCode};
use super::error::{Conflict, Error, Result, ValidationError};
use super::history::Meta;
use super::offer::{Offer, OfferStatus, OfferTerms};
use super::order::{Order, OrderStatus};
use super::repository::OrderRepository;
use super::state_machine::{OrderEvent, OrderStateMachine};
use super::types::{OfferId, OrderId};
use std::sync::Arc;

pub struct OfferLifecycleManager {
    repo: Arc<OrderRepository>,
    policy: AccessPolicy,
    machine: OrderStateMachine,
}

impl OfferLifecycleManager {
    pub fn new(repo: Arc<OrderRepository>, policy: AccessPolicy) -> Self {
        Self {
            repo,
            policy,
            machine: OrderStateMachine::default(),
        }
    }

    pub fn with_state_machine(mut self, machine: OrderStateMachine) -> Self {
        self.machine = machine;
        self
    }

    /// Submit a new PENDING offer on an open order
    pub fn create_offer(
        &self,
        order_id: OrderId,
        actor: &Actor,
        terms: OfferTerms,
    ) -> Result<Offer> {
        terms.validate()?;

        let order = self.repo.get_order(order_id)?;
        if order.requester() == Some(&actor.id) {
            return Err(ValidationError::OwnOrder.into());
        }
        if !self.policy.can_bid(actor, &order) {
            return Err(Error::PermissionDenied(match order.kind.bidder_role() {
                RoleCode::Seller => "active seller role required",
                RoleCode::Buyer => "active buyer role required",
            }));
        }

        let mut uow = self.repo.begin();
        let order = uow.get_for_update(order_id)?;
        if order.status != OrderStatus::Open {
            tracing::warn!(order_id = %order_id, status = %order.status, "Offer rejected, order not open");
            return Err(Conflict::OrderNotOpen(order.status).into());
        }
        let duplicate = uow
            .offers_of(&order_id)?
            .iter()
            .any(|o| o.offered_by == actor.id && o.status == OfferStatus::Pending);
        if duplicate {
            tracing::warn!(order_id = %order_id, actor = %actor.id, "Duplicate pending offer");
            return Err(Conflict::DuplicatePendingOffer.into());
        }

        let offer = Offer::new(order_id, actor.id.clone(), terms);
        uow.save_offer(offer.clone());
        uow.commit()?;

        tracing::info!(
            order_id = %order_id,
            offer_id = %offer.id,
            actor = %actor.id,
            total = %offer.terms.total_price(),
            "Offer submitted"
        );
        Ok(offer)
    }

    /// Accept one offer, committing the order to its author and price.
    ///
    /// Of any number of concurrent calls against the same order exactly one
    /// succeeds. The rest observe the offer is no longer pending, or the order
    /// is no longer open, and fail with a conflict.
    pub fn accept_offer(&self, offer_id: OfferId, actor: &Actor) -> Result<Order> {
        let offer = self.repo.get_offer(offer_id)?;
        let order = self.repo.get_order(offer.order_id)?;
        if !self.policy.is_owner(actor, &order) {
            return Err(Error::PermissionDenied("only the order owner can accept offers"));
        }

        let mut uow = self.repo.begin();
        let mut order = uow.get_for_update(offer.order_id)?;
        let mut offer = uow.get_offer_for_update(offer_id)?;
        if offer.status != OfferStatus::Pending {
            tracing::warn!(offer_id = %offer_id, status = %offer.status, "Accept rejected, offer not pending");
            return Err(Conflict::OfferNotPending(offer.status).into());
        }

        let mut declined = 0usize;
        for mut sibling in uow.offers_of(&order.id)? {
            if sibling.id != offer.id && sibling.status == OfferStatus::Pending {
                sibling.settle(OfferStatus::Declined)?;
                uow.save_offer(sibling);
                declined += 1;
            }
        }

        offer.settle(OfferStatus::Accepted)?;
        order.selected_offer = Some(offer.id);
        order.assign_counterparty(offer.offered_by.clone());
        order.agreed_price = Some(offer.terms.total_price().clone());
        uow.save_offer(offer.clone());

        let meta = Meta::from([
            ("offer_id".to_string(), offer.id.to_string()),
            ("declined_offers".to_string(), declined.to_string()),
        ]);
        if let Err(err) =
            self.machine
                .transition(&mut uow, &mut order, OrderEvent::AcceptOffer, Some(&actor.id), meta)
        {
            tracing::warn!(order_id = %order.id, error = %err, "Accept rejected, rolling back");
            return Err(err);
        }
        uow.commit()?;

        tracing::info!(
            order_id = %order.id,
            offer_id = %offer.id,
            counterparty = %offer.offered_by,
            declined,
            "Offer accepted"
        );
        Ok(order)
    }

    /// The offer's author takes it back
    pub fn withdraw_offer(&self, offer_id: OfferId, actor: &Actor) -> Result<Offer> {
        self.settle(offer_id, OfferStatus::Withdrawn, |offer, _| {
            if actor.is_staff || offer.offered_by == actor.id {
                Ok(())
            } else {
                Err(Error::PermissionDenied("only the offer author can withdraw it"))
            }
        })
    }

    /// The order owner turns the offer down
    pub fn decline_offer(&self, offer_id: OfferId, actor: &Actor) -> Result<Offer> {
        self.settle(offer_id, OfferStatus::Declined, |_, order| {
            if self.policy.is_owner(actor, order) {
                Ok(())
            } else {
                Err(Error::PermissionDenied("only the order owner can decline offers"))
            }
        })
    }

    fn settle<F>(&self, offer_id: OfferId, next: OfferStatus, authorize: F) -> Result<Offer>
    where
        F: Fn(&Offer, &Order) -> Result<()>,
    {
        let offer = self.repo.get_offer(offer_id)?;
        let order = self.repo.get_order(offer.order_id)?;
        authorize(&offer, &order)?;

        let mut uow = self.repo.begin();
        uow.get_for_update(offer.order_id)?;
        let mut offer = uow.get_offer_for_update(offer_id)?;
        if let Err(conflict) = offer.settle(next) {
            tracing::warn!(offer_id = %offer_id, status = %offer.status, "Offer is no longer pending");
            return Err(conflict.into());
        }
        uow.save_offer(offer.clone());
        uow.commit()?;

        tracing::info!(offer_id = %offer_id, order_id = %offer.order_id, status = %next, "Offer settled");
        Ok(offer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::RoleBook;
    use crate::money::{Currency, Money};
    use crate::order::{OrderDetails, OrderKind};
    use crate::types::ActorId;
    use std::time::Duration;

    struct Fixture {
        manager: OfferLifecycleManager,
        repo: Arc<OrderRepository>,
        book: Arc<RoleBook>,
        owner: Actor,
        seller: Actor,
        order: Order,
    }

    fn fixture(machine: OrderStateMachine) -> Fixture {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let repo = Arc::new(OrderRepository::new(Arc::new(db), Duration::from_millis(50)).unwrap());
        let book = Arc::new(RoleBook::new());
        let owner = Actor::new(ActorId::new("owner"));
        let seller = Actor::new(ActorId::new("seller"));
        book.grant(&owner.id, RoleCode::Buyer);
        book.grant(&seller.id, RoleCode::Seller);

        let order = Order::open(
            OrderKind::Buy,
            owner.id.clone(),
            OrderDetails::new().set_title("Buy steel"),
        );
        let mut uow = repo.begin();
        uow.save_order(order.clone());
        uow.commit().unwrap();

        Fixture {
            manager: OfferLifecycleManager::new(Arc::clone(&repo), AccessPolicy::new(book.clone()))
                .with_state_machine(machine),
            repo,
            book,
            owner,
            seller,
            order,
        }
    }

    fn terms(amount: i128) -> OfferTerms {
        OfferTerms::new(Money::new(amount, Currency::default()))
    }

    #[test]
    fn accept_records_price_and_history() {
        let f = fixture(OrderStateMachine::default());
        let offer = f.manager.create_offer(f.order.id, &f.seller, terms(4_200)).unwrap();

        let order = f.manager.accept_offer(offer.id, &f.owner).unwrap();
        assert_eq!(order.agreed_price, Some(Money::new(4_200, Currency::default())));

        let history = f.repo.history(order.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].meta.get("offer_id"), Some(&offer.id.to_string()));
    }

    #[test]
    fn rejected_transition_rolls_back_the_offer() {
        static NOTHING_ALLOWED: &[crate::state_machine::Transition] = &[];
        let f = fixture(OrderStateMachine::with_table(NOTHING_ALLOWED));
        let offer = f.manager.create_offer(f.order.id, &f.seller, terms(10)).unwrap();

        let err = f.manager.accept_offer(offer.id, &f.owner).unwrap_err();
        assert!(matches!(err, Error::Conflict(Conflict::InvalidTransition { .. })));

        assert_eq!(f.repo.get_offer(offer.id).unwrap().status, OfferStatus::Pending);
        assert_eq!(f.repo.get_order(f.order.id).unwrap(), f.order);
        assert!(f.repo.history(f.order.id).unwrap().is_empty());
    }

    #[test]
    fn accept_on_a_cancelled_order_changes_nothing() {
        let f = fixture(OrderStateMachine::default());
        let rival = Actor::new(ActorId::new("rival"));
        f.book.grant(&rival.id, RoleCode::Seller);
        let first = f.manager.create_offer(f.order.id, &f.seller, terms(10)).unwrap();
        let second = f.manager.create_offer(f.order.id, &rival, terms(20)).unwrap();

        // cancelled out of band while both offers are still pending
        let mut uow = f.repo.begin();
        let mut cancelled = uow.get_for_update(f.order.id).unwrap();
        cancelled.status = OrderStatus::Cancelled;
        uow.save_order(cancelled.clone());
        uow.commit().unwrap();

        let err = f.manager.accept_offer(first.id, &f.owner).unwrap_err();
        assert!(matches!(
            err,
            Error::Conflict(Conflict::InvalidTransition {
                current: OrderStatus::Cancelled,
                ..
            })
        ));

        assert_eq!(f.repo.get_order(f.order.id).unwrap(), cancelled);
        assert_eq!(f.repo.get_offer(first.id).unwrap(), first);
        assert_eq!(f.repo.get_offer(second.id).unwrap(), second);
        assert!(f.repo.history(f.order.id).unwrap().is_empty());
    }

    #[test]
    fn unknown_offer_is_not_found() {
        let f = fixture(OrderStateMachine::default());

        let err = f.manager.accept_offer(OfferId::new(), &f.owner).unwrap_err();
        assert_eq!(err.http_status(), 404);
    }
}
