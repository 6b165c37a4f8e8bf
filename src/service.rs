//! Service layer API for the order negotiation workflow
use super::access::{AccessPolicy, Actor, RoleLookup};
use super::error::{Conflict, Error, Result, ValidationError};
use super::history::StatusHistoryEntry;
use super::lifecycle::OfferLifecycleManager;
use super::money::{Currency, Money};
use super::offer::{Offer, OfferTerms};
use super::order::{Order, OrderDetails, OrderKind, OrderStatus};
use super::repository::OrderRepository;
use super::settings::Settings;
use super::types::{OfferId, OrderId};
use std::collections::HashSet;
use std::sync::Arc;

pub struct OrderService {
    repo: Arc<OrderRepository>,
    policy: AccessPolicy,
    lifecycle: OfferLifecycleManager,
    default_currency: Currency,
}

// Unauthenticated callers may neither mutate nor read anything non-public.
fn authenticated(caller: Option<&Actor>) -> Result<&Actor> {
    caller.ok_or(Error::Unauthenticated)
}

impl OrderService {
    pub fn new(
        instance: Arc<sled::Db>,
        roles: Arc<dyn RoleLookup>,
        settings: &Settings,
    ) -> Result<Self> {
        let repo = Arc::new(OrderRepository::new(instance, settings.lock_timeout())?);
        let policy = AccessPolicy::new(roles);

        Ok(Self {
            lifecycle: OfferLifecycleManager::new(Arc::clone(&repo), policy.clone()),
            default_currency: settings.default_currency()?,
            repo,
            policy,
        })
    }

    pub fn repository(&self) -> &OrderRepository {
        &self.repo
    }

    /// Parse a money payload at the boundary, defaulting the currency.
    pub fn money(&self, amount: Option<&str>, currency: Option<&str>) -> Result<Money> {
        Ok(Money::from_parts(amount, currency, &self.default_currency)?)
    }

    /// Post a new OPEN order. The caller becomes its requester.
    pub fn create_order(
        &self,
        caller: Option<&Actor>,
        kind: OrderKind,
        details: OrderDetails,
    ) -> Result<Order> {
        let actor = authenticated(caller)?;
        details.validate()?;
        if !self.policy.can_create_order(actor, kind) {
            return Err(ValidationError::RoleRequired {
                role: kind.requester_role(),
                kind,
            }
            .into());
        }

        let order = Order::open(kind, actor.id.clone(), details);
        let mut uow = self.repo.begin();
        uow.save_order(order.clone());
        uow.commit()?;

        tracing::info!(order_id = %order.id, kind = %kind, requester = %actor.id, "Order created");
        Ok(order)
    }

    pub fn get_order(&self, caller: Option<&Actor>, order_id: OrderId) -> Result<Order> {
        let actor = authenticated(caller)?;
        let order = self.repo.get_order(order_id)?;
        if !self.policy.is_participant(actor, &order) {
            return Err(Error::PermissionDenied("not a participant of this order"));
        }
        Ok(order)
    }

    /// Replace the details of an open order. Status and history are untouched.
    pub fn update_order_details(
        &self,
        caller: Option<&Actor>,
        order_id: OrderId,
        details: OrderDetails,
    ) -> Result<Order> {
        let actor = authenticated(caller)?;
        details.validate()?;
        let order = self.repo.get_order(order_id)?;
        if !self.policy.is_owner(actor, &order) {
            return Err(Error::PermissionDenied("only the order owner can edit it"));
        }

        let mut uow = self.repo.begin();
        let mut order = uow.get_for_update(order_id)?;
        if order.status != OrderStatus::Open {
            tracing::warn!(order_id = %order_id, status = %order.status, "Edit rejected, order not open");
            return Err(Conflict::OrderNotOpen(order.status).into());
        }
        order.details = details;
        order.touch();
        uow.save_order(order.clone());
        uow.commit()?;

        tracing::info!(order_id = %order_id, actor = %actor.id, "Order details updated");
        Ok(order)
    }

    /// Orders the caller may see: their own, ones matched to them, and open
    /// orders they are eligible to bid on.
    pub fn list_orders(&self, caller: Option<&Actor>) -> Result<Vec<Order>> {
        let actor = authenticated(caller)?;
        self.repo.list(|order| self.policy.is_participant(actor, order))
    }

    pub fn submit_offer(
        &self,
        caller: Option<&Actor>,
        order_id: OrderId,
        terms: OfferTerms,
    ) -> Result<Offer> {
        let actor = authenticated(caller)?;
        self.lifecycle.create_offer(order_id, actor, terms)
    }

    /// Every offer on an order, for its owner.
    pub fn list_offers_for_order(
        &self,
        caller: Option<&Actor>,
        order_id: OrderId,
    ) -> Result<Vec<Offer>> {
        let actor = authenticated(caller)?;
        let order = self.repo.get_order(order_id)?;
        if !self.policy.is_owner(actor, &order) {
            return Err(Error::PermissionDenied("only the order owner can list its offers"));
        }
        self.repo.offers_for_order(order_id)
    }

    /// Offers the caller wrote, plus offers on orders where they are buyer or provider.
    pub fn list_offers(&self, caller: Option<&Actor>) -> Result<Vec<Offer>> {
        let actor = authenticated(caller)?;
        if actor.is_staff {
            return self.repo.list_offers(|_| true);
        }

        let involved: HashSet<OrderId> = self
            .repo
            .list(|order| {
                order.buyer.as_ref() == Some(&actor.id)
                    || order.assigned_provider.as_ref() == Some(&actor.id)
            })?
            .into_iter()
            .map(|order| order.id)
            .collect();

        self.repo
            .list_offers(|offer| offer.offered_by == actor.id || involved.contains(&offer.order_id))
    }

    pub fn get_offer(&self, caller: Option<&Actor>, offer_id: OfferId) -> Result<Offer> {
        let actor = authenticated(caller)?;
        let offer = self.repo.get_offer(offer_id)?;
        let order = self.repo.get_order(offer.order_id)?;
        if !self.policy.is_offer_participant(actor, &offer, &order) {
            return Err(Error::PermissionDenied("not allowed to access this offer"));
        }
        Ok(offer)
    }

    pub fn accept_offer(&self, caller: Option<&Actor>, offer_id: OfferId) -> Result<Order> {
        let actor = authenticated(caller)?;
        self.lifecycle.accept_offer(offer_id, actor)
    }

    pub fn withdraw_offer(&self, caller: Option<&Actor>, offer_id: OfferId) -> Result<Offer> {
        let actor = authenticated(caller)?;
        self.lifecycle.withdraw_offer(offer_id, actor)
    }

    pub fn decline_offer(&self, caller: Option<&Actor>, offer_id: OfferId) -> Result<Offer> {
        let actor = authenticated(caller)?;
        self.lifecycle.decline_offer(offer_id, actor)
    }

    /// The order's transitions, oldest first.
    pub fn status_history(
        &self,
        caller: Option<&Actor>,
        order_id: OrderId,
    ) -> Result<Vec<StatusHistoryEntry>> {
        let actor = authenticated(caller)?;
        let order = self.repo.get_order(order_id)?;
        if !self.policy.is_participant(actor, &order) {
            return Err(Error::PermissionDenied("not a participant of this order"));
        }
        self.repo.history(order_id)
    }

    /// Whether the order's history chain is intact. Staff only.
    pub fn verify_history(&self, caller: Option<&Actor>, order_id: OrderId) -> Result<bool> {
        let actor = authenticated(caller)?;
        if !actor.is_staff {
            return Err(Error::PermissionDenied("history verification is restricted to staff"));
        }
        self.repo.get_order(order_id)?;
        self.repo.audit().verify(&order_id)
    }
}
