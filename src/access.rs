//! Who may read or change an order or offer.
//!
//! Role verification lives outside this crate. The policy only asks a
//! [`RoleLookup`] whether an actor holds a role, and combines the answer with
//! ownership of the record in question.
use super::offer::Offer;
use super::order::{Order, OrderKind, OrderStatus};
use super::types::ActorId;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleCode {
    Buyer,
    Seller,
}

impl fmt::Display for RoleCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleCode::Buyer => f.write_str("BUYER"),
            RoleCode::Seller => f.write_str("SELLER"),
        }
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: ActorId,
    pub is_staff: bool,
}

impl Actor {
    pub fn new(id: ActorId) -> Self {
        Self {
            id,
            is_staff: false,
        }
    }
    pub fn staff(id: ActorId) -> Self {
        Self { id, is_staff: true }
    }
}

/// Capability check provided by the account system.
pub trait RoleLookup: Send + Sync {
    fn has_role(&self, actor: &ActorId, role: RoleCode, require_active: bool) -> bool;
}

/// In-memory role registry, value is whether the role is active.
#[derive(Debug, Default)]
pub struct RoleBook {
    roles: DashMap<(ActorId, RoleCode), bool>,
}

impl RoleBook {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn grant(&self, actor: &ActorId, role: RoleCode) {
        self.roles.insert((actor.clone(), role), true);
    }
    /// Records a role that is still awaiting verification.
    pub fn grant_inactive(&self, actor: &ActorId, role: RoleCode) {
        self.roles.insert((actor.clone(), role), false);
    }
    pub fn deactivate(&self, actor: &ActorId, role: RoleCode) {
        if let Some(mut active) = self.roles.get_mut(&(actor.clone(), role)) {
            *active = false;
        }
    }
}

impl RoleLookup for RoleBook {
    fn has_role(&self, actor: &ActorId, role: RoleCode, require_active: bool) -> bool {
        self.roles
            .get(&(actor.clone(), role))
            .is_some_and(|active| *active || !require_active)
    }
}

#[derive(Clone)]
pub struct AccessPolicy {
    roles: Arc<dyn RoleLookup>,
}

impl AccessPolicy {
    pub fn new(roles: Arc<dyn RoleLookup>) -> Self {
        Self { roles }
    }

    /// Staff satisfy every role check.
    pub fn has_active_role(&self, actor: &Actor, role: RoleCode) -> bool {
        actor.is_staff || self.roles.has_role(&actor.id, role, true)
    }

    pub fn can_create_order(&self, actor: &Actor, kind: OrderKind) -> bool {
        self.has_active_role(actor, kind.requester_role())
    }

    pub fn can_bid(&self, actor: &Actor, order: &Order) -> bool {
        self.has_active_role(actor, order.kind.bidder_role())
    }

    /// Owners may mutate the order and accept or decline its offers.
    pub fn is_owner(&self, actor: &Actor, order: &Order) -> bool {
        actor.is_staff || order.requester() == Some(&actor.id)
    }

    /// Participants may read the order and its history. While an order is
    /// open, anyone who could bid on it is a participant.
    pub fn is_participant(&self, actor: &Actor, order: &Order) -> bool {
        if self.is_owner(actor, order) || order.counterparty() == Some(&actor.id) {
            return true;
        }
        order.status == OrderStatus::Open && self.can_bid(actor, order)
    }

    pub fn is_offer_participant(&self, actor: &Actor, offer: &Offer, order: &Order) -> bool {
        actor.is_staff || offer.offered_by == actor.id || self.is_owner(actor, order)
    }
}
