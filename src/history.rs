//! Append-only audit trail of order status transitions.
//!
//! Entries live in their own sled tree keyed by `order id ‖ sequence`, so a
//! prefix scan yields one order's history in the order it was written. Each
//! entry records the digest of its predecessor, which lets [`AuditLog::verify`]
//! detect rewritten or removed entries.
use super::error::Result;
use super::order::OrderStatus;
use super::state_machine::OrderEvent;
use super::types::{ActorId, OrderId, TimeStamp};
use std::collections::BTreeMap;

pub type Meta = BTreeMap<String, String>;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct StatusHistoryEntry {
    #[n(0)]
    pub order_id: OrderId,
    #[n(1)]
    pub from_status: Option<OrderStatus>,
    #[n(2)]
    pub to_status: OrderStatus,
    #[n(3)]
    pub event: String,
    #[n(4)]
    pub actor: Option<ActorId>, // None when system initiated
    #[n(5)]
    pub meta: Meta,
    #[n(6)]
    pub at: TimeStamp,
    #[n(7)]
    pub prev_hash: Option<String>, // digest of the previous entry for this order
}

impl StatusHistoryEntry {
    pub fn new(
        order_id: OrderId,
        from_status: Option<OrderStatus>,
        to_status: OrderStatus,
        event: OrderEvent,
        actor: Option<ActorId>,
        meta: Meta,
    ) -> Self {
        Self {
            order_id,
            from_status,
            to_status,
            event: event.as_str().to_string(),
            actor,
            meta,
            at: TimeStamp::new(),
            prev_hash: None,
        }
    }

    /// Returns the digest of the entry along with its CBOR encoding.
    pub fn build(&self) -> Result<(String, Vec<u8>)> {
        let cbor = minicbor::to_vec(self)?;
        let hash = sha256::digest(&cbor);

        Ok((hash, cbor))
    }
}

#[derive(Clone)]
pub struct AuditLog {
    tree: sled::Tree,
}

impl AuditLog {
    pub(crate) fn new(tree: sled::Tree) -> Self {
        Self { tree }
    }

    pub(crate) fn tree(&self) -> &sled::Tree {
        &self.tree
    }

    pub(crate) fn key(order_id: &OrderId, sequence: u64) -> Vec<u8> {
        let mut key = Vec::with_capacity(24);
        key.extend_from_slice(order_id.as_bytes());
        key.extend_from_slice(&sequence.to_be_bytes());
        key
    }

    /// All entries for `order_id`, oldest first.
    pub fn entries(&self, order_id: &OrderId) -> Result<Vec<StatusHistoryEntry>> {
        self.tree
            .scan_prefix(order_id.as_bytes())
            .values()
            .map(|value| -> Result<StatusHistoryEntry> { Ok(minicbor::decode(&value?)?) })
            .collect()
    }

    /// Digest of the newest entry, used to chain the next append.
    pub fn last_digest(&self, order_id: &OrderId) -> Result<Option<String>> {
        match self.tree.scan_prefix(order_id.as_bytes()).values().next_back() {
            Some(value) => Ok(Some(sha256::digest(&*value?))),
            None => Ok(None),
        }
    }

    /// Checks that every entry points at the digest of the one before it.
    pub fn verify(&self, order_id: &OrderId) -> Result<bool> {
        let mut expected: Option<String> = None;
        for value in self.tree.scan_prefix(order_id.as_bytes()).values() {
            let value = value?;
            let entry: StatusHistoryEntry = minicbor::decode(&value)?;
            if entry.prev_hash != expected || entry.order_id != *order_id {
                tracing::warn!(order_id = %order_id, "Status history chain is broken");
                return Ok(false);
            }
            expected = Some(sha256::digest(&*value));
        }
        Ok(true)
    }
}
