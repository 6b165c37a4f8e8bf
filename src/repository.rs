//! sled-backed storage for orders, offers and their history.
//!
//! # Trees
//!
//! | Tree | Key | Value |
//! |------|-----|-------|
//! | `orders` | order id | CBOR [`Order`] |
//! | `offers` | offer id | CBOR [`Offer`] |
//! | `order_offers` | order id ‖ offer id | empty, index of offers per order |
//! | `status_history` | order id ‖ sequence | CBOR [`StatusHistoryEntry`] |
//!
//! Plain reads go straight to the trees. Mutations go through a
//! [`UnitOfWork`], which takes row locks, stages writes in memory and applies
//! them in one multi-tree transaction on [`UnitOfWork::commit`]. Dropping a unit
//! of work without committing discards every staged write and releases its locks.
use super::error::{Error, Result};
use super::history::{AuditLog, StatusHistoryEntry};
use super::locks::{LockKey, LockTable, RowGuard};
use super::offer::Offer;
use super::order::Order;
use super::types::{OfferId, OrderId};
use sled::Transactional;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

pub struct OrderRepository {
    instance: Arc<sled::Db>,
    orders: sled::Tree,
    offers: sled::Tree,
    order_offers: sled::Tree,
    audit: AuditLog,
    locks: LockTable,
}

impl OrderRepository {
    pub fn new(instance: Arc<sled::Db>, lock_timeout: Duration) -> Result<Self> {
        Ok(Self {
            orders: instance.open_tree("orders")?,
            offers: instance.open_tree("offers")?,
            order_offers: instance.open_tree("order_offers")?,
            audit: AuditLog::new(instance.open_tree("status_history")?),
            locks: LockTable::new(lock_timeout),
            instance,
        })
    }

    /// Start a unit of work. Nothing is locked until a `*_for_update` call.
    pub fn begin(&self) -> UnitOfWork<'_> {
        UnitOfWork {
            repo: self,
            guards: HashMap::new(),
            orders: BTreeMap::new(),
            offers: BTreeMap::new(),
            history: Vec::new(),
        }
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn get_order(&self, id: OrderId) -> Result<Order> {
        self.load_order(&id)?
            .ok_or_else(|| Error::not_found("order", id))
    }

    pub fn get_offer(&self, id: OfferId) -> Result<Offer> {
        self.load_offer(&id)?
            .ok_or_else(|| Error::not_found("offer", id))
    }

    /// Unlocked snapshot of every order matching `filter`.
    pub fn list<F>(&self, filter: F) -> Result<Vec<Order>>
    where
        F: Fn(&Order) -> bool,
    {
        let mut found = Vec::new();
        for value in self.orders.iter().values() {
            let order: Order = minicbor::decode(&value?)?;
            if filter(&order) {
                found.push(order);
            }
        }
        Ok(found)
    }

    /// Unlocked snapshot of every offer matching `filter`.
    pub fn list_offers<F>(&self, filter: F) -> Result<Vec<Offer>>
    where
        F: Fn(&Offer) -> bool,
    {
        let mut found = Vec::new();
        for value in self.offers.iter().values() {
            let offer: Offer = minicbor::decode(&value?)?;
            if filter(&offer) {
                found.push(offer);
            }
        }
        Ok(found)
    }

    /// Offers placed on `order_id`, oldest first.
    pub fn offers_for_order(&self, order_id: OrderId) -> Result<Vec<Offer>> {
        let mut found = Vec::new();
        for offer_id in self.indexed_offer_ids(&order_id)? {
            if let Some(offer) = self.load_offer(&offer_id)? {
                found.push(offer);
            }
        }
        Ok(found)
    }

    pub fn history(&self, order_id: OrderId) -> Result<Vec<StatusHistoryEntry>> {
        self.audit.entries(&order_id)
    }

    fn load_order(&self, id: &OrderId) -> Result<Option<Order>> {
        match self.orders.get(id.as_bytes())? {
            Some(value) => Ok(Some(minicbor::decode(&value)?)),
            None => Ok(None),
        }
    }

    fn load_offer(&self, id: &OfferId) -> Result<Option<Offer>> {
        match self.offers.get(id.as_bytes())? {
            Some(value) => Ok(Some(minicbor::decode(&value)?)),
            None => Ok(None),
        }
    }

    fn indexed_offer_ids(&self, order_id: &OrderId) -> Result<Vec<OfferId>> {
        let mut ids = Vec::new();
        for key in self.order_offers.scan_prefix(order_id.as_bytes()).keys() {
            let key = key?;
            let raw = <[u8; 16]>::try_from(&key[16..])
                .map_err(|_| minicbor::decode::Error::message("malformed order_offers key"))?;
            ids.push(OfferId::from_bytes(raw));
        }
        Ok(ids)
    }

    fn index_key(order_id: &OrderId, offer_id: &OfferId) -> Vec<u8> {
        let mut key = Vec::with_capacity(32);
        key.extend_from_slice(order_id.as_bytes());
        key.extend_from_slice(offer_id.as_bytes());
        key
    }
}

/// Locks and staged writes belonging to one logical transaction.
///
/// Outside this crate a unit of work can only take locks and read. Staging
/// and committing stay with the service and state machine, so order status
/// never changes except through [`OrderStateMachine`](crate::state_machine::OrderStateMachine).
pub struct UnitOfWork<'r> {
    repo: &'r OrderRepository,
    guards: HashMap<LockKey, RowGuard>,
    orders: BTreeMap<OrderId, Order>,
    offers: BTreeMap<OfferId, Offer>,
    history: Vec<StatusHistoryEntry>,
}

impl UnitOfWork<'_> {
    /// Exclusive lock on the order row, held until commit or drop.
    pub fn get_for_update(&mut self, id: OrderId) -> Result<Order> {
        self.lock(LockKey::Order(id))?;
        self.read_order(&id)?
            .ok_or_else(|| Error::not_found("order", id))
    }

    /// Exclusive lock on the offer row. The parent order must already be
    /// locked by this unit of work, so locks are always taken order first.
    pub fn get_offer_for_update(&mut self, id: OfferId) -> Result<Offer> {
        let order_id = self
            .read_offer(&id)?
            .ok_or_else(|| Error::not_found("offer", id))?
            .order_id;
        self.require_order_lock(&order_id)?;

        self.lock(LockKey::Offer(id))?;
        // re-read now that nobody else can change it
        self.read_offer(&id)?
            .ok_or_else(|| Error::not_found("offer", id))
    }

    /// Every offer on a locked order, including ones staged in this unit of work.
    pub fn offers_of(&self, order_id: &OrderId) -> Result<Vec<Offer>> {
        self.require_order_lock(order_id)?;

        let mut found = BTreeMap::new();
        for offer_id in self.repo.indexed_offer_ids(order_id)? {
            if let Some(offer) = self.read_offer(&offer_id)? {
                found.insert(offer_id, offer);
            }
        }
        for (id, offer) in &self.offers {
            if offer.order_id == *order_id {
                found.insert(*id, offer.clone());
            }
        }
        Ok(found.into_values().collect())
    }

    pub(crate) fn save_order(&mut self, order: Order) {
        self.orders.insert(order.id, order);
    }

    pub(crate) fn save_offer(&mut self, offer: Offer) {
        self.offers.insert(offer.id, offer);
    }

    /// Stage a history entry, chaining it to the newest entry of the same order.
    pub(crate) fn append_history(&mut self, mut entry: StatusHistoryEntry) -> Result<()> {
        self.require_order_lock(&entry.order_id)?;

        let staged = self
            .history
            .iter()
            .rev()
            .find(|staged| staged.order_id == entry.order_id);
        entry.prev_hash = match staged {
            Some(previous) => Some(previous.build()?.0),
            None => self.repo.audit.last_digest(&entry.order_id)?,
        };

        self.history.push(entry);
        Ok(())
    }

    /// Apply every staged write atomically, then release the locks.
    pub(crate) fn commit(self) -> Result<()> {
        let repo = self.repo;

        let mut orders = Vec::with_capacity(self.orders.len());
        for (id, order) in &self.orders {
            orders.push((id.as_bytes().to_vec(), minicbor::to_vec(order)?));
        }
        let mut offers = Vec::with_capacity(self.offers.len());
        let mut index = Vec::with_capacity(self.offers.len());
        for (id, offer) in &self.offers {
            offers.push((id.as_bytes().to_vec(), minicbor::to_vec(offer)?));
            index.push(OrderRepository::index_key(&offer.order_id, id));
        }
        let mut history = Vec::with_capacity(self.history.len());
        for entry in &self.history {
            let sequence = repo.instance.generate_id()?;
            history.push((AuditLog::key(&entry.order_id, sequence), entry.build()?.1));
        }

        (&repo.orders, &repo.offers, &repo.order_offers, repo.audit.tree())
            .transaction(|(tx_orders, tx_offers, tx_index, tx_history)| {
                for (key, value) in &orders {
                    tx_orders.insert(key.as_slice(), value.as_slice())?;
                }
                for (key, value) in &offers {
                    tx_offers.insert(key.as_slice(), value.as_slice())?;
                }
                for key in &index {
                    tx_index.insert(key.as_slice(), &[] as &[u8])?;
                }
                for (key, value) in &history {
                    tx_history.insert(key.as_slice(), value.as_slice())?;
                }
                Ok::<(), ConflictableTransactionError<Error>>(())
            })
            .map_err(|e| match e {
                TransactionError::Abort(e) => e,
                TransactionError::Storage(e) => Error::Storage(e),
            })?;

        tracing::debug!(
            orders = orders.len(),
            offers = offers.len(),
            history = history.len(),
            "Unit of work committed"
        );
        Ok(())
    }

    fn lock(&mut self, key: LockKey) -> Result<()> {
        if !self.guards.contains_key(&key) {
            let guard = self.repo.locks.acquire(key)?;
            self.guards.insert(key, guard);
        }
        Ok(())
    }

    fn require_order_lock(&self, order_id: &OrderId) -> Result<()> {
        if self.guards.contains_key(&LockKey::Order(*order_id)) {
            return Ok(());
        }
        Err(Error::LockOrder {
            entity: "order",
            id: order_id.to_string(),
        })
    }

    fn read_order(&self, id: &OrderId) -> Result<Option<Order>> {
        match self.orders.get(id) {
            Some(order) => Ok(Some(order.clone())),
            None => self.repo.load_order(id),
        }
    }

    fn read_offer(&self, id: &OfferId) -> Result<Option<Offer>> {
        match self.offers.get(id) {
            Some(offer) => Ok(Some(offer.clone())),
            None => self.repo.load_offer(id),
        }
    }
}
