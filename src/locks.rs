//! Per-record exclusive locks with a bounded wait.
//!
//! A [`RowGuard`] is held for the lifetime of a unit of work and releases its
//! row when dropped, whether the work was committed or abandoned.
use super::error::{Error, Result};
use super::types::{OfferId, OrderId};
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKey {
    Order(OrderId),
    Offer(OfferId),
}

impl LockKey {
    pub fn entity(&self) -> &'static str {
        match self {
            LockKey::Order(_) => "order",
            LockKey::Offer(_) => "offer",
        }
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockKey::Order(id) => id.fmt(f),
            LockKey::Offer(id) => id.fmt(f),
        }
    }
}

#[derive(Default)]
struct RowLock {
    held: Mutex<bool>,
    released: Condvar,
}

type Rows = Arc<DashMap<LockKey, Arc<RowLock>>>;

pub struct LockTable {
    rows: Rows,
    timeout: Duration,
}

impl LockTable {
    pub fn new(timeout: Duration) -> Self {
        Self {
            rows: Arc::new(DashMap::new()),
            timeout,
        }
    }

    /// Blocks until `key` is free or the timeout elapses.
    pub fn acquire(&self, key: LockKey) -> Result<RowGuard> {
        let lock = self.rows.entry(key).or_default().value().clone();
        let deadline = Instant::now() + self.timeout;

        let mut held = lock.held.lock();
        while *held {
            if lock.released.wait_until(&mut held, deadline).timed_out() && *held {
                tracing::warn!(entity = key.entity(), id = %key, "Lock wait timed out");
                return Err(Error::LockTimeout {
                    entity: key.entity(),
                    id: key.to_string(),
                });
            }
        }
        *held = true;
        drop(held);

        tracing::debug!(entity = key.entity(), id = %key, "Lock acquired");
        Ok(RowGuard {
            key,
            lock,
            rows: Arc::clone(&self.rows),
        })
    }

    /// Number of rows currently tracked, held or waited on.
    pub fn tracked(&self) -> usize {
        self.rows.len()
    }
}

pub struct RowGuard {
    key: LockKey,
    lock: Arc<RowLock>,
    rows: Rows,
}

impl RowGuard {
    pub fn key(&self) -> LockKey {
        self.key
    }
}

impl Drop for RowGuard {
    fn drop(&mut self) {
        *self.lock.held.lock() = false;
        self.lock.released.notify_one();

        // the table and this guard are the only owners when nobody is waiting
        self.rows
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_times_out_while_held() {
        let table = LockTable::new(Duration::from_millis(50));
        let key = LockKey::Order(OrderId::new());

        let guard = table.acquire(key).unwrap();
        let err = table.acquire(key).err().unwrap();
        assert!(matches!(err, Error::LockTimeout { entity: "order", .. }));

        drop(guard);
        assert!(table.acquire(key).is_ok());
    }

    #[test]
    fn different_rows_do_not_block() {
        let table = LockTable::new(Duration::from_millis(50));

        let _a = table.acquire(LockKey::Order(OrderId::new())).unwrap();
        let _b = table.acquire(LockKey::Order(OrderId::new())).unwrap();
        let _c = table.acquire(LockKey::Offer(OfferId::new())).unwrap();
        assert_eq!(table.tracked(), 3);
    }

    #[test]
    fn released_rows_are_forgotten() {
        let table = LockTable::new(Duration::from_millis(50));

        let guard = table.acquire(LockKey::Offer(OfferId::new())).unwrap();
        assert_eq!(table.tracked(), 1);
        drop(guard);
        assert_eq!(table.tracked(), 0);
    }

    #[test]
    fn waiter_gets_the_row_after_release() {
        let table = LockTable::new(Duration::from_secs(5));
        let key = LockKey::Order(OrderId::new());
        let guard = table.acquire(key).unwrap();

        std::thread::scope(|s| {
            let waiter = s.spawn(|| table.acquire(key).map(|g| g.key()));
            std::thread::sleep(Duration::from_millis(20));
            drop(guard);
            assert_eq!(waiter.join().unwrap().unwrap(), key);
        });
    }
}
