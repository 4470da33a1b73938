//! Process-wide named locks.
//!
//! Reconciliations that mutate a shared parent (addresses of one backend
//! pool, subnets of one network) serialize on a lock keyed by
//! `(name, kind)`. Waiters are served strictly in arrival order and a
//! thread may not re-acquire a lock it holds. The lock is released when
//! the guard drops, including during unwinding.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::{Condvar, LazyLock, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

#[derive(Debug, Default)]
struct Entry {
    next_ticket: u64,
    serving: u64,
    holder: Option<ThreadId>,
}

impl Entry {
    fn is_idle(&self) -> bool {
        self.holder.is_none() && self.serving == self.next_ticket
    }
}

type Key = (String, String);

struct Table {
    entries: Mutex<HashMap<Key, Entry>>,
    released: Condvar,
}

impl Table {
    fn lock(&self) -> MutexGuard<'_, HashMap<Key, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

static LOCKS: LazyLock<Table> = LazyLock::new(|| Table {
    entries: Mutex::new(HashMap::new()),
    released: Condvar::new(),
});

/// Holds a named lock until dropped.
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct NamedLockGuard {
    key: Key,
}

impl NamedLockGuard {
    /// Lock name.
    pub fn name(&self) -> &str {
        &self.key.0
    }

    /// Lock kind.
    pub fn kind(&self) -> &str {
        &self.key.1
    }

    /// Release the lock now.
    pub fn unlock(self) {
        drop(self);
    }
}

impl Drop for NamedLockGuard {
    fn drop(&mut self) {
        let mut entries = LOCKS.lock();
        if let Some(entry) = entries.get_mut(&self.key) {
            entry.holder = None;
            entry.serving += 1;
            if entry.is_idle() {
                entries.remove(&self.key);
            }
        }
        drop(entries);
        LOCKS.released.notify_all();
        log::debug!("released lock {} ({})", self.key.0, self.key.1);
    }
}

/// Acquire the lock `(name, kind)`, blocking until it is this caller's turn.
pub fn lock_by_name(name: &str, kind: &str) -> Result<NamedLockGuard> {
    let key = (name.to_string(), kind.to_string());
    let me = thread::current().id();

    let mut entries = LOCKS.lock();
    let entry = entries.entry(key.clone()).or_default();
    if entry.holder == Some(me) {
        return Err(Error::LockReentry {
            name: key.0,
            kind: key.1,
        });
    }
    let ticket = entry.next_ticket;
    entry.next_ticket += 1;

    log::debug!("waiting for lock {name} ({kind}), ticket {ticket}");
    let mut entries = LOCKS
        .released
        .wait_while(entries, |entries| {
            entries.get(&key).is_some_and(|e| e.serving != ticket)
        })
        .unwrap_or_else(PoisonError::into_inner);

    if let Some(entry) = entries.get_mut(&key) {
        entry.holder = Some(me);
    }
    log::debug!("acquired lock {name} ({kind})");

    Ok(NamedLockGuard { key })
}

/// Whether `(name, kind)` is currently held.
pub fn is_locked(name: &str, kind: &str) -> bool {
    LOCKS
        .lock()
        .get(&(name.to_string(), kind.to_string()))
        .is_some_and(|e| e.holder.is_some())
}
