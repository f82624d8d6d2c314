//! Write-once key value store with rendezvous reads.
//!
//! A `get` on a key that has not been written yet suspends until some caller
//! `set`s it or the wait budget runs out. Each awaited key owns a `watch`
//! channel; `set` publishes the value into it and drops the slot.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{KvError, Result};

pub const DEFAULT_WAIT: Duration = Duration::from_millis(3000);
pub const MAX_WAIT: Duration = Duration::from_secs(10 * 60);

/// How long a pending `get` may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Used when the caller gives no budget.
    pub default_wait: Duration,
    /// Upper bound on any budget.
    pub max_wait: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            default_wait: DEFAULT_WAIT,
            max_wait: MAX_WAIT,
        }
    }
}

impl WaitPolicy {
    pub fn resolve(&self, requested: Option<Duration>) -> Duration {
        requested.unwrap_or(self.default_wait).min(self.max_wait)
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, String>,
    waiters: HashMap<String, watch::Sender<Option<String>>>,
}

#[derive(Default)]
pub struct Store {
    inner: Mutex<Inner>,
    policy: WaitPolicy,
}

impl Store {
    pub fn new(policy: WaitPolicy) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            policy,
        }
    }

    pub fn policy(&self) -> WaitPolicy {
        self.policy
    }

    /// Inserts `key` if it has no value yet and wakes its readers.
    pub fn set(&self, key: String, value: String) -> Result<()> {
        if key.is_empty() {
            return Err(KvError::InvalidArgument("empty key".into()));
        }

        let mut inner = self.lock();
        if inner.entries.contains_key(&key) {
            return Err(KvError::AlreadyExists(key));
        }
        inner.entries.insert(key.clone(), value.clone());

        if let Some(slot) = inner.waiters.remove(&key) {
            debug!(%key, readers = slot.receiver_count(), "Wake readers");
            slot.send_replace(Some(value));
        }
        Ok(())
    }

    /// Returns the value of `key`, waiting up to `timeout` from now for it to
    /// be set.
    pub async fn get(&self, key: &str, timeout: Duration) -> Result<String> {
        if key.is_empty() {
            return Err(KvError::InvalidArgument("empty key".into()));
        }
        // `None` when the budget is too large to represent: wait without limit.
        let deadline = Instant::now().checked_add(timeout);

        let mut waiter = {
            let mut inner = self.lock();
            if let Some(value) = inner.entries.get(key) {
                return Ok(value.clone());
            }
            // Subscribing under the lock means a concurrent `set` either
            // happened before (value seen above) or will publish to us.
            let rx = inner
                .waiters
                .entry(key.to_owned())
                .or_insert_with(|| watch::channel(None).0)
                .subscribe();
            Waiter {
                store: self,
                key,
                rx: Some(rx),
            }
        };
        debug!(%key, ?timeout, "Wait for key");

        let outcome = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, waiter.wait()).await,
            None => Ok(waiter.wait().await),
        };
        drop(waiter);

        match outcome {
            Ok(Some(value)) => Ok(value),
            Ok(None) => {
                let value = self.lock().entries.get(key).cloned();
                value.ok_or_else(|| KvError::Internal(format!("waiter for {key} closed")))
            }
            Err(_) => {
                debug!(%key, "Wait deadline exceeded");
                Err(KvError::DeadlineExceeded(key.to_owned()))
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of keys that currently have at least one suspended reader.
    pub fn pending_keys(&self) -> usize {
        self.lock().waiters.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A suspended reader. Dropping it releases the key's slot once no other
/// reader is left, whether the read finished, timed out or was cancelled.
struct Waiter<'a> {
    store: &'a Store,
    key: &'a str,
    rx: Option<watch::Receiver<Option<String>>>,
}

impl Waiter<'_> {
    /// `None` means the slot went away without a value.
    async fn wait(&mut self) -> Option<String> {
        let rx = self.rx.as_mut()?;
        loop {
            let current = rx.borrow_and_update().clone();
            if current.is_some() {
                return current;
            }
            if rx.changed().await.is_err() {
                return rx.borrow().clone();
            }
        }
    }
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        drop(self.rx.take());
        let mut inner = self.store.lock();
        let unused = inner
            .waiters
            .get(self.key)
            .map_or(false, |slot| slot.receiver_count() == 0);
        if unused {
            inner.waiters.remove(self.key);
        }
    }
}
