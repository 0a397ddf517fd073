//! Session store — process-wide map from user id to the active intake session.
//!
//! Each user id owns one slot guarded by its own async mutex. Holding the
//! slot guard is the per-user critical section: read step, validate, write
//! the next step or finalize. Different users only meet on the brief map
//! lookup.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info};

use super::state::Session;

/// Exclusive access to one user's slot. `None` means no flow is active.
pub type SessionSlot = OwnedMutexGuard<Option<Session>>;

/// Per-user session map with optional idle expiry.
pub struct SessionStore {
    slots: RwLock<HashMap<String, Arc<Mutex<Option<Session>>>>>,
    ttl: Option<chrono::Duration>,
}

impl SessionStore {
    /// Create a store. `ttl = None` keeps abandoned sessions forever.
    pub fn new(ttl: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            slots: RwLock::new(HashMap::new()),
            ttl: ttl.and_then(|d| chrono::Duration::from_std(d).ok()),
        })
    }

    /// Lock the slot for `user_id`, creating it if needed.
    ///
    /// A session idle past the TTL is dropped here, so expiry does not depend
    /// on the sweep having run.
    pub async fn lock(&self, user_id: &str) -> SessionSlot {
        let slot = self.slot(user_id).await;
        self.acquire(user_id, slot).await
    }

    /// Lock the slot for `user_id` only if one exists. Never creates a slot,
    /// so text from users without a flow leaves no trace in the map.
    pub async fn lock_existing(&self, user_id: &str) -> Option<SessionSlot> {
        let slot = self.slots.read().await.get(user_id).cloned()?;
        Some(self.acquire(user_id, slot).await)
    }

    /// Release `slot`. If it holds no session and nobody else holds or waits
    /// on it, the user's entry is removed from the map.
    pub async fn release(&self, user_id: &str, slot: SessionSlot) {
        let active = slot.is_some();
        drop(slot);
        if active {
            return;
        }
        let mut slots = self.slots.write().await;
        let idle = slots.get(user_id).is_some_and(|entry| {
            Arc::strong_count(entry) == 1 && entry.try_lock().is_ok_and(|guard| guard.is_none())
        });
        if idle {
            slots.remove(user_id);
        }
    }

    /// Snapshot of a user's session, if one is active.
    pub async fn get(&self, user_id: &str) -> Option<Session> {
        let slot = self.slots.read().await.get(user_id).cloned()?;
        let guard = slot.lock().await;
        guard
            .as_ref()
            .filter(|s| !self.is_expired(Some(s)))
            .cloned()
    }

    /// Number of users with an active session.
    pub async fn active_count(&self) -> usize {
        let slots: Vec<_> = self.slots.read().await.values().cloned().collect();
        let mut count = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                count += 1;
            }
        }
        count
    }

    /// Drop sessions idle past the TTL and forget unused slots.
    /// Returns the number of sessions expired.
    pub async fn prune_expired(&self) -> usize {
        let mut slots = self.slots.write().await;
        let mut expired = 0;

        slots.retain(|user_id, slot| {
            // A slot someone holds or waits on is in use; leave it.
            let Ok(mut guard) = slot.try_lock() else {
                return true;
            };
            if self.is_expired(guard.as_ref()) {
                debug!(user_id = %user_id, "Expiring idle session");
                *guard = None;
                expired += 1;
            }
            let in_use = guard.is_some();
            drop(guard);
            in_use || Arc::strong_count(slot) > 1
        });

        if expired > 0 {
            info!(expired, "Pruned idle sessions");
        }
        expired
    }

    async fn slot(&self, user_id: &str) -> Arc<Mutex<Option<Session>>> {
        if let Some(slot) = self.slots.read().await.get(user_id) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().await;
        Arc::clone(
            slots
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(None))),
        )
    }

    async fn acquire(&self, user_id: &str, slot: Arc<Mutex<Option<Session>>>) -> SessionSlot {
        let mut guard = slot.lock_owned().await;
        if self.is_expired(guard.as_ref()) {
            info!(user_id, "Session expired before next message");
            *guard = None;
        }
        guard
    }

    #[cfg(test)]
    pub(crate) async fn slot_count(&self) -> usize {
        self.slots.read().await.len()
    }

    fn is_expired(&self, session: Option<&Session>) -> bool {
        match (self.ttl, session) {
            (Some(ttl), Some(session)) => session.idle_for(Utc::now()) > ttl,
            _ => false,
        }
    }
}

/// Spawn the periodic idle-session sweep.
pub fn spawn_expiry_task(store: Arc<SessionStore>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Skip immediate first tick
        ticker.tick().await;

        loop {
            ticker.tick().await;
            store.prune_expired().await;
        }
    })
}
