//! Per-identity exclusion for renders, cache restores and evictions.
//!
//! At most one task works on a given identity at a time. A second request for
//! an identity that is being rendered waits for the first one and then finds
//! the result in the cache instead of rendering again.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct InFlight {
    slots: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Exclusive hold on one identity. Released on drop.
#[derive(Debug)]
pub struct SlotGuard<'a> {
    registry: &'a InFlight,
    identity: String,
    slot: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, identity: &str) -> Arc<AsyncMutex<()>> {
        let mut slots = self.slots.lock();
        Arc::clone(slots.entry(identity.to_string()).or_default())
    }

    /// Waits until no other task holds `identity`.
    pub async fn acquire(&self, identity: &str) -> SlotGuard<'_> {
        let mut entry = SlotGuard {
            registry: self,
            identity: identity.to_string(),
            slot: self.slot(identity),
            guard: None,
        };
        let guard = Arc::clone(&entry.slot).lock_owned().await;
        entry.guard = Some(guard);
        entry
    }

    /// Takes `identity` only if nobody holds it right now.
    pub fn try_acquire(&self, identity: &str) -> Option<SlotGuard<'_>> {
        let mut entry = SlotGuard {
            registry: self,
            identity: identity.to_string(),
            slot: self.slot(identity),
            guard: None,
        };
        let guard = Arc::clone(&entry.slot).try_lock_owned().ok()?;
        entry.guard = Some(guard);
        Some(entry)
    }

    /// Number of identities currently held or waited on.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();

        // Registry lock held: nobody can clone the slot while we count.
        let mut slots = self.registry.slots.lock();
        if Arc::strong_count(&self.slot) <= 2 {
            slots.remove(&self.identity);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn released_slots_are_forgotten() {
        let in_flight = InFlight::new();
        {
            let _guard = in_flight.acquire("abcsvg").await;
            assert_eq!(in_flight.len(), 1);
        }
        assert!(in_flight.is_empty());
    }

    #[tokio::test]
    async fn try_acquire_fails_while_held() {
        let in_flight = InFlight::new();
        let guard = in_flight.acquire("abcsvg").await;

        assert!(in_flight.try_acquire("abcsvg").is_none());
        assert!(in_flight.try_acquire("defsvg").is_some());

        drop(guard);
        assert!(in_flight.try_acquire("abcsvg").is_some());
        assert!(in_flight.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn second_acquire_waits_for_first() {
        let in_flight = Arc::new(InFlight::new());
        let guard = in_flight.acquire("abcsvg").await;

        let waiter = {
            let in_flight = Arc::clone(&in_flight);
            tokio::spawn(async move {
                let _guard = in_flight.acquire("abcsvg").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
        assert!(in_flight.is_empty());
    }
}
