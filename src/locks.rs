//! Process-wide named locks.
//!
//! ARM updates replace the whole object, so two concurrent read-modify-write
//! cycles against the same parent (a virtual network, a NAT gateway, ...)
//! silently drop one of the changes. Every such cycle holds the parent's
//! named lock for its full duration.
//!
//! Only operations inside this process are serialized.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

static REGISTRY: LazyLock<LockRegistry> = LazyLock::new(LockRegistry::default);

pub fn key(name: &str, resource_type: &str) -> String {
    format!("{}.{}", resource_type, name)
}

/// Locks `name` within `resource_type`, e.g. `by_name("vnet1", "azurerm_virtual_network")`.
pub async fn by_name(name: &str, resource_type: &str) -> NamedLock {
    REGISTRY.acquire(key(name, resource_type)).await
}

/// Locks several names of one resource type in sorted order.
pub async fn by_names(names: &[String], resource_type: &str) -> NamedLocks {
    let keys = names.iter().map(|n| key(n, resource_type)).collect();
    REGISTRY.acquire_many(keys).await
}

/// Locks several ARM resource IDs in sorted order. IDs compare case-insensitively.
pub async fn by_ids(ids: &[String]) -> NamedLocks {
    let keys = ids.iter().map(|id| id.to_lowercase()).collect();
    REGISTRY.acquire_many(keys).await
}

struct Entry {
    lock: Arc<AsyncMutex<()>>,
    refs: usize,
}

/// Maps a lock key to a reference-counted async mutex. Entries are dropped
/// once nobody holds or waits for them.
#[derive(Clone, Default)]
pub struct LockRegistry {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl LockRegistry {
    pub async fn acquire(&self, key: String) -> NamedLock {
        let ticket = self.checkout(key);

        tracing::trace!(key = %ticket.key, "waiting for lock");
        let guard = ticket.lock.clone().lock_owned().await;
        tracing::trace!(key = %ticket.key, "lock acquired");

        NamedLock {
            _guard: guard,
            ticket,
        }
    }

    /// Acquires every key, sorted and deduplicated, so that two callers
    /// asking for overlapping sets can never wait on each other in a cycle.
    pub async fn acquire_many(&self, mut keys: Vec<String>) -> NamedLocks {
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            guards.push(self.acquire(key).await);
        }
        NamedLocks { guards }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn checkout(&self, key: String) -> Ticket {
        let mut entries = self.entries.lock();
        let entry = entries.entry(key.clone()).or_insert_with(|| Entry {
            lock: Arc::new(AsyncMutex::new(())),
            refs: 0,
        });
        entry.refs += 1;

        Ticket {
            lock: entry.lock.clone(),
            key,
            registry: self.clone(),
        }
    }

    fn release(&self, key: &str) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.refs -= 1;
            if entry.refs == 0 {
                entries.remove(key);
            }
        }
    }
}

/// A claim on a registry entry; returned even if the acquiring future is
/// cancelled while waiting.
struct Ticket {
    lock: Arc<AsyncMutex<()>>,
    key: String,
    registry: LockRegistry,
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.registry.release(&self.key);
    }
}

/// Held lock. Unlocks on drop.
pub struct NamedLock {
    // field order matters: the mutex guard is released before the ticket
    _guard: OwnedMutexGuard<()>,
    ticket: Ticket,
}

impl NamedLock {
    pub fn key(&self) -> &str {
        &self.ticket.key
    }
}

impl std::fmt::Debug for NamedLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedLock").field("key", &self.key()).finish()
    }
}

/// Several held locks, released in reverse acquisition order.
#[derive(Debug)]
pub struct NamedLocks {
    guards: Vec<NamedLock>,
}

impl NamedLocks {
    pub fn keys(&self) -> Vec<&str> {
        self.guards.iter().map(|g| g.key()).collect()
    }
}

impl Drop for NamedLocks {
    fn drop(&mut self) {
        while let Some(guard) = self.guards.pop() {
            drop(guard);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_key_format() {
        assert_eq!(key("vnet1", "azurerm_virtual_network"), "azurerm_virtual_network.vnet1");
    }

    #[tokio::test]
    async fn test_entry_removed_after_release() {
        let registry = LockRegistry::default();
        {
            let lock = registry.acquire("a.b".to_string()).await;
            assert_eq!(lock.key(), "a.b");
            assert_eq!(registry.len(), 1);
        }
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_same_key_is_serialized() {
        let registry = LockRegistry::default();
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let active = active.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _lock = registry.acquire("azurerm_nat_gateway.nat1".to_string()).await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let registry = LockRegistry::default();
        let _a = registry.acquire("t.a".to_string()).await;
        let b = tokio::time::timeout(
            Duration::from_millis(100),
            registry.acquire("t.b".to_string()),
        )
        .await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_waiter_releases_entry() {
        let registry = LockRegistry::default();
        let held = registry.acquire("t.a".to_string()).await;

        let waiting = tokio::time::timeout(
            Duration::from_millis(20),
            registry.acquire("t.a".to_string()),
        )
        .await;
        assert!(waiting.is_err());

        drop(held);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_acquire_many_sorts_and_dedups() {
        let registry = LockRegistry::default();
        let locks = registry
            .acquire_many(vec!["c".to_string(), "a".to_string(), "b".to_string(), "a".to_string()])
            .await;
        assert_eq!(locks.keys(), vec!["a", "b", "c"]);
        assert_eq!(registry.len(), 3);
        drop(locks);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_sets_do_not_deadlock() {
        let registry = LockRegistry::default();
        let mut handles = Vec::new();
        for i in 0..10 {
            let registry = registry.clone();
            let keys = if i % 2 == 0 {
                vec!["x".to_string(), "y".to_string()]
            } else {
                vec!["y".to_string(), "x".to_string()]
            };
            handles.push(tokio::spawn(async move {
                let _locks = registry.acquire_many(keys).await;
                tokio::time::sleep(Duration::from_millis(1)).await;
            }));
        }

        let all = async {
            for handle in handles {
                handle.await.unwrap();
            }
        };
        assert!(tokio::time::timeout(Duration::from_secs(5), all).await.is_ok());
    }

    #[tokio::test]
    async fn test_global_helpers_use_resource_type_prefix() {
        let lock = by_name("nsg-locks-test", "azurerm_network_security_group").await;
        assert_eq!(lock.key(), "azurerm_network_security_group.nsg-locks-test");

        let locks = by_ids(&["/B".to_string(), "/a".to_string()]).await;
        assert_eq!(locks.keys(), vec!["/a", "/b"]);

        let names = by_names(&["rt2".to_string(), "rt1".to_string()], "azurerm_route_table").await;
        assert_eq!(
            names.keys(),
            vec!["azurerm_route_table.rt1", "azurerm_route_table.rt2"]
        );
    }
}
