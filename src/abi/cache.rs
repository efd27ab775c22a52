//! Process-wide mapping from deployed addresses to contract interfaces.
//!
//! Used to decode events raised by other contracts during a transaction,
//! provided those contracts were bound earlier in the same process.

use alloy::primitives::Address;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use super::definition::ContractAbi;

static GLOBAL: OnceLock<Arc<AbiCache>> = OnceLock::new();

#[derive(Debug, Default)]
struct Entries {
    by_address: HashMap<Address, Arc<ContractAbi>>,
    /// Registration order, oldest first; only maintained when bounded
    order: VecDeque<Address>,
}

/// Address → ABI registry. Re-registering an address replaces its ABI.
///
/// Unbounded unless built with [`AbiCache::bounded`], in which case the
/// least recently registered address is evicted first.
#[derive(Debug, Default)]
pub struct AbiCache {
    entries: RwLock<Entries>,
    capacity: Option<usize>,
}

impl AbiCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bounded(capacity: usize) -> Self {
        Self {
            entries: RwLock::default(),
            capacity: Some(capacity.max(1)),
        }
    }

    /// The shared process-wide cache.
    pub fn global() -> Arc<AbiCache> {
        GLOBAL.get_or_init(|| Arc::new(AbiCache::new())).clone()
    }

    pub fn register(&self, address: Address, abi: Arc<ContractAbi>) {
        let mut entries = self.write();
        let replaced = entries.by_address.insert(address, abi).is_some();
        debug!(
            "Registered ABI for {} ({})",
            address,
            if replaced { "replaced" } else { "new" }
        );

        if let Some(capacity) = self.capacity {
            entries.order.retain(|a| *a != address);
            entries.order.push_back(address);
            while entries.order.len() > capacity {
                if let Some(evicted) = entries.order.pop_front() {
                    entries.by_address.remove(&evicted);
                    debug!("Evicted ABI for {}", evicted);
                }
            }
        }
    }

    pub fn get(&self, address: &Address) -> Option<Arc<ContractAbi>> {
        self.read().by_address.get(address).cloned()
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.read().by_address.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.read().by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut entries = self.write();
        entries.by_address.clear();
        entries.order.clear();
    }

    // A panic while holding the lock cannot leave the maps half-updated in a
    // way that matters to readers, so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, Entries> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Entries> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    #[test]
    fn test_register_and_replace() {
        let cache = AbiCache::new();
        let first = Arc::new(ContractAbi::default());
        cache.register(address(1), first.clone());
        assert!(Arc::ptr_eq(&cache.get(&address(1)).unwrap(), &first));

        let second = Arc::new(ContractAbi::default());
        cache.register(address(1), second.clone());
        assert_eq!(cache.len(), 1);
        assert!(Arc::ptr_eq(&cache.get(&address(1)).unwrap(), &second));
        assert!(cache.get(&address(2)).is_none());
    }

    #[test]
    fn test_bounded_evicts_oldest_registration() {
        let cache = AbiCache::bounded(2);
        let abi = Arc::new(ContractAbi::default());
        cache.register(address(1), abi.clone());
        cache.register(address(2), abi.clone());
        cache.register(address(1), abi.clone());
        cache.register(address(3), abi);

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&address(1)));
        assert!(!cache.contains(&address(2)));
        assert!(cache.contains(&address(3)));
    }

    #[test]
    fn test_global_is_shared() {
        assert!(Arc::ptr_eq(&AbiCache::global(), &AbiCache::global()));
    }
}
