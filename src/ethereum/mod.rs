pub mod provider;
pub mod resolver;
pub mod signer;
pub mod utils;

use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

pub use provider::{AlloyRpc, ChainRpc, ProviderManager};
pub use resolver::{NameResolver, StaticNameResolver};
pub use signer::{LocalSigner, TransactionSigner};

/// Parameters of a call, estimate or transaction as handed to the chain.
/// A missing `to` means contract creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallParams {
    pub from: Option<Address>,
    pub to: Option<Address>,
    pub data: Bytes,
    pub value: Option<U256>,
    pub gas: Option<u64>,
    pub gas_price: Option<u128>,
    pub nonce: Option<u64>,
    pub chain_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: Option<u64>,
    pub log_index: Option<u64>,
    pub transaction_hash: Option<B256>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawReceipt {
    pub transaction_hash: B256,
    pub block_number: Option<u64>,
    pub contract_address: Option<Address>,
    pub status: bool,
    pub gas_used: u64,
    pub from: Address,
    pub to: Option<Address>,
    pub logs: Vec<RawLog>,
}

/// An `eth_getLogs` filter over an inclusive block range.
///
/// `topics[i] == None` matches any value at position `i`; logs may carry
/// more topics than the filter names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Option<Address>,
    pub from_block: u64,
    pub to_block: u64,
    pub topics: Vec<Option<B256>>,
}

impl LogFilter {
    pub fn matches(&self, log: &RawLog) -> bool {
        if self.address.is_some_and(|a| a != log.address) {
            return false;
        }
        if let Some(block) = log.block_number {
            if block < self.from_block || block > self.to_block {
                return false;
            }
        }
        self.topics.iter().enumerate().all(|(i, wanted)| match wanted {
            None => true,
            Some(topic) => log.topics.get(i) == Some(topic),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_matching() {
        let log = RawLog {
            address: Address::repeat_byte(1),
            topics: vec![B256::repeat_byte(0xaa), B256::repeat_byte(0xbb)],
            data: Bytes::new(),
            block_number: Some(10),
            log_index: Some(0),
            transaction_hash: None,
        };
        let mut filter = LogFilter {
            address: Some(Address::repeat_byte(1)),
            from_block: 5,
            to_block: 10,
            topics: vec![Some(B256::repeat_byte(0xaa))],
        };
        assert!(filter.matches(&log));

        filter.topics = vec![None, Some(B256::repeat_byte(0xbb)), None];
        assert!(filter.matches(&log));

        filter.topics = vec![None, Some(B256::repeat_byte(0xcc))];
        assert!(!filter.matches(&log));

        filter.topics.clear();
        filter.to_block = 9;
        assert!(!filter.matches(&log));
    }
}
