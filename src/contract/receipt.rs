use alloy::primitives::{Address, B256};
use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::debug;

use super::Contract;
use crate::abi::codec::decode_log_item_args;
use crate::abi::{AbiDefinition, ContractAbi, DecodedTuple};
use crate::error::Result;
use crate::ethereum::{RawLog, RawReceipt};

fn checksummed<S: Serializer>(address: &Address, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&address.to_checksum(None))
}

/// A log decoded against an event definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedEvent {
    pub name: String,
    pub signature: String,
    pub args: DecodedTuple,
    #[serde(serialize_with = "checksummed")]
    pub address: Address,
    pub block_number: Option<u64>,
    pub log_index: Option<u64>,
    pub transaction_hash: Option<B256>,
}

impl DecodedEvent {
    pub fn decode(definition: &AbiDefinition, log: &RawLog) -> Result<Self> {
        Ok(Self {
            name: definition.name().to_string(),
            signature: definition.signature().to_string(),
            args: decode_log_item_args(definition, log)?,
            address: log.address,
            block_number: log.block_number,
            log_index: log.log_index,
            transaction_hash: log.transaction_hash,
        })
    }

    /// Decode with whichever event of `abi` the log's first topic names.
    /// `None` for anonymous or unknown events and for malformed logs.
    pub fn decode_with(abi: &ContractAbi, log: &RawLog) -> Option<Self> {
        let definition = abi.event_by_topic(log.topics.first()?)?;
        match Self::decode(definition, log) {
            Ok(event) => Some(event),
            Err(e) => {
                debug!("Skipping log {:?} from {}: {}", log.log_index, log.address, e);
                None
            }
        }
    }

    /// Name equality plus loose argument matching (see [`DecodedTuple::matches`]).
    pub fn matches(&self, name: &str, filter: &Value) -> bool {
        self.name == name && self.args.matches(filter)
    }
}

/// A mined receipt with the events that could be decoded from its logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    #[serde(flatten)]
    pub raw: RawReceipt,
    pub events: Vec<DecodedEvent>,
}

impl Receipt {
    /// Logs from the contract itself use its ABI; logs from other addresses
    /// use the ABI cache. Logs from unknown addresses are skipped.
    pub fn decode(contract: &Contract, raw: RawReceipt) -> Self {
        let primary = raw.contract_address.or_else(|| contract.address());
        let cache = &contract.context().cache;

        let events = raw
            .logs
            .iter()
            .filter_map(|log| {
                if Some(log.address) == primary {
                    DecodedEvent::decode_with(contract.abi(), log)
                } else {
                    let abi = cache.get(&log.address)?;
                    DecodedEvent::decode_with(&abi, log)
                }
            })
            .collect();

        Self { raw, events }
    }

    pub fn transaction_hash(&self) -> B256 {
        self.raw.transaction_hash
    }

    pub fn block_number(&self) -> Option<u64> {
        self.raw.block_number
    }

    pub fn contract_address(&self) -> Option<Address> {
        self.raw.contract_address
    }

    pub fn status(&self) -> bool {
        self.raw.status
    }

    pub fn find_event(&self, name: &str, filter: &Value) -> Option<&DecodedEvent> {
        self.events.iter().find(|e| e.matches(name, filter))
    }

    pub fn find_events(&self, name: &str, filter: &Value) -> Vec<&DecodedEvent> {
        self.events.iter().filter(|e| e.matches(name, filter)).collect()
    }
}
