//! In-memory chain used by the end-to-end tests.
//!
//! Every transaction is mined immediately in its own block. Deployments
//! remember the last 32 bytes of their creation data and `call` returns
//! them, which is enough for a constructor-set getter.

#![allow(dead_code)]

use alloy::primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use contract_dispatch::abi::{AbiCache, ContractAbi};
use contract_dispatch::ethereum::{
    CallParams, ChainRpc, LogFilter, RawLog, RawReceipt, TransactionSigner,
};
use contract_dispatch::{ChainContext, Contract, ContractError, Result, TransactionSettings, WatchSettings};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const GAS_ESTIMATE: u64 = 50_000;
pub const GAS_PRICE: u128 = 1_000_000_000;
pub const CHAIN_ID: u64 = 31337;

pub fn account() -> Address {
    Address::repeat_byte(0xaa)
}

/// A log to attach to the next mined transaction. `address: None` uses the
/// transaction's target (or the created contract).
#[derive(Debug, Clone)]
pub struct ScriptedLog {
    pub address: Option<Address>,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

#[derive(Debug, Default)]
struct State {
    block: u64,
    accounts: Vec<Address>,
    code: HashMap<Address, Bytes>,
    storage: HashMap<Address, Bytes>,
    nonces: HashMap<Address, u64>,
    receipts: HashMap<B256, RawReceipt>,
    logs: Vec<RawLog>,
    scripted: Vec<ScriptedLog>,
    revert_next: bool,
    failing_log_queries: u32,
    transactions: u64,
    sent: Vec<CallParams>,
}

#[derive(Debug)]
pub struct MemoryChain {
    state: Mutex<State>,
}

impl MemoryChain {
    pub fn new() -> Arc<Self> {
        Self::with_accounts(vec![account()])
    }

    pub fn with_accounts(accounts: Vec<Address>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                block: 1,
                accounts,
                ..Default::default()
            }),
        })
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn block(&self) -> u64 {
        self.state().block
    }

    /// Mine `count` empty blocks.
    pub fn mine(&self, count: u64) {
        self.state().block += count;
    }

    pub fn revert_next(&self) {
        self.state().revert_next = true;
    }

    /// Make the next `count` log queries fail.
    pub fn fail_next_logs(&self, count: u32) {
        self.state().failing_log_queries = count;
    }

    pub fn failing_log_queries(&self) -> u32 {
        self.state().failing_log_queries
    }

    pub fn script_logs(&self, logs: Vec<ScriptedLog>) {
        self.state().scripted.extend(logs);
    }

    /// Mine a block containing one log outside of any transaction.
    pub fn push_log(&self, address: Address, topics: Vec<B256>, data: Bytes) -> u64 {
        let mut state = self.state();
        state.block += 1;
        let block = state.block;
        let log_index = state.logs.len() as u64;
        state.logs.push(RawLog {
            address,
            topics,
            data,
            block_number: Some(block),
            log_index: Some(log_index),
            transaction_hash: None,
        });
        block
    }

    pub fn sent(&self) -> Vec<CallParams> {
        self.state().sent.clone()
    }

    fn mine_transaction(&self, params: &CallParams) -> B256 {
        let mut state = self.state();
        state.transactions += 1;
        state.block += 1;
        state.sent.push(params.clone());

        let hash = B256::left_padding_from(&state.transactions.to_be_bytes());
        let block = state.block;
        let from = params.from.unwrap_or_default();
        let nonce = *state.nonces.get(&from).unwrap_or(&0);
        state.nonces.insert(from, nonce + 1);

        let status = !std::mem::take(&mut state.revert_next);
        let scripted = std::mem::take(&mut state.scripted);

        let contract_address = match params.to {
            None if status => {
                let address = from.create(nonce);
                let data = &params.data;
                let tail = data[data.len().saturating_sub(32)..].to_vec();
                state.code.insert(address, params.data.clone());
                state.storage.insert(address, Bytes::from(tail));
                Some(address)
            }
            _ => None,
        };

        let mut logs = Vec::new();
        if status {
            for scripted in scripted {
                let log_index = state.logs.len() as u64;
                let log = RawLog {
                    address: scripted
                        .address
                        .or(params.to)
                        .or(contract_address)
                        .unwrap_or_default(),
                    topics: scripted.topics,
                    data: scripted.data,
                    block_number: Some(block),
                    log_index: Some(log_index),
                    transaction_hash: Some(hash),
                };
                state.logs.push(log.clone());
                logs.push(log);
            }
        }

        state.receipts.insert(
            hash,
            RawReceipt {
                transaction_hash: hash,
                block_number: Some(block),
                contract_address,
                status,
                gas_used: GAS_ESTIMATE,
                from,
                to: params.to,
                logs,
            },
        );
        hash
    }
}

#[async_trait]
impl ChainRpc for MemoryChain {
    async fn chain_id(&self) -> Result<u64> {
        Ok(CHAIN_ID)
    }

    async fn block_number(&self) -> Result<u64> {
        Ok(self.block())
    }

    async fn get_code(&self, address: Address, _block: Option<u64>) -> Result<Bytes> {
        Ok(self.state().code.get(&address).cloned().unwrap_or_default())
    }

    async fn gas_price(&self) -> Result<u128> {
        Ok(GAS_PRICE)
    }

    async fn estimate_gas(&self, _params: &CallParams) -> Result<u64> {
        Ok(GAS_ESTIMATE)
    }

    async fn call(&self, params: &CallParams, _block: Option<u64>) -> Result<Bytes> {
        let to = params.to.unwrap_or_default();
        Ok(self.state().storage.get(&to).cloned().unwrap_or_default())
    }

    async fn transaction_count(&self, address: Address) -> Result<u64> {
        Ok(*self.state().nonces.get(&address).unwrap_or(&0))
    }

    async fn send_transaction(&self, params: &CallParams) -> Result<B256> {
        Ok(self.mine_transaction(params))
    }

    async fn send_raw_transaction(&self, raw: &Bytes) -> Result<B256> {
        let params: CallParams =
            serde_json::from_slice(raw).map_err(|e| ContractError::Rpc(e.to_string()))?;
        Ok(self.mine_transaction(&params))
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<RawReceipt>> {
        Ok(self.state().receipts.get(&hash).cloned())
    }

    async fn past_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>> {
        let mut state = self.state();
        if state.failing_log_queries > 0 {
            state.failing_log_queries -= 1;
            return Err(ContractError::Rpc("connection reset".into()));
        }
        Ok(state
            .logs
            .iter()
            .filter(|log| filter.matches(log))
            .cloned()
            .collect())
    }

    async fn accounts(&self) -> Result<Vec<Address>> {
        Ok(self.state().accounts.clone())
    }
}

/// "Signs" by serialising the parameters as JSON, so the chain can read
/// back exactly what was signed.
#[derive(Debug, Default)]
pub struct RecordingSigner;

pub fn signer_address() -> Address {
    Address::repeat_byte(0x42)
}

#[async_trait]
impl TransactionSigner for RecordingSigner {
    fn address(&self, _private_key: &str) -> Result<Address> {
        Ok(signer_address())
    }

    async fn sign(&self, _private_key: &str, params: &CallParams) -> Result<Bytes> {
        let mut params = params.clone();
        params.from = Some(signer_address());
        let json = serde_json::to_vec(&params).map_err(|e| ContractError::Signing(e.to_string()))?;
        Ok(Bytes::from(json))
    }
}

/// Fast polling so lifecycle tests settle quickly.
pub fn fast_settings() -> TransactionSettings {
    TransactionSettings {
        receipt_poll: Duration::from_millis(5),
        confirmation_poll: Duration::from_millis(5),
        ..Default::default()
    }
}

pub fn fast_watch() -> WatchSettings {
    WatchSettings {
        poll_rate: Duration::from_millis(10),
    }
}

/// A context over `chain` with its own ABI cache and the recording signer.
pub fn context(chain: &Arc<MemoryChain>) -> ChainContext {
    ChainContext::new(chain.clone())
        .with_signer(Arc::new(RecordingSigner))
        .with_cache(Arc::new(AbiCache::new()))
}

pub fn contract(abi: &str, context: ChainContext) -> Contract {
    Contract::new(ContractAbi::from_json(abi).unwrap(), context)
        .with_settings(fast_settings())
        .with_watch_settings(fast_watch())
}

pub const STORE_ABI: &str = r#"[
    {"type": "constructor", "stateMutability": "nonpayable",
     "inputs": [{"name": "initial", "type": "uint256"}]},
    {"type": "function", "name": "value", "stateMutability": "view",
     "inputs": [], "outputs": [{"name": "", "type": "uint256"}]},
    {"type": "function", "name": "f", "stateMutability": "nonpayable",
     "inputs": [], "outputs": []},
    {"type": "function", "name": "f", "stateMutability": "nonpayable",
     "inputs": [{"name": "x", "type": "uint256"}], "outputs": []},
    {"type": "event", "name": "Stored", "anonymous": false,
     "inputs": [{"name": "who", "type": "address", "indexed": true},
                {"name": "amount", "type": "uint256", "indexed": false}]}
]"#;

pub const TOKEN_ABI: &str = r#"[
    {"type": "function", "name": "transfer", "stateMutability": "nonpayable",
     "inputs": [{"name": "to", "type": "address"}, {"name": "amount", "type": "uint256"}],
     "outputs": [{"name": "", "type": "bool"}]},
    {"type": "event", "name": "Transfer", "anonymous": false,
     "inputs": [{"name": "from", "type": "address", "indexed": true},
                {"name": "to", "type": "address", "indexed": true},
                {"name": "value", "type": "uint256", "indexed": false}]}
]"#;

pub fn address_topic(address: Address) -> B256 {
    address.into_word()
}

pub fn amount_data(amount: u64) -> Bytes {
    Bytes::from(B256::left_padding_from(&amount.to_be_bytes()).to_vec())
}
