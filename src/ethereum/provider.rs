use crate::config::{Config, NetworkConfig};
use crate::error::{ContractError, Result};
use alloy::{
    eips::BlockId,
    network::TransactionBuilder,
    primitives::{Address, Bytes, B256},
    providers::{Provider, ProviderBuilder, RootProvider},
    rpc::types::{Filter, Log, TransactionReceipt, TransactionRequest},
    transports::http::{Client, Http},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::{CallParams, LogFilter, RawLog, RawReceipt};

/// The JSON-RPC surface the contract layer consumes.
///
/// `block` arguments of `None` mean the latest block.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn chain_id(&self) -> Result<u64>;
    async fn block_number(&self) -> Result<u64>;
    async fn get_code(&self, address: Address, block: Option<u64>) -> Result<Bytes>;
    async fn gas_price(&self) -> Result<u128>;
    async fn estimate_gas(&self, params: &CallParams) -> Result<u64>;
    async fn call(&self, params: &CallParams, block: Option<u64>) -> Result<Bytes>;
    async fn transaction_count(&self, address: Address) -> Result<u64>;
    /// Submit for signing by the node; yields the transaction hash.
    async fn send_transaction(&self, params: &CallParams) -> Result<B256>;
    async fn send_raw_transaction(&self, raw: &Bytes) -> Result<B256>;
    /// `None` until the transaction is mined.
    async fn transaction_receipt(&self, hash: B256) -> Result<Option<RawReceipt>>;
    async fn past_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>>;
    async fn accounts(&self) -> Result<Vec<Address>>;
}

/// [`ChainRpc`] over an alloy HTTP provider.
#[derive(Debug, Clone)]
pub struct AlloyRpc {
    provider: RootProvider<Http<Client>>,
}

impl AlloyRpc {
    pub fn new(provider: RootProvider<Http<Client>>) -> Self {
        Self { provider }
    }

    pub fn connect(rpc_url: &str) -> Result<Self> {
        let url = rpc_url
            .parse()
            .map_err(|e| ContractError::Rpc(format!("invalid RPC URL '{}': {}", rpc_url, e)))?;
        Ok(Self::new(ProviderBuilder::new().on_http(url)))
    }

    pub fn provider(&self) -> &RootProvider<Http<Client>> {
        &self.provider
    }
}

fn to_request(params: &CallParams) -> TransactionRequest {
    let mut request = TransactionRequest::default().input(params.data.clone().into());
    if let Some(from) = params.from {
        request = request.from(from);
    }
    if let Some(to) = params.to {
        request = request.to(to);
    }
    if let Some(value) = params.value {
        request = request.value(value);
    }
    if let Some(gas) = params.gas {
        request = request.with_gas_limit(gas);
    }
    if let Some(gas_price) = params.gas_price {
        request = request.with_gas_price(gas_price);
    }
    if let Some(nonce) = params.nonce {
        request = request.with_nonce(nonce);
    }
    if let Some(chain_id) = params.chain_id {
        request = request.with_chain_id(chain_id);
    }
    request
}

fn block_id(block: Option<u64>) -> BlockId {
    block.map(BlockId::number).unwrap_or_else(BlockId::latest)
}

fn to_filter(filter: &LogFilter) -> Filter {
    let mut rpc_filter = Filter::new()
        .from_block(filter.from_block)
        .to_block(filter.to_block);
    if let Some(address) = filter.address {
        rpc_filter = rpc_filter.address(address);
    }
    for (position, topic) in filter.topics.iter().enumerate() {
        let Some(topic) = *topic else { continue };
        rpc_filter = match position {
            0 => rpc_filter.event_signature(topic),
            1 => rpc_filter.topic1(topic),
            2 => rpc_filter.topic2(topic),
            3 => rpc_filter.topic3(topic),
            _ => rpc_filter,
        };
    }
    rpc_filter
}

fn from_log(log: &Log) -> RawLog {
    RawLog {
        address: log.address(),
        topics: log.topics().to_vec(),
        data: log.data().data.clone(),
        block_number: log.block_number,
        log_index: log.log_index,
        transaction_hash: log.transaction_hash,
    }
}

fn from_receipt(receipt: &TransactionReceipt) -> RawReceipt {
    RawReceipt {
        transaction_hash: receipt.transaction_hash,
        block_number: receipt.block_number,
        contract_address: receipt.contract_address,
        status: receipt.status(),
        gas_used: receipt.gas_used as u64,
        from: receipt.from,
        to: receipt.to,
        logs: receipt.inner.logs().iter().map(from_log).collect(),
    }
}

#[async_trait]
impl ChainRpc for AlloyRpc {
    async fn chain_id(&self) -> Result<u64> {
        self.provider.get_chain_id().await.map_err(ContractError::rpc)
    }

    async fn block_number(&self) -> Result<u64> {
        self.provider.get_block_number().await.map_err(ContractError::rpc)
    }

    async fn get_code(&self, address: Address, block: Option<u64>) -> Result<Bytes> {
        self.provider
            .get_code_at(address)
            .block_id(block_id(block))
            .await
            .map_err(ContractError::rpc)
    }

    async fn gas_price(&self) -> Result<u128> {
        self.provider.get_gas_price().await.map_err(ContractError::rpc)
    }

    async fn estimate_gas(&self, params: &CallParams) -> Result<u64> {
        self.provider
            .estimate_gas(&to_request(params))
            .await
            .map_err(ContractError::rpc)
    }

    async fn call(&self, params: &CallParams, block: Option<u64>) -> Result<Bytes> {
        self.provider
            .call(&to_request(params))
            .block(block_id(block))
            .await
            .map_err(ContractError::rpc)
    }

    async fn transaction_count(&self, address: Address) -> Result<u64> {
        self.provider
            .get_transaction_count(address)
            .await
            .map_err(ContractError::rpc)
    }

    async fn send_transaction(&self, params: &CallParams) -> Result<B256> {
        let pending = self
            .provider
            .send_transaction(to_request(params))
            .await
            .map_err(ContractError::rpc)?;
        let hash = *pending.tx_hash();
        debug!("Submitted transaction 0x{:x}", hash);
        Ok(hash)
    }

    async fn send_raw_transaction(&self, raw: &Bytes) -> Result<B256> {
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(ContractError::rpc)?;
        let hash = *pending.tx_hash();
        debug!("Submitted signed transaction 0x{:x}", hash);
        Ok(hash)
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<RawReceipt>> {
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(ContractError::rpc)?;
        Ok(receipt.as_ref().map(from_receipt))
    }

    async fn past_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>> {
        let logs = self
            .provider
            .get_logs(&to_filter(filter))
            .await
            .map_err(ContractError::rpc)?;
        Ok(logs.iter().map(from_log).collect())
    }

    async fn accounts(&self) -> Result<Vec<Address>> {
        self.provider.get_accounts().await.map_err(ContractError::rpc)
    }
}

/// One RPC collaborator per configured network.
#[derive(Debug)]
pub struct ProviderManager {
    providers: HashMap<String, Arc<AlloyRpc>>,
    config: Config,
}

impl ProviderManager {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let mut providers = HashMap::new();

        for (network_name, network_config) in &config.networks {
            let rpc = Self::create_provider(network_config)?;
            providers.insert(network_name.clone(), Arc::new(rpc));
        }

        Ok(Self { providers, config })
    }

    fn create_provider(network_config: &NetworkConfig) -> anyhow::Result<AlloyRpc> {
        Ok(AlloyRpc::connect(&network_config.rpc_url)?)
    }

    pub fn get_provider(&self, network: Option<&str>) -> anyhow::Result<Arc<AlloyRpc>> {
        let network_name = network.unwrap_or(&self.config.default_network);
        self.providers
            .get(network_name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Network '{}' not found", network_name))
    }

    pub fn get_network_config(&self, network: Option<&str>) -> anyhow::Result<&NetworkConfig> {
        let network_name = network.unwrap_or(&self.config.default_network);
        self.config
            .networks
            .get(network_name)
            .ok_or_else(|| anyhow::anyhow!("Network '{}' not configured", network_name))
    }

    pub fn get_available_networks(&self) -> Vec<String> {
        let mut names: Vec<String> = self.config.networks.keys().cloned().collect();
        names.sort();
        names
    }

    /// Validates network connectivity with detailed error information
    pub async fn validate_network_connection(&self, network: Option<&str>) -> anyhow::Result<u64> {
        let network_name = network.unwrap_or(&self.config.default_network);
        let rpc = self
            .get_provider(network)
            .map_err(|e| anyhow::anyhow!("Network '{}' is not configured: {}", network_name, e))?;

        rpc.block_number().await.map_err(|e| {
            anyhow::anyhow!(
                "Cannot connect to network '{}': {}. Please check your RPC endpoint configuration and network connectivity.",
                network_name,
                super::utils::interpret_rpc_error(&e.to_string())
            )
        })
    }
}
