use anyhow::{anyhow, Result};
use rmcp::{
    model::{ServerCapabilities, ServerInfo},
    tool,
    transport::stdio,
    ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};

use crate::{
    abi::{AbiCache, Artifact, CallArgs, CallOutput},
    config::Config,
    contract::{
        BoundCall, CallOptions, ChainContext, Contract, DecodedEvent, EventOptions, EventWatch,
        Receipt,
    },
    error::ContractError,
    ethereum::{provider::ProviderManager, utils, StaticNameResolver},
};

/// Where a contract lives: its artifact on disk, an optional address and
/// the network to talk to.
#[derive(Debug, Clone, Default)]
pub struct ContractTarget {
    pub artifact: String,
    pub address: Option<String>,
    pub network: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ContractDispatchServer {
    providers: Arc<ProviderManager>,
    names: Arc<StaticNameResolver>,
    cache: Arc<AbiCache>,
    config: Arc<Config>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct EncodeCallRequest {
    /// Path to an ABI or build artifact JSON file
    artifact: String,
    /// Function name; omit to encode a deployment
    function_name: Option<String>,
    /// JSON array (positional) or object (named)
    arguments: Option<Value>,
    network: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct CallFunctionRequest {
    artifact: String,
    contract_address: String,
    function_name: String,
    arguments: Option<Value>,
    from: Option<String>,
    /// Block number; negative values count back from the latest block
    block: Option<i64>,
    network: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct EstimateGasRequest {
    artifact: String,
    contract_address: String,
    function_name: String,
    arguments: Option<Value>,
    from: Option<String>,
    /// Wei, decimal or 0x-prefixed hex
    value: Option<String>,
    network: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct PastEventsRequest {
    artifact: String,
    contract_address: String,
    event_name: String,
    /// Optional, partial argument filter
    arguments: Option<Value>,
    from_block: Option<i64>,
    to_block: Option<i64>,
    network: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct SendTransactionRequest {
    artifact: String,
    /// Omit together with `function_name` to deploy the artifact's bytecode
    contract_address: Option<String>,
    function_name: Option<String>,
    arguments: Option<Value>,
    private_key: Option<String>,
    value: Option<String>,
    gas_limit: Option<u64>,
    gas_price: Option<String>,
    /// Blocks to wait for on top of the mined block, at most 12
    confirmations: Option<u64>,
    network: Option<String>,
}

impl ContractDispatchServer {
    pub fn new(config: Config) -> Result<Self> {
        let providers = Arc::new(ProviderManager::new(config.clone())?);
        let names = Arc::new(config.name_resolver()?);
        let cache = config.abi_cache();

        Ok(Self {
            providers,
            names,
            cache,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn run(&self) -> Result<()> {
        info!("Starting contract dispatch MCP server");

        let service = self.clone().serve(stdio()).await?;

        info!("Contract dispatch MCP server started successfully");
        let _ = service.waiting().await;
        Ok(())
    }

    /// Load the target's artifact and bind it on the requested network.
    pub async fn bind(&self, target: &ContractTarget) -> Result<Contract> {
        if let Some(network) = &target.network {
            utils::validate_network(network, &self.providers.get_available_networks())?;
        }
        let rpc = self.providers.get_provider(target.network.as_deref())?;
        let artifact = Artifact::load(&target.artifact).await?;

        let context = ChainContext::new(rpc)
            .with_names(self.names.clone())
            .with_cache(self.cache.clone());
        let contract = Contract::from_artifact(artifact, context)
            .with_settings(self.config.transaction_settings())
            .with_watch_settings(self.config.watch_settings());

        match &target.address {
            Some(address) => Ok(contract.with_address(utils::validate_address(address)?)),
            None => Ok(contract),
        }
    }

    async fn bind_call(
        &self,
        target: &ContractTarget,
        function: Option<&str>,
        args: Value,
    ) -> Result<BoundCall> {
        let contract = self.bind(target).await?;
        let args = CallArgs::from_json(args);
        match function {
            Some(name) => {
                utils::validate_identifier(name)?;
                Ok(contract.function(name, args)?)
            }
            None => Ok(contract.constructor(args)?),
        }
    }

    /// Call data for a function, or bytecode plus arguments for a deployment.
    pub async fn encode(
        &self,
        target: &ContractTarget,
        function: Option<&str>,
        args: Value,
    ) -> Result<String> {
        let call = self.bind_call(target, function, args).await?;
        Ok(call.encode().await?.to_string())
    }

    pub async fn call(
        &self,
        target: &ContractTarget,
        function: &str,
        args: Value,
        opts: &CallOptions,
    ) -> Result<CallOutput> {
        let call = self.bind_call(target, Some(function), args).await?;
        Ok(call.call(opts).await?)
    }

    pub async fn estimate(
        &self,
        target: &ContractTarget,
        function: &str,
        args: Value,
        opts: &CallOptions,
    ) -> Result<u64> {
        let call = self.bind_call(target, Some(function), args).await?;
        Ok(call.gas(opts).await?)
    }

    pub async fn past_events(
        &self,
        target: &ContractTarget,
        event: &str,
        args: Value,
        opts: &EventOptions,
    ) -> Result<Vec<DecodedEvent>> {
        utils::validate_identifier(event)?;
        let contract = self.bind(target).await?;
        let bound = contract.event(event, CallArgs::from_json(args))?;
        Ok(bound.since(opts).await?)
    }

    pub async fn watch(
        &self,
        target: &ContractTarget,
        event: &str,
        args: Value,
        opts: EventOptions,
    ) -> Result<EventWatch> {
        utils::validate_identifier(event)?;
        let contract = self.bind(target).await?;
        let bound = contract.event(event, CallArgs::from_json(args))?;
        Ok(bound.watch(opts))
    }

    /// Submit and wait for the receipt, or for `confirmations` blocks on top
    /// of it. Refused unless write operations are enabled.
    pub async fn send(
        &self,
        target: &ContractTarget,
        function: Option<&str>,
        args: Value,
        opts: CallOptions,
        confirmations: Option<u64>,
    ) -> Result<Receipt> {
        if !self.config.security.allow_write_operations {
            return Err(anyhow!(
                "Write operations are disabled. Use --allow-writes flag to enable transaction sending."
            ));
        }

        let call = self.bind_call(target, function, args).await?;
        let pending = call.send(opts).await?;
        let hash = pending.tx_id().await?;
        info!("Waiting for 0x{:x} to be mined", hash);

        let receipt = match confirmations {
            Some(count) => pending.confirmed(count).await?,
            None => pending.await?,
        };
        if let Some(address) = receipt.contract_address() {
            info!("Contract deployed at {}", address.to_checksum(None));
        }
        Ok(receipt)
    }
}

/// Render an error for a tool response, translating raw RPC failures.
pub fn describe_error(error: &anyhow::Error) -> String {
    match error.downcast_ref::<ContractError>() {
        Some(ContractError::Rpc(message)) => utils::interpret_rpc_error(message),
        _ => error.to_string(),
    }
}

/// Parse a decimal or hex gas price into wei.
pub fn parse_gas_price(value: &str) -> Result<u128> {
    let price = utils::validate_hex_value(value)?;
    u128::try_from(price).map_err(|_| anyhow!("Gas price '{}' is too large", value))
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "Failed to serialize result".to_string())
}

#[tool(tool_box)]
impl ContractDispatchServer {
    #[tool(description = "Encode call data for a contract function, or deployment data when no function is given")]
    async fn encode_call(&self, #[tool(aggr)] request: EncodeCallRequest) -> String {
        let target = ContractTarget {
            artifact: request.artifact,
            address: None,
            network: request.network,
        };

        match self.encode(
            &target,
            request.function_name.as_deref(),
            request.arguments.unwrap_or(Value::Null),
        )
        .await
        {
            Ok(data) => to_json(&json!({ "data": data })),
            Err(e) => {
                error!("Failed to encode call: {}", e);
                format!("Error: {}", describe_error(&e))
            }
        }
    }

    #[tool(description = "Call a contract function without sending a transaction and decode its result")]
    async fn call_function(&self, #[tool(aggr)] request: CallFunctionRequest) -> String {
        let target = ContractTarget {
            artifact: request.artifact,
            address: Some(request.contract_address),
            network: request.network,
        };
        let opts = CallOptions {
            from: request.from,
            block: request.block,
            ..Default::default()
        };

        match self.call(
            &target,
            &request.function_name,
            request.arguments.unwrap_or(Value::Null),
            &opts,
        )
        .await
        {
            Ok(output) => to_json(&output),
            Err(e) => {
                error!("Failed to call function: {}", e);
                format!("Error: {}", describe_error(&e))
            }
        }
    }

    #[tool(description = "Estimate gas cost for a contract function call")]
    async fn estimate_gas(&self, #[tool(aggr)] request: EstimateGasRequest) -> String {
        let target = ContractTarget {
            artifact: request.artifact,
            address: Some(request.contract_address),
            network: request.network,
        };
        let opts = CallOptions {
            from: request.from,
            value: request.value.map(Value::String),
            ..Default::default()
        };

        match self.estimate(
            &target,
            &request.function_name,
            request.arguments.unwrap_or(Value::Null),
            &opts,
        )
        .await
        {
            Ok(gas_estimate) => format!("Estimated gas: {} units", gas_estimate),
            Err(e) => {
                error!("Failed to estimate gas: {}", e);
                format!("Error: {}", describe_error(&e))
            }
        }
    }

    #[tool(description = "Get past events emitted by a contract, optionally filtered by argument values")]
    async fn get_past_events(&self, #[tool(aggr)] request: PastEventsRequest) -> String {
        let target = ContractTarget {
            artifact: request.artifact,
            address: Some(request.contract_address),
            network: request.network,
        };
        let opts = EventOptions {
            from_block: request.from_block,
            to_block: request.to_block,
            poll_rate: None,
        };

        match self
            .past_events(
                &target,
                &request.event_name,
                request.arguments.unwrap_or(Value::Null),
                &opts,
            )
            .await
        {
            Ok(events) => to_json(&events),
            Err(e) => {
                error!("Failed to get past events: {}", e);
                format!("Error: {}", describe_error(&e))
            }
        }
    }

    #[tool(description = "Send a transaction calling a contract function, or deploy the artifact, and wait for the receipt")]
    async fn send_transaction(&self, #[tool(aggr)] request: SendTransactionRequest) -> String {
        let gas_price = match request.gas_price.as_deref().map(parse_gas_price).transpose() {
            Ok(price) => price,
            Err(e) => return format!("Error: {}", e),
        };
        let target = ContractTarget {
            artifact: request.artifact,
            address: request.contract_address,
            network: request.network,
        };
        let opts = CallOptions {
            value: request.value.map(Value::String),
            gas: request.gas_limit,
            gas_price,
            private_key: request.private_key.or_else(Config::private_key_from_env),
            ..Default::default()
        };

        match self.send(
            &target,
            request.function_name.as_deref(),
            request.arguments.unwrap_or(Value::Null),
            opts,
            request.confirmations,
        )
        .await
        {
            Ok(receipt) => to_json(&receipt),
            Err(e) => {
                error!("Failed to send transaction: {}", e);
                format!("Error: {}", describe_error(&e))
            }
        }
    }
}

#[tool(tool_box)]
impl ServerHandler for ContractDispatchServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some("MCP server for ABI-driven smart contract interaction. Encodes calls from a JSON ABI or build artifact, resolves overloads from the arguments given, calls functions, estimates gas, queries past events and sends transactions.".into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
