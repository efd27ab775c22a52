use alloy::primitives::{Address, Bytes};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::transaction::{self, PendingTransaction};
use super::{resolve_block, Contract};
use crate::abi::codec::{decode_parameters, encode_constructor_call, encode_function_call, parse_uint};
use crate::abi::{AbiDefinition, AbiKind, CallOutput, Resolved};
use crate::error::{ContractError, Result};
use crate::ethereum::CallParams;

/// Per-call overrides. Anything left `None` falls back to the binding's
/// defaults or is computed from the chain.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Caller address or resolvable name
    pub from: Option<String>,
    /// Target address or resolvable name; defaults to the bound address
    pub to: Option<String>,
    /// Wei to send, as a number or decimal/hex string
    pub value: Option<Value>,
    pub gas: Option<u64>,
    pub gas_price: Option<u128>,
    pub nonce: Option<u64>,
    /// Sign locally and submit the raw transaction
    pub private_key: Option<String>,
    /// Block to call against; negative counts back from latest
    pub block: Option<i64>,
    pub gas_bonus: Option<f64>,
    pub gas_price_bonus: Option<f64>,
}

/// A resolved function or constructor with its arranged arguments.
///
/// Nothing touches the network until one of `gas`, `call` or `send` runs.
#[derive(Debug, Clone)]
pub struct BoundCall {
    contract: Contract,
    definition: Arc<AbiDefinition>,
    args: Vec<Value>,
}

impl BoundCall {
    pub(crate) fn new(contract: Contract, resolved: Resolved) -> Self {
        Self {
            contract,
            definition: resolved.definition,
            args: resolved.args,
        }
    }

    pub fn definition(&self) -> &AbiDefinition {
        &self.definition
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    pub fn is_constructor(&self) -> bool {
        self.definition.kind == AbiKind::Constructor
    }

    /// Call data only: selector plus arguments, or bytecode plus
    /// constructor arguments. Names in address arguments are resolved but
    /// the chain is not consulted.
    pub async fn encode(&self) -> Result<Bytes> {
        let args = self
            .contract
            .resolve_address_args(&self.definition.inputs, &self.args)
            .await?;
        if self.is_constructor() {
            let bytecode = self.contract.bytecode().ok_or(ContractError::NoBytecode)?;
            encode_constructor_call(bytecode, &self.definition, &args)
        } else {
            encode_function_call(&self.definition, &args)
        }
    }

    /// Estimate gas. A caller is required for state-changing functions.
    pub async fn gas(&self, opts: &CallOptions) -> Result<u64> {
        let params = self.params(opts, !self.definition.is_constant).await?;
        let gas = self.contract.context().rpc.estimate_gas(&params).await?;
        debug!("Estimated {} gas for {}", gas, self.definition.signature());
        Ok(gas)
    }

    /// Execute read-only and decode the return data. A single declared
    /// output comes back as a scalar.
    pub async fn call(&self, opts: &CallOptions) -> Result<CallOutput> {
        let params = self.params(opts, false).await?;
        let rpc = &self.contract.context().rpc;
        let block = match opts.block {
            Some(block) => Some(resolve_block(rpc.as_ref(), block).await?),
            None => None,
        };
        let raw = rpc.call(&params, block).await?;
        let outputs = decode_parameters(&self.definition.outputs, &raw)?;
        Ok(CallOutput::from_tuple(outputs))
    }

    /// Submit a transaction. Encoding and address errors fail here; network
    /// failures surface through the returned handle.
    pub async fn send(&self, opts: CallOptions) -> Result<PendingTransaction> {
        let params = self.params(&opts, true).await?;
        debug!(
            "Sending {} from {:?}",
            if self.is_constructor() {
                "deployment".to_string()
            } else {
                self.definition.signature().to_string()
            },
            params.from
        );
        Ok(transaction::start(self.clone(), params, opts))
    }

    async fn params(&self, opts: &CallOptions, require_from: bool) -> Result<CallParams> {
        let data = self.encode().await?;
        let to = if self.is_constructor() {
            None
        } else {
            Some(match &opts.to {
                Some(to) => self.contract.resolve_name(to).await?,
                None => self
                    .contract
                    .address()
                    .ok_or(ContractError::ContractAddressUndetermined)?,
            })
        };
        let from = self.resolve_from(opts, require_from).await?;
        let value = opts
            .value
            .as_ref()
            .map(|v| parse_uint(v).map_err(|reason| ContractError::encoding("value", reason)))
            .transpose()?;

        Ok(CallParams {
            from,
            to,
            data,
            value,
            gas: opts.gas,
            gas_price: opts.gas_price,
            nonce: opts.nonce,
            chain_id: None,
        })
    }

    /// Explicit `from`, then the private key's address, then the binding
    /// default, then (when required) the node's first account.
    async fn resolve_from(&self, opts: &CallOptions, required: bool) -> Result<Option<Address>> {
        if let Some(from) = &opts.from {
            return self.contract.resolve_name(from).await.map(Some);
        }
        if let Some(key) = &opts.private_key {
            return self.contract.context().signer.address(key).map(Some);
        }
        if let Some(from) = self.contract.default_from() {
            return Ok(Some(from));
        }
        if !required {
            return Ok(None);
        }
        match self.contract.context().rpc.accounts().await {
            Ok(accounts) => accounts
                .first()
                .copied()
                .map(Some)
                .ok_or(ContractError::CallerUndetermined),
            Err(e) => {
                debug!("Account lookup failed: {}", e);
                Err(ContractError::CallerUndetermined)
            }
        }
    }
}
