//! Contract bindings: an ABI plus optional bytecode and address, wired to the
//! chain collaborators.

pub mod call;
pub mod event;
pub mod receipt;
pub mod transaction;

use alloy::primitives::{Address, Bytes};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::debug;

use crate::abi::{resolve, AbiCache, AbiKind, AbiParam, Artifact, CallArgs, ContractAbi};
use crate::error::Result;
use crate::ethereum::resolver::parse_hex_address;
use crate::ethereum::{ChainRpc, LocalSigner, NameResolver, StaticNameResolver, TransactionSigner};

pub use call::{BoundCall, CallOptions};
pub use event::{BoundEvent, EventOptions, EventWatch, WatchHandle};
pub use receipt::{DecodedEvent, Receipt};
pub use transaction::{PendingTransaction, TxState, MAX_CONFIRMATIONS};

/// The collaborators a binding talks to.
#[derive(Clone)]
pub struct ChainContext {
    pub rpc: Arc<dyn ChainRpc>,
    pub signer: Arc<dyn TransactionSigner>,
    pub names: Arc<dyn NameResolver>,
    pub cache: Arc<AbiCache>,
}

impl ChainContext {
    /// Local signing, no name table and the process-wide ABI cache.
    pub fn new(rpc: Arc<dyn ChainRpc>) -> Self {
        Self {
            rpc,
            signer: Arc::new(LocalSigner),
            names: Arc::new(StaticNameResolver::default()),
            cache: AbiCache::global(),
        }
    }

    pub fn with_signer(mut self, signer: Arc<dyn TransactionSigner>) -> Self {
        self.signer = signer;
        self
    }

    pub fn with_names(mut self, names: Arc<dyn NameResolver>) -> Self {
        self.names = names;
        self
    }

    pub fn with_cache(mut self, cache: Arc<AbiCache>) -> Self {
        self.cache = cache;
        self
    }
}

impl std::fmt::Debug for ChainContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainContext")
            .field("cached_abis", &self.cache.len())
            .finish_non_exhaustive()
    }
}

/// Gas, gas price and polling defaults for transactions sent via a binding.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionSettings {
    /// Headroom added to the gas estimate, as a fraction (0.25 = +25%)
    pub gas_bonus: f64,
    /// Adjustment to the network gas price, as a fraction (-0.1 = -10%)
    pub gas_price_bonus: f64,
    pub receipt_poll: Duration,
    pub confirmation_poll: Duration,
}

impl Default for TransactionSettings {
    fn default() -> Self {
        Self {
            gas_bonus: 0.25,
            gas_price_bonus: -0.1,
            receipt_poll: Duration::from_millis(1000),
            confirmation_poll: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WatchSettings {
    pub poll_rate: Duration,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            poll_rate: Duration::from_millis(15_000),
        }
    }
}

/// A handle on one contract. Clones share the bound address.
#[derive(Debug, Clone)]
pub struct Contract {
    abi: Arc<ContractAbi>,
    bytecode: Option<Bytes>,
    address: Arc<RwLock<Option<Address>>>,
    from: Option<Address>,
    settings: TransactionSettings,
    watch: WatchSettings,
    context: ChainContext,
}

impl Contract {
    pub fn new(abi: ContractAbi, context: ChainContext) -> Self {
        Self {
            abi: Arc::new(abi),
            bytecode: None,
            address: Arc::new(RwLock::new(None)),
            from: None,
            settings: TransactionSettings::default(),
            watch: WatchSettings::default(),
            context,
        }
    }

    pub fn from_artifact(artifact: Artifact, context: ChainContext) -> Self {
        let mut contract = Self::new(artifact.abi, context);
        contract.bytecode = artifact.bytecode;
        contract
    }

    pub fn with_bytecode(mut self, bytecode: Bytes) -> Self {
        self.bytecode = Some(bytecode);
        self
    }

    pub fn with_address(self, address: Address) -> Self {
        self.set_address(address);
        self
    }

    /// Default caller for calls and transactions.
    pub fn with_from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    pub fn with_settings(mut self, settings: TransactionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_watch_settings(mut self, watch: WatchSettings) -> Self {
        self.watch = watch;
        self
    }

    /// Bind to `address` and register the ABI for it in the cache.
    pub fn set_address(&self, address: Address) {
        *self.address.write().unwrap_or_else(|e| e.into_inner()) = Some(address);
        self.context.cache.register(address, self.abi.clone());
        debug!("Contract bound to {}", address.to_checksum(None));
    }

    /// A copy of this binding at another address. The copy does not share
    /// its address with `self`.
    pub fn at(&self, address: Address) -> Contract {
        let contract = Contract {
            address: Arc::new(RwLock::new(None)),
            ..self.clone()
        };
        contract.set_address(address);
        contract
    }

    pub fn address(&self) -> Option<Address> {
        *self.address.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn abi(&self) -> &Arc<ContractAbi> {
        &self.abi
    }

    pub fn bytecode(&self) -> Option<&Bytes> {
        self.bytecode.as_ref()
    }

    pub fn default_from(&self) -> Option<Address> {
        self.from
    }

    pub fn settings(&self) -> &TransactionSettings {
        &self.settings
    }

    pub fn watch_settings(&self) -> &WatchSettings {
        &self.watch
    }

    pub fn context(&self) -> &ChainContext {
        &self.context
    }

    /// Bind a function call. Fails if no overload of `name` fits `args`.
    pub fn function(&self, name: &str, args: impl Into<CallArgs>) -> Result<BoundCall> {
        let resolved = resolve(&self.abi, AbiKind::Function, Some(name), &args.into())?;
        Ok(BoundCall::new(self.clone(), resolved))
    }

    /// Bind a deployment. With no constructor in the ABI, zero arguments
    /// select an implicit empty constructor.
    pub fn constructor(&self, args: impl Into<CallArgs>) -> Result<BoundCall> {
        let resolved = resolve(&self.abi, AbiKind::Constructor, None, &args.into())?;
        Ok(BoundCall::new(self.clone(), resolved))
    }

    /// Bind an event query. Arguments are an optional, partial filter.
    pub fn event(&self, name: &str, args: impl Into<CallArgs>) -> Result<BoundEvent> {
        let resolved = resolve(&self.abi, AbiKind::Event, Some(name), &args.into())?;
        Ok(BoundEvent::new(self.clone(), resolved))
    }

    /// Whether code exists at the bound address. Unbound contracts are not deployed.
    pub async fn is_deployed(&self, block: Option<u64>) -> Result<bool> {
        let Some(address) = self.address() else {
            return Ok(false);
        };
        let code = self.context.rpc.get_code(address, block).await?;
        Ok(!code.is_empty())
    }

    /// Replace names in address-typed positions of `args` with resolved,
    /// checksummed addresses. Recurses through arrays and tuples; a list
    /// given for a scalar address (an any-of event filter) is resolved
    /// element-wise.
    pub(crate) async fn resolve_address_args(
        &self,
        params: &[AbiParam],
        args: &[Value],
    ) -> Result<Vec<Value>> {
        let mut names = Vec::new();
        for (param, value) in params.iter().zip(args) {
            collect_names(param, value, &mut names);
        }

        let mut resolved = HashMap::new();
        for name in names {
            if !resolved.contains_key(&name) {
                let address = self.context.names.resolve(&name).await?;
                resolved.insert(name, address);
            }
        }

        let mut args = args.to_vec();
        for (param, value) in params.iter().zip(args.iter_mut()) {
            substitute(param, value, &resolved);
        }
        Ok(args)
    }

    pub(crate) async fn resolve_name(&self, name: &str) -> Result<Address> {
        match parse_hex_address(name) {
            Some(address) => Ok(address),
            None => self.context.names.resolve(name).await,
        }
    }
}

fn is_tuple(param: &AbiParam) -> bool {
    param.element().is_none() && param.ty.starts_with("tuple")
}

fn tuple_slot<'a>(component: &AbiParam, index: usize, value: &'a mut Value) -> Option<&'a mut Value> {
    match value {
        Value::Array(items) => items.get_mut(index),
        Value::Object(fields) => fields.get_mut(&component.name),
        _ => None,
    }
}

fn collect_names(param: &AbiParam, value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) if param.is_address() => {
            if parse_hex_address(s).is_none() {
                out.push(s.clone());
            }
        }
        Value::Array(items) if param.is_address() => {
            for item in items {
                collect_names(param, item, out);
            }
        }
        Value::Array(items) if param.element().is_some() => {
            if let Some(element) = param.element() {
                for item in items {
                    collect_names(&element, item, out);
                }
            }
        }
        _ if is_tuple(param) => {
            for (i, component) in param.components.iter().enumerate() {
                let field = match value {
                    Value::Array(items) => items.get(i),
                    Value::Object(fields) => fields.get(&component.name),
                    _ => None,
                };
                if let Some(field) = field {
                    collect_names(component, field, out);
                }
            }
        }
        _ => {}
    }
}

fn substitute(param: &AbiParam, value: &mut Value, resolved: &HashMap<String, Address>) {
    match value {
        Value::String(s) if param.is_address() => {
            let address = parse_hex_address(s).or_else(|| resolved.get(s.as_str()).copied());
            if let Some(address) = address {
                *s = address.to_checksum(None);
            }
        }
        Value::Array(items) if param.is_address() => {
            for item in items {
                substitute(param, item, resolved);
            }
        }
        Value::Array(items) if param.element().is_some() => {
            if let Some(element) = param.element() {
                for item in items {
                    substitute(&element, item, resolved);
                }
            }
        }
        _ if is_tuple(param) => {
            for (i, component) in param.components.iter().enumerate() {
                if let Some(slot) = tuple_slot(component, i, value) {
                    substitute(component, slot, resolved);
                }
            }
        }
        _ => {}
    }
}

/// Scale `value` by `1 + bonus`, in basis points, saturating.
pub(crate) fn apply_bonus(value: u128, bonus: f64) -> u128 {
    let basis_points = (bonus * 10_000.0).round() as i128;
    let factor = (10_000 + basis_points).max(0) as u128;
    (value / 10_000)
        .saturating_mul(factor)
        .saturating_add((value % 10_000).saturating_mul(factor) / 10_000)
}

/// Resolve a block number where negative values count back from the
/// latest block (`-1` is the latest).
pub(crate) fn absolute_block(block: i64, latest: u64) -> u64 {
    if block >= 0 {
        block as u64
    } else {
        (latest as i128 + 1 + block as i128).max(0) as u64
    }
}

pub(crate) async fn resolve_block(rpc: &dyn ChainRpc, block: i64) -> Result<u64> {
    if block >= 0 {
        Ok(block as u64)
    } else {
        Ok(absolute_block(block, rpc.block_number().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_apply_bonus() {
        assert_eq!(apply_bonus(100_000, 0.25), 125_000);
        assert_eq!(apply_bonus(1_000_000_000, -0.1), 900_000_000);
        assert_eq!(apply_bonus(7, 0.0), 7);
        assert_eq!(apply_bonus(7, -2.0), 0);
        assert_eq!(apply_bonus(u128::MAX, 1.0), u128::MAX);
        assert_eq!(apply_bonus(u128::MAX, 0.0), u128::MAX);
        let half = u128::MAX / 2;
        assert!(apply_bonus(half, 0.5) > half);
        assert_eq!(apply_bonus(half, -0.5), half / 2);
    }

    #[test]
    fn test_absolute_block() {
        assert_eq!(absolute_block(5, 100), 5);
        assert_eq!(absolute_block(-1, 100), 100);
        assert_eq!(absolute_block(-10, 100), 91);
        assert_eq!(absolute_block(-500, 100), 0);
    }

    #[test]
    fn test_collect_and_substitute_names() {
        let raw: alloy::json_abi::Param = serde_json::from_value(json!({
            "name": "legs", "type": "tuple[]",
            "components": [{"name": "to", "type": "address"}, {"name": "amount", "type": "uint256"}]
        }))
        .unwrap();
        let param = AbiParam::from(&raw);
        let value = json!([
            {"to": "alice.eth", "amount": 1},
            ["0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed", 2]
        ]);

        let mut names = Vec::new();
        collect_names(&param, &value, &mut names);
        assert_eq!(names, vec!["alice.eth".to_string()]);

        let resolved = HashMap::from([("alice.eth".to_string(), Address::repeat_byte(0x11))]);
        let mut value = value;
        substitute(&param, &mut value, &resolved);
        assert_eq!(value[0]["to"], json!(Address::repeat_byte(0x11).to_checksum(None)));
        assert_eq!(value[1][0], json!("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"));
        assert_eq!(value[0]["amount"], json!(1));
    }
}
