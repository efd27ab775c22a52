//! Contract interface definitions and build-artifact loading.
//!
//! ABI JSON is parsed by `alloy::json_abi`; `ContractAbi` indexes its items
//! by kind, name and event topic for overload resolution and log decoding.

use alloy::json_abi::{
    Constructor, Error as ErrorItem, Event, EventParam, Function, JsonAbi, Param, StateMutability,
};
use alloy::primitives::{Bytes, B256};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::debug;

use crate::error::{ContractError, Result};

/// The kind of an ABI entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbiKind {
    Constructor,
    #[default]
    Function,
    Event,
    Fallback,
    Receive,
    /// A custom error
    Error,
}

impl std::fmt::Display for AbiKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            AbiKind::Constructor => "constructor",
            AbiKind::Function => "function",
            AbiKind::Event => "event",
            AbiKind::Fallback => "fallback",
            AbiKind::Receive => "receive",
            AbiKind::Error => "error",
        };
        f.write_str(label)
    }
}

/// A function/event parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbiParam {
    pub name: String,
    /// Declared type as written in the ABI (e.g. "uint256", "tuple[]")
    pub ty: String,
    pub components: Vec<AbiParam>,
    pub indexed: bool,
    pub(crate) canonical: String,
}

impl From<&Param> for AbiParam {
    fn from(param: &Param) -> Self {
        Self {
            name: param.name.clone(),
            ty: param.ty.clone(),
            components: param.components.iter().map(AbiParam::from).collect(),
            indexed: false,
            canonical: param.selector_type().into_owned(),
        }
    }
}

impl From<&EventParam> for AbiParam {
    fn from(param: &EventParam) -> Self {
        Self {
            name: param.name.clone(),
            ty: param.ty.clone(),
            components: param.components.iter().map(AbiParam::from).collect(),
            indexed: param.indexed,
            canonical: param.selector_type().into_owned(),
        }
    }
}

impl AbiParam {
    /// An unnamed parameter of the given canonical type
    pub fn of_type(ty: impl Into<String>) -> Self {
        let ty = ty.into();
        Self {
            name: String::new(),
            canonical: ty.clone(),
            ty,
            components: Vec::new(),
            indexed: false,
        }
    }

    pub fn named(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::of_type(ty)
        }
    }

    /// Canonical type with tuples expanded through their components, e.g.
    /// `tuple[]` with components `(uint256 a, address b)` is `(uint256,address)[]`.
    pub fn canonical_type(&self) -> &str {
        &self.canonical
    }

    /// The element parameter of an array type, or `None` if this is not an array.
    pub fn element(&self) -> Option<AbiParam> {
        let open = self.ty.strip_suffix(']').and_then(|ty| ty.rfind('['))?;
        let canonical_open = self.canonical.rfind('[')?;
        Some(AbiParam {
            name: self.name.clone(),
            ty: self.ty[..open].to_string(),
            components: self.components.clone(),
            indexed: false,
            canonical: self.canonical[..canonical_open].to_string(),
        })
    }

    pub fn is_address(&self) -> bool {
        self.ty == "address"
    }
}

/// One entry of a contract interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbiDefinition {
    pub kind: AbiKind,
    /// Absent for constructors, fallback and receive entries
    pub name: Option<String>,
    pub inputs: Vec<AbiParam>,
    pub outputs: Vec<AbiParam>,
    pub is_constant: bool,
    pub payable: bool,
    pub anonymous: bool,
    signature: String,
    selector: [u8; 4],
    topic: B256,
}

fn is_constant(mutability: StateMutability) -> bool {
    matches!(mutability, StateMutability::Pure | StateMutability::View)
}

fn params(params: &[Param]) -> Vec<AbiParam> {
    params.iter().map(AbiParam::from).collect()
}

impl From<&Function> for AbiDefinition {
    fn from(function: &Function) -> Self {
        Self {
            kind: AbiKind::Function,
            name: Some(function.name.clone()),
            inputs: params(&function.inputs),
            outputs: params(&function.outputs),
            is_constant: is_constant(function.state_mutability),
            payable: function.state_mutability == StateMutability::Payable,
            anonymous: false,
            signature: function.signature(),
            selector: function.selector().0,
            topic: B256::ZERO,
        }
    }
}

impl From<&Constructor> for AbiDefinition {
    fn from(constructor: &Constructor) -> Self {
        let types: Vec<_> = constructor.inputs.iter().map(Param::selector_type).collect();
        Self {
            kind: AbiKind::Constructor,
            name: None,
            inputs: params(&constructor.inputs),
            outputs: Vec::new(),
            is_constant: false,
            payable: constructor.state_mutability == StateMutability::Payable,
            anonymous: false,
            signature: format!("constructor({})", types.join(",")),
            selector: [0; 4],
            topic: B256::ZERO,
        }
    }
}

impl From<&Event> for AbiDefinition {
    fn from(event: &Event) -> Self {
        Self {
            kind: AbiKind::Event,
            name: Some(event.name.clone()),
            inputs: event.inputs.iter().map(AbiParam::from).collect(),
            outputs: Vec::new(),
            is_constant: false,
            payable: false,
            anonymous: event.anonymous,
            signature: event.signature(),
            selector: [0; 4],
            topic: event.selector(),
        }
    }
}

impl From<&ErrorItem> for AbiDefinition {
    fn from(error: &ErrorItem) -> Self {
        Self {
            kind: AbiKind::Error,
            name: Some(error.name.clone()),
            inputs: params(&error.inputs),
            outputs: Vec::new(),
            is_constant: false,
            payable: false,
            anonymous: false,
            signature: error.signature(),
            selector: error.selector().0,
            topic: B256::ZERO,
        }
    }
}

impl AbiDefinition {
    /// The constructor assumed for contracts whose ABI declares none.
    pub fn implicit_constructor() -> Self {
        Self::from(&Constructor {
            inputs: Vec::new(),
            state_mutability: StateMutability::NonPayable,
        })
    }

    fn special(kind: AbiKind, mutability: StateMutability) -> Self {
        Self {
            kind,
            name: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            is_constant: false,
            payable: mutability == StateMutability::Payable,
            anonymous: false,
            signature: format!("{}()", kind),
            selector: [0; 4],
            topic: B256::ZERO,
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    /// Canonical signature: `name(type1,type2)`
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Function selector; zero for constructors and events.
    pub fn selector(&self) -> [u8; 4] {
        self.selector
    }

    /// Signature hash, the first topic of non-anonymous events.
    pub fn topic(&self) -> B256 {
        self.topic
    }

    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(|p| p.name.as_str()).filter(|n| !n.is_empty())
    }
}

/// A parsed contract interface, indexed by kind and name.
///
/// Overloads sharing a name are kept in declaration order under one key.
#[derive(Debug, Clone, Default)]
pub struct ContractAbi {
    json: JsonAbi,
    definitions: Vec<Arc<AbiDefinition>>,
    by_name: HashMap<(AbiKind, String), Vec<usize>>,
    by_topic: HashMap<B256, usize>,
}

impl From<JsonAbi> for ContractAbi {
    fn from(json: JsonAbi) -> Self {
        let mut definitions: Vec<AbiDefinition> = Vec::new();
        definitions.extend(json.constructor.iter().map(AbiDefinition::from));
        definitions.extend(json.functions().map(AbiDefinition::from));
        definitions.extend(json.events().map(AbiDefinition::from));
        definitions.extend(json.errors().map(AbiDefinition::from));
        if let Some(fallback) = &json.fallback {
            definitions.push(AbiDefinition::special(AbiKind::Fallback, fallback.state_mutability));
        }
        if let Some(receive) = &json.receive {
            definitions.push(AbiDefinition::special(AbiKind::Receive, receive.state_mutability));
        }

        let mut abi = Self {
            json,
            ..Self::default()
        };
        for definition in definitions {
            let index = abi.definitions.len();
            if let Some(name) = &definition.name {
                abi.by_name
                    .entry((definition.kind, name.clone()))
                    .or_default()
                    .push(index);
            }
            if definition.kind == AbiKind::Event && !definition.anonymous {
                abi.by_topic.entry(definition.topic()).or_insert(index);
            }
            abi.definitions.push(Arc::new(definition));
        }
        abi
    }
}

impl ContractAbi {
    /// Parse a JSON ABI array.
    pub fn from_json(json: &str) -> Result<Self> {
        let abi: JsonAbi =
            serde_json::from_str(json).map_err(|e| ContractError::InvalidAbi(e.to_string()))?;
        Ok(abi.into())
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let abi: JsonAbi =
            serde_json::from_value(value).map_err(|e| ContractError::InvalidAbi(e.to_string()))?;
        Ok(abi.into())
    }

    /// The parsed interface as alloy sees it.
    pub fn json_abi(&self) -> &JsonAbi {
        &self.json
    }

    pub fn definitions(&self) -> impl Iterator<Item = &Arc<AbiDefinition>> {
        self.definitions.iter()
    }

    /// All definitions of `kind`, restricted to `name` when one is given.
    pub fn candidates(&self, kind: AbiKind, name: Option<&str>) -> Vec<Arc<AbiDefinition>> {
        match name {
            Some(name) => self
                .by_name
                .get(&(kind, name.to_string()))
                .map(|indices| indices.iter().map(|&i| self.definitions[i].clone()).collect())
                .unwrap_or_default(),
            None => self
                .definitions
                .iter()
                .filter(|d| d.kind == kind)
                .cloned()
                .collect(),
        }
    }

    /// The non-anonymous event whose signature hash is `topic`.
    pub fn event_by_topic(&self, topic: &B256) -> Option<&Arc<AbiDefinition>> {
        self.by_topic.get(topic).map(|&i| &self.definitions[i])
    }

    pub fn has_constructor(&self) -> bool {
        self.json.constructor.is_some()
    }

    /// Declared names of `kind`, sorted.
    pub fn names(&self, kind: AbiKind) -> Vec<String> {
        match kind {
            AbiKind::Function => self.json.functions.keys().cloned().collect(),
            AbiKind::Event => self.json.events.keys().cloned().collect(),
            AbiKind::Error => self.json.errors.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

/// A contract interface optionally bundled with deployment bytecode, as
/// produced by Solidity build tooling.
#[derive(Debug, Clone, Default)]
pub struct Artifact {
    pub abi: ContractAbi,
    pub bytecode: Option<Bytes>,
}

impl Artifact {
    /// Accepts either a bare ABI array or an artifact object with `abi` and
    /// `bytecode` (a hex string, or `{ "object": "0x..." }`).
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Array(_) => Ok(Self {
                abi: ContractAbi::from_value(value)?,
                bytecode: None,
            }),
            Value::Object(mut object) => {
                let abi = object
                    .remove("abi")
                    .ok_or_else(|| ContractError::InvalidAbi("artifact has no `abi` field".into()))?;
                let bytecode = match object.remove("bytecode") {
                    Some(Value::String(hex)) => parse_bytecode(&hex)?,
                    Some(Value::Object(mut nested)) => match nested.remove("object") {
                        Some(Value::String(hex)) => parse_bytecode(&hex)?,
                        _ => None,
                    },
                    _ => None,
                };
                Ok(Self {
                    abi: ContractAbi::from_value(abi)?,
                    bytecode,
                })
            }
            other => Err(ContractError::InvalidAbi(format!(
                "expected an ABI array or artifact object, found {}",
                other
            ))),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| ContractError::InvalidAbi(e.to_string()))?;
        Self::from_value(value)
    }

    /// Load an ABI or artifact JSON file
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await.map_err(|e| {
            ContractError::InvalidAbi(format!("failed to read {:?}: {}", path, e))
        })?;
        let artifact = Self::from_json(&content)?;
        debug!(
            "Loaded {} ABI entries from {:?} (bytecode: {})",
            artifact.abi.len(),
            path,
            artifact.bytecode.is_some()
        );
        Ok(artifact)
    }
}

fn parse_bytecode(hex_str: &str) -> Result<Option<Bytes>> {
    let trimmed = hex_str.trim().trim_start_matches("0x");
    if trimmed.is_empty() {
        return Ok(None);
    }
    let bytes = hex::decode(trimmed)
        .map_err(|e| ContractError::InvalidAbi(format!("invalid bytecode: {}", e)))?;
    Ok(Some(Bytes::from(bytes)))
}
