//! Overload resolution: pick the definition matching a call's argument shape.

use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

use super::definition::{AbiDefinition, AbiKind, ContractAbi};
use crate::error::{ContractError, Result};

/// Arguments as supplied by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum CallArgs {
    Positional(Vec<Value>),
    Named(Map<String, Value>),
}

impl CallArgs {
    pub fn none() -> Self {
        CallArgs::Positional(Vec::new())
    }

    /// A JSON array is positional, an object is named, `null` is no arguments
    /// and any other value is a single positional argument.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Self::none(),
            Value::Array(values) => CallArgs::Positional(values),
            Value::Object(map) => CallArgs::Named(map),
            other => CallArgs::Positional(vec![other]),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            CallArgs::Positional(values) => values.len(),
            CallArgs::Named(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CallArgs {
    fn default() -> Self {
        Self::none()
    }
}

impl From<Vec<Value>> for CallArgs {
    fn from(values: Vec<Value>) -> Self {
        CallArgs::Positional(values)
    }
}

impl From<Map<String, Value>> for CallArgs {
    fn from(map: Map<String, Value>) -> Self {
        CallArgs::Named(map)
    }
}

/// A selected definition with its arguments arranged in declared input order.
/// Inputs the caller left out are `null`.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub definition: Arc<AbiDefinition>,
    pub args: Vec<Value>,
}

/// Select the definition of `kind` (and `name`, if given) matching `args`.
///
/// Functions and constructors need an exact match: positional arity, or the
/// exact input-name set for named arguments. A single positional object is
/// first matched by input names (the object's keys must be a subset). Events
/// accept partial filters: up to their input count positionally, or any
/// subset of their input names. Longer input lists win ties.
pub fn resolve(abi: &ContractAbi, kind: AbiKind, name: Option<&str>, args: &CallArgs) -> Result<Resolved> {
    let mut candidates = abi.candidates(kind, name);
    if kind == AbiKind::Constructor && candidates.is_empty() && args.is_empty() {
        return Ok(Resolved {
            definition: Arc::new(AbiDefinition::implicit_constructor()),
            args: Vec::new(),
        });
    }
    candidates.sort_by(|a, b| b.inputs.len().cmp(&a.inputs.len()));
    let partial = kind == AbiKind::Event;

    let selected = match args {
        CallArgs::Positional(values) => {
            let by_object = match values.as_slice() {
                [Value::Object(map)] => candidates
                    .iter()
                    .find(|c| keys_within(c, map))
                    .map(|c| (c.clone(), arrange_named(c, map))),
                _ => None,
            };
            by_object.or_else(|| {
                candidates
                    .iter()
                    .find(|c| {
                        if partial {
                            values.len() <= c.inputs.len()
                        } else {
                            values.len() == c.inputs.len()
                        }
                    })
                    .map(|c| (c.clone(), arrange_positional(c, values)))
            })
        }
        CallArgs::Named(map) => candidates
            .iter()
            .find(|c| {
                if partial {
                    keys_within(c, map)
                } else {
                    input_name_set(c) == map.keys().map(String::as_str).collect()
                }
            })
            .map(|c| (c.clone(), arrange_named(c, map))),
    };

    match selected {
        Some((definition, args)) => Ok(Resolved { definition, args }),
        None => Err(not_found(kind, name, args, &candidates)),
    }
}

fn input_name_set(definition: &AbiDefinition) -> HashSet<&str> {
    definition.input_names().collect()
}

fn keys_within(definition: &AbiDefinition, map: &Map<String, Value>) -> bool {
    let names = input_name_set(definition);
    !map.is_empty() && map.keys().all(|k| names.contains(k.as_str()))
}

fn arrange_positional(definition: &AbiDefinition, values: &[Value]) -> Vec<Value> {
    (0..definition.inputs.len())
        .map(|i| values.get(i).cloned().unwrap_or(Value::Null))
        .collect()
}

fn arrange_named(definition: &AbiDefinition, map: &Map<String, Value>) -> Vec<Value> {
    definition
        .inputs
        .iter()
        .map(|p| map.get(&p.name).cloned().unwrap_or(Value::Null))
        .collect()
}

fn not_found(
    kind: AbiKind,
    name: Option<&str>,
    args: &CallArgs,
    candidates: &[Arc<AbiDefinition>],
) -> ContractError {
    let shape = match args {
        CallArgs::Positional(values) => format!("{} positional argument(s)", values.len()),
        CallArgs::Named(map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            format!("named arguments {{{}}}", keys.join(", "))
        }
    };
    let detail = if candidates.is_empty() {
        "not declared in the ABI".to_string()
    } else {
        let signatures: Vec<&str> = candidates.iter().map(|c| c.signature()).collect();
        format!("{} fit none of {}", shape, signatures.join(", "))
    };
    ContractError::DefinitionNotFound {
        kind: kind.to_string(),
        name: name.unwrap_or("<unnamed>").to_string(),
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn abi() -> ContractAbi {
        ContractAbi::from_json(
            r#"[
            {"type":"function","name":"f","inputs":[],"outputs":[]},
            {"type":"function","name":"f","inputs":[{"name":"x","type":"uint256"}],"outputs":[]},
            {"type":"function","name":"g","inputs":[
                {"name":"owner","type":"address"},{"name":"amount","type":"uint256"}],"outputs":[]},
            {"type":"function","name":"g","inputs":[{"name":"owner","type":"address"}],"outputs":[]},
            {"type":"event","name":"Moved","anonymous":false,"inputs":[
                {"name":"from","type":"address","indexed":true},
                {"name":"to","type":"address","indexed":true},
                {"name":"amount","type":"uint256","indexed":false}]},
            {"type":"fallback"}
        ]"#,
        )
        .unwrap()
    }

    #[test]
    fn test_overloads_resolve_by_arity() {
        let abi = abi();
        let none = resolve(&abi, AbiKind::Function, Some("f"), &CallArgs::none()).unwrap();
        assert_eq!(none.definition.signature(), "f()");

        let one = resolve(&abi, AbiKind::Function, Some("f"), &vec![json!(5)].into()).unwrap();
        assert_eq!(one.definition.signature(), "f(uint256)");
        assert_eq!(one.args, vec![json!(5)]);

        let err = resolve(&abi, AbiKind::Function, Some("f"), &vec![json!(1), json!(2)].into()).unwrap_err();
        assert!(matches!(err, ContractError::DefinitionNotFound { .. }));
    }

    #[test]
    fn test_named_arguments_need_exact_name_set() {
        let abi = abi();
        let args = CallArgs::from_json(json!({"amount": 1, "owner": "0x01"}));
        let resolved = resolve(&abi, AbiKind::Function, Some("g"), &args).unwrap();
        assert_eq!(resolved.definition.inputs.len(), 2);
        assert_eq!(resolved.args, vec![json!("0x01"), json!(1)]);

        let partial = CallArgs::from_json(json!({"amount": 1}));
        assert!(resolve(&abi, AbiKind::Function, Some("g"), &partial).is_err());
    }

    #[test]
    fn test_single_object_prefers_longest_superset() {
        let abi = abi();
        let args = CallArgs::Positional(vec![json!({"owner": "0x01"})]);
        let resolved = resolve(&abi, AbiKind::Function, Some("g"), &args).unwrap();
        assert_eq!(resolved.definition.signature(), "g(address,uint256)");
        assert_eq!(resolved.args, vec![json!("0x01"), Value::Null]);
    }

    #[test]
    fn test_single_object_falls_back_to_arity() {
        let abi = ContractAbi::from_json(
            r#"[{"type":"function","name":"submit","inputs":[
                {"name":"order","type":"tuple","components":[{"name":"id","type":"uint256"}]}],"outputs":[]}]"#,
        )
        .unwrap();
        let args = CallArgs::Positional(vec![json!({"id": 3})]);
        let resolved = resolve(&abi, AbiKind::Function, Some("submit"), &args).unwrap();
        assert_eq!(resolved.args, vec![json!({"id": 3})]);
    }

    #[test]
    fn test_event_filters_are_partial() {
        let abi = abi();
        let positional = resolve(&abi, AbiKind::Event, Some("Moved"), &vec![json!("0x01")].into()).unwrap();
        assert_eq!(positional.args, vec![json!("0x01"), Value::Null, Value::Null]);

        let named = resolve(&abi, AbiKind::Event, Some("Moved"), &CallArgs::from_json(json!({"to": "0x02"}))).unwrap();
        assert_eq!(named.args, vec![Value::Null, json!("0x02"), Value::Null]);

        assert!(resolve(&abi, AbiKind::Event, Some("Moved"), &CallArgs::from_json(json!({"nope": 1}))).is_err());
        assert!(resolve(&abi, AbiKind::Event, Some("Missing"), &CallArgs::none()).is_err());
    }

    #[test]
    fn test_implicit_constructor() {
        let abi = abi();
        let resolved = resolve(&abi, AbiKind::Constructor, None, &CallArgs::none()).unwrap();
        assert!(resolved.definition.inputs.is_empty());
        assert!(resolve(&abi, AbiKind::Constructor, None, &vec![json!(1)].into()).is_err());
    }
}
