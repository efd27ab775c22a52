//! Application-level representation of decoded ABI values.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::Value;

use super::codec::canonical_integer;

/// A decoded ABI value.
///
/// Integers are kept as base-10 strings so values beyond 2^53 never lose
/// precision, addresses are checksum-cased and byte strings are lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiValue {
    Bool(bool),
    Int(String),
    Address(String),
    Bytes(String),
    String(String),
    Array(Vec<AbiValue>),
    Tuple(DecodedTuple),
}

impl AbiValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AbiValue::Int(s) | AbiValue::Address(s) | AbiValue::Bytes(s) | AbiValue::String(s) => {
                Some(s)
            }
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AbiValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[AbiValue]> {
        match self {
            AbiValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&DecodedTuple> {
        match self {
            AbiValue::Tuple(tuple) => Some(tuple),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Loose equality against a caller-supplied filter value.
    ///
    /// `null` matches anything. Integers compare numerically whatever their
    /// textual form, addresses and hex compare case-insensitively. A JSON
    /// array tested against a non-array value matches if any element does.
    pub fn matches(&self, filter: &Value) -> bool {
        match (self, filter) {
            (_, Value::Null) => true,
            (AbiValue::Array(items), Value::Array(wanted)) => {
                items.len() == wanted.len() && items.iter().zip(wanted).all(|(v, w)| v.matches(w))
            }
            (AbiValue::Tuple(tuple), Value::Array(wanted)) => {
                tuple.len() == wanted.len()
                    && tuple.values().iter().zip(wanted).all(|(v, w)| v.matches(w))
            }
            (_, Value::Array(any_of)) => any_of.iter().any(|w| self.matches(w)),
            (AbiValue::Tuple(tuple), Value::Object(fields)) => fields
                .iter()
                .all(|(key, w)| tuple.get(key).map(|v| v.matches(w)).unwrap_or(false)),
            (AbiValue::Bool(b), Value::Bool(w)) => b == w,
            (AbiValue::Bool(b), Value::String(w)) => w.parse::<bool>().map(|w| w == *b).unwrap_or(false),
            (AbiValue::Int(n), w) => canonical_integer(w).map(|w| &w == n).unwrap_or(false),
            (AbiValue::Address(a), Value::String(w)) => a.eq_ignore_ascii_case(w.trim()),
            (AbiValue::Bytes(h), Value::String(w)) => {
                let w = w.trim();
                let w = w.strip_prefix("0x").or_else(|| w.strip_prefix("0X")).unwrap_or(w);
                h.trim_start_matches("0x").eq_ignore_ascii_case(w)
            }
            (AbiValue::String(s), Value::String(w)) => s == w,
            _ => false,
        }
    }
}

impl Serialize for AbiValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AbiValue::Bool(b) => serializer.serialize_bool(*b),
            AbiValue::Int(s) | AbiValue::Address(s) | AbiValue::Bytes(s) | AbiValue::String(s) => {
                serializer.serialize_str(s)
            }
            AbiValue::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            AbiValue::Tuple(tuple) => tuple.serialize(serializer),
        }
    }
}

/// An ordered list of values addressable both by position and by name.
///
/// Both keys resolve to the same stored value, so `tuple.get("0")` and
/// `tuple.get("owner")` can never disagree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedTuple {
    values: Vec<AbiValue>,
    names: Vec<Option<String>>,
}

impl DecodedTuple {
    /// `names` is aligned with `values`; empty names are treated as absent.
    pub fn new(values: Vec<AbiValue>, names: Vec<String>) -> Self {
        let names = (0..values.len())
            .map(|i| names.get(i).filter(|n| !n.is_empty()).cloned())
            .collect();
        Self { values, names }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[AbiValue] {
        &self.values
    }

    pub fn into_values(self) -> Vec<AbiValue> {
        self.values
    }

    pub fn at(&self, position: usize) -> Option<&AbiValue> {
        self.values.get(position)
    }

    pub fn named(&self, name: &str) -> Option<&AbiValue> {
        self.names
            .iter()
            .position(|n| n.as_deref() == Some(name))
            .and_then(|i| self.values.get(i))
    }

    /// Look up by decimal position (`"0"`, `"1"`, …) or by name.
    pub fn get(&self, key: &str) -> Option<&AbiValue> {
        match key.parse::<usize>() {
            Ok(position) => self.at(position),
            Err(_) => self.named(key),
        }
    }

    pub fn name_of(&self, position: usize) -> Option<&str> {
        self.names.get(position).and_then(|n| n.as_deref())
    }

    /// Every supplied key must be present and match; `null` filters match anything.
    pub fn matches(&self, filter: &Value) -> bool {
        match filter {
            Value::Null => true,
            Value::Object(fields) => fields.iter().all(|(key, wanted)| {
                wanted.is_null() || self.get(key).map(|v| v.matches(wanted)).unwrap_or(false)
            }),
            Value::Array(positional) => positional
                .iter()
                .enumerate()
                .all(|(i, wanted)| wanted.is_null() || self.at(i).map(|v| v.matches(wanted)).unwrap_or(false)),
            _ => false,
        }
    }
}

impl std::ops::Index<usize> for DecodedTuple {
    type Output = AbiValue;

    fn index(&self, position: usize) -> &AbiValue {
        &self.values[position]
    }
}

impl Serialize for DecodedTuple {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let named = self.names.iter().filter(|n| n.is_some()).count();
        let mut map = serializer.serialize_map(Some(self.values.len() + named))?;
        for (i, value) in self.values.iter().enumerate() {
            map.serialize_entry(&i.to_string(), value)?;
        }
        for (name, value) in self.names.iter().zip(&self.values) {
            if let Some(name) = name {
                if name.parse::<usize>().is_err() {
                    map.serialize_entry(name, value)?;
                }
            }
        }
        map.end()
    }
}

/// Result of a read-only call, shaped by the definition's output arity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutput {
    /// The definition declares exactly one output
    Scalar(AbiValue),
    /// Zero or several outputs, dual-keyed
    Tuple(DecodedTuple),
}

impl CallOutput {
    pub(crate) fn from_tuple(tuple: DecodedTuple) -> Self {
        if tuple.len() == 1 {
            let mut values = tuple.into_values();
            CallOutput::Scalar(values.remove(0))
        } else {
            CallOutput::Tuple(tuple)
        }
    }

    /// Collapse into a single value: the scalar itself, or the tuple.
    pub fn into_value(self) -> AbiValue {
        match self {
            CallOutput::Scalar(value) => value,
            CallOutput::Tuple(tuple) => AbiValue::Tuple(tuple),
        }
    }

    pub fn as_scalar(&self) -> Option<&AbiValue> {
        match self {
            CallOutput::Scalar(value) => Some(value),
            CallOutput::Tuple(_) => None,
        }
    }
}

impl Serialize for CallOutput {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CallOutput::Scalar(value) => value.serialize(serializer),
            CallOutput::Tuple(tuple) => tuple.serialize(serializer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> DecodedTuple {
        DecodedTuple::new(
            vec![
                AbiValue::Address("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed".into()),
                AbiValue::Int("1000".into()),
                AbiValue::Bool(true),
            ],
            vec!["owner".into(), "".into(), "active".into()],
        )
    }

    #[test]
    fn test_dual_keys_reference_same_value() {
        let tuple = sample();
        assert_eq!(tuple.get("0"), tuple.get("owner"));
        assert_eq!(tuple.get("2"), tuple.named("active"));
        assert_eq!(tuple.name_of(1), None);
        assert!(tuple.get("missing").is_none());
        assert_eq!(tuple[1], AbiValue::Int("1000".into()));
    }

    #[test]
    fn test_serialize_dual_keyed() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(
            value,
            json!({
                "0": "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
                "owner": "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
                "1": "1000",
                "2": true,
                "active": true
            })
        );
    }

    #[test]
    fn test_loose_matching() {
        let tuple = sample();
        assert!(tuple.matches(&json!({"owner": "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"})));
        assert!(tuple.matches(&json!({"1": "0x3e8"})));
        assert!(tuple.matches(&json!({"1": 1000, "active": null})));
        assert!(tuple.matches(&json!([null, ["7", "1000"]])));
        assert!(!tuple.matches(&json!({"1": "999"})));
        assert!(!tuple.matches(&json!({"nope": 1})));
        assert!(AbiValue::Bytes("0xdeadbeef".into()).matches(&json!("0xDEADBEEF")));
    }

    #[test]
    fn test_call_output_shape() {
        let single = CallOutput::from_tuple(DecodedTuple::new(vec![AbiValue::Int("7".into())], vec![]));
        assert_eq!(single.as_scalar(), Some(&AbiValue::Int("7".into())));

        let multi = CallOutput::from_tuple(sample());
        assert!(multi.as_scalar().is_none());
        assert!(matches!(multi.into_value(), AbiValue::Tuple(t) if t.len() == 3));
    }
}
