//! Conversion between JSON application values and the ABI wire format.
//!
//! Binary layout is delegated to `alloy`'s dynamic ABI types; this module owns
//! coercion of loosely-typed inputs (numbers, decimal or hex strings, hex byte
//! strings, positional or named tuples) and normalisation of decoded outputs.

use alloy::dyn_abi::{DynSolType, DynSolValue};
use alloy::primitives::{keccak256, Address, Bytes, B256, I256, U256};
use serde_json::Value;
use std::str::FromStr;

use super::definition::{AbiDefinition, AbiParam};
use super::value::{AbiValue, DecodedTuple};
use crate::error::{ContractError, Result};
use crate::ethereum::RawLog;

/// Parse a parameter's canonical type into a dynamic ABI type.
pub fn parse_type(param: &AbiParam) -> Result<DynSolType> {
    let canonical = param.canonical_type();
    DynSolType::parse(canonical)
        .map_err(|e| ContractError::InvalidAbi(format!("unsupported type '{}': {}", canonical, e)))
}

/// Encode a single value of type `ty`.
pub fn encode_value(ty: &str, value: &Value) -> Result<Bytes> {
    encode_param(&AbiParam::of_type(ty), value)
}

pub fn encode_param(param: &AbiParam, value: &Value) -> Result<Bytes> {
    let ty = parse_type(param)?;
    Ok(to_dyn_value(param, &ty, value)?.abi_encode().into())
}

/// Decode a single value of type `ty` from its standalone encoding.
pub fn decode_value(ty: &str, raw: &[u8]) -> Result<AbiValue> {
    let param = AbiParam::of_type(ty);
    let decoded = parse_type(&param)?
        .abi_decode(raw)
        .map_err(|e| ContractError::decoding(ty, e))?;
    from_dyn_value(&param, &decoded)
}

/// Encode an argument list as an ABI tuple (no selector).
pub fn encode_arguments(params: &[AbiParam], args: &[Value]) -> Result<Vec<u8>> {
    if params.len() != args.len() {
        return Err(ContractError::encoding(
            "arguments",
            format!("expected {} values, got {}", params.len(), args.len()),
        ));
    }
    let values = params
        .iter()
        .zip(args)
        .map(|(param, value)| to_dyn_value(param, &parse_type(param)?, value))
        .collect::<Result<Vec<_>>>()?;
    Ok(DynSolValue::Tuple(values).abi_encode_params())
}

/// Selector followed by the encoded argument tuple.
pub fn encode_function_call(definition: &AbiDefinition, args: &[Value]) -> Result<Bytes> {
    let mut data = definition.selector().to_vec();
    data.extend(encode_arguments(&definition.inputs, args)?);
    Ok(data.into())
}

/// Deployment bytecode followed by the encoded constructor arguments.
pub fn encode_constructor_call(
    bytecode: &Bytes,
    definition: &AbiDefinition,
    args: &[Value],
) -> Result<Bytes> {
    let mut data = bytecode.to_vec();
    data.extend(encode_arguments(&definition.inputs, args)?);
    Ok(data.into())
}

/// Decode an ABI tuple laid out per `params` into a dual-keyed tuple.
pub fn decode_parameters(params: &[AbiParam], data: &[u8]) -> Result<DecodedTuple> {
    if params.is_empty() {
        return Ok(DecodedTuple::default());
    }
    if data.is_empty() {
        return Err(ContractError::decoding("return data", "empty response"));
    }
    let types = params.iter().map(parse_type).collect::<Result<Vec<_>>>()?;
    let values = match DynSolType::Tuple(types)
        .abi_decode_params(data)
        .map_err(|e| ContractError::decoding("parameters", e))?
    {
        DynSolValue::Tuple(values) => values,
        other => vec![other],
    };
    let decoded = params
        .iter()
        .zip(&values)
        .map(|(param, value)| from_dyn_value(param, value))
        .collect::<Result<Vec<_>>>()?;
    Ok(DecodedTuple::new(
        decoded,
        params.iter().map(|p| p.name.clone()).collect(),
    ))
}

/// Build the topic filter for an event.
///
/// `args` is aligned with the event's inputs (`null` where absent). The result
/// holds the signature hash (unless anonymous) followed by one entry per
/// indexed input; `None` is a wildcard.
pub fn encode_log_topics_filter(
    definition: &AbiDefinition,
    args: &[Value],
) -> Result<Vec<Option<B256>>> {
    let mut topics = Vec::new();
    if !definition.anonymous {
        topics.push(Some(definition.topic()));
    }
    for (i, param) in definition.inputs.iter().enumerate() {
        if !param.indexed {
            continue;
        }
        let value = args.get(i).unwrap_or(&Value::Null);
        // An array against a scalar type is an any-of filter, left to post-decode matching.
        let any_of = value.is_array() && param.element().is_none() && !param.ty.starts_with("tuple");
        if value.is_null() || any_of {
            topics.push(None);
        } else {
            topics.push(Some(encode_topic(param, value)?));
        }
    }
    Ok(topics)
}

/// Encode one indexed value as a log topic. Value types occupy the word
/// directly. Strings and bytes hash their raw contents; arrays and tuples
/// hash the concatenation of their members, each padded to whole words and
/// without length prefixes.
pub fn encode_topic(param: &AbiParam, value: &Value) -> Result<B256> {
    let ty = parse_type(param)?;
    let encoded = to_dyn_value(param, &ty, value)?;
    Ok(match &encoded {
        _ if is_word_type(&ty) => B256::from_slice(&encoded.abi_encode()),
        DynSolValue::String(s) => keccak256(s.as_bytes()),
        DynSolValue::Bytes(bytes) => keccak256(bytes),
        _ => {
            let mut preimage = Vec::new();
            topic_preimage(&encoded, &mut preimage);
            keccak256(preimage)
        }
    })
}

fn topic_preimage(value: &DynSolValue, out: &mut Vec<u8>) {
    match value {
        DynSolValue::String(s) => pad_to_word(s.as_bytes(), out),
        DynSolValue::Bytes(bytes) => pad_to_word(bytes, out),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            for item in items {
                topic_preimage(item, out);
            }
        }
        word => out.extend(word.abi_encode()),
    }
}

fn pad_to_word(bytes: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(bytes);
    out.resize(out.len() + (32 - bytes.len() % 32) % 32, 0);
}

/// Decode a raw log against an event definition.
///
/// Indexed inputs come from `topics[1..]` in declaration order, the rest from
/// `data` as one contiguous tuple; both are re-interleaved into input order.
pub fn decode_log_item_args(definition: &AbiDefinition, log: &RawLog) -> Result<DecodedTuple> {
    let topics = if definition.anonymous {
        &log.topics[..]
    } else {
        match log.topics.split_first() {
            Some((signature, rest)) if *signature == definition.topic() => rest,
            _ => {
                return Err(ContractError::decoding(
                    definition.signature(),
                    "log signature topic does not match",
                ))
            }
        }
    };

    let indexed = definition.inputs.iter().filter(|p| p.indexed).count();
    if topics.len() != indexed {
        return Err(ContractError::decoding(
            definition.signature(),
            format!("expected {} indexed topics, found {}", indexed, topics.len()),
        ));
    }

    let data_params: Vec<AbiParam> = definition
        .inputs
        .iter()
        .filter(|p| !p.indexed)
        .cloned()
        .collect();
    let mut data_values = decode_parameters(&data_params, &log.data)?.into_values().into_iter();
    let mut topic_values = topics.iter();

    let mut values = Vec::with_capacity(definition.inputs.len());
    for param in &definition.inputs {
        let value = if param.indexed {
            let topic = topic_values
                .next()
                .ok_or_else(|| ContractError::decoding(&param.name, "missing topic"))?;
            decode_topic(param, topic)?
        } else {
            data_values
                .next()
                .ok_or_else(|| ContractError::decoding(&param.name, "missing data value"))?
        };
        values.push(value);
    }

    Ok(DecodedTuple::new(
        values,
        definition.inputs.iter().map(|p| p.name.clone()).collect(),
    ))
}

fn decode_topic(param: &AbiParam, topic: &B256) -> Result<AbiValue> {
    let ty = parse_type(param)?;
    if !is_word_type(&ty) {
        // Only the hash of a dynamic value is recoverable from a topic.
        return Ok(AbiValue::Bytes(format!("0x{}", hex::encode(topic))));
    }
    let decoded = ty
        .abi_decode(topic.as_slice())
        .map_err(|e| ContractError::decoding(&param.name, e))?;
    from_dyn_value(param, &decoded)
}

/// Whether an indexed value of this parameter is stored as a hash in its topic.
pub fn topic_is_hashed(param: &AbiParam) -> bool {
    parse_type(param).map(|ty| !is_word_type(&ty)).unwrap_or(true)
}

fn is_word_type(ty: &DynSolType) -> bool {
    matches!(
        ty,
        DynSolType::Bool
            | DynSolType::Int(_)
            | DynSolType::Uint(_)
            | DynSolType::Address
            | DynSolType::FixedBytes(_)
            | DynSolType::Function
    )
}

fn label(param: &AbiParam) -> String {
    if param.name.is_empty() {
        param.canonical_type().to_string()
    } else {
        format!("'{}' ({})", param.name, param.canonical_type())
    }
}

fn tuple_fields(param: &AbiParam, arity: usize) -> Vec<AbiParam> {
    if param.components.len() == arity {
        param.components.clone()
    } else {
        vec![AbiParam::of_type(""); arity]
    }
}

/// Coerce a JSON value into the dynamic value of type `ty`.
fn to_dyn_value(param: &AbiParam, ty: &DynSolType, value: &Value) -> Result<DynSolValue> {
    let fail = |reason: String| ContractError::encoding(label(param), reason);
    if value.is_null() {
        return Err(fail("a value is required".into()));
    }

    match ty {
        DynSolType::Bool => match value {
            Value::Bool(b) => Ok(DynSolValue::Bool(*b)),
            Value::String(s) => s
                .trim()
                .parse::<bool>()
                .map(DynSolValue::Bool)
                .map_err(|_| fail(format!("'{}' is not a boolean", s))),
            other => Err(fail(format!("expected a boolean, found {}", other))),
        },
        DynSolType::Uint(bits) => {
            let n = parse_uint(value).map_err(fail)?;
            if n.bit_len() > *bits {
                return Err(fail(format!("{} does not fit in uint{}", n, bits)));
            }
            Ok(DynSolValue::Uint(n, *bits))
        }
        DynSolType::Int(bits) => {
            let n = parse_int(value).map_err(fail)?;
            if !int_fits(&n, *bits) {
                return Err(fail(format!("{} does not fit in int{}", n, bits)));
            }
            Ok(DynSolValue::Int(n, *bits))
        }
        DynSolType::Address => {
            let s = value
                .as_str()
                .ok_or_else(|| fail("an address must be a hex string".into()))?;
            Address::from_str(s.trim())
                .map(DynSolValue::Address)
                .map_err(|e| fail(format!("invalid address '{}': {}", s, e)))
        }
        DynSolType::FixedBytes(size) => {
            let bytes = parse_hex(value).map_err(fail)?;
            if bytes.len() > *size {
                return Err(fail(format!(
                    "{} bytes given for bytes{}",
                    bytes.len(),
                    size
                )));
            }
            // Short inputs are right-padded with zeros.
            let mut word = B256::ZERO;
            word.0[..bytes.len()].copy_from_slice(&bytes);
            Ok(DynSolValue::FixedBytes(word, *size))
        }
        DynSolType::Bytes => Ok(DynSolValue::Bytes(parse_hex(value).map_err(fail)?)),
        DynSolType::String => match value {
            Value::String(s) => Ok(DynSolValue::String(s.clone())),
            other => Err(fail(format!("expected a string, found {}", other))),
        },
        DynSolType::Array(inner) => {
            let items = value
                .as_array()
                .ok_or_else(|| fail("expected an array".into()))?;
            let element = param.element().unwrap_or_else(|| AbiParam::of_type(""));
            items
                .iter()
                .map(|item| to_dyn_value(&element, inner, item))
                .collect::<Result<Vec<_>>>()
                .map(DynSolValue::Array)
        }
        DynSolType::FixedArray(inner, len) => {
            let items = value
                .as_array()
                .ok_or_else(|| fail("expected an array".into()))?;
            if items.len() != *len {
                return Err(fail(format!("expected {} elements, got {}", len, items.len())));
            }
            let element = param.element().unwrap_or_else(|| AbiParam::of_type(""));
            items
                .iter()
                .map(|item| to_dyn_value(&element, inner, item))
                .collect::<Result<Vec<_>>>()
                .map(DynSolValue::FixedArray)
        }
        DynSolType::Tuple(types) => {
            let fields = tuple_fields(param, types.len());
            let items: Vec<&Value> = match value {
                Value::Array(items) if items.len() == types.len() => items.iter().collect(),
                Value::Array(items) => {
                    return Err(fail(format!(
                        "expected {} tuple fields, got {}",
                        types.len(),
                        items.len()
                    )))
                }
                Value::Object(map) => fields
                    .iter()
                    .map(|f| map.get(&f.name).unwrap_or(&Value::Null))
                    .collect(),
                other => return Err(fail(format!("expected a tuple, found {}", other))),
            };
            fields
                .iter()
                .zip(types)
                .zip(items)
                .map(|((field, ty), item)| to_dyn_value(field, ty, item))
                .collect::<Result<Vec<_>>>()
                .map(DynSolValue::Tuple)
        }
        _ => Err(fail("type is not supported by this codec".into())),
    }
}

/// Normalise a decoded dynamic value.
fn from_dyn_value(param: &AbiParam, value: &DynSolValue) -> Result<AbiValue> {
    Ok(match value {
        DynSolValue::Bool(b) => AbiValue::Bool(*b),
        DynSolValue::Int(n, _) => AbiValue::Int(n.to_string()),
        DynSolValue::Uint(n, _) => AbiValue::Int(n.to_string()),
        DynSolValue::Address(address) => AbiValue::Address(address.to_checksum(None)),
        DynSolValue::FixedBytes(word, size) => {
            AbiValue::Bytes(format!("0x{}", hex::encode(&word.0[..*size])))
        }
        DynSolValue::Function(function) => AbiValue::Bytes(format!("0x{}", hex::encode(function))),
        DynSolValue::Bytes(bytes) => AbiValue::Bytes(format!("0x{}", hex::encode(bytes))),
        DynSolValue::String(s) => AbiValue::String(s.clone()),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) => {
            let element = param.element().unwrap_or_else(|| AbiParam::of_type(""));
            AbiValue::Array(
                items
                    .iter()
                    .map(|item| from_dyn_value(&element, item))
                    .collect::<Result<Vec<_>>>()?,
            )
        }
        DynSolValue::Tuple(items) => {
            let fields = tuple_fields(param, items.len());
            let values = fields
                .iter()
                .zip(items)
                .map(|(field, item)| from_dyn_value(field, item))
                .collect::<Result<Vec<_>>>()?;
            AbiValue::Tuple(DecodedTuple::new(
                values,
                fields.into_iter().map(|f| f.name).collect(),
            ))
        }
        #[allow(unreachable_patterns)]
        other => {
            return Err(ContractError::decoding(
                label(param),
                format!("unsupported value {:?}", other),
            ))
        }
    })
}

fn strip_hex_prefix(s: &str) -> Option<&str> {
    s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))
}

/// Parse an unsigned integer from a JSON number or a decimal/hex string.
pub fn parse_uint(value: &Value) -> std::result::Result<U256, String> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| format!("{} is not a non-negative integer", n)),
        Value::String(s) => {
            let s = s.trim();
            let parsed = match strip_hex_prefix(s) {
                Some(hex) => U256::from_str_radix(hex, 16),
                None => U256::from_str_radix(s, 10),
            };
            parsed.map_err(|_| format!("'{}' is not an unsigned integer", s))
        }
        other => Err(format!("expected an integer, found {}", other)),
    }
}

/// Parse a signed integer from a JSON number or a (optionally signed)
/// decimal/hex string. Never goes through floating point.
pub fn parse_int(value: &Value) -> std::result::Result<I256, String> {
    let text = match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => n.to_string(),
        Value::Number(n) => return Err(format!("{} is not an integer", n)),
        Value::String(s) => s.trim().to_string(),
        other => return Err(format!("expected an integer, found {}", other)),
    };
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(&text)),
    };
    let decimal = match strip_hex_prefix(body) {
        Some(hex) => U256::from_str_radix(hex, 16)
            .map_err(|_| format!("'{}' is not an integer", text))?
            .to_string(),
        None => body.to_string(),
    };
    let signed = if negative {
        format!("-{}", decimal)
    } else {
        decimal
    };
    I256::from_dec_str(&signed).map_err(|_| format!("'{}' is not a signed 256-bit integer", text))
}

/// Canonical base-10 form of an integer-like JSON value, or `None`.
pub fn canonical_integer(value: &Value) -> Option<String> {
    parse_int(value)
        .map(|n| n.to_string())
        .or_else(|_| parse_uint(value).map(|n| n.to_string()))
        .ok()
}

fn int_fits(n: &I256, bits: usize) -> bool {
    if bits >= 256 {
        return true;
    }
    let magnitude = if n.is_negative() {
        !n.into_raw()
    } else {
        n.into_raw()
    };
    magnitude.bit_len() < bits
}

fn parse_hex(value: &Value) -> std::result::Result<Vec<u8>, String> {
    let s = value
        .as_str()
        .ok_or_else(|| format!("expected a hex string, found {}", value))?
        .trim();
    let body = strip_hex_prefix(s).unwrap_or(s);
    hex::decode(body).map_err(|e| format!("invalid hex '{}': {}", s, e))
}
