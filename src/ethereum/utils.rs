use alloy::primitives::{Address, U256};
use anyhow::{anyhow, Result};
use serde_json::Value;
use std::str::FromStr;

/// Validates an address given on the command line or to a tool
pub fn validate_address(address: &str) -> Result<Address> {
    let address = address.trim();

    if address.is_empty() {
        return Err(anyhow!("Address cannot be empty"));
    }

    let Some(hex_part) = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
    else {
        return Err(anyhow!(
            "Invalid address format: '{}'. Addresses must start with '0x'",
            address
        ));
    };

    if hex_part.len() != 40 {
        return Err(anyhow!(
            "Invalid address length: '{}'. Expected 0x followed by 40 hex characters",
            address
        ));
    }

    if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(anyhow!(
            "Invalid address format: '{}'. Contains non-hexadecimal characters",
            address
        ));
    }

    Address::from_str(address).map_err(|e| anyhow!("Invalid address '{}': {}", address, e))
}

pub fn validate_network(network: &str, available_networks: &[String]) -> Result<()> {
    if network.is_empty() {
        return Err(anyhow!("Network name cannot be empty"));
    }

    if !available_networks.iter().any(|n| n == network) {
        return Err(anyhow!(
            "Unknown network: '{}'. Available networks: {}",
            network,
            available_networks.join(", ")
        ));
    }

    Ok(())
}

/// Function and event names must be Solidity identifiers.
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    match chars.next() {
        None => return Err(anyhow!("Name cannot be empty")),
        Some(c) if !(c.is_ascii_alphabetic() || c == '_' || c == '$') => {
            return Err(anyhow!(
                "Invalid name: '{}'. Names must start with a letter, '_' or '$'",
                name
            ))
        }
        _ => {}
    }

    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$') {
        return Err(anyhow!(
            "Invalid name: '{}'. Names can only contain letters, digits, '_' and '$'",
            name
        ));
    }

    Ok(())
}

/// Parses a wei amount given in decimal or 0x-prefixed hex
pub fn validate_hex_value(value_str: &str) -> Result<U256> {
    let value_str = value_str.trim();
    if value_str.is_empty() {
        return Err(anyhow!("Value cannot be empty"));
    }

    match value_str
        .strip_prefix("0x")
        .or_else(|| value_str.strip_prefix("0X"))
    {
        Some(hex) => U256::from_str_radix(hex, 16)
            .map_err(|_| anyhow!("Invalid hexadecimal value: '{}'", value_str)),
        None => U256::from_str_radix(value_str, 10).map_err(|_| {
            anyhow!(
                "Invalid numeric value: '{}'. Use decimal format or '0x' prefixed hex",
                value_str
            )
        }),
    }
}

/// Parses a JSON argument string: `[..]` is positional, `{..}` named, empty is none.
pub fn parse_json_args(args: Option<&str>) -> Result<Value> {
    match args.map(str::trim) {
        None | Some("") => Ok(Value::Null),
        Some(text) => serde_json::from_str(text)
            .map_err(|e| anyhow!("Arguments must be JSON (array or object): {}", e)),
    }
}

/// Creates user-friendly error messages for common RPC errors
pub fn interpret_rpc_error(error: &str) -> String {
    if error.contains("execution reverted") {
        "Execution reverted: the contract rejected the call. Check its requirements and your arguments.".to_string()
    } else if error.contains("insufficient funds") {
        "Transaction failed: Insufficient funds to cover value and gas.".to_string()
    } else if error.contains("gas required exceeds allowance") || error.contains("out of gas") {
        "Transaction failed: Gas limit too low. Raise the gas limit or the gas bonus.".to_string()
    } else if error.contains("nonce too low") {
        "Transaction failed: Nonce too low. Another transaction was already mined with this nonce.".to_string()
    } else if error.contains("replacement transaction underpriced") {
        "Transaction failed: Gas price too low to replace a pending transaction. Raise the gas price.".to_string()
    } else if error.contains("connection refused") || error.contains("network unreachable") {
        "Network error: Cannot connect to RPC endpoint. Check the RPC URL configuration.".to_string()
    } else if error.contains("timeout") || error.contains("timed out") {
        "Network error: Request timed out. The RPC endpoint may be overloaded or unreachable."
            .to_string()
    } else if error.contains("rate limit") || error.contains("429") {
        "Rate limit error: Too many requests to the RPC endpoint. Try again shortly.".to_string()
    } else if error.contains("method not found") {
        "RPC error: The requested method is not supported by this RPC endpoint.".to_string()
    } else {
        format!("RPC error: {}", error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_address() {
        assert!(validate_address("0x742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e").is_ok());
        assert!(validate_address(" 0x0000000000000000000000000000000000000000 ").is_ok());

        assert!(validate_address("").is_err());
        assert!(validate_address("treasury.eth").is_err());
        assert!(validate_address("0x123").is_err());
        assert!(validate_address("742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e").is_err());
        assert!(validate_address("0xgg2d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e").is_err());
    }

    #[test]
    fn test_validate_network() {
        let networks = vec!["ethereum".to_string(), "sepolia".to_string()];

        assert!(validate_network("sepolia", &networks).is_ok());
        assert!(validate_network("invalid", &networks).is_err());
        assert!(validate_network("", &networks).is_err());
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("transfer").is_ok());
        assert!(validate_identifier("_internal").is_ok());
        assert!(validate_identifier("$sym").is_ok());

        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1st").is_err());
        assert!(validate_identifier("bad-name").is_err());
    }

    #[test]
    fn test_values_and_args() {
        assert_eq!(validate_hex_value("0x10").unwrap(), U256::from(16));
        assert_eq!(validate_hex_value("1000").unwrap(), U256::from(1000));
        assert!(validate_hex_value("ten").is_err());

        assert_eq!(parse_json_args(None).unwrap(), Value::Null);
        assert_eq!(parse_json_args(Some("[1, \"a\"]")).unwrap(), json!([1, "a"]));
        assert!(parse_json_args(Some("{oops")).is_err());
    }

    #[test]
    fn test_interpret_rpc_error() {
        assert!(interpret_rpc_error("server returned: execution reverted").starts_with("Execution reverted"));
        assert_eq!(interpret_rpc_error("boom"), "RPC error: boom");
    }
}
