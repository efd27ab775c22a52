use crate::error::{ContractError, Result};
use alloy::primitives::Address;
use async_trait::async_trait;
use std::collections::HashMap;
use std::str::FromStr;

/// Turns human-readable names into addresses. Hex addresses pass through.
#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn resolve(&self, name: &str) -> Result<Address>;
}

/// Resolves from a fixed name table, e.g. the `[names]` section of the config.
#[derive(Debug, Clone, Default)]
pub struct StaticNameResolver {
    names: HashMap<String, Address>,
}

impl StaticNameResolver {
    pub fn new(names: HashMap<String, Address>) -> Self {
        Self { names }
    }

    pub fn insert(&mut self, name: impl Into<String>, address: Address) {
        self.names.insert(name.into(), address);
    }
}

/// A string that already looks like a 20-byte hex address.
pub fn parse_hex_address(value: &str) -> Option<Address> {
    let value = value.trim();
    if value.len() == 42 && (value.starts_with("0x") || value.starts_with("0X")) {
        Address::from_str(value).ok()
    } else {
        None
    }
}

#[async_trait]
impl NameResolver for StaticNameResolver {
    async fn resolve(&self, name: &str) -> Result<Address> {
        if let Some(address) = parse_hex_address(name) {
            return Ok(address);
        }
        self.names
            .get(name.trim())
            .copied()
            .ok_or_else(|| ContractError::UnresolvedName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_resolution() {
        let mut resolver = StaticNameResolver::default();
        resolver.insert("treasury.eth", Address::repeat_byte(7));

        assert_eq!(resolver.resolve("treasury.eth").await.unwrap(), Address::repeat_byte(7));
        assert_eq!(
            resolver
                .resolve("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed")
                .await
                .unwrap()
                .to_checksum(None),
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        );
        assert_eq!(
            resolver.resolve("nobody.eth").await.unwrap_err(),
            ContractError::UnresolvedName("nobody.eth".into())
        );
    }
}
