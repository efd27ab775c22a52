use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;

use crate::abi::AbiCache;
use crate::contract::{TransactionSettings, WatchSettings};
use crate::ethereum::{utils, StaticNameResolver};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub networks: HashMap<String, NetworkConfig>,
    pub default_network: String,
    #[serde(default)]
    pub transactions: TransactionConfig,
    #[serde(default)]
    pub events: EventConfig,
    #[serde(default)]
    pub abi_cache: AbiCacheConfig,
    /// Static name → address table used to resolve address arguments
    #[serde(default)]
    pub names: HashMap<String, String>,
    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub explorer_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Fraction added to gas estimates
    pub gas_bonus: f64,
    /// Fraction added to the network gas price (negative to shave)
    pub gas_price_bonus: f64,
    pub receipt_poll_ms: u64,
    pub confirmation_poll_ms: u64,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        let settings = TransactionSettings::default();
        Self {
            gas_bonus: settings.gas_bonus,
            gas_price_bonus: settings.gas_price_bonus,
            receipt_poll_ms: settings.receipt_poll.as_millis() as u64,
            confirmation_poll_ms: settings.confirmation_poll.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    pub poll_rate_ms: u64,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            poll_rate_ms: WatchSettings::default().poll_rate.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AbiCacheConfig {
    /// Maximum number of addresses kept; unbounded when absent
    pub capacity: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub allow_write_operations: bool,
}

impl Default for Config {
    fn default() -> Self {
        let mut networks = HashMap::new();

        networks.insert(
            "ethereum".to_string(),
            NetworkConfig {
                rpc_url: "https://eth-mainnet.g.alchemy.com/v2/demo".to_string(),
                chain_id: 1,
                explorer_url: Some("https://etherscan.io".to_string()),
            },
        );

        networks.insert(
            "sepolia".to_string(),
            NetworkConfig {
                rpc_url: "https://eth-sepolia.g.alchemy.com/v2/demo".to_string(),
                chain_id: 11155111,
                explorer_url: Some("https://sepolia.etherscan.io".to_string()),
            },
        );

        networks.insert(
            "local".to_string(),
            NetworkConfig {
                rpc_url: "http://127.0.0.1:8545".to_string(),
                chain_id: 31337,
                explorer_url: None,
            },
        );

        Self {
            networks,
            default_network: "ethereum".to_string(),
            transactions: TransactionConfig::default(),
            events: EventConfig::default(),
            abi_cache: AbiCacheConfig::default(),
            names: HashMap::new(),
            security: SecurityConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {:?}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {:?}: {}", path, e))?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    anyhow!("Failed to create config directory {:?}: {}", parent, e)
                })?;
            }
        }

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {:?}: {}", path, e))?;

        Ok(())
    }

    /// Load configuration with fallback to default
    pub async fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Self {
        let mut config = match path {
            Some(path) => match Self::load_from_file(path).await {
                Ok(config) => {
                    tracing::info!("Loaded configuration from file");
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to load config file, using defaults: {}", e);
                    Self::default()
                }
            },
            None => Self::default(),
        };

        config.apply_env_vars();
        config
    }

    fn apply_env_vars(&mut self) {
        if let Ok(api_key) = std::env::var("ALCHEMY_API_KEY") {
            tracing::info!("Using ALCHEMY_API_KEY environment variable for RPC URLs");

            for (network_name, network_config) in &mut self.networks {
                if network_config.rpc_url.contains("alchemy.com/v2/demo") {
                    network_config.rpc_url = network_config
                        .rpc_url
                        .replace("/demo", &format!("/{}", api_key));
                    tracing::debug!("Updated {} RPC URL with API key", network_name);
                } else if network_config.rpc_url.contains("YOUR_API_KEY_HERE") {
                    network_config.rpc_url = network_config
                        .rpc_url
                        .replace("YOUR_API_KEY_HERE", &api_key);
                    tracing::debug!("Updated {} RPC URL with API key", network_name);
                }
            }
        } else {
            for (network_name, network_config) in &self.networks {
                if network_config.rpc_url.contains("/demo") {
                    tracing::warn!("Using demo RPC endpoint for {}, set ALCHEMY_API_KEY environment variable for better reliability", network_name);
                }
            }
        }
    }

    /// Signing key from `CONTRACT_DISPATCH_PRIVATE_KEY`, if set and non-empty
    pub fn private_key_from_env() -> Option<String> {
        std::env::var("CONTRACT_DISPATCH_PRIVATE_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
    }

    pub fn transaction_settings(&self) -> TransactionSettings {
        TransactionSettings {
            gas_bonus: self.transactions.gas_bonus,
            gas_price_bonus: self.transactions.gas_price_bonus,
            receipt_poll: Duration::from_millis(self.transactions.receipt_poll_ms),
            confirmation_poll: Duration::from_millis(self.transactions.confirmation_poll_ms),
        }
    }

    pub fn watch_settings(&self) -> WatchSettings {
        WatchSettings {
            poll_rate: Duration::from_millis(self.events.poll_rate_ms),
        }
    }

    /// The process-wide cache, or a dedicated bounded one if a capacity is set.
    pub fn abi_cache(&self) -> Arc<AbiCache> {
        match self.abi_cache.capacity {
            Some(capacity) => Arc::new(AbiCache::bounded(capacity)),
            None => AbiCache::global(),
        }
    }

    pub fn name_resolver(&self) -> Result<StaticNameResolver> {
        let mut resolver = StaticNameResolver::default();
        for (name, address) in &self.names {
            let address = utils::validate_address(address)
                .map_err(|e| anyhow!("Invalid address for name '{}': {}", name, e))?;
            resolver.insert(name.clone(), address);
        }
        Ok(resolver)
    }

    /// Get default config file path
    pub fn default_config_path() -> Result<std::path::PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("contract-dispatch").join("config.toml"))
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let sample_config = r#"# contract-dispatch configuration

# Network used when none is specified
default_network = "ethereum"

[networks.ethereum]
rpc_url = "https://eth-mainnet.g.alchemy.com/v2/YOUR_API_KEY_HERE"
chain_id = 1
explorer_url = "https://etherscan.io"

[networks.sepolia]
rpc_url = "https://eth-sepolia.g.alchemy.com/v2/YOUR_API_KEY_HERE"
chain_id = 11155111
explorer_url = "https://sepolia.etherscan.io"

[networks.local]
rpc_url = "http://127.0.0.1:8545"
chain_id = 31337

# Transaction defaults; bonuses are fractions (0.25 = +25%)
[transactions]
gas_bonus = 0.25
gas_price_bonus = -0.1
receipt_poll_ms = 1000
confirmation_poll_ms = 1000

# Live event watchers
[events]
poll_rate_ms = 15000

# Addresses remembered for decoding events from other contracts.
# Unbounded unless a capacity is given.
[abi_cache]
# capacity = 1024

# Names accepted wherever an address argument is expected
[names]
# treasury = "0x0000000000000000000000000000000000000000"

[security]
allow_write_operations = false

# Environment variables:
# ALCHEMY_API_KEY - replaces YOUR_API_KEY_HERE / demo keys above
# CONTRACT_DISPATCH_PRIVATE_KEY - signing key for `send`
"#;
        sample_config.to_string()
    }
}
