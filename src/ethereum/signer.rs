use crate::error::{ContractError, Result};
use alloy::{
    eips::eip2718::Encodable2718,
    network::{EthereumWallet, TransactionBuilder},
    primitives::{Address, Bytes},
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
};
use async_trait::async_trait;
use std::str::FromStr;

use super::CallParams;

/// Local signing capability: derive an address from a private key and
/// produce a serialized signed transaction.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    fn address(&self, private_key: &str) -> Result<Address>;

    /// `params` must carry nonce, gas, gas price and chain id.
    async fn sign(&self, private_key: &str, params: &CallParams) -> Result<Bytes>;
}

/// Signs legacy transactions in-process with an alloy `PrivateKeySigner`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalSigner;

fn parse_key(private_key: &str) -> Result<PrivateKeySigner> {
    let private_key = private_key.trim();
    let private_key = private_key.strip_prefix("0x").unwrap_or(private_key);
    PrivateKeySigner::from_str(private_key)
        .map_err(|e| ContractError::Signing(format!("invalid private key: {}", e)))
}

#[async_trait]
impl TransactionSigner for LocalSigner {
    fn address(&self, private_key: &str) -> Result<Address> {
        Ok(parse_key(private_key)?.address())
    }

    async fn sign(&self, private_key: &str, params: &CallParams) -> Result<Bytes> {
        let signer = parse_key(private_key)?;
        let from = signer.address();
        let wallet = EthereumWallet::from(signer);

        let missing = |field: &str| ContractError::Signing(format!("transaction has no {}", field));
        let mut request = TransactionRequest::default()
            .from(from)
            .with_nonce(params.nonce.ok_or_else(|| missing("nonce"))?)
            .with_gas_limit(params.gas.ok_or_else(|| missing("gas limit"))?)
            .with_gas_price(params.gas_price.ok_or_else(|| missing("gas price"))?)
            .with_value(params.value.unwrap_or_default());
        request = match params.to {
            Some(to) => request.with_to(to).with_input(params.data.clone()),
            None => request.with_deploy_code(params.data.clone()),
        };
        if let Some(chain_id) = params.chain_id {
            request = request.with_chain_id(chain_id);
        }

        let envelope = request
            .build(&wallet)
            .await
            .map_err(|e| ContractError::Signing(e.to_string()))?;
        Ok(envelope.encoded_2718().into())
    }
}
