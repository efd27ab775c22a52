use alloy::primitives::B256;
use thiserror::Error;

/// Errors raised while resolving, encoding, submitting or decoding contract
/// interactions.
///
/// Every variant carries owned text so a settled outcome can be cloned out to
/// each awaiting facet of a [`PendingTransaction`](crate::contract::PendingTransaction).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContractError {
    #[error("no {kind} definition matches {name}: {detail}")]
    DefinitionNotFound {
        kind: String,
        name: String,
        detail: String,
    },

    #[error("cannot encode {param}: {reason}")]
    Encoding { param: String, reason: String },

    #[error("cannot decode {what}: {reason}")]
    Decoding { what: String, reason: String },

    #[error("no caller address could be determined (pass `from`, a private key, or unlock an account)")]
    CallerUndetermined,

    #[error("no contract address could be determined (bind the contract or pass `to`)")]
    ContractAddressUndetermined,

    #[error("transaction {hash} was mined but reverted")]
    TransactionFailed { hash: B256 },

    #[error("name '{0}' could not be resolved to an address")]
    UnresolvedName(String),

    #[error("confirmations beyond {max} are not tracked (requested {requested})")]
    ConfirmationLimit { requested: u64, max: u64 },

    #[error("contract has no bytecode to deploy")]
    NoBytecode,

    #[error("invalid ABI: {0}")]
    InvalidAbi(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("rpc error: {0}")]
    Rpc(String),
}

impl ContractError {
    pub(crate) fn encoding(param: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Encoding {
            param: param.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn decoding(what: impl Into<String>, reason: impl ToString) -> Self {
        Self::Decoding {
            what: what.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn rpc(error: impl ToString) -> Self {
        Self::Rpc(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ContractError>;
