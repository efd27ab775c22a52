//! ABI-driven contract calls, transactions and event queries.
//!
//! A [`Contract`] couples a JSON ABI (and optionally deploy bytecode and an
//! address) with the chain collaborators in a [`ChainContext`]. Functions,
//! constructors and events are bound by name with positional or named JSON
//! arguments, overloads are resolved from the arguments, and results come
//! back as JSON-friendly [`AbiValue`]s.

pub mod abi;
pub mod config;
pub mod contract;
pub mod error;
pub mod ethereum;
pub mod server;

pub use abi::{AbiCache, AbiValue, Artifact, CallArgs, CallOutput, ContractAbi, DecodedTuple};
pub use contract::{
    BoundCall, BoundEvent, CallOptions, ChainContext, Contract, DecodedEvent, EventOptions,
    EventWatch, PendingTransaction, Receipt, TransactionSettings, TxState, WatchHandle,
    WatchSettings, MAX_CONFIRMATIONS,
};
pub use error::{ContractError, Result};
