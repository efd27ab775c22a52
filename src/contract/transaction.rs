//! Transaction lifecycle: `Built → Submitted → HashKnown → Mined → Confirmed`,
//! or `Failed` from any of them.
//!
//! One driver task owns the transitions and publishes each state on a watch
//! channel; every [`PendingTransaction`] facet just waits for the state it
//! needs, so a settled outcome is observed identically by all of them.

use alloy::primitives::B256;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::call::{BoundCall, CallOptions};
use super::receipt::Receipt;
use super::apply_bonus;
use crate::error::{ContractError, Result};
use crate::ethereum::{CallParams, ChainRpc};

/// Deepest confirmation count `confirmed` will wait for.
pub const MAX_CONFIRMATIONS: u64 = 12;

#[derive(Debug, Clone)]
pub enum TxState {
    Built,
    Submitted,
    HashKnown(B256),
    Mined {
        hash: B256,
        receipt: Arc<Receipt>,
    },
    Confirmed {
        hash: B256,
        receipt: Arc<Receipt>,
        confirmations: u64,
    },
    Failed {
        hash: Option<B256>,
        error: ContractError,
    },
}

impl TxState {
    pub fn hash(&self) -> Option<B256> {
        match self {
            TxState::Built | TxState::Submitted => None,
            TxState::HashKnown(hash)
            | TxState::Mined { hash, .. }
            | TxState::Confirmed { hash, .. } => Some(*hash),
            TxState::Failed { hash, .. } => *hash,
        }
    }

    pub fn receipt(&self) -> Option<&Arc<Receipt>> {
        match self {
            TxState::Mined { receipt, .. } | TxState::Confirmed { receipt, .. } => Some(receipt),
            _ => None,
        }
    }

    /// Blocks mined on top of the transaction's block; `None` before mining.
    pub fn confirmations(&self) -> Option<u64> {
        match self {
            TxState::Mined { .. } => Some(0),
            TxState::Confirmed { confirmations, .. } => Some(*confirmations),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ContractError> {
        match self {
            TxState::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Highest confirmation depth any facet has asked for.
#[derive(Debug, Default)]
struct Demand {
    wanted: AtomicU64,
    raised: Notify,
}

/// Handle on a submitted transaction.
///
/// `tx_id`, `receipt` and `confirmed` can be awaited independently and any
/// number of times. Awaiting the handle itself yields the receipt.
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    state: watch::Receiver<TxState>,
    demand: Arc<Demand>,
}

impl PendingTransaction {
    /// Current state, without waiting.
    pub fn state(&self) -> TxState {
        self.state.borrow().clone()
    }

    /// Resolves once the network has assigned a hash. Fails only if the
    /// transaction never got that far.
    pub async fn tx_id(&self) -> Result<B256> {
        let state = self
            .wait_for(|s| s.hash().is_some() || s.error().is_some())
            .await?;
        match (state.hash(), state.error()) {
            (Some(hash), _) => Ok(hash),
            (None, Some(error)) => Err(error.clone()),
            (None, None) => Err(driver_stopped()),
        }
    }

    /// Resolves once mined with a success status.
    pub async fn receipt(&self) -> Result<Receipt> {
        let state = self
            .wait_for(|s| s.receipt().is_some() || s.error().is_some())
            .await?;
        settle(&state)
    }

    /// Resolves once `count` blocks have been mined on top of the
    /// transaction's block. No timeout applies.
    pub async fn confirmed(&self, count: u64) -> Result<Receipt> {
        if count > MAX_CONFIRMATIONS {
            return Err(ContractError::ConfirmationLimit {
                requested: count,
                max: MAX_CONFIRMATIONS,
            });
        }
        if self.demand.wanted.fetch_max(count, Ordering::SeqCst) < count {
            self.demand.raised.notify_one();
        }
        let state = self
            .wait_for(|s| s.confirmations().is_some_and(|c| c >= count) || s.error().is_some())
            .await?;
        settle(&state)
    }

    async fn wait_for(&self, predicate: impl FnMut(&TxState) -> bool) -> Result<TxState> {
        let mut state = self.state.clone();
        let settled = state
            .wait_for(predicate)
            .await
            .map_err(|_| driver_stopped())?;
        Ok((*settled).clone())
    }
}

impl IntoFuture for PendingTransaction {
    type Output = Result<Receipt>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.receipt().await })
    }
}

fn settle(state: &TxState) -> Result<Receipt> {
    match (state.receipt(), state.error()) {
        (_, Some(error)) => Err(error.clone()),
        (Some(receipt), None) => Ok(receipt.as_ref().clone()),
        (None, None) => Err(driver_stopped()),
    }
}

fn driver_stopped() -> ContractError {
    ContractError::Rpc("transaction driver stopped before settling".into())
}

/// Spawn the driver for `call` and hand back its handle.
pub(crate) fn start(call: BoundCall, params: CallParams, opts: CallOptions) -> PendingTransaction {
    let (state, receiver) = watch::channel(TxState::Built);
    let demand = Arc::new(Demand::default());
    let driver = Driver {
        state,
        demand: demand.clone(),
    };
    tokio::spawn(driver.run(call, params, opts));
    PendingTransaction {
        state: receiver,
        demand,
    }
}

struct Driver {
    state: watch::Sender<TxState>,
    demand: Arc<Demand>,
}

impl Driver {
    async fn run(self, call: BoundCall, params: CallParams, opts: CallOptions) {
        let rpc = call.contract().context().rpc.clone();
        let confirmation_poll = call.contract().settings().confirmation_poll;

        match self.mine(&call, params, &opts).await {
            Ok((hash, receipt)) => {
                self.confirm(rpc.as_ref(), hash, receipt, confirmation_poll)
                    .await
            }
            Err(error) => {
                let hash = self.state.borrow().hash();
                warn!("Transaction failed: {}", error);
                self.state.send_replace(TxState::Failed { hash, error });
            }
        }
    }

    async fn mine(
        &self,
        call: &BoundCall,
        mut params: CallParams,
        opts: &CallOptions,
    ) -> Result<(B256, Arc<Receipt>)> {
        let contract = call.contract();
        let context = contract.context();
        let rpc = context.rpc.as_ref();
        let settings = contract.settings();

        if params.gas_price.is_none() {
            let bonus = opts.gas_price_bonus.unwrap_or(settings.gas_price_bonus);
            params.gas_price = Some(apply_bonus(rpc.gas_price().await?, bonus));
        }
        if params.gas.is_none() {
            let bonus = opts.gas_bonus.unwrap_or(settings.gas_bonus);
            let estimate = apply_bonus(rpc.estimate_gas(&params).await? as u128, bonus);
            params.gas = Some(u64::try_from(estimate).unwrap_or(u64::MAX));
        }

        self.state.send_replace(TxState::Submitted);
        let hash = match &opts.private_key {
            Some(key) => {
                let from = params.from.ok_or(ContractError::CallerUndetermined)?;
                if params.nonce.is_none() {
                    params.nonce = Some(rpc.transaction_count(from).await?);
                }
                if params.chain_id.is_none() {
                    params.chain_id = Some(rpc.chain_id().await?);
                }
                let raw = context.signer.sign(key, &params).await?;
                rpc.send_raw_transaction(&raw).await?
            }
            None => rpc.send_transaction(&params).await?,
        };
        info!("Transaction submitted with hash: 0x{:x}", hash);
        self.state.send_replace(TxState::HashKnown(hash));

        let raw = loop {
            if let Some(raw) = rpc.transaction_receipt(hash).await? {
                break raw;
            }
            tokio::select! {
                _ = sleep(settings.receipt_poll) => {}
                _ = self.state.closed() => {
                    debug!("All handles on 0x{:x} dropped; no longer waiting for a receipt", hash);
                    return Err(driver_stopped());
                }
            }
        };
        if !raw.status {
            return Err(ContractError::TransactionFailed { hash });
        }

        if call.is_constructor() {
            if let Some(address) = raw.contract_address {
                contract.set_address(address);
            }
        }
        let receipt = Receipt::decode(contract, raw);
        info!(
            "Transaction 0x{:x} mined in block {:?} with {} decoded event(s)",
            hash,
            receipt.block_number(),
            receipt.events.len()
        );
        Ok((hash, Arc::new(receipt)))
    }

    /// Publish confirmation depth, polling the block height only while
    /// some facet is waiting for more than has been reached.
    async fn confirm(&self, rpc: &dyn ChainRpc, hash: B256, receipt: Arc<Receipt>, poll: Duration) {
        self.state.send_replace(TxState::Mined {
            hash,
            receipt: receipt.clone(),
        });
        let mined_at = match receipt.block_number() {
            Some(block) => block,
            None => match rpc.block_number().await {
                Ok(block) => block,
                Err(e) => {
                    warn!("Cannot determine block of 0x{:x}: {}", hash, e);
                    return;
                }
            },
        };

        let mut confirmations = 0;
        loop {
            if self.state.is_closed() {
                return;
            }
            let wanted = self.demand.wanted.load(Ordering::SeqCst);
            if wanted <= confirmations {
                tokio::select! {
                    _ = self.demand.raised.notified() => continue,
                    _ = self.state.closed() => return,
                }
            }

            match rpc.block_number().await {
                Ok(current) => {
                    let depth = current.saturating_sub(mined_at);
                    if depth > confirmations {
                        confirmations = depth;
                        debug!("Transaction 0x{:x} has {} confirmation(s)", hash, confirmations);
                        self.state.send_replace(TxState::Confirmed {
                            hash,
                            receipt: receipt.clone(),
                            confirmations,
                        });
                    }
                }
                Err(e) => warn!("Confirmation poll for 0x{:x} failed: {}", hash, e),
            }

            if confirmations < wanted {
                tokio::select! {
                    _ = sleep(poll) => {}
                    _ = self.state.closed() => return,
                }
            }
        }
    }
}
