//! Historical event queries and live polling watchers.

use alloy::primitives::{Address, B256};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::time::sleep;
use tracing::{debug, warn};

use super::receipt::DecodedEvent;
use super::{absolute_block, Contract};
use crate::abi::codec::{encode_log_topics_filter, topic_is_hashed};
use crate::abi::{AbiDefinition, Resolved};
use crate::error::{ContractError, Result};
use crate::ethereum::{LogFilter, RawLog};

/// Block range and polling overrides. Negative blocks count back from the
/// latest (`-1` is the latest block).
#[derive(Debug, Clone, Default)]
pub struct EventOptions {
    pub from_block: Option<i64>,
    pub to_block: Option<i64>,
    pub poll_rate: Option<Duration>,
}

/// A resolved event with its (partial) argument filter.
#[derive(Debug, Clone)]
pub struct BoundEvent {
    contract: Contract,
    definition: Arc<AbiDefinition>,
    args: Vec<Value>,
}

/// Topic filter plus the post-decode argument filter, built once per query.
#[derive(Debug, Clone)]
struct Prepared {
    address: Address,
    topics: Vec<Option<B256>>,
    args: Value,
}

impl Prepared {
    fn log_filter(&self, from_block: u64, to_block: u64) -> LogFilter {
        LogFilter {
            address: Some(self.address),
            from_block,
            to_block,
            topics: self.topics.clone(),
        }
    }
}

impl BoundEvent {
    pub(crate) fn new(contract: Contract, resolved: Resolved) -> Self {
        Self {
            contract,
            definition: resolved.definition,
            args: resolved.args,
        }
    }

    pub fn definition(&self) -> &AbiDefinition {
        &self.definition
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    async fn prepare(&self) -> Result<Prepared> {
        let address = self
            .contract
            .address()
            .ok_or(ContractError::ContractAddressUndetermined)?;
        let args = self
            .contract
            .resolve_address_args(&self.definition.inputs, &self.args)
            .await?;
        let topics = encode_log_topics_filter(&self.definition, &args)?;
        // Indexed dynamic values decode to their hash; the topic already filtered them.
        let post_filter = self
            .definition
            .inputs
            .iter()
            .zip(args)
            .map(|(param, value)| {
                if param.indexed && topic_is_hashed(param) {
                    Value::Null
                } else {
                    value
                }
            })
            .collect();
        Ok(Prepared {
            address,
            topics,
            args: Value::Array(post_filter),
        })
    }

    fn decode(&self, prepared: &Prepared, log: &RawLog) -> Option<DecodedEvent> {
        match DecodedEvent::decode(&self.definition, log) {
            Ok(event) if event.args.matches(&prepared.args) => Some(event),
            Ok(_) => None,
            Err(e) => {
                debug!("Skipping undecodable log from {}: {}", log.address, e);
                None
            }
        }
    }

    /// One-shot query over `[from_block, to_block]`, defaulting to
    /// `[0, latest]`. The contract must have an address.
    pub async fn since(&self, opts: &EventOptions) -> Result<Vec<DecodedEvent>> {
        let prepared = self.prepare().await?;
        let rpc = &self.contract.context().rpc;

        let from = opts.from_block.unwrap_or(0);
        let to = opts.to_block.unwrap_or(-1);
        let (from_block, to_block) = if from < 0 || to < 0 {
            let latest = rpc.block_number().await?;
            (absolute_block(from, latest), absolute_block(to, latest))
        } else {
            (from as u64, to as u64)
        };
        if from_block > to_block {
            return Ok(Vec::new());
        }

        let filter = prepared.log_filter(from_block, to_block);
        let logs = rpc.past_logs(&filter).await?;
        debug!(
            "{}: {} log(s) in blocks {}..={}",
            self.definition.signature(),
            logs.len(),
            from_block,
            to_block
        );
        Ok(logs.iter().filter_map(|log| self.decode(&prepared, log)).collect())
    }

    /// Start polling for new matching events.
    ///
    /// Without `from_block` the first poll only records the current height,
    /// so events already mined are not reported. Each later poll scans the
    /// blocks mined since the previous one. Poll failures are logged and
    /// retried on the next tick and the failed range is scanned again.
    /// Failing to build the filter (an unbound contract, an unresolvable
    /// name) is delivered as an error and stops the watch.
    pub fn watch(&self, opts: EventOptions) -> EventWatch {
        let (sender, receiver) = mpsc::unbounded_channel();
        let shared = Arc::new(WatchShared {
            closed: AtomicBool::new(false),
            running: AtomicBool::new(true),
            wake: Notify::new(),
            last_scanned: Mutex::new(None),
            poll_rate: opts
                .poll_rate
                .unwrap_or(self.contract.watch_settings().poll_rate),
        });
        let handle = WatchHandle {
            shared: shared.clone(),
        };
        tokio::spawn(self.clone().poll_loop(opts.from_block, shared, sender));
        EventWatch { receiver, handle }
    }

    async fn poll_loop(
        self,
        start: Option<i64>,
        shared: Arc<WatchShared>,
        sender: mpsc::UnboundedSender<Result<DecodedEvent>>,
    ) {
        let prepared = match self.prepare().await {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!("Cannot watch {}: {}", self.definition.signature(), e);
                let _ = sender.send(Err(e));
                shared.running.store(false, Ordering::SeqCst);
                return;
            }
        };

        let mut next_from: Option<u64> = None;
        while shared.is_active() && !sender.is_closed() {
            if let Err(e) = self
                .poll(&prepared, start, &mut next_from, &shared, &sender)
                .await
            {
                warn!("Event poll for {} failed: {}", self.definition.signature(), e);
            }
            if !shared.is_active() {
                break;
            }
            tokio::select! {
                _ = sleep(shared.poll_rate) => {}
                _ = shared.wake.notified() => {}
                _ = sender.closed() => break,
            }
        }
        shared.running.store(false, Ordering::SeqCst);
        debug!("Watcher for {} stopped", self.definition.signature());
    }

    async fn poll(
        &self,
        prepared: &Prepared,
        start: Option<i64>,
        next_from: &mut Option<u64>,
        shared: &WatchShared,
        sender: &mpsc::UnboundedSender<Result<DecodedEvent>>,
    ) -> Result<()> {
        let current = self.contract.context().rpc.block_number().await?;
        let from = match (*next_from, start) {
            (Some(from), _) => from,
            (None, Some(start)) => absolute_block(start, current),
            (None, None) => {
                *next_from = Some(current + 1);
                shared.set_last_scanned(current);
                return Ok(());
            }
        };
        *next_from = Some(from);
        if current < from {
            return Ok(());
        }

        let filter = prepared.log_filter(from, current);
        let logs = self.contract.context().rpc.past_logs(&filter).await?;
        debug!(
            "{}: scanned blocks {}..={}, {} log(s)",
            self.definition.signature(),
            from,
            current,
            logs.len()
        );
        for event in logs.iter().filter_map(|log| self.decode(prepared, log)) {
            if !shared.is_active() || sender.send(Ok(event)).is_err() {
                return Ok(());
            }
        }
        *next_from = Some(current + 1);
        shared.set_last_scanned(current);
        Ok(())
    }
}

#[derive(Debug)]
struct WatchShared {
    /// Set by `close`
    closed: AtomicBool,
    /// Cleared when the poll loop exits
    running: AtomicBool,
    wake: Notify,
    last_scanned: Mutex<Option<u64>>,
    poll_rate: Duration,
}

impl WatchShared {
    fn is_active(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.running.load(Ordering::SeqCst)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn set_last_scanned(&self, block: u64) {
        *self.last_scanned.lock().unwrap_or_else(|e| e.into_inner()) = Some(block);
    }
}

/// Control handle for a running watch. Clones control the same watch.
#[derive(Debug, Clone)]
pub struct WatchHandle {
    shared: Arc<WatchShared>,
}

impl WatchHandle {
    /// Stop polling. No events are delivered after this returns. Idempotent.
    pub fn close(&self) {
        if !self.shared.closed.swap(true, Ordering::SeqCst) {
            self.shared.wake.notify_one();
        }
    }

    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    /// Highest block covered so far, `None` before the first poll succeeds.
    pub fn last_scanned_block(&self) -> Option<u64> {
        *self.shared.last_scanned.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn poll_rate(&self) -> Duration {
        self.shared.poll_rate
    }
}

/// Stream of events from a watch. Dropping it stops the watch.
#[derive(Debug)]
pub struct EventWatch {
    receiver: mpsc::UnboundedReceiver<Result<DecodedEvent>>,
    handle: WatchHandle,
}

impl EventWatch {
    /// Next event, or `None` once the watch has stopped.
    pub async fn next(&mut self) -> Option<Result<DecodedEvent>> {
        if self.handle.shared.is_closed() {
            return None;
        }
        self.receiver.recv().await
    }

    pub fn handle(&self) -> WatchHandle {
        self.handle.clone()
    }

    pub fn close(&self) {
        self.handle.close();
    }
}
