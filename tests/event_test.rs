//! Past-event queries and live watchers against the in-memory chain.

mod common;

use alloy::primitives::{keccak256, Address, B256};
use common::*;
use contract_dispatch::{AbiValue, CallArgs, ContractError, EventOptions};
use serde_json::json;
use std::time::Duration;
use tokio::time::{sleep, timeout};

fn transfer_topic() -> B256 {
    keccak256("Transfer(address,address,uint256)")
}

fn stored_topic() -> B256 {
    keccak256("Stored(address,uint256)")
}

#[tokio::test]
async fn test_watch_filters_by_indexed_address() {
    let chain = MemoryChain::new();
    let token_address = Address::repeat_byte(0x77);
    let token = contract(TOKEN_ABI, context(&chain)).with_address(token_address);
    let wanted = Address::repeat_byte(0x11);
    let other = Address::repeat_byte(0x22);

    let mut watch = token
        .event("Transfer", CallArgs::from_json(json!({"to": wanted.to_checksum(None)})))
        .unwrap()
        .watch(EventOptions::default());
    let handle = watch.handle();
    assert_eq!(handle.poll_rate(), Duration::from_millis(10));

    for _ in 0..200 {
        if handle.last_scanned_block().is_some() {
            break;
        }
        sleep(Duration::from_millis(5)).await;
    }
    assert!(handle.last_scanned_block().is_some());

    let from = address_topic(account());
    chain.push_log(token_address, vec![transfer_topic(), from, address_topic(other)], amount_data(1));
    chain.push_log(token_address, vec![transfer_topic(), from, address_topic(wanted)], amount_data(2));
    chain.push_log(
        Address::repeat_byte(0x99),
        vec![transfer_topic(), from, address_topic(wanted)],
        amount_data(3),
    );

    let event = timeout(Duration::from_secs(2), watch.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(event.name, "Transfer");
    assert_eq!(event.address, token_address);
    assert_eq!(event.args.get("value").and_then(AbiValue::as_str), Some("2"));
    assert_eq!(
        event.args.get("to").and_then(AbiValue::as_str),
        Some(wanted.to_checksum(None).as_str())
    );
    assert_eq!(event.args.get("1"), event.args.get("to"));

    assert!(timeout(Duration::from_millis(100), watch.next()).await.is_err());

    watch.close();
    watch.close();
    assert!(!handle.is_active());
    assert!(watch.next().await.is_none());
}

#[tokio::test]
async fn test_watch_from_block_reports_history() {
    let chain = MemoryChain::new();
    let store_address = Address::repeat_byte(0x33);
    let store = contract(STORE_ABI, context(&chain)).with_address(store_address);
    chain.push_log(store_address, vec![stored_topic(), address_topic(account())], amount_data(5));

    let mut watch = store
        .event("Stored", CallArgs::none())
        .unwrap()
        .watch(EventOptions {
            from_block: Some(0),
            ..Default::default()
        });
    let event = timeout(Duration::from_secs(2), watch.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(event.args.get("amount").and_then(AbiValue::as_str), Some("5"));
    assert_eq!(event.block_number, Some(2));

    chain.push_log(store_address, vec![stored_topic(), address_topic(account())], amount_data(6));
    let event = timeout(Duration::from_secs(2), watch.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(event.args.get("amount").and_then(AbiValue::as_str), Some("6"));
}

#[tokio::test]
async fn test_watch_with_unresolvable_name_reports_error() {
    let chain = MemoryChain::new();
    let store = contract(STORE_ABI, context(&chain)).with_address(Address::repeat_byte(0x33));
    let mut watch = store
        .event("Stored", CallArgs::from_json(json!(["nobody.eth"])))
        .unwrap()
        .watch(EventOptions::default());

    let first = timeout(Duration::from_secs(2), watch.next()).await.unwrap();
    assert_eq!(
        first.unwrap().unwrap_err(),
        ContractError::UnresolvedName("nobody.eth".into())
    );
    assert!(timeout(Duration::from_secs(2), watch.next()).await.unwrap().is_none());
    assert!(!watch.handle().is_active());
}

#[tokio::test]
async fn test_past_events_over_block_ranges() {
    let chain = MemoryChain::new();
    let store_address = Address::repeat_byte(0x33);
    let store = contract(STORE_ABI, context(&chain)).with_address(store_address);
    let alice = Address::repeat_byte(0x0a);
    let bob = Address::repeat_byte(0x0b);

    chain.push_log(store_address, vec![stored_topic(), address_topic(alice)], amount_data(1));
    chain.push_log(store_address, vec![stored_topic(), address_topic(bob)], amount_data(2));
    chain.push_log(store_address, vec![stored_topic(), address_topic(alice)], amount_data(3));
    chain.push_log(Address::repeat_byte(0x44), vec![stored_topic(), address_topic(alice)], amount_data(4));
    let latest = chain.block();

    let all = store.event("Stored", CallArgs::none()).unwrap();
    assert_eq!(all.since(&EventOptions::default()).await.unwrap().len(), 3);

    let recent = all
        .since(&EventOptions {
            from_block: Some(-3),
            ..Default::default()
        })
        .await
        .unwrap();
    let amounts: Vec<_> = recent
        .iter()
        .filter_map(|e| e.args.get("amount").and_then(AbiValue::as_str))
        .collect();
    assert_eq!(amounts, vec!["2", "3"]);
    assert!(recent.iter().all(|e| e.block_number.unwrap() >= latest - 2));

    let from_alice = store
        .event("Stored", CallArgs::from_json(json!({"who": alice.to_checksum(None)})))
        .unwrap()
        .since(&EventOptions::default())
        .await
        .unwrap();
    assert_eq!(from_alice.len(), 2);

    let either = store
        .event("Stored", CallArgs::from_json(json!([[alice.to_checksum(None), bob.to_checksum(None)]])))
        .unwrap()
        .since(&EventOptions::default())
        .await
        .unwrap();
    assert_eq!(either.len(), 3);

    let by_amount = store
        .event("Stored", CallArgs::from_json(json!({"amount": 2})))
        .unwrap()
        .since(&EventOptions::default())
        .await
        .unwrap();
    assert_eq!(by_amount.len(), 1);

    let inverted = all
        .since(&EventOptions {
            from_block: Some(10),
            to_block: Some(5),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(inverted.is_empty());
}

#[tokio::test]
async fn test_watch_survives_failed_polls() {
    let chain = MemoryChain::new();
    let store_address = Address::repeat_byte(0x33);
    let store = contract(STORE_ABI, context(&chain)).with_address(store_address);

    let mut watch = store
        .event("Stored", CallArgs::none())
        .unwrap()
        .watch(EventOptions::default());
    let handle = watch.handle();
    for _ in 0..200 {
        if handle.last_scanned_block().is_some() {
            break;
        }
        sleep(Duration::from_millis(5)).await;
    }
    assert!(handle.last_scanned_block().is_some());

    chain.fail_next_logs(3);
    chain.push_log(store_address, vec![stored_topic(), address_topic(account())], amount_data(5));

    let event = timeout(Duration::from_secs(2), watch.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(event.args.get("amount").and_then(AbiValue::as_str), Some("5"));
    assert_eq!(chain.failing_log_queries(), 0);
    assert!(handle.is_active());

    chain.push_log(store_address, vec![stored_topic(), address_topic(account())], amount_data(6));
    let event = timeout(Duration::from_secs(2), watch.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(event.args.get("amount").and_then(AbiValue::as_str), Some("6"));

    // Each event is delivered once.
    assert!(timeout(Duration::from_millis(100), watch.next()).await.is_err());
    watch.close();
}

#[tokio::test]
async fn test_unbound_event_needs_an_address() {
    let chain = MemoryChain::new();
    let unbound = contract(STORE_ABI, context(&chain));
    chain.push_log(
        Address::repeat_byte(0x99),
        vec![stored_topic(), address_topic(account())],
        amount_data(1),
    );

    let stored = unbound.event("Stored", CallArgs::none()).unwrap();
    assert_eq!(
        stored.since(&EventOptions::default()).await.unwrap_err(),
        ContractError::ContractAddressUndetermined
    );

    let mut watch = stored.watch(EventOptions {
        from_block: Some(0),
        ..Default::default()
    });
    let first = timeout(Duration::from_secs(2), watch.next()).await.unwrap();
    assert_eq!(first.unwrap().unwrap_err(), ContractError::ContractAddressUndetermined);
    assert!(timeout(Duration::from_secs(2), watch.next()).await.unwrap().is_none());

    let bound = unbound.at(Address::repeat_byte(0x99));
    let events = bound
        .event("Stored", CallArgs::none())
        .unwrap()
        .since(&EventOptions::default())
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
}
