//! End-to-end pipeline tests against the in-memory subscriber.

use shieldlog_core::{
    codec::encrypt_amount, render, Address, BigUint, ChannelSink, DecryptedRecord, EventKind,
    SchemaRegistry, SubscriptionError, SymmetricKey,
};
use shieldlog_evm::encode_log;
use shieldlog_stream::{
    ListenerConfig, ListenerExit, ListenerState, MemoryFeed, MemorySubscriber, Orchestrator,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

const CONTRACT: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

fn contract() -> Address {
    CONTRACT.parse().unwrap()
}

fn from() -> Address {
    "0xaa00000000000000000000000000000000000001".parse().unwrap()
}

fn to() -> Address {
    "0xbb00000000000000000000000000000000000002".parse().unwrap()
}

struct Harness {
    key: SymmetricKey,
    subscriber: MemorySubscriber,
    orchestrator: Orchestrator,
    records: UnboundedReceiver<DecryptedRecord>,
}

fn start(events: Vec<EventKind>) -> Harness {
    let key = SymmetricKey::from_bytes(rand::random());
    let subscriber = MemorySubscriber::new();
    let (sink, records) = ChannelSink::new();
    let config = ListenerConfig {
        contract: Some(CONTRACT.into()),
        events,
        ..ListenerConfig::default()
    };
    let orchestrator = Orchestrator::spawn(
        &config,
        Arc::new(subscriber.clone()),
        Arc::new(shieldlog_core::AmountCipher::new(&key)),
        Arc::new(sink),
    )
    .unwrap();
    Harness { key, subscriber, orchestrator, records }
}

async fn feed(h: &Harness, kind: EventKind) -> MemoryFeed {
    let hash = SchemaRegistry::global().get(kind).content_hash;
    h.subscriber.wait_for_feed(hash).await
}

fn encrypted(amount: u64, key: &[u8]) -> Vec<u8> {
    encrypt_amount(&BigUint::from(amount), key, rand::random()).unwrap()
}

fn transfer_log(h: &Harness, payload: &[u8]) -> shieldlog_core::RawLog {
    encode_log(EventKind::Transfer, contract(), [from(), to()], h.key.commitment(), payload)
}

/// A subscribed Transfer log encrypted under the right key yields one record.
#[tokio::test]
async fn transfer_is_decrypted_and_rendered() {
    let mut h = start(vec![EventKind::Transfer]);
    let feed = feed(&h, EventKind::Transfer).await;

    let log = transfer_log(&h, &encrypted(1000, h.key.as_bytes()));
    assert_eq!(h.subscriber.publish(&log), 1);

    let rec = h.records.recv().await.unwrap();
    assert_eq!(rec.kind, EventKind::Transfer);
    assert_eq!(rec.field("from"), Some(from()));
    assert_eq!(rec.field("to"), Some(to()));
    assert_eq!(rec.amount, BigUint::from(1000u32));
    assert!(render(&rec).ends_with("    amount: 1000\n\n"));

    h.orchestrator.shutdown();
    let reports = h.orchestrator.wait().await.unwrap();
    assert_eq!(reports[0].stats.records_emitted, 1);
    assert_eq!(feed.close_count(), 1);
}

/// A payload encrypted under another key is dropped; the task keeps going.
#[tokio::test]
async fn wrong_key_is_skipped_and_listener_survives() {
    let mut h = start(vec![EventKind::Transfer]);
    let feed = feed(&h, EventKind::Transfer).await;

    let other_key: [u8; 32] = rand::random();
    feed.push(transfer_log(&h, &encrypted(1000, &other_key)));
    feed.push(transfer_log(&h, &encrypted(7, h.key.as_bytes())));

    // Only the second entry comes through
    let rec = h.records.recv().await.unwrap();
    assert_eq!(rec.amount, BigUint::from(7u32));
    assert_eq!(h.orchestrator.states(), vec![(EventKind::Transfer, ListenerState::Subscribed)]);

    h.orchestrator.shutdown();
    let reports = h.orchestrator.wait().await.unwrap();
    let report = &reports[0];
    assert_eq!(report.stats.decryption_errors, 1);
    assert_eq!(report.stats.records_emitted, 1);
    assert!(h.records.try_recv().is_err());
}

/// Entries queued before a runtime error are all processed, the failing
/// listener closes once and is joinable while its sibling keeps running.
#[tokio::test]
async fn runtime_error_after_three_entries() {
    let mut h = start(vec![EventKind::Transfer, EventKind::Approval]);
    let transfers = feed(&h, EventKind::Transfer).await;
    let approvals = feed(&h, EventKind::Approval).await;

    for amount in 1..=3u64 {
        transfers.push(transfer_log(&h, &encrypted(amount, h.key.as_bytes())));
    }
    transfers.fail("connection reset by peer");

    let report = tokio::time::timeout(Duration::from_secs(5), h.orchestrator.join_next())
        .await
        .expect("failing listener should be joinable on its own")
        .unwrap()
        .unwrap();
    assert_eq!(report.kind, EventKind::Transfer);
    assert_eq!(report.state, ListenerState::Closed);
    assert_eq!(
        report.exit,
        ListenerExit::RuntimeError(SubscriptionError::Runtime {
            reason: "connection reset by peer".into()
        })
    );
    assert_eq!(report.stats.records_emitted, 3);
    assert_eq!(transfers.close_count(), 1);

    for amount in 1..=3u32 {
        assert_eq!(h.records.recv().await.unwrap().amount, BigUint::from(amount));
    }

    // Sibling is unaffected
    let approval = encode_log(
        EventKind::Approval,
        contract(),
        [from(), to()],
        h.key.commitment(),
        &encrypted(55, h.key.as_bytes()),
    );
    approvals.push(approval);
    let rec = h.records.recv().await.unwrap();
    assert_eq!(rec.kind, EventKind::Approval);
    assert_eq!(rec.field("spender"), Some(to()));
    assert!(h
        .orchestrator
        .states()
        .contains(&(EventKind::Approval, ListenerState::Subscribed)));

    h.orchestrator.shutdown();
    let rest = h.orchestrator.wait().await.unwrap();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].exit, ListenerExit::Shutdown);
    assert_eq!(approvals.close_count(), 1);
    assert_eq!(transfers.close_count(), 1);
}

/// Setup failure for one event type does not prevent the other.
#[tokio::test]
async fn setup_failure_is_reported_per_listener() {
    let subscriber = MemorySubscriber::new();
    let approval_hash = SchemaRegistry::global().get(EventKind::Approval).content_hash;
    subscriber.fail_setup(approval_hash, "filter rejected");

    let (sink, _records) = ChannelSink::new();
    let config = ListenerConfig { contract: Some(CONTRACT.into()), ..ListenerConfig::default() };
    let mut orch = Orchestrator::spawn(
        &config,
        Arc::new(subscriber.clone()),
        Arc::new(shieldlog_core::AmountCipher::new(&SymmetricKey::from_bytes([9; 32]))),
        Arc::new(sink),
    )
    .unwrap();

    let first = orch.join_next().await.unwrap().unwrap();
    assert_eq!(first.kind, EventKind::Approval);
    assert!(first.is_setup_failure());

    let transfer_hash = SchemaRegistry::global().get(EventKind::Transfer).content_hash;
    subscriber.wait_for_feed(transfer_hash).await;
    orch.shutdown();
    let rest = orch.wait().await.unwrap();
    assert_eq!(rest[0].kind, EventKind::Transfer);
    assert_eq!(rest[0].exit, ListenerExit::Shutdown);
}

/// A malformed entry on one listener does not disturb its sibling.
#[tokio::test]
async fn malformed_entry_stays_with_its_listener() {
    let mut h = start(vec![EventKind::Transfer, EventKind::Approval]);
    let transfers = feed(&h, EventKind::Transfer).await;
    let approvals = feed(&h, EventKind::Approval).await;

    // Only the event hash topic and a data section that is not valid ABI
    let transfer_hash = SchemaRegistry::global().get(EventKind::Transfer).content_hash;
    transfers.push(shieldlog_core::RawLog::new(contract(), vec![transfer_hash], vec![0xff; 5]));

    const N: u64 = 5;
    for i in 0..N {
        let log = encode_log(
            EventKind::Approval,
            contract(),
            [from(), to()],
            h.key.commitment(),
            &encrypted(100 + i, h.key.as_bytes()),
        );
        approvals.push(log);
    }
    transfers.push(transfer_log(&h, &encrypted(9, h.key.as_bytes())));

    let mut next_approval = 100u64;
    let mut transfer_seen = false;
    for _ in 0..=N {
        let rec = h.records.recv().await.unwrap();
        match rec.kind {
            EventKind::Approval => {
                assert_eq!(rec.amount, BigUint::from(next_approval));
                next_approval += 1;
            }
            EventKind::Transfer => {
                assert_eq!(rec.amount, BigUint::from(9u32));
                transfer_seen = true;
            }
        }
    }
    assert_eq!(next_approval, 100 + N);
    assert!(transfer_seen);
    assert_eq!(
        h.orchestrator.states(),
        vec![
            (EventKind::Transfer, ListenerState::Subscribed),
            (EventKind::Approval, ListenerState::Subscribed),
        ]
    );

    h.orchestrator.shutdown();
    let reports = h.orchestrator.wait().await.unwrap();
    let report = |kind: EventKind| reports.iter().find(|r| r.kind == kind).unwrap();
    assert_eq!(report(EventKind::Transfer).stats.decode_errors, 1);
    assert_eq!(report(EventKind::Transfer).stats.records_emitted, 1);
    assert_eq!(report(EventKind::Approval).stats.decode_errors, 0);
    assert_eq!(report(EventKind::Approval).stats.records_emitted, N);
    assert!(reports.iter().all(|r| r.exit == ListenerExit::Shutdown));
}

/// Many listeners decoding concurrently never see each other's entries.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_listeners_stay_independent() {
    let mut h = start(vec![EventKind::Transfer, EventKind::Approval]);
    let transfers = feed(&h, EventKind::Transfer).await;
    let approvals = feed(&h, EventKind::Approval).await;

    const N: u64 = 200;
    let key = *h.key.as_bytes();
    let commitment = h.key.commitment();
    let t = tokio::spawn(async move {
        for i in 0..N {
            let log = encode_log(EventKind::Transfer, contract(), [from(), to()], commitment, &encrypted(i, &key));
            transfers.push(log);
        }
    });
    let a = tokio::spawn(async move {
        for i in 0..N {
            let log = encode_log(EventKind::Approval, contract(), [to(), from()], commitment, &encrypted(N + i, &key));
            approvals.push(log);
        }
    });
    t.await.unwrap();
    a.await.unwrap();

    let mut next_transfer = 0u64;
    let mut next_approval = N;
    for _ in 0..2 * N {
        let rec = h.records.recv().await.unwrap();
        // Per-type order is delivery order
        match rec.kind {
            EventKind::Transfer => {
                assert_eq!(rec.amount, BigUint::from(next_transfer));
                assert_eq!(rec.indexed, [from(), to()]);
                next_transfer += 1;
            }
            EventKind::Approval => {
                assert_eq!(rec.amount, BigUint::from(next_approval));
                assert_eq!(rec.indexed, [to(), from()]);
                next_approval += 1;
            }
        }
    }

    h.orchestrator.shutdown();
    let reports = h.orchestrator.wait().await.unwrap();
    assert!(reports.iter().all(|r| r.stats.records_emitted == N));
}
