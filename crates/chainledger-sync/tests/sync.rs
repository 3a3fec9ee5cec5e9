//! Synchronizer behaviour against an in-memory fetcher and store.

use async_trait::async_trait;
use chainledger_core::address_book::{AddressBook, AddressBookJson, AddressCategory, AddressEntry};
use chainledger_core::chain_data::ChainDataJson;
use chainledger_core::evm::{EvmTransaction, EvmTransfer};
use chainledger_core::store::{chain_data_key, MemoryStore, Store};
use chainledger_core::transaction::TransferCategory;
use chainledger_sync::{ChainData, ChainDataBuilder, FetchError, FetchedHistory, Fetcher, SyncState};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const ALICE: &str = "0x1111111111111111111111111111111111111111";
const BOB: &str = "0x2222222222222222222222222222222222222222";
const STRANGER: &str = "0x9999999999999999999999999999999999999999";
const CONTRACT: &str = "0x3333333333333333333333333333333333333333";

// ─── Mock fetcher ────────────────────────────────────────────────────────────

#[derive(Default)]
struct MockFetcher {
    histories: HashMap<String, FetchedHistory>,
    transactions: HashMap<String, EvmTransaction>,
    failing: Mutex<HashSet<String>>,
    delay: Option<Duration>,
    history_requests: AtomicUsize,
    transaction_requests: AtomicUsize,
}

impl MockFetcher {
    fn with_history(mut self, address: &str, txs: &[&EvmTransaction], calls: Vec<EvmTransfer>) -> Self {
        let hashes = txs.iter().map(|tx| tx.hash.clone()).collect();
        self.histories.insert(address.to_string(), FetchedHistory::new(hashes, calls));
        for tx in txs {
            self.transactions.insert(tx.hash.clone(), (*tx).clone());
        }
        self
    }

    fn fail(&self, hash: &str) {
        self.failing.lock().unwrap().insert(hash.to_string());
    }

    fn recover(&self, hash: &str) {
        self.failing.lock().unwrap().remove(hash);
    }

    fn transaction_requests(&self) -> usize {
        self.transaction_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_history(&self, address: &str) -> Result<FetchedHistory, FetchError> {
        self.history_requests.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.histories
            .get(address)
            .cloned()
            .ok_or_else(|| FetchError::Http(format!("no history for {address}")))
    }

    async fn fetch_transaction(&self, hash: &str) -> Result<EvmTransaction, FetchError> {
        self.transaction_requests.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(hash) {
            return Err(FetchError::Timeout { ms: 1 });
        }
        self.transactions
            .get(hash)
            .cloned()
            .ok_or_else(|| FetchError::NotFound { hash: hash.to_string() })
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn days_ago(days: i64) -> DateTime<Utc> {
    Utc::now() - ChronoDuration::days(days)
}

fn hash(byte: char) -> String {
    format!("0x{}", byte.to_string().repeat(64))
}

fn tx(byte: char, from: &str, to: &str, value: &str, at: DateTime<Utc>) -> EvmTransaction {
    EvmTransaction {
        hash: hash(byte),
        block: 12_000_000,
        timestamp: at,
        from: from.to_string(),
        to: Some(to.to_string()),
        value: value.to_string(),
        nonce: 1,
        gas_price: "0x3b9aca00".to_string(),
        gas_used: "0x5208".to_string(),
        data: "0x".to_string(),
        index: 0,
        status: Some(1),
        logs: vec![],
        transfers: vec![],
    }
}

fn call(byte: char, from: &str, to: &str, value: &str, at: DateTime<Utc>) -> EvmTransfer {
    EvmTransfer {
        block: 12_000_000,
        from: from.to_string(),
        hash: hash(byte),
        timestamp: at,
        to: to.to_string(),
        value: value.to_string(),
    }
}

fn book() -> AddressBook {
    let mut json = AddressBookJson::new();
    for (address, name) in [(ALICE, "alice"), (BOB, "bob")] {
        json.insert(
            address.to_string(),
            AddressEntry::new(&format!("Ethereum/{address}"), AddressCategory::Owned, name),
        );
    }
    chainledger_evm::address_book(json, &[])
}

fn chain_data(fetcher: Arc<MockFetcher>, store: Arc<MemoryStore>) -> ChainData {
    ChainDataBuilder::new()
        .fetcher(fetcher)
        .store(store)
        .fetch_timeout(Duration::from_millis(200))
        .build()
        .unwrap()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sync_address_fetches_and_persists() {
    let a = tx('a', ALICE, STRANGER, "1", days_ago(3));
    let b = tx('b', STRANGER, ALICE, "2", days_ago(2));
    let fetcher = Arc::new(MockFetcher::default().with_history(ALICE, &[&a, &b], vec![]));
    let store = Arc::new(MemoryStore::new());
    let mut data = chain_data(fetcher.clone(), store.clone());

    assert_eq!(data.state(ALICE), SyncState::Unsynced);
    let report = data.sync_address(ALICE).await.unwrap();
    assert_eq!(report.new_hashes, 2);
    assert_eq!(report.transactions_fetched, 2);
    assert!(matches!(data.state(ALICE), SyncState::Synced(_)));

    let saved = store.load(&chain_data_key("Ethereum")).await.unwrap().unwrap();
    let saved = ChainDataJson::from_value(saved);
    assert_eq!(saved.transactions.len(), 2);
    assert_eq!(saved.history(ALICE).len(), 2);

    // valid cached records are never fetched again
    let again = data.sync_address(ALICE).await.unwrap();
    assert_eq!(again.transactions_fetched, 0);
    assert_eq!(fetcher.transaction_requests(), 2);
}

#[tokio::test]
async fn shared_transactions_and_calls_are_stored_once() {
    let a = tx('a', ALICE, BOB, "1", days_ago(5));
    let mut c = tx('c', STRANGER, CONTRACT, "0", days_ago(4));
    let shared_call = call('c', ALICE, BOB, "0.5", days_ago(4));
    c.transfers.push(shared_call.clone());

    let fetcher = Arc::new(
        MockFetcher::default()
            .with_history(ALICE, &[&a, &c], vec![shared_call.clone()])
            .with_history(BOB, &[&a, &c], vec![shared_call.clone()]),
    );
    let mut data = chain_data(fetcher.clone(), Arc::new(MemoryStore::new()));

    let report = data.sync_address_book(&book()).await.unwrap();
    assert_eq!(report.addresses_synced, 2);
    assert_eq!(report.transactions_fetched, 2);
    assert_eq!(fetcher.transaction_requests(), 2);
    assert_eq!(data.json().transactions.len(), 2);
    assert_eq!(data.json().calls.len(), 1);
    assert_eq!(data.get_evm_transaction(&hash('c')).unwrap().transfers.len(), 1);

    let transactions = data.get_transactions(&book(), &[]);
    assert_eq!(transactions.len(), 2);
    assert!(transactions[0].date <= transactions[1].date);
    assert_eq!(transactions[0].uuid, format!("Ethereum/{}", hash('a')));
    let internal = transactions[0]
        .transfers
        .iter()
        .find(|t| t.category == TransferCategory::Internal);
    assert!(internal.is_some());

    let single = data.get_transaction(&hash('c'), &book(), &[]).unwrap();
    assert_eq!(single.transfers.len(), 1);
    assert_eq!(single.transfers[0].category, TransferCategory::Internal);
}

#[tokio::test]
async fn fetch_failures_are_retried_next_sync() {
    let a = tx('a', ALICE, STRANGER, "1", days_ago(3));
    let b = tx('b', ALICE, STRANGER, "1", days_ago(2));
    let fetcher = Arc::new(MockFetcher::default().with_history(ALICE, &[&a, &b], vec![]));
    fetcher.fail(&b.hash);
    let mut data = chain_data(fetcher.clone(), Arc::new(MemoryStore::new()));

    let report = data.sync_address(ALICE).await.unwrap();
    assert_eq!(report.transactions_fetched, 1);
    assert_eq!(report.fetch_failures, 1);
    assert_eq!(data.json().missing_transactions(), vec![b.hash.clone()]);

    fetcher.recover(&b.hash);
    let report = data.sync_transaction(&b.hash).await.unwrap();
    assert_eq!(report.transactions_fetched, 1);
    assert!(data.json().missing_transactions().is_empty());
}

#[tokio::test]
async fn unavailable_history_leaves_address_unsynced() {
    let fetcher = Arc::new(MockFetcher::default());
    let mut data = chain_data(fetcher, Arc::new(MemoryStore::new()));
    let report = data.sync_address(BOB).await.unwrap();
    assert_eq!(report.fetch_failures, 1);
    assert_eq!(data.state(BOB), SyncState::Unsynced);
}

#[tokio::test]
async fn slow_fetches_time_out() {
    let a = tx('a', ALICE, STRANGER, "1", days_ago(3));
    let mut fetcher = MockFetcher::default().with_history(ALICE, &[&a], vec![]);
    fetcher.delay = Some(Duration::from_secs(2));
    let mut data = chain_data(Arc::new(fetcher), Arc::new(MemoryStore::new()));
    let report = data.sync_address(ALICE).await.unwrap();
    assert_eq!(report.fetch_failures, 1);
    assert!(data.json().transactions.is_empty());
}

#[tokio::test]
async fn refresh_and_retirement_windows() {
    let recent = tx('a', ALICE, STRANGER, "1", days_ago(10));
    let ancient = tx('b', BOB, STRANGER, "1", days_ago(800));

    let mut json = ChainDataJson::default();
    json.record_history(ALICE, &[recent.hash.clone()]);
    json.insert_transaction(recent);
    json.record_history(BOB, &[ancient.hash.clone()]);
    json.insert_transaction(ancient);

    let fetcher = Arc::new(MockFetcher::default());
    let now = Utc::now();

    // synced an hour ago: fresh
    json.set_last_updated(ALICE, now - ChronoDuration::hours(1));
    json.set_last_updated(BOB, now - ChronoDuration::days(30));
    let data = ChainDataBuilder::new().fetcher(fetcher.clone()).json(json.clone()).build().unwrap();
    assert!(!data.needs_sync(ALICE, now));
    // quiet for two years and synced before: retired
    assert!(!data.needs_sync(BOB, now));
    // never synced
    assert!(data.needs_sync(STRANGER, now));

    // synced a day ago with recent activity: stale
    json.set_last_updated(ALICE, now - ChronoDuration::days(1));
    let data = ChainDataBuilder::new().fetcher(fetcher).json(json).build().unwrap();
    assert!(data.needs_sync(ALICE, now));
}

#[tokio::test]
async fn restore_merges_the_saved_document() {
    let a = tx('a', ALICE, STRANGER, "1", days_ago(3));
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(MockFetcher::default().with_history(ALICE, &[&a], vec![]));

    let mut first = chain_data(fetcher.clone(), store.clone());
    first.sync_address(ALICE).await.unwrap();

    let mut second = chain_data(fetcher, store);
    assert!(second.json().transactions.is_empty());
    assert_eq!(second.restore().await.unwrap(), 1);
    assert!(second.get_evm_transaction(&a.hash).is_some());
}

#[tokio::test]
async fn invalid_inputs_are_ignored() {
    let fetcher = Arc::new(MockFetcher::default());
    let mut data = chain_data(fetcher.clone(), Arc::new(MemoryStore::new()));
    assert_eq!(data.sync_transaction("0x1234").await.unwrap().transactions_fetched, 0);
    assert_eq!(data.sync_address("not-an-address").await.unwrap().addresses_synced, 0);
    assert_eq!(fetcher.transaction_requests(), 0);
}

#[tokio::test]
async fn restore_refetches_only_invalid_records() {
    let good = tx('a', ALICE, STRANGER, "1", days_ago(3));
    let fresh = tx('b', ALICE, STRANGER, "2", days_ago(2));
    let mut corrupt = fresh.clone();
    corrupt.gas_used = "lots".to_string();

    let mut saved = ChainDataJson::default();
    saved.record_history(ALICE, &[good.hash.clone(), fresh.hash.clone()]);
    saved.set_last_updated(ALICE, Utc::now());
    saved.transactions.insert(good.hash.clone(), good.clone());
    saved.transactions.insert(fresh.hash.clone(), corrupt);

    let store = Arc::new(MemoryStore::new());
    let key = chain_data_key("Ethereum");
    store.save(&key, &serde_json::to_value(&saved).unwrap()).await.unwrap();

    let fetcher = Arc::new(MockFetcher::default().with_history(ALICE, &[&good, &fresh], vec![]));
    let mut data = chain_data(fetcher.clone(), store.clone());
    assert_eq!(data.restore().await.unwrap(), 1);
    assert!(data.get_evm_transaction(&good.hash).is_some());
    assert_eq!(data.json().history(ALICE).len(), 2);

    let report = data.sync_address_book(&book()).await.unwrap();
    assert_eq!(report.transactions_fetched, 1);
    assert_eq!(fetcher.transaction_requests(), 1);
    assert_eq!(data.get_evm_transaction(&fresh.hash).unwrap().gas_used, "0x5208");

    let persisted = ChainDataJson::load(store.load(&key).await.unwrap().unwrap()).unwrap();
    assert_eq!(persisted.transactions.len(), 2);
    assert!(persisted.missing_transactions().is_empty());
}

#[tokio::test]
async fn unreadable_saved_document_is_never_overwritten() {
    let store = Arc::new(MemoryStore::new());
    let key = chain_data_key("Ethereum");
    let unreadable = serde_json::json!({ "addresses": "not a map", "transactions": {} });
    store.save(&key, &unreadable).await.unwrap();

    let a = tx('a', ALICE, STRANGER, "1", days_ago(3));
    let fetcher = Arc::new(MockFetcher::default().with_history(ALICE, &[&a], vec![]));
    let mut data = chain_data(fetcher, store.clone());
    assert!(data.restore().await.is_err());
    assert!(data.json().transactions.is_empty());
    assert_eq!(store.load(&key).await.unwrap(), Some(unreadable));
}
