//! The synchronizer: keeps a [`ChainDataJson`] cache current for the self
//! addresses of an address book and classifies what it holds.
//!
//! Per address: `Unsynced → Syncing → Synced(last_updated)`, back to
//! `Syncing` once the refresh window has passed, unless the address has
//! been quiet for longer than the retirement window.
//!
//! All fetches run one at a time on a single writer. The cache is persisted
//! after every new history list and every fetched transaction, so a crash
//! loses at most the in-flight request.

use chainledger_core::account::{normalize_address, Account};
use chainledger_core::address_book::AddressBook;
use chainledger_core::chain_data::ChainDataJson;
use chainledger_core::error::StoreError;
use chainledger_core::evm::{is_bytes32, EvmMetadata, EvmTransaction};
use chainledger_core::store::{chain_data_key, Store};
use chainledger_core::transaction::Transaction;
use chainledger_evm::{parse_transaction, App, Pipeline};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SyncConfig;
use crate::error::FetchError;
use crate::fetcher::Fetcher;

/// Where an address stands in the sync lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Unsynced,
    Syncing,
    Synced(DateTime<Utc>),
}

/// Counters for one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub addresses_synced: usize,
    pub addresses_skipped: usize,
    pub new_hashes: usize,
    pub new_calls: usize,
    pub transactions_fetched: usize,
    pub fetch_failures: usize,
}

impl SyncReport {
    fn absorb(&mut self, other: SyncReport) {
        self.addresses_synced += other.addresses_synced;
        self.addresses_skipped += other.addresses_skipped;
        self.new_hashes += other.new_hashes;
        self.new_calls += other.new_calls;
        self.transactions_fetched += other.transactions_fetched;
        self.fetch_failures += other.fetch_failures;
    }
}

/// Cached chain data for one chain plus the means to refresh it.
pub struct ChainData {
    meta: EvmMetadata,
    json: ChainDataJson,
    fetcher: Arc<dyn Fetcher>,
    store: Option<Arc<dyn Store>>,
    config: SyncConfig,
    syncing: BTreeSet<String>,
}

impl ChainData {
    pub(crate) fn new(
        meta: EvmMetadata,
        json: ChainDataJson,
        fetcher: Arc<dyn Fetcher>,
        store: Option<Arc<dyn Store>>,
        config: SyncConfig,
    ) -> Self {
        tracing::info!(
            chain = %meta.name,
            fetcher = fetcher.name(),
            transactions = json.transactions.len(),
            "chain data ready"
        );
        Self {
            meta,
            json,
            fetcher,
            store,
            config,
            syncing: BTreeSet::new(),
        }
    }

    pub fn metadata(&self) -> &EvmMetadata {
        &self.meta
    }

    pub fn json(&self) -> &ChainDataJson {
        &self.json
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn fetcher_name(&self) -> &str {
        self.fetcher.name()
    }

    /// Merge the document previously saved in the store into memory.
    /// Returns the number of cached transactions afterwards.
    ///
    /// Invalid records are dropped and fetched again on the next sync. A
    /// document that doesn't deserialize is an error and nothing is merged,
    /// so it is never overwritten by a later save.
    pub async fn restore(&mut self) -> Result<usize, StoreError> {
        let Some(store) = &self.store else {
            return Ok(self.json.transactions.len());
        };
        if let Some(value) = store.load(&chain_data_key(&self.meta.name)).await? {
            let stored = ChainDataJson::load(value).map_err(|e| {
                tracing::error!(chain = %self.meta.name, error = %e, "saved chain data is unreadable");
                StoreError::Serde(e)
            })?;
            self.json.merge(stored);
        }
        tracing::info!(chain = %self.meta.name, transactions = self.json.transactions.len(), "restored chain data");
        Ok(self.json.transactions.len())
    }

    /// Fold another chain data document into this one and persist.
    pub async fn merge(&mut self, other: ChainDataJson) -> Result<(), StoreError> {
        self.json.merge(other);
        self.persist().await
    }

    async fn persist(&self) -> Result<(), StoreError> {
        match &self.store {
            Some(store) => {
                let value = serde_json::to_value(&self.json)?;
                store.save(&chain_data_key(&self.meta.name), &value).await
            }
            None => {
                tracing::debug!(chain = %self.meta.name, "no store configured, not saving");
                Ok(())
            }
        }
    }

    async fn bounded<T, F>(&self, what: &str, fut: F) -> Result<T, FetchError>
    where
        F: Future<Output = Result<T, FetchError>>,
    {
        match tokio::time::timeout(self.config.fetch_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(what, fetcher = self.fetcher.name(), "fetch timed out");
                Err(FetchError::Timeout {
                    ms: self.config.fetch_timeout.as_millis() as u64,
                })
            }
        }
    }

    // ─── State machine ───────────────────────────────────────────────────────

    pub fn state(&self, address: &str) -> SyncState {
        if self.syncing.contains(address) {
            return SyncState::Syncing;
        }
        match self.json.last_updated(address) {
            Some(at) => SyncState::Synced(at),
            None => SyncState::Unsynced,
        }
    }

    /// Most recent on-chain action involving `address` that we know about.
    pub fn last_action(&self, address: &str) -> Option<DateTime<Utc>> {
        let from_history = self
            .json
            .history(address)
            .iter()
            .filter_map(|hash| self.json.transactions.get(hash))
            .map(|tx| tx.timestamp);
        let from_calls = self
            .json
            .calls
            .iter()
            .filter(|call| call.from.eq_ignore_ascii_case(address) || call.to.eq_ignore_ascii_case(address))
            .map(|call| call.timestamp);
        from_history.chain(from_calls).max()
    }

    /// Whether `address` is due for a history refresh at `now`.
    pub fn needs_sync(&self, address: &str, now: DateTime<Utc>) -> bool {
        let SyncState::Synced(last_updated) = self.state(address) else {
            return true;
        };
        let Some(last_action) = self.last_action(address) else {
            tracing::debug!(%address, "no activity recorded");
            return true;
        };
        let elapsed = |since: DateTime<Utc>| (now - since).to_std().unwrap_or(Duration::ZERO);
        if elapsed(last_action) > self.config.retirement_window {
            tracing::debug!(%address, %last_action, "skipping retired address");
            return false;
        }
        if elapsed(last_updated) < self.config.refresh_window {
            tracing::debug!(%address, %last_updated, "skipping recently synced address");
            return false;
        }
        true
    }

    // ─── Sync operations ─────────────────────────────────────────────────────

    /// Refresh one address: its history, its internal calls, then every
    /// transaction in its history that isn't cached yet.
    pub async fn sync_address(&mut self, address: &str) -> Result<SyncReport, StoreError> {
        let address = match normalize_address(Account::parse(address).address.as_str()) {
            Ok(address) => address,
            Err(e) => {
                tracing::warn!(%address, error = %e, "not syncing invalid address");
                return Ok(SyncReport::default());
            }
        };
        self.syncing.insert(address.clone());
        let result = self.sync_address_inner(&address).await;
        self.syncing.remove(&address);
        result
    }

    async fn sync_address_inner(&mut self, address: &str) -> Result<SyncReport, StoreError> {
        let mut report = SyncReport::default();
        tracing::info!(%address, fetcher = self.fetcher.name(), "fetching history");
        let fetcher = Arc::clone(&self.fetcher);
        let history = match self.bounded(address, fetcher.fetch_history(address)).await {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!(%address, error = %e, "history unavailable, will retry next sync");
                report.fetch_failures += 1;
                return Ok(report);
            }
        };

        report.new_hashes = self.json.record_history(address, &history.hashes);
        report.new_calls = self.json.merge_calls(history.calls);
        self.json.set_last_updated(address, Utc::now());
        self.persist().await?;
        report.addresses_synced = 1;
        tracing::info!(
            %address,
            hashes = history.hashes.len(),
            new = report.new_hashes,
            calls = report.new_calls,
            "saved history"
        );

        let hashes = self.json.history(address).to_vec();
        for (i, hash) in hashes.iter().enumerate() {
            if self.json.has_valid_transaction(hash) {
                continue;
            }
            tracing::debug!(%address, progress = %format!("{}/{}", i + 1, hashes.len()), %hash, "syncing transaction");
            report.absorb(self.fetch_and_store(hash).await?);
        }
        Ok(report)
    }

    async fn fetch_and_store(&mut self, hash: &str) -> Result<SyncReport, StoreError> {
        let mut report = SyncReport::default();
        let fetcher = Arc::clone(&self.fetcher);
        match self.bounded(hash, fetcher.fetch_transaction(hash)).await {
            Ok(tx) => {
                if self.json.insert_transaction(tx) {
                    report.transactions_fetched = 1;
                    self.persist().await?;
                }
            }
            Err(e) => {
                tracing::warn!(%hash, error = %e, "transaction unavailable, will retry next sync");
                report.fetch_failures = 1;
            }
        }
        Ok(report)
    }

    /// Fetch one transaction unless a valid copy is cached.
    pub async fn sync_transaction(&mut self, hash: &str) -> Result<SyncReport, StoreError> {
        if !is_bytes32(hash) {
            tracing::warn!(%hash, "not syncing invalid transaction hash");
            return Ok(SyncReport::default());
        }
        if self.json.has_valid_transaction(hash) {
            return Ok(SyncReport::default());
        }
        self.fetch_and_store(hash).await
    }

    /// Refresh every self address that is due, then make sure every hash in
    /// every self address's history has a cached transaction.
    pub async fn sync_address_book(&mut self, book: &AddressBook) -> Result<SyncReport, StoreError> {
        let now = Utc::now();
        let addresses = self_addresses(book, &self.meta);
        let due: Vec<String> = addresses.iter().filter(|a| self.needs_sync(a, now)).cloned().collect();
        tracing::info!(
            chain = %self.meta.name,
            due = due.len(),
            total = addresses.len(),
            "syncing out-of-date addresses"
        );

        let mut report = SyncReport {
            addresses_skipped: addresses.len() - due.len(),
            ..SyncReport::default()
        };
        for address in &due {
            report.absorb(self.sync_address(address).await?);
        }
        for address in &addresses {
            let hashes = self.json.history(address).to_vec();
            for hash in hashes {
                report.absorb(self.sync_transaction(&hash).await?);
            }
        }
        tracing::info!(chain = %self.meta.name, ?report, "sync complete");
        Ok(report)
    }

    // ─── Consumer interface ──────────────────────────────────────────────────

    /// Cached transaction with its internal calls attached.
    pub fn get_evm_transaction(&self, hash: &str) -> Option<EvmTransaction> {
        self.json.get_transaction(hash)
    }

    /// Classify every cached transaction in the history of a self address,
    /// in chronological order.
    pub fn get_transactions(&self, book: &AddressBook, extra_apps: &[App]) -> Vec<Transaction> {
        classify_history(&self.json, &self.meta, book, extra_apps)
    }

    /// Classify one cached transaction.
    pub fn get_transaction(&self, hash: &str, book: &AddressBook, extra_apps: &[App]) -> Option<Transaction> {
        let evm_tx = self.json.get_transaction(hash)?;
        Some(parse_transaction(&evm_tx, &self.meta, book, extra_apps))
    }
}

/// Self addresses of `book` that live on `meta`'s chain, in book order.
pub fn self_addresses(book: &AddressBook, meta: &EvmMetadata) -> Vec<String> {
    let mut seen = BTreeSet::new();
    book.self_accounts()
        .into_iter()
        .filter(|a| a.is_evm() && a.chain.as_deref().map_or(true, |c| c == meta.name))
        .map(|a| a.address)
        .filter(|address| seen.insert(address.clone()))
        .collect()
}

/// Classify the cached history of every self address without a fetcher.
/// Hashes that are not synced yet are skipped.
pub fn classify_history(
    json: &ChainDataJson,
    meta: &EvmMetadata,
    book: &AddressBook,
    extra_apps: &[App],
) -> Vec<Transaction> {
    let mut hashes = BTreeSet::new();
    for address in self_addresses(book, meta) {
        hashes.extend(json.history(&address).iter().cloned());
    }
    let evm_txs: Vec<EvmTransaction> = hashes
        .iter()
        .filter_map(|hash| {
            let tx = json.get_transaction(hash);
            if tx.is_none() {
                tracing::debug!(%hash, "not synced yet, skipping");
            }
            tx
        })
        .collect();
    tracing::info!(chain = %meta.name, count = evm_txs.len(), "classifying transactions");
    Pipeline::with_apps(extra_apps).parse_all(&evm_txs, meta, book)
}
