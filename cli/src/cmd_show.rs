//! `chainledger transactions` and `chainledger transaction <hash>`

use anyhow::{anyhow, bail, Result};
use chainledger_core::evm::is_bytes32;
use chainledger_evm::parse_transaction;
use chainledger_sync::classify_history;

use crate::{print_json, Session};

pub async fn transactions(ctx: &Session, pretty: bool) -> Result<()> {
    let book = ctx.address_book().await?;
    let json = ctx.chain_data_json().await?;
    let transactions = classify_history(&json, &ctx.meta, &book, &[]);
    tracing::info!(count = transactions.len(), "classified cached history");
    print_json(&transactions, pretty)
}

pub async fn transaction(ctx: &Session, hash: &str, sync: bool, pretty: bool) -> Result<()> {
    if !is_bytes32(hash) {
        bail!("{hash:?} is not a transaction hash");
    }
    let book = ctx.address_book().await?;

    let transaction = if sync {
        let mut chain_data = ctx.chain_data().await?;
        chain_data.sync_transaction(hash).await?;
        chain_data.get_transaction(hash, &book, &[])
    } else {
        let json = ctx.chain_data_json().await?;
        json.get_transaction(hash)
            .map(|evm_tx| parse_transaction(&evm_tx, &ctx.meta, &book, &[]))
    };

    let transaction = transaction.ok_or_else(|| {
        if sync {
            anyhow!("transaction {hash} could not be fetched")
        } else {
            anyhow!("transaction {hash} is not cached, rerun with --sync")
        }
    })?;
    print_json(&transaction, pretty)
}
