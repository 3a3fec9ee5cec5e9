//! `chainledger validate`

use anyhow::{bail, Result};
use chainledger_core::address_book::{get_address_book_error, AddressBookJson};
use chainledger_core::chain_data::{get_chain_data_error, ChainDataJson};
use chainledger_core::store::{Store, ADDRESS_BOOK_KEY};
use serde_json::Value;

use crate::Session;

pub async fn run(ctx: &Session) -> Result<()> {
    let mut failures = 0;

    let book = ctx.store.load(ADDRESS_BOOK_KEY).await?;
    failures += report(ADDRESS_BOOK_KEY, book, |value| {
        let json: AddressBookJson = serde_json::from_value(value).map_err(|e| e.to_string())?;
        match get_address_book_error(&json) {
            Some(error) => Err(error),
            None => Ok(format!("{} entries", json.len())),
        }
    });

    let key = ctx.chain_key();
    let chain = ctx.store.load(&key).await?;
    failures += report(&key, chain, |value| {
        let json: ChainDataJson = serde_json::from_value(value).map_err(|e| e.to_string())?;
        match get_chain_data_error(&json) {
            Some(error) => Err(error),
            None => Ok(format!(
                "{} addresses, {} transactions, {} calls",
                json.addresses.len(),
                json.transactions.len(),
                json.calls.len()
            )),
        }
    });

    if failures > 0 {
        bail!("{failures} document(s) failed validation");
    }
    Ok(())
}

fn report(
    key: &str,
    value: Option<Value>,
    check: impl FnOnce(Value) -> Result<String, String>,
) -> usize {
    let Some(value) = value else {
        println!("  -  {key}: not saved yet");
        return 0;
    };
    match check(value) {
        Ok(summary) => {
            println!("  ✓  {key}: {summary}");
            0
        }
        Err(error) => {
            println!("  ✗  {key}: {error}");
            1
        }
    }
}
