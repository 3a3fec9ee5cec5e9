//! `chainledger sync`

use anyhow::{Context, Result};
use chainledger_sync::self_addresses;

use crate::Session;

pub async fn run(ctx: &Session, addresses: &[String]) -> Result<()> {
    let mut book = ctx.address_book().await?;

    if !addresses.is_empty() {
        for address in addresses {
            book.add_self(address, None)
                .with_context(|| format!("adding self address {address}"))?;
        }
        ctx.save_address_book(&book).await?;
    }

    let selves = self_addresses(&book, &ctx.meta);
    if selves.is_empty() {
        println!("No self addresses in the address book; pass --address 0x... to add one.");
        return Ok(());
    }

    let mut chain_data = ctx.chain_data().await?;
    let report = chain_data.sync_address_book(&book).await?;

    println!("Chain:                {}", ctx.meta.name);
    println!("Provider:             {}", chain_data.fetcher_name());
    println!("Self addresses:       {}", selves.len());
    println!("  synced:             {}", report.addresses_synced);
    println!("  skipped:            {}", report.addresses_skipped);
    println!("New hashes:           {}", report.new_hashes);
    println!("New internal calls:   {}", report.new_calls);
    println!("Transactions fetched: {}", report.transactions_fetched);
    println!("Fetch failures:       {}", report.fetch_failures);
    println!("Cached transactions:  {}", chain_data.json().transactions.len());
    if report.fetch_failures > 0 {
        println!("Some fetches failed; rerun sync to retry them.");
    }
    Ok(())
}
