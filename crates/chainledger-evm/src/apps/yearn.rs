//! Yearn vaults and the yGov staking pool.
//!
//! A vault deposit swaps the underlying for vault shares; a withdrawal
//! swaps them back. YFI staked in yGov stays ours behind a `Yearn-Gov`
//! venue.

use chainledger_core::account::insert_venue;
use chainledger_core::error::ClassifyError;
use chainledger_core::evm::EvmTransaction;
use chainledger_core::transaction::{Transaction, Transfer, TransferCategory};
use std::sync::OnceLock;

use crate::abi::EventSet;
use crate::app::{App, AppAddress};
use crate::context::ParserContext;

use super::{default_index, logs_from, missing, position, warn_miss};

const NAME: &str = "Yearn";
const GOV_VENUE: &str = "Yearn-Gov";

pub const YFI: AppAddress = AppAddress::token("YFI", "0x0bc529c00c6401aef6d220be8c6ea1667f6ad93e");

const GOV: &[AppAddress] = &[AppAddress::defi("yGov", "0xba37b002abafdd8e89a1995da52740bbc013d992")];

pub const VAULTS: &[AppAddress] = &[
    AppAddress::token("yDAI", "0xacd43e627e64355f1861cec6d3a6688b31a6f952"),
    AppAddress::token("yDAIv3", "0xc2cb1040220768554cf699b0d863a3cd4324ce32"),
    AppAddress::token("yUSDC", "0x597ad1e0c13bfe8025993d9e79c69e1c0233522e").decimals(6),
    AppAddress::token("yUSDCv3", "0x26ea744e5b887e5205727f55dfbe8685e3b21951").decimals(6),
    AppAddress::token("yUSDT", "0x2f08119c6f07c006695e079aafc638b8789faf18").decimals(6),
    AppAddress::token("yUSDTv3", "0xe6354ed5bc4b393a5aad09f21c46e101e692d447").decimals(6),
    AppAddress::token("yWETH", "0xe1237aa7f535b0cc33fd973d66cbf830354d16c7"),
    AppAddress::token("yYFI", "0xba2e7fed597fd0e3e70f5130bcdbbfe06bb94fe1"),
    AppAddress::token("yvUSDT", "0x7da96a3891add058ada2e826306d812c638d87a7").decimals(6),
    AppAddress::token("yvWBTC", "0xcb550a6d4c8e3517a939bc79d0c7093eb7cf56b5").decimals(8),
    AppAddress::token("yvWETH", "0x5f18c75abdae578b483e5f43f12a39cf75b973a9"),
    AppAddress::token("yvYFI", "0xe14d13d8b3b85af791b2aadd661cdbd5e6097db1"),
];

const TOKENS: &[AppAddress] = &[YFI];

pub const APP: App = App {
    name: NAME,
    addresses: &[GOV, VAULTS, TOKENS],
    insert: &[],
    modify: &[parse_vaults, parse_gov],
    swap_venue: false,
};

const GOV_EVENTS: &[&str] = &[
    "event RegisterVoter(address voter, uint256 votes, uint256 totalVotes)",
    "event RewardPaid(address indexed user, uint256 reward)",
    "event Staked(address indexed user, uint256 amount)",
    "event Withdrawn(address indexed user, uint256 amount)",
];

fn gov_events() -> &'static EventSet {
    static SET: OnceLock<EventSet> = OnceLock::new();
    SET.get_or_init(|| EventSet::parse_lossy(GOV_EVENTS))
}

/// Asset a vault share redeems for.
pub fn underlying(vault: &str) -> Option<&'static str> {
    Some(match vault {
        "yDAI" | "yDAIv3" => "DAI",
        "yUSDC" | "yUSDCv3" => "USDC",
        "yUSDT" | "yUSDTv3" | "yvUSDT" => "USDT",
        "yWETH" | "yvWETH" => "WETH",
        "yYFI" | "yvYFI" => "YFI",
        "yvWBTC" => "WBTC",
        _ => return None,
    })
}

/// `ETH` and `WETH` both count as the underlying of a WETH vault.
fn same_asset(a: &str, b: &str) -> bool {
    a == b || a.strip_prefix('W').unwrap_or(a) == b.strip_prefix('W').unwrap_or(b)
}

// ─── Vaults ──────────────────────────────────────────────────────────────────

fn parse_vaults(
    tx: &mut Transaction,
    evm_tx: &EvmTransaction,
    ctx: &mut ParserContext<'_>,
) -> Result<(), ClassifyError> {
    let mut seen: Vec<&str> = Vec::new();
    for log in logs_from(evm_tx, VAULTS) {
        tx.push_app(NAME);
        if seen.iter().any(|a| a.eq_ignore_ascii_case(&log.address)) {
            continue;
        }
        seen.push(&log.address);
        warn_miss(evm_tx, vault(tx, &log.address, log.index as f64, ctx));
    }
    Ok(())
}

fn vault(tx: &mut Transaction, address: &str, index: f64, ctx: &ParserContext<'_>) -> Result<(), ClassifyError> {
    let vault = ctx.account(address);
    let shares = ctx.name(address);
    let asset = underlying(&shares).ok_or_else(|| missing(NAME, format!("the asset behind {shares}")))?;
    let y = position(tx, |t| {
        t.asset == shares && (ctx.is_self(&t.from) || ctx.is_self(&t.to)) && t.category != TransferCategory::Fee
    })
    .ok_or_else(|| missing(NAME, format!("a {shares} transfer")))?;
    let deposit = ctx.is_self(&tx.transfers[y].to);
    let paired = |t: &Transfer| {
        t.category != TransferCategory::Fee
            && same_asset(&t.asset, asset)
            && if deposit { ctx.is_self(&t.from) } else { ctx.is_self(&t.to) }
    };
    let u = position(tx, paired).ok_or_else(|| missing(NAME, format!("a matching {asset} transfer")))?;
    tracing::info!(vault = %shares, deposit, "yearn vault");

    if deposit {
        let t = &mut tx.transfers[u];
        t.category = TransferCategory::SwapOut;
        t.to = vault.clone();
        default_index(t, index - 1.0);
        let t = &mut tx.transfers[y];
        t.category = TransferCategory::SwapIn;
        t.from = vault;
        tx.set_method("Deposit");
    } else {
        let t = &mut tx.transfers[u];
        t.category = TransferCategory::SwapIn;
        t.from = vault.clone();
        default_index(t, index + 1.0);
        let t = &mut tx.transfers[y];
        t.category = TransferCategory::SwapOut;
        t.to = vault;
        tx.set_method("Withdraw");
    }
    Ok(())
}

// ─── yGov ────────────────────────────────────────────────────────────────────

fn parse_gov(
    tx: &mut Transaction,
    evm_tx: &EvmTransaction,
    ctx: &mut ParserContext<'_>,
) -> Result<(), ClassifyError> {
    for log in logs_from(evm_tx, GOV) {
        tx.push_app(NAME);
        let Some(event) = gov_events().decode(log) else {
            continue;
        };
        let user = event.address("user").or_else(|_| event.address("voter"));
        let Ok(user) = user.map(|u| ctx.account(&u)) else {
            continue;
        };
        if !ctx.is_self(&user) {
            continue;
        }
        let gov = ctx.account(&log.address);
        match event.name.as_str() {
            "Staked" => {
                let result = position(tx, |t| t.asset == YFI.name && t.to == gov)
                    .map(|i| {
                        let t = &mut tx.transfers[i];
                        t.category = TransferCategory::Internal;
                        t.to = insert_venue(&user, GOV_VENUE);
                        tx.set_method("Deposit");
                    })
                    .ok_or_else(|| missing(NAME, "a YFI deposit"));
                warn_miss(evm_tx, result);
            }
            "Withdrawn" => {
                if let Some(i) = position(tx, |t| t.asset == YFI.name && t.from == gov && t.to == user) {
                    let t = &mut tx.transfers[i];
                    t.category = TransferCategory::Internal;
                    t.from = insert_venue(&user, GOV_VENUE);
                    tx.set_method("Withdraw");
                }
            }
            "RegisterVoter" => tx.set_method("YFI Voting Registration"),
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_vault_has_an_underlying() {
        for vault in VAULTS {
            assert!(underlying(vault.name).is_some(), "{}", vault.name);
        }
    }

    #[test]
    fn wrapped_and_native_match() {
        assert!(same_asset("ETH", "WETH"));
        assert!(same_asset("DAI", "DAI"));
        assert!(!same_asset("DAI", "USDC"));
    }
}
