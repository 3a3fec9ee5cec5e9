//! Uniswap v1/v2 markets, liquidity mining pools and the UNI airdrop.

use alloy_primitives::U256;
use chainledger_core::account::{insert_venue, Account};
use chainledger_core::amount::Amount;
use chainledger_core::error::ClassifyError;
use chainledger_core::evm::EvmTransaction;
use chainledger_core::transaction::{Transaction, Transfer, TransferCategory};
use std::sync::OnceLock;

use crate::abi::{DecodedLog, EventSet};
use crate::normalizer::LogValue;
use crate::app::{is_any, is_any_raw, App, AppAddress};
use crate::context::ParserContext;

use super::{default_index, is_one_of, logs_from, missing, position, warn_miss};

const NAME: &str = "Uniswap";

pub const ROUTER_V2: AppAddress = AppAddress::defi("UniswapRouterV2", "0x7a250d5630b4cf539739df2c5dacb4c659f2488d");

const ROUTERS: &[AppAddress] = &[
    AppAddress::defi("UniswapFactoryV1", "0xc0a47dfe034b400b47bdad5fecda2621de6c4d95"),
    AppAddress::defi("UniswapFactoryV2", "0x5c69bee701ef814a2b6a3edd4b1652cb9cc5aa6f"),
    ROUTER_V2,
];

const GOV_TOKENS: &[AppAddress] = &[AppAddress::token("UNI", "0x1f9840a85d5af5bf1d1762f925bdaddc4201f984")];

const AIRDROP: &[AppAddress] = &[AppAddress::defi("UNI-airdropper", "0x090d4613473dee047c3f2706764f49e0821d256e")];

const STAKING: &[AppAddress] = &[
    AppAddress::defi("Stake-ETH-USDC", "0x7fba4b8dc5e7616e59622806932dbea72537a56b"),
    AppAddress::defi("Stake-ETH-USDT", "0x6c3e4cb2e96b01f4b866965a91ed4437839a121a"),
    AppAddress::defi("Stake-ETH-DAI", "0xa1484c3aa22a66c62b77e0ae78e15258bd0cb711"),
    AppAddress::defi("Stake-ETH-WBTC", "0xca35e32e7926b96a9988f61d510e038108d8068e"),
];

pub const V1_MARKETS: &[AppAddress] = &[
    AppAddress::exchange("UniV1-aDAI", "0x7cfab87aac0899c093235b342ac0e5b1acf159eb"),
    AppAddress::exchange("UniV1-BAT", "0x2e642b8d59b45a1d8c5aef716a84ff44ea665914"),
    AppAddress::exchange("UniV1-cDAI", "0x34e89740adf97c3a9d3f63cc2ce4a914382c230b"),
    AppAddress::exchange("UniV1-DAI", "0x2a1530c4c41db0b0b2bb646cb5eb1a67b7158667"),
    AppAddress::exchange("UniV1-GNO", "0xe8e45431b93215566ba923a7e611b7342ea954df"),
    AppAddress::exchange("UniV1-LINK", "0xf173214c720f58e03e194085b1db28b50acdeead"),
    AppAddress::exchange("UniV1-MKR", "0x2c4bd064b998838076fa341a83d007fc2fa50957"),
    AppAddress::exchange("UniV1-REP", "0x48b04d2a05b6b604d8d5223fd1984f191ded51af"),
    AppAddress::exchange("UniV1-SAI", "0x09cabec1ead1c0ba254b09efb3ee13841712be14"),
    AppAddress::exchange("UniV1-SNX", "0x3958b4ec427f8fa24eb60f42821760e88d485f7f"),
    AppAddress::exchange("UniV1-sUSD", "0xb944d13b2f4047fc7bd3f7013bcf01b115fb260d"),
    AppAddress::exchange("UniV1-USDC", "0x97dec872013f6b5fb443861090ad931542878126"),
    AppAddress::exchange("UniV1-WBTC", "0x4d2f5cfba55ae412221182d8475bc85799a5644b"),
    AppAddress::exchange("UniV1-ZRX", "0xae76c84c9262cdb9abc0c2c8888e62db8e22a0bf"),
];

pub const V2_MARKETS: &[AppAddress] = &[
    AppAddress::token("UniV2-AAVE-ETH", "0xdfc14d2af169b0d36c4eff567ada9b2e0cae044f"),
    AppAddress::token("UniV2-COMP-ETH", "0xcffdded873554f362ac02f8fb1f02e5ada10516f"),
    AppAddress::token("UniV2-DAI-ETH", "0xa478c2975ab1ea89e8196811f51a7b7ade33eb11"),
    AppAddress::token("UniV2-DAI-USDC", "0xae461ca67b15dc8dc81ce7615e0320da1a9ab8d5"),
    AppAddress::token("UniV2-ETH-USDT", "0x0d4a11d5eeaac28ec3f61d100daf4d40471f1852"),
    AppAddress::token("UniV2-LINK-ETH", "0xa2107fa5b38d9bbd2c461d6edf11b11a50f6b974"),
    AppAddress::token("UniV2-MKR-ETH", "0xc2adda861f89bbb333c90c492cb837741916a225"),
    AppAddress::token("UniV2-TORN-ETH", "0x0c722a487876989af8a05fffb6e32e45cc23fb3a"),
    AppAddress::token("UniV2-UNI-ETH", "0xd3d2e2692501a5c9ca623199d38826e513033a17"),
    AppAddress::token("UniV2-USDC-ETH", "0xb4e16d0168e52d35cacd2c6185b44281ec28c9dc"),
    AppAddress::token("UniV2-USDC-USDT", "0x3041cbd36888becc7bbcbc0045e3b1f144466f5f"),
    AppAddress::token("UniV2-WBTC-ETH", "0xbb2b8038a1640196fbe3e38816f3e67cba72d940"),
    AppAddress::token("UniV2-WBTC-USDC", "0x004375dff511095cc5a197a54140a24efef3a416"),
];

const ALL: &[&[AppAddress]] = &[ROUTERS, GOV_TOKENS, AIRDROP, STAKING, V1_MARKETS, V2_MARKETS];

pub const APP: App = App {
    name: NAME,
    addresses: ALL,
    insert: &[],
    modify: &[parse_markets, parse_governance],
    swap_venue: true,
};

const V1_EVENTS: &[&str] = &[
    "event AddLiquidity(address indexed provider, uint256 indexed eth_amount, uint256 indexed token_amount)",
    "event EthPurchase(address indexed buyer, uint256 indexed tokens_sold, uint256 indexed eth_bought)",
    "event RemoveLiquidity(address indexed provider, uint256 indexed eth_amount, uint256 indexed token_amount)",
    "event TokenPurchase(address indexed buyer, uint256 indexed eth_sold, uint256 indexed tokens_bought)",
];

const V2_EVENTS: &[&str] = &[
    "event Burn(address indexed sender, uint256 amount0, uint256 amount1, address indexed to)",
    "event Mint(address indexed sender, uint256 amount0, uint256 amount1)",
    "event Swap(address indexed sender, uint256 amount0In, uint256 amount1In, uint256 amount0Out, uint256 amount1Out, address indexed to)",
];

const STAKING_EVENTS: &[&str] = &[
    "event RewardPaid(address indexed user, uint256 reward)",
    "event Staked(address indexed user, uint256 amount)",
    "event Withdrawn(address indexed user, uint256 amount)",
];

const AIRDROP_EVENTS: &[&str] = &["event Claimed(uint256 index, address account, uint256 amount)"];

fn v1_events() -> &'static EventSet {
    static SET: OnceLock<EventSet> = OnceLock::new();
    SET.get_or_init(|| EventSet::parse_lossy(V1_EVENTS))
}

fn v2_events() -> &'static EventSet {
    static SET: OnceLock<EventSet> = OnceLock::new();
    SET.get_or_init(|| EventSet::parse_lossy(V2_EVENTS))
}

fn staking_events() -> &'static EventSet {
    static SET: OnceLock<EventSet> = OnceLock::new();
    SET.get_or_init(|| EventSet::parse_lossy(STAKING_EVENTS))
}

fn airdrop_events() -> &'static EventSet {
    static SET: OnceLock<EventSet> = OnceLock::new();
    SET.get_or_init(|| EventSet::parse_lossy(AIRDROP_EVENTS))
}

fn is_uniswap(account: &Account) -> bool {
    ALL.iter().any(|group| is_any(group, account))
}

// ─── Swaps and liquidity ─────────────────────────────────────────────────────

fn parse_markets(
    tx: &mut Transaction,
    evm_tx: &EvmTransaction,
    ctx: &mut ParserContext<'_>,
) -> Result<(), ClassifyError> {
    for log in evm_tx.logs.iter().filter(|l| ALL.iter().any(|g| is_any_raw(g, &l.address))) {
        tx.push_app(NAME);
        let event = if is_any_raw(V2_MARKETS, &log.address) {
            v2_events().decode(log)
        } else if is_any_raw(V1_MARKETS, &log.address) {
            v1_events().decode(log)
        } else {
            None
        };
        let Some(event) = event else {
            continue;
        };
        let method = match event.name.as_str() {
            "Swap" | "EthPurchase" | "TokenPurchase" => "Trade",
            "Mint" | "AddLiquidity" => "Supply Liquidity",
            "Burn" | "RemoveLiquidity" => "Remove Liquidity",
            _ => continue,
        };
        warn_miss(evm_tx, swap(tx, evm_tx, &event, ctx, method));
    }
    Ok(())
}

/// Raw token amounts an event reports, in the token's own units.
fn event_amounts(event: &DecodedLog) -> Vec<U256> {
    event
        .args
        .iter()
        .filter_map(|(_, value)| match value {
            LogValue::Uint(u) if !u.is_zero() => Some(*u),
            _ => None,
        })
        .collect()
}

fn transfer_decimals(t: &Transfer, evm_tx: &EvmTransaction, ctx: &ParserContext<'_>) -> u8 {
    if t.asset == ctx.meta.fee_asset {
        return 18;
    }
    t.index
        .and_then(|index| evm_tx.logs.iter().find(|l| l.index as f64 == index))
        .map(|l| ctx.decimals(&l.address))
        .unwrap_or(18)
}

/// A market event claims the swap legs whose amounts it reports. When it
/// reports none of them (liquidity tokens, unusual routes), it falls back to
/// the legs no other market has claimed yet and then needs both sides.
fn swap(
    tx: &mut Transaction,
    evm_tx: &EvmTransaction,
    event: &DecodedLog,
    ctx: &ParserContext<'_>,
    method: &str,
) -> Result<(), ClassifyError> {
    let log_address = event.address.as_str();
    let market = ctx.account(log_address);
    let index = if event.index == 0 { 1.0 } else { event.index as f64 };
    let amounts = event_amounts(event);
    let reported = |t: &Transfer| {
        let decimals = transfer_decimals(t, evm_tx, ctx);
        amounts.iter().any(|raw| Amount::from_units(*raw, decimals) == t.amount)
    };

    let outs: Vec<usize> = (0..tx.transfers.len())
        .filter(|&i| {
            let t = &tx.transfers[i];
            ctx.is_self(&t.from)
                && is_uniswap(&t.to)
                && is_one_of(t.category, &[TransferCategory::Expense, TransferCategory::SwapOut])
        })
        .collect();
    let ins: Vec<usize> = (0..tx.transfers.len())
        .filter(|&i| {
            let t = &tx.transfers[i];
            ctx.is_self(&t.to)
                && is_uniswap(&t.from)
                && is_one_of(t.category, &[TransferCategory::Income, TransferCategory::SwapIn])
        })
        .collect();

    let mut swaps_out: Vec<usize> = outs.iter().copied().filter(|&i| reported(&tx.transfers[i])).collect();
    let mut swaps_in: Vec<usize> = ins.iter().copied().filter(|&i| reported(&tx.transfers[i])).collect();
    let matched = !swaps_out.is_empty() || !swaps_in.is_empty();
    if swaps_out.is_empty() {
        swaps_out = outs
            .into_iter()
            .filter(|&i| tx.transfers[i].category == TransferCategory::Expense)
            .collect();
    }
    if swaps_in.is_empty() {
        swaps_in = ins
            .into_iter()
            .filter(|&i| tx.transfers[i].category == TransferCategory::Income)
            .collect();
    }
    if !matched && (swaps_in.is_empty() || swaps_out.is_empty()) {
        return Err(missing(
            NAME,
            format!("swaps for {method}: in={} out={}", swaps_in.len(), swaps_out.len()),
        ));
    }
    tracing::info!(market = %ctx.name(log_address), method, "uniswap");
    for i in swaps_in {
        let t = &mut tx.transfers[i];
        t.category = TransferCategory::SwapIn;
        t.from = market.clone();
        default_index(t, index);
    }
    for i in swaps_out {
        let t = &mut tx.transfers[i];
        t.category = TransferCategory::SwapOut;
        t.to = market.clone();
        default_index(t, index);
    }
    tx.set_method(method);
    Ok(())
}

// ─── Staking and airdrop ─────────────────────────────────────────────────────

fn is_lp_token(asset: &str) -> bool {
    V2_MARKETS.iter().any(|m| m.name == asset)
}

fn parse_governance(
    tx: &mut Transaction,
    evm_tx: &EvmTransaction,
    ctx: &mut ParserContext<'_>,
) -> Result<(), ClassifyError> {
    for log in logs_from(evm_tx, AIRDROP) {
        if let Some(event) = airdrop_events().decode(log) {
            if event.name == "Claimed" {
                tracing::info!(hash = %evm_tx.hash, "UNI airdrop claim");
                tx.push_app(NAME);
                tx.set_method("Claim");
            }
        }
    }
    for log in logs_from(evm_tx, STAKING) {
        let Some(event) = staking_events().decode(log) else {
            continue;
        };
        tx.push_app(NAME);
        match event.name.as_str() {
            "Staked" => warn_miss(evm_tx, stake(tx, ctx, true)),
            "Withdrawn" => warn_miss(evm_tx, stake(tx, ctx, false)),
            _ => {}
        }
    }
    Ok(())
}

fn stake(tx: &mut Transaction, ctx: &ParserContext<'_>, deposit: bool) -> Result<(), ClassifyError> {
    if deposit {
        let i = position(tx, |t| {
            ctx.is_self(&t.from)
                && is_any(STAKING, &t.to)
                && is_lp_token(&t.asset)
                && is_one_of(t.category, &[TransferCategory::Expense, TransferCategory::Internal])
        })
        .ok_or_else(|| missing(NAME, "a deposit to the staking pool"))?;
        let t = &mut tx.transfers[i];
        t.to = insert_venue(&t.from, NAME);
        t.category = TransferCategory::Internal;
        tx.set_method("Deposit");
    } else {
        let i = position(tx, |t| {
            ctx.is_self(&t.to)
                && is_any(STAKING, &t.from)
                && is_lp_token(&t.asset)
                && is_one_of(t.category, &[TransferCategory::Income, TransferCategory::Internal])
        })
        .ok_or_else(|| missing(NAME, "a withdrawal from the staking pool"))?;
        let t = &mut tx.transfers[i];
        t.from = insert_venue(&t.to, NAME);
        t.category = TransferCategory::Internal;
        tx.set_method("Withdraw");
    }
    Ok(())
}
