//! Tornado Cash mixer deposits and relayed withdrawals.
//!
//! Funds inside the mixer stay ours, so deposits and withdrawals are
//! `Internal` movements through a `Tornado` venue. The mixer doesn't say
//! which pool was used: a withdrawal of `x` is assumed to come out of the
//! pool sized at the nearest power of ten above `x`, with the difference
//! paid to the relayer.

use chainledger_core::account::{insert_venue, Account};
use chainledger_core::error::ClassifyError;
use chainledger_core::evm::EvmTransaction;
use chainledger_core::transaction::{Transaction, Transfer, TransferCategory};

use crate::app::{is_any, App, AppAddress};
use crate::context::ParserContext;

use super::{default_index, is_one_of};

const NAME: &str = "Tornado";

pub const RELAYER: AppAddress = AppAddress::defi("TornadoRelayer", "0xb541fc07bc7619fd4062a54d96268525cbc6ffef");

const GOV_TOKENS: &[AppAddress] = &[AppAddress::token("TORN", "0x77777feddddffc19ff86db637967013e6c6a116c")];

const MISC: &[AppAddress] = &[
    AppAddress::defi("vTORN-airdropper", "0x4e7b3769921c8dfbdb3d1b4c73558db079a180c7"),
    AppAddress::defi("vTORN", "0x3efa30704d2b8bbac821307230376556cf8cc39e"),
];

pub const MIXERS: &[AppAddress] = &[
    AppAddress::defi("tornado-proxy", "0x905b63fff465b9ffbf41dea908ceb12478ec7601"),
    AppAddress::defi("tornado-proxy", "0x722122df12d4e14e13ac3b6895a86e84145b6967"),
    RELAYER,
    AppAddress::defi("tornado-dai-100", "0xd4b88df4d29f5cedd6857912842cff3b20c8cfa3"),
    AppAddress::defi("tornado-dai-1000", "0xfd8610d20aa15b7b2e3be39b396a1bc3516c7144"),
    AppAddress::defi("tornado-dai-10000", "0x07687e702b410fa43f4cb4af7fa097918ffd2730"),
    AppAddress::defi("tornado-dai-100000", "0x23773e65ed146a459791799d01336db287f25334"),
    AppAddress::defi("tornado-eth-01", "0x12d66f87a04a9e220743712ce6d9bb1b5616b8fc"),
    AppAddress::defi("tornado-eth-1", "0x47ce0c6ed5b0ce3d3a51fdb1c52dc66a7c3c2936"),
    AppAddress::defi("tornado-eth-10", "0x910cbd523d972eb0a6f4cae4618ad62622b39dbf"),
    AppAddress::defi("tornado-eth-100", "0xa160cdab225685da1d56aa342ad8841c3b53f291"),
    AppAddress::defi("tornado-mixer", "0x94a1b5cdb22c43faab4abeb5c74999895464ddaf"),
    AppAddress::defi("tornado-wbtc-01", "0x178169b423a011fff22b9e3f3abea13414ddd0f1"),
    AppAddress::defi("tornado-wbtc-1", "0x610b717796ad172b316836ac95a2ffad065ceab4"),
    AppAddress::defi("tornado-wbtc-10", "0xbb93e510bbcd0b7beb5a853875f9ec60275cf498"),
];

pub const APP: App = App {
    name: NAME,
    addresses: &[GOV_TOKENS, MISC, MIXERS],
    insert: &[],
    modify: &[parse_mixer],
    swap_venue: false,
};

fn parse_mixer(
    tx: &mut Transaction,
    evm_tx: &EvmTransaction,
    ctx: &mut ParserContext<'_>,
) -> Result<(), ClassifyError> {
    let mut seen = false;
    let relayer = ctx.account(RELAYER.address);

    for t in tx.transfers.iter_mut() {
        if ctx.book.is_self(&t.from)
            && is_any(MIXERS, &t.to)
            && is_one_of(t.category, &[TransferCategory::Expense, TransferCategory::Internal])
        {
            t.category = TransferCategory::Internal;
            t.to = insert_venue(&t.from, NAME);
            seen = true;
            tracing::info!(hash = %evm_tx.hash, asset = %t.asset, amount = %t.amount, "tornado deposit");
            tx.method = "Deposit".to_string();
        }
    }

    let mut fees: Vec<Transfer> = Vec::new();
    for t in tx.transfers.iter_mut() {
        if ctx.book.is_self(&t.to)
            && is_any(MIXERS, &t.from)
            && is_one_of(t.category, &[TransferCategory::Income, TransferCategory::Internal])
        {
            let venue: Account = insert_venue(&t.to, NAME);
            t.category = TransferCategory::Internal;
            t.from = venue.clone();
            default_index(t, 1.0);
            let fee = t.amount.closest_ten_pow() - t.amount;
            if fee.is_positive() {
                fees.push(
                    Transfer::new(&t.asset, TransferCategory::Fee, venue, relayer.clone(), fee).with_index(0.0),
                );
            }
            seen = true;
            tracing::info!(hash = %evm_tx.hash, asset = %t.asset, amount = %t.amount, "tornado withdrawal");
            tx.method = "Withdraw".to_string();
        }
    }
    tx.transfers.extend(fees);

    if seen {
        tx.push_app(NAME);
    }
    Ok(())
}
