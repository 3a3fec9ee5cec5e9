//! Standalone ERC20 tokens. Protocol-specific tokens live with their app.

use crate::app::{App, AppAddress};

pub const DAI: AppAddress = AppAddress::token("DAI", "0x6b175474e89094c44da98b954eedeac495271d0f");
pub const USDC: AppAddress = AppAddress::token("USDC", "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48").decimals(6);
pub const USDT: AppAddress = AppAddress::token("USDT", "0xdac17f958d2ee523a2206206994597c13d831ec7").decimals(6);
pub const WBTC: AppAddress = AppAddress::token("WBTC", "0x2260fac5e5542a773aa44fbcfedf7c193bc2c599").decimals(8);

const ETHEREUM: &[AppAddress] = &[
    AppAddress::token("1INCH", "0x111111111117dc0aa78b770fa6a738034120c302"),
    AppAddress::token("3Crv", "0x6c3f90f043a72fa612cbac8115ee7e52bde6e490"),
    AppAddress::token("ADT", "0xd0d6d6c5fe4a677d343cc433536bb717bae167dd").decimals(9),
    AppAddress::token("BAT", "0x0d8775f648430679a709e98d2b0cb6250d2887ef"),
    AppAddress::token("CHERRY", "0x4ecb692b0fedecd7b486b4c99044392784877e8c").decimals(4),
    DAI,
    AppAddress::token("GEN", "0x543ff227f64aa17ea132bf9886cab5db55dcaddf"),
    AppAddress::token("GNO", "0x6810e776880c02933d47db1b9fc05908e5386b96"),
    AppAddress::token("GRT", "0xc944e90c64b2c07662a292be6244bdf05cda44a7"),
    AppAddress::token("GTC", "0xde30da39c46104798bb5aa3fe8b9e0e1f348163f"),
    AppAddress::token("OMG", "0xd26114cd6ee289accf82350c8d8487fedb8a0c07"),
    AppAddress::token("RAI", "0x03ab458634910aad20ef5f1c8ee96f1d6ac54919"),
    AppAddress::token("REP", "0xe94327d07fc17907b4db788e5adf2ed424addff6"),
    AppAddress::token("REP", "0x1985365e9f78359a9b6ad760e32412f4a445e862"),
    AppAddress::token("REPv2", "0x221657776846890989a759ba2973e427dff5c9bb"),
    AppAddress::token("SNT", "0x744d70fdbe2ba4cf95131626614a1763df805b9e"),
    AppAddress::token("SNX", "0xc011a73ee8576fb46f5e1c5751ca3b9fe0af2a6f"),
    AppAddress::token("SNX", "0xc011a72400e58ecd99ee497cf89e3775d4bd732f"),
    AppAddress::token("SPANK", "0x42d6622dece394b54999fbd73d108123806f6a18"),
    AppAddress::token("sUSD", "0x57ab1ec28d129707052df4df418d58a2d46d5f51"),
    AppAddress::token("sUSD", "0x57ab1e02fee23774580c119740129eac7081e9d3"),
    AppAddress::token("TUSD", "0x0000000000085d4780b73119b644ae5ecd22b376"),
    USDC,
    USDT,
    WBTC,
    AppAddress::token("ZRX", "0xe41d2489571d322189246dafa5ebde1f4699f498"),
];

const POLYGON: &[AppAddress] = &[
    AppAddress::token("DAI", "0x8f3Cf7ad23Cd3CaDbD9735AFf958023239c6A063").on("Polygon"),
    AppAddress::token("USDC", "0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174").decimals(6).on("Polygon"),
    AppAddress::token("USDT", "0xc2132D05D31c914a87C6611C10748AEb04B58e8F").decimals(6).on("Polygon"),
    AppAddress::token("WBTC", "0x1BFD67037B42Cf73acF2047067bd4F2C47D9BfD6").decimals(8).on("Polygon"),
    AppAddress::token("WETH", "0x7ceB23fD6bC0adD59E62ac25578270cFf1b9f619").on("Polygon"),
];

pub const APP: App = App {
    name: "ERC20",
    addresses: &[ETHEREUM, POLYGON],
    insert: &[],
    modify: &[],
    swap_venue: false,
};

#[cfg(test)]
mod tests {
    use super::*;
    use chainledger_core::address_book::get_address_entry_error;

    #[test]
    fn token_entries_are_valid() {
        for address in APP.all_addresses() {
            let entry = address.entry();
            assert_eq!(get_address_entry_error(&entry), None, "{}", address.name);
        }
        assert_eq!(USDC.entry().decimals, Some(6));
        assert!(POLYGON.iter().all(|a| a.entry().address.starts_with("Polygon/")));
    }
}
