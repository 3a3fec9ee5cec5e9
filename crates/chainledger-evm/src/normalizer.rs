//! Converts alloy `DynSolValue`s into the small value model parsers read.

use alloy_core::dyn_abi::DynSolValue;
use alloy_primitives::U256;

/// A decoded event argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogValue {
    Bool(bool),
    /// Sign and magnitude of a signed integer.
    Int { negative: bool, abs: U256 },
    Uint(U256),
    /// EIP-55 checksummed.
    Address(String),
    Bytes(Vec<u8>),
    Str(String),
    Array(Vec<LogValue>),
    Tuple(Vec<LogValue>),
}

/// Convert a decoded `DynSolValue` into a `LogValue`.
pub fn normalize(val: DynSolValue) -> LogValue {
    match val {
        DynSolValue::Bool(b) => LogValue::Bool(b),
        DynSolValue::Int(i, _bits) => LogValue::Int {
            negative: i.is_negative(),
            abs: i.unsigned_abs(),
        },
        DynSolValue::Uint(u, _bits) => LogValue::Uint(u),
        DynSolValue::FixedBytes(bytes, size) => LogValue::Bytes(bytes[..size].to_vec()),
        DynSolValue::Bytes(b) => LogValue::Bytes(b),
        DynSolValue::String(s) => LogValue::Str(s),
        DynSolValue::Address(a) => LogValue::Address(a.to_checksum(None)),
        DynSolValue::Array(vals) | DynSolValue::FixedArray(vals) => {
            LogValue::Array(vals.into_iter().map(normalize).collect())
        }
        DynSolValue::Tuple(fields) => LogValue::Tuple(fields.into_iter().map(normalize).collect()),
        DynSolValue::Function(f) => LogValue::Bytes(f.to_vec()),
    }
}

/// Interpret a 32-byte word as a signed two's-complement integer.
pub fn word_to_signed(word: &[u8]) -> (bool, U256) {
    let raw = U256::from_be_slice(word);
    if raw.bit(255) {
        (true, (!raw).wrapping_add(U256::from(1u64)))
    } else {
        (false, raw)
    }
}

/// Decode a right-padded bytes32 as text (eg a Maker ilk `ETH-A`).
pub fn bytes32_to_string(word: &[u8]) -> String {
    let end = word.iter().position(|b| *b == 0).unwrap_or(word.len());
    String::from_utf8_lossy(&word[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, I256};

    #[test]
    fn normalize_uint() {
        let v = normalize(DynSolValue::Uint(U256::from(42u64), 256));
        assert_eq!(v, LogValue::Uint(U256::from(42u64)));
    }

    #[test]
    fn normalize_negative_int() {
        let v = normalize(DynSolValue::Int("-5".parse::<I256>().unwrap(), 256));
        assert_eq!(
            v,
            LogValue::Int {
                negative: true,
                abs: U256::from(5u64)
            }
        );
    }

    #[test]
    fn normalize_address_is_checksummed() {
        let addr: Address = "0xd8da6bf26964af9d7eed9e03e53415d37aa96045".parse().unwrap();
        assert_eq!(
            normalize(DynSolValue::Address(addr)),
            LogValue::Address("0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045".into())
        );
    }

    #[test]
    fn signed_words() {
        let mut minus_one = [0xffu8; 32];
        assert_eq!(word_to_signed(&minus_one), (true, U256::from(1u64)));
        minus_one = [0u8; 32];
        minus_one[31] = 7;
        assert_eq!(word_to_signed(&minus_one), (false, U256::from(7u64)));
    }

    #[test]
    fn ilk_text() {
        let mut word = [0u8; 32];
        word[..5].copy_from_slice(b"ETH-A");
        assert_eq!(bytes32_to_string(&word), "ETH-A");
    }
}
