//! Keccak fingerprints of event and function signatures.
//!
//! The topic of a non-anonymous event is the keccak256 hash of its canonical
//! signature, e.g. `keccak256("Transfer(address,address,uint256)")`. DSNote
//! style anonymous logs put the 4-byte function selector in topics[0] instead.

use tiny_keccak::{Hasher, Keccak};

/// Raw keccak256 digest.
pub fn keccak256(input: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(input);
    hasher.finalize(&mut output);
    output
}

/// `0x`-prefixed keccak256 of a canonical signature (an event topic).
pub fn keccak256_signature(signature: &str) -> String {
    format!("0x{}", hex::encode(keccak256(signature.as_bytes())))
}

/// `0x`-prefixed 4-byte selector of a canonical function signature.
pub fn selector(signature: &str) -> String {
    format!("0x{}", hex::encode(&keccak256(signature.as_bytes())[..4]))
}

/// topics[0] of a log, if it is a well-formed 32-byte hash.
pub fn from_topics(topics: &[String]) -> Option<&str> {
    let first = topics.first()?;
    let hex = first.strip_prefix("0x").unwrap_or(first);
    if hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(first.as_str())
    } else {
        None
    }
}

/// True if topics[0] starts with the given 4-byte selector.
pub fn topic_has_selector(topics: &[String], selector: &str) -> bool {
    match from_topics(topics) {
        Some(topic) => topic
            .get(..selector.len())
            .map(|prefix| prefix.eq_ignore_ascii_case(selector))
            .unwrap_or(false),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erc20_transfer_topic() {
        assert_eq!(
            keccak256_signature("Transfer(address,address,uint256)"),
            "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn transfer_function_selector() {
        assert_eq!(selector("transfer(address,uint256)"), "0xa9059cbb");
    }

    #[test]
    fn selector_prefix_match() {
        let topics = vec![format!("0xa9059cbb{}", "0".repeat(56))];
        assert!(topic_has_selector(&topics, "0xa9059cbb"));
        assert!(!topic_has_selector(&topics, "0x095ea7b3"));
        assert!(!topic_has_selector(&["0x12".to_string()], "0x12"));
    }
}
