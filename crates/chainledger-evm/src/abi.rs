//! Human-readable event ABIs and log decoding.
//!
//! Apps declare the events they care about as Solidity signatures
//! (`"event Transfer(address indexed from, address indexed to, uint256 value)"`).
//! An [`EventSet`] parses them once and decodes matching logs: indexed
//! arguments come from topics[1..], the rest from the data payload.
//!
//! # Indexed parameter encoding
//! - Value types (uint, int, bool, address, bytesN) are padded to 32 bytes
//!   in the topic and can be decoded.
//! - Reference types (string, bytes, arrays, tuples) are stored as the
//!   keccak256 of their encoding; the raw 32-byte hash is returned.

use alloy_core::dyn_abi::{DynSolType, DynSolValue};
use alloy_dyn_abi::Specifier;
use alloy_json_abi::Event;
use alloy_primitives::U256;
use chainledger_core::evm::EvmTransactionLog;

use crate::error::DecodeError;
use crate::fingerprint;
use crate::normalizer::{self, LogValue};

/// One parsed event definition.
#[derive(Debug, Clone)]
pub struct EventAbi {
    pub name: String,
    pub topic: String,
    params: Vec<(String, bool, DynSolType)>,
}

impl EventAbi {
    pub fn parse(signature: &str) -> Result<Self, DecodeError> {
        let invalid = |reason: String| DecodeError::InvalidSignature {
            signature: signature.to_string(),
            reason,
        };
        let event = Event::parse(signature).map_err(|e| invalid(e.to_string()))?;
        let params = event
            .inputs
            .iter()
            .map(|p| {
                p.resolve()
                    .map(|ty| (p.name.clone(), p.indexed, ty))
                    .map_err(|e| invalid(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            topic: fingerprint::keccak256_signature(&event.signature()),
            name: event.name,
            params,
        })
    }

    fn indexed_count(&self) -> usize {
        self.params.iter().filter(|(_, indexed, _)| *indexed).count()
    }

    /// True if the log carries this event's topic and topic count.
    pub fn matches(&self, log: &EvmTransactionLog) -> bool {
        log.topics.len() == self.indexed_count() + 1
            && fingerprint::from_topics(&log.topics)
                .map(|t| t.eq_ignore_ascii_case(&self.topic))
                .unwrap_or(false)
    }

    /// Decode a log already known to match.
    pub fn decode(&self, log: &EvmTransactionLog) -> Result<DecodedLog, DecodeError> {
        let expected = self.indexed_count() + 1;
        if log.topics.len() != expected {
            return Err(DecodeError::TopicCount {
                expected,
                found: log.topics.len(),
            });
        }
        let mut args = Vec::with_capacity(self.params.len());
        let mut topics = log.topics.iter().skip(1);
        let data_types: Vec<DynSolType> = self
            .params
            .iter()
            .filter(|(_, indexed, _)| !indexed)
            .map(|(_, _, ty)| ty.clone())
            .collect();
        let mut data_values = decode_data(&log.data, data_types)?.into_iter();

        for (name, indexed, ty) in &self.params {
            let value = if *indexed {
                let topic = topics.next().ok_or(DecodeError::TopicCount {
                    expected,
                    found: log.topics.len(),
                })?;
                decode_topic(topic, ty)?
            } else {
                data_values.next().ok_or_else(|| DecodeError::AbiDecodeFailed {
                    reason: format!("missing data value for {name}"),
                })?
            };
            args.push((name.clone(), value));
        }
        Ok(DecodedLog {
            name: self.name.clone(),
            address: log.address.clone(),
            index: log.index,
            args,
        })
    }
}

fn decode_hex(field: &str, raw: &str) -> Result<Vec<u8>, DecodeError> {
    hex::decode(raw.strip_prefix("0x").unwrap_or(raw)).map_err(|e| DecodeError::InvalidHex {
        field: field.to_string(),
        reason: e.to_string(),
    })
}

fn decode_topic(topic: &str, ty: &DynSolType) -> Result<LogValue, DecodeError> {
    let bytes = decode_hex("topic", topic)?;
    match ty {
        DynSolType::String
        | DynSolType::Bytes
        | DynSolType::Array(_)
        | DynSolType::FixedArray(..)
        | DynSolType::Tuple(_) => return Ok(LogValue::Bytes(bytes)),
        _ => {}
    }
    ty.abi_decode(&bytes)
        .map(normalizer::normalize)
        .map_err(|e| DecodeError::AbiDecodeFailed {
            reason: format!("topic decode: {e}"),
        })
}

fn decode_data(data: &str, types: Vec<DynSolType>) -> Result<Vec<LogValue>, DecodeError> {
    if types.is_empty() {
        return Ok(Vec::new());
    }
    let bytes = decode_hex("data", data)?;
    let decoded = DynSolType::Tuple(types)
        .abi_decode_sequence(&bytes)
        .map_err(|e| DecodeError::AbiDecodeFailed {
            reason: e.to_string(),
        })?;
    Ok(match decoded {
        DynSolValue::Tuple(vals) => vals.into_iter().map(normalizer::normalize).collect(),
        other => vec![normalizer::normalize(other)],
    })
}

// ─── Decoded logs ────────────────────────────────────────────────────────────

/// A log decoded against an event ABI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedLog {
    pub name: String,
    pub address: String,
    pub index: u64,
    pub args: Vec<(String, LogValue)>,
}

impl DecodedLog {
    pub fn get(&self, name: &str) -> Result<&LogValue, DecodeError> {
        self.args
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| DecodeError::MissingArg {
                event: self.name.clone(),
                name: name.to_string(),
            })
    }

    fn wrong_type(&self, name: &str, expected: &'static str) -> DecodeError {
        DecodeError::ArgType {
            event: self.name.clone(),
            name: name.to_string(),
            expected,
        }
    }

    /// Checksummed address argument.
    pub fn address(&self, name: &str) -> Result<String, DecodeError> {
        match self.get(name)? {
            LogValue::Address(a) => Ok(a.clone()),
            _ => Err(self.wrong_type(name, "address")),
        }
    }

    pub fn uint(&self, name: &str) -> Result<U256, DecodeError> {
        match self.get(name)? {
            LogValue::Uint(u) => Ok(*u),
            _ => Err(self.wrong_type(name, "uint")),
        }
    }

    /// Sign and magnitude of an int argument.
    pub fn int(&self, name: &str) -> Result<(bool, U256), DecodeError> {
        match self.get(name)? {
            LogValue::Int { negative, abs } => Ok((*negative, *abs)),
            LogValue::Uint(u) => Ok((false, *u)),
            _ => Err(self.wrong_type(name, "int")),
        }
    }

    pub fn string(&self, name: &str) -> Result<&str, DecodeError> {
        match self.get(name)? {
            LogValue::Str(s) => Ok(s),
            _ => Err(self.wrong_type(name, "string")),
        }
    }

    pub fn bytes(&self, name: &str) -> Result<&[u8], DecodeError> {
        match self.get(name)? {
            LogValue::Bytes(b) => Ok(b),
            _ => Err(self.wrong_type(name, "bytes")),
        }
    }
}

// ─── Event sets ──────────────────────────────────────────────────────────────

/// The events an app recognises.
#[derive(Debug, Clone, Default)]
pub struct EventSet {
    events: Vec<EventAbi>,
}

impl EventSet {
    /// Parse every signature, failing on the first invalid one.
    pub fn parse(signatures: &[&str]) -> Result<Self, DecodeError> {
        let events = signatures
            .iter()
            .map(|s| EventAbi::parse(s))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { events })
    }

    /// Parse signatures, logging and skipping invalid ones.
    pub fn parse_lossy(signatures: &[&str]) -> Self {
        let events = signatures
            .iter()
            .filter_map(|s| match EventAbi::parse(s) {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::error!(error = %e, "invalid event signature");
                    None
                }
            })
            .collect();
        Self { events }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Topic of a named event.
    pub fn topic(&self, name: &str) -> Option<&str> {
        self.events
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.topic.as_str())
    }

    /// Decode a log. `Ok(None)` when no event in the set matches.
    pub fn parse_log(&self, log: &EvmTransactionLog) -> Result<Option<DecodedLog>, DecodeError> {
        match self.events.iter().find(|e| e.matches(log)) {
            Some(event) => event.decode(log).map(Some),
            None => Ok(None),
        }
    }

    /// Like [`EventSet::parse_log`], logging decode failures.
    pub fn decode(&self, log: &EvmTransactionLog) -> Option<DecodedLog> {
        match self.parse_log(log) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!(address = %log.address, index = log.index, error = %e, "failed to decode log");
                None
            }
        }
    }
}

// ─── DSNote logs ─────────────────────────────────────────────────────────────

/// An anonymous DSNote log: the called function and its raw argument words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogNote {
    pub name: String,
    pub args: Vec<[u8; 32]>,
}

impl LogNote {
    pub fn arg(&self, i: usize) -> [u8; 32] {
        self.args.get(i).copied().unwrap_or([0u8; 32])
    }

    pub fn uint(&self, i: usize) -> U256 {
        U256::from_be_bytes(self.arg(i))
    }

    pub fn int(&self, i: usize) -> (bool, U256) {
        normalizer::word_to_signed(&self.arg(i))
    }
}

/// Function selectors recognised in DSNote logs.
#[derive(Debug, Clone, Default)]
pub struct LogNoteSet {
    functions: Vec<(String, String)>,
}

impl LogNoteSet {
    /// `signatures` are canonical, eg `"slip(bytes32,address,int256)"`.
    pub fn new(signatures: &[&str]) -> Self {
        let functions = signatures
            .iter()
            .map(|sig| {
                let name = sig.split('(').next().unwrap_or(sig).to_string();
                (name, fingerprint::selector(sig))
            })
            .collect();
        Self { functions }
    }

    /// The calldata is carried ABI-encoded as `bytes` in the log data:
    /// offset word, length word, then selector and argument words.
    ///
    /// A log whose length word runs past its data is not a note.
    pub fn parse(&self, log: &EvmTransactionLog) -> Option<LogNote> {
        let (name, _) = self
            .functions
            .iter()
            .find(|(_, sel)| fingerprint::topic_has_selector(&log.topics, sel))?;
        let data = decode_hex("data", &log.data).ok()?;
        let len = U256::from_be_slice(data.get(32..64)?).saturating_to::<usize>();
        let Some(calldata) = data.get(64..).and_then(|rest| rest.get(..len)) else {
            tracing::warn!(
                address = %log.address,
                index = log.index,
                call = %name,
                "note calldata length exceeds log data"
            );
            return None;
        };
        let args = calldata
            .get(4..)
            .unwrap_or(&[])
            .chunks(32)
            .map(|chunk| {
                let mut word = [0u8; 32];
                word[..chunk.len()].copy_from_slice(chunk);
                word
            })
            .collect();
        Some(LogNote {
            name: name.clone(),
            args,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ERC20: &[&str] = &[
        "event Transfer(address indexed from, address indexed to, uint256 amount)",
        "event Approval(address indexed owner, address indexed spender, uint256 amount)",
    ];

    fn word(hex_tail: &str) -> String {
        format!("0x{:0>64}", hex_tail)
    }

    #[test]
    fn decodes_erc20_transfer() {
        let set = EventSet::parse(ERC20).unwrap();
        let log = EvmTransactionLog {
            address: "0x6b175474e89094c44da98b954eedeac495271d0f".into(),
            data: word("de0b6b3a7640000"),
            index: 3,
            topics: vec![
                set.topic("Transfer").unwrap().to_string(),
                word("1111111111111111111111111111111111111111"),
                word("2222222222222222222222222222222222222222"),
            ],
        };
        let decoded = set.parse_log(&log).unwrap().unwrap();
        assert_eq!(decoded.name, "Transfer");
        assert_eq!(
            decoded.address("from").unwrap(),
            "0x1111111111111111111111111111111111111111"
        );
        assert_eq!(
            decoded.uint("amount").unwrap(),
            U256::from(1_000_000_000_000_000_000u64)
        );
        assert!(decoded.uint("from").is_err());
    }

    #[test]
    fn topic_count_disambiguates_erc721() {
        let set = EventSet::parse(ERC20).unwrap();
        let log = EvmTransactionLog {
            address: "0x6b175474e89094c44da98b954eedeac495271d0f".into(),
            data: "0x".into(),
            index: 0,
            topics: vec![
                set.topic("Transfer").unwrap().to_string(),
                word("1"),
                word("2"),
                word("3"),
            ],
        };
        assert_eq!(set.parse_log(&log).unwrap(), None);
    }

    #[test]
    fn invalid_signatures_are_skipped() {
        let set = EventSet::parse_lossy(&["event Broken(", ERC20[0]]);
        assert_eq!(set.len(), 1);
        assert!(EventSet::parse(&["event Broken("]).is_err());
    }

    #[test]
    fn parses_log_note_arguments() {
        let notes = LogNoteSet::new(&["join(uint256)", "exit(uint256)"]);
        let sel = fingerprint::selector("exit(uint256)");
        let wad = "de0b6b3a7640000";
        // offset, length (4 + 32), selector + wad, padding
        let data = format!(
            "0x{}{}{}{:0>64}{}",
            format!("{:0>64}", "20"),
            format!("{:0>64}", "24"),
            &sel[2..],
            wad,
            "0".repeat(56)
        );
        let log = EvmTransactionLog {
            address: "0x197e90f9fad81970ba7976f33cbd77088e5d7cf7".into(),
            data,
            index: 1,
            topics: vec![format!("{}{}", sel, "0".repeat(56)), word("1"), word("0"), word("0")],
        };
        let note = notes.parse(&log).unwrap();
        assert_eq!(note.name, "exit");
        assert_eq!(note.uint(0), U256::from(1_000_000_000_000_000_000u64));
        assert_eq!(note.uint(5), U256::ZERO);
    }

    fn join_note(data: String) -> EvmTransactionLog {
        let sel = fingerprint::selector("join(uint256)");
        EvmTransactionLog {
            address: "0x197e90f9fad81970ba7976f33cbd77088e5d7cf7".into(),
            data,
            index: 2,
            topics: vec![format!("{}{}", sel, "0".repeat(56)), word("1"), word("0"), word("0")],
        }
    }

    #[test]
    fn oversized_note_length_is_not_a_note() {
        let notes = LogNoteSet::new(&["join(uint256)"]);
        let data = format!("0x{}{}", word("20").trim_start_matches("0x"), "f".repeat(64));
        assert_eq!(notes.parse(&join_note(data)), None);

        // one byte longer than the calldata actually carried
        let sel = fingerprint::selector("join(uint256)");
        let data = format!(
            "0x{:0>64}{:0>64}{}{:0>64}",
            "20",
            "25",
            &sel[2..],
            "1"
        );
        assert_eq!(notes.parse(&join_note(data)), None);
    }

    #[test]
    fn truncated_note_is_not_a_note() {
        let notes = LogNoteSet::new(&["join(uint256)"]);
        assert_eq!(notes.parse(&join_note("0x".into())), None);
        assert_eq!(notes.parse(&join_note(word("20"))), None);
        assert_eq!(notes.parse(&join_note("0xnothex".into())), None);
    }

    #[test]
    fn undecodable_event_data_is_an_error() {
        let set = EventSet::parse(ERC20).unwrap();
        let log = EvmTransactionLog {
            address: "0x6b175474e89094c44da98b954eedeac495271d0f".into(),
            data: "0x1234".into(),
            index: 0,
            topics: vec![
                set.topic("Transfer").unwrap().to_string(),
                word("1111111111111111111111111111111111111111"),
                word("2222222222222222222222222222222222222222"),
            ],
        };
        assert!(set.parse_log(&log).is_err());
        assert_eq!(set.decode(&log), None);
    }
}
