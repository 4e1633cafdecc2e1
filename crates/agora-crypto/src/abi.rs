//! ABI encoding of condition parameters
//!
//! Values are encoded with `abi.encode` tuple semantics: every value takes
//! one 32-byte head word; static values live in the head, dynamic arrays put
//! their byte offset in the head and `length ‖ elements` in the tail.

use agora_types::{parse_u256, Address, Bytes32, ParamType, ParamValue, TypesError, U256};

use crate::{DerivationError, DerivationResult};

/// Width of one ABI word
pub const WORD: usize = 32;

/// A parsed, typed parameter value ready for encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiValue {
    Bytes32(Bytes32),
    Address(Address),
    Uint256(U256),
    Bytes32Array(Vec<Bytes32>),
    AddressArray(Vec<Address>),
    Uint256Array(Vec<U256>),
}

impl AbiValue {
    /// Type tag of this value
    pub fn param_type(&self) -> ParamType {
        match self {
            Self::Bytes32(_) => ParamType::Bytes32,
            Self::Address(_) => ParamType::Address,
            Self::Uint256(_) => ParamType::Uint256,
            Self::Bytes32Array(_) => ParamType::Bytes32Array,
            Self::AddressArray(_) => ParamType::AddressArray,
            Self::Uint256Array(_) => ParamType::Uint256Array,
        }
    }

    /// Whether the value is encoded in the tail
    pub fn is_dynamic(&self) -> bool {
        self.param_type().is_array()
    }

    /// Parse one scalar of the given (scalar) type
    pub fn parse_scalar(param_type: ParamType, text: &str) -> Result<Self, TypesError> {
        match param_type {
            ParamType::Bytes32 => Bytes32::parse(text).map(Self::Bytes32),
            ParamType::Address => Address::parse(text).map(Self::Address),
            ParamType::Uint256 => parse_u256(text).map(Self::Uint256),
            ParamType::Bytes32Array => parse_list(text, Bytes32::parse).map(Self::Bytes32Array),
            ParamType::AddressArray => parse_list(text, Address::parse).map(Self::AddressArray),
            ParamType::Uint256Array => parse_list(text, parse_u256).map(Self::Uint256Array),
        }
    }

    /// Parse an array of the given (array) type
    pub fn parse_array(param_type: ParamType, items: &[String]) -> Result<Self, TypesError> {
        match param_type {
            ParamType::Bytes32Array => items
                .iter()
                .map(|s| Bytes32::parse(s))
                .collect::<Result<_, _>>()
                .map(Self::Bytes32Array),
            ParamType::AddressArray => items
                .iter()
                .map(|s| Address::parse(s))
                .collect::<Result<_, _>>()
                .map(Self::AddressArray),
            ParamType::Uint256Array => items
                .iter()
                .map(|s| parse_u256(s))
                .collect::<Result<_, _>>()
                .map(Self::Uint256Array),
            scalar => Err(TypesError::UnknownParamType(format!("{}[]", scalar))),
        }
    }

    /// Parse a literal parameter value.
    ///
    /// Condition references cannot be parsed on their own; they are resolved
    /// by [`crate::derive_conditions`].
    pub fn from_param(name: &str, param_type: ParamType, value: &ParamValue) -> DerivationResult<Self> {
        let invalid = |source: TypesError| DerivationError::InvalidValue {
            param: name.to_string(),
            param_type,
            source,
        };
        match (value, param_type.is_array()) {
            (ParamValue::Scalar(text), false) => Self::parse_scalar(param_type, text).map_err(invalid),
            (ParamValue::Array(items), true) => Self::parse_array(param_type, items).map_err(invalid),
            (ParamValue::Scalar(_), true) => Err(DerivationError::ShapeMismatch {
                param: name.to_string(),
                param_type,
                expected: "an array",
            }),
            (ParamValue::Array(_), false) => Err(DerivationError::ShapeMismatch {
                param: name.to_string(),
                param_type,
                expected: "a scalar",
            }),
            (ParamValue::ConditionRef(target), _) => Err(DerivationError::UnresolvedReference {
                param: name.to_string(),
                target: target.clone(),
            }),
        }
    }

    /// The single head word of a static value
    fn static_word(&self) -> Option<[u8; WORD]> {
        match self {
            Self::Bytes32(b) => Some(b.0),
            Self::Address(a) => Some(address_word(a)),
            Self::Uint256(u) => Some(uint_word(u)),
            _ => None,
        }
    }

    /// `length ‖ elements` of a dynamic value
    fn tail(&self) -> Vec<u8> {
        let words: Vec<[u8; WORD]> = match self {
            Self::Bytes32Array(items) => items.iter().map(|b| b.0).collect(),
            Self::AddressArray(items) => items.iter().map(address_word).collect(),
            Self::Uint256Array(items) => items.iter().map(uint_word).collect(),
            _ => Vec::new(),
        };
        let mut out = Vec::with_capacity(WORD * (words.len() + 1));
        out.extend_from_slice(&uint_word(&U256::from(words.len() as u64)));
        for word in words {
            out.extend_from_slice(&word);
        }
        out
    }
}

/// Tuple-encode values in order
pub fn encode(values: &[AbiValue]) -> Vec<u8> {
    let head_len = WORD * values.len();
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();
    for value in values {
        match value.static_word() {
            Some(word) => head.extend_from_slice(&word),
            None => {
                let offset = U256::from((head_len + tail.len()) as u64);
                head.extend_from_slice(&uint_word(&offset));
                tail.extend_from_slice(&value.tail());
            }
        }
    }
    head.extend_from_slice(&tail);
    head
}

/// Address left-padded to one word
pub fn address_word(address: &Address) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - Address::LEN..].copy_from_slice(address.as_bytes());
    word
}

/// Big-endian uint256 word
pub fn uint_word(value: &U256) -> [u8; WORD] {
    value.to_be_bytes::<WORD>()
}

/// Comma-separated list, optionally wrapped in brackets
fn parse_list<T>(text: &str, parse: impl Fn(&str) -> Result<T, TypesError>) -> Result<Vec<T>, TypesError> {
    let inner = text.trim().trim_start_matches('[').trim_end_matches(']').trim();
    if inner.is_empty() {
        return Ok(Vec::new());
    }
    inner
        .split(',')
        .map(|item| parse(item.trim().trim_matches('"')))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word_hex(n: u64) -> String {
        hex::encode(uint_word(&U256::from(n)))
    }

    #[test]
    fn test_static_tuple_is_word_concatenation() {
        let id = Bytes32::new([0xab; 32]);
        let addr = Address::new([0x11; 20]);
        let encoded = encode(&[
            AbiValue::Bytes32(id),
            AbiValue::Address(addr),
            AbiValue::Uint256(U256::from(10u64)),
        ]);
        assert_eq!(encoded.len(), 3 * WORD);
        assert_eq!(&encoded[..32], &[0xab; 32]);
        assert_eq!(&encoded[32..44], &[0u8; 12]);
        assert_eq!(&encoded[44..64], &[0x11; 20]);
        assert_eq!(hex::encode(&encoded[64..]), word_hex(10));
    }

    #[test]
    fn test_dynamic_arrays_use_offsets() {
        let encoded = encode(&[
            AbiValue::Uint256Array(vec![U256::from(7u64), U256::from(3u64)]),
            AbiValue::Bytes32(Bytes32::new([1; 32])),
            AbiValue::AddressArray(vec![Address::new([2; 20])]),
        ]);
        let words: Vec<String> = encoded.chunks(WORD).map(hex::encode).collect();
        assert_eq!(words.len(), 3 + 3 + 2);
        // head: offset(0x60), bytes32, offset(0x60 + 3 words)
        assert_eq!(words[0], word_hex(0x60));
        assert_eq!(words[1], "01".repeat(32));
        assert_eq!(words[2], word_hex(0xc0));
        // first tail: len 2, 7, 3
        assert_eq!(words[3], word_hex(2));
        assert_eq!(words[4], word_hex(7));
        assert_eq!(words[5], word_hex(3));
        // second tail: len 1, padded address
        assert_eq!(words[6], word_hex(1));
        assert_eq!(words[7], format!("{}{}", "00".repeat(12), "02".repeat(20)));
    }

    #[test]
    fn test_empty_array_encodes_length_only() {
        let encoded = encode(&[AbiValue::AddressArray(Vec::new())]);
        assert_eq!(encoded.len(), 2 * WORD);
        assert_eq!(hex::encode(&encoded[..32]), word_hex(0x20));
        assert_eq!(hex::encode(&encoded[32..]), word_hex(0));
    }

    #[test]
    fn test_from_param_rejects_bad_values() {
        let short = ParamValue::Scalar("0x1234".to_string());
        let err = AbiValue::from_param("_did", ParamType::Bytes32, &short).unwrap_err();
        assert!(matches!(err, DerivationError::InvalidValue { .. }));

        let not_hex = ParamValue::Scalar(format!("0x{}", "zz".repeat(20)));
        assert!(AbiValue::from_param("_to", ParamType::Address, &not_hex).is_err());

        let not_number = ParamValue::Array(vec!["ten".to_string()]);
        assert!(AbiValue::from_param("_amounts", ParamType::Uint256Array, &not_number).is_err());

        let scalar_for_array = ParamValue::Scalar("1".to_string());
        let err = AbiValue::from_param("_amounts", ParamType::Uint256Array, &scalar_for_array).unwrap_err();
        assert!(matches!(err, DerivationError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_parse_scalar_accepts_bracketed_list() {
        let value = AbiValue::parse_scalar(ParamType::Uint256Array, "[\"1\", \"2\"]").unwrap();
        assert_eq!(value, AbiValue::Uint256Array(vec![U256::from(1u64), U256::from(2u64)]));
    }
}
