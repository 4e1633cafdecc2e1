//! Identity types for Agora
//!
//! Ledger identifiers are fixed-width byte strings. Each width gets its own
//! strongly typed wrapper so that a 20-byte address can never be passed where
//! a 32-byte condition or agreement identifier is expected.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::TypesError;

/// Macro to generate fixed-width byte types with common implementations
macro_rules! define_fixed_bytes {
    ($name:ident, $len:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// Width in bytes
            pub const LEN: usize = $len;

            /// The all-zero value
            pub const ZERO: Self = Self([0u8; $len]);

            /// Wrap raw bytes
            pub const fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Parse a hex string, with or without `0x` prefix.
            ///
            /// The string must contain exactly twice `LEN` hex digits; nothing
            /// is padded or truncated.
            pub fn parse(s: &str) -> Result<Self, TypesError> {
                let digits = strip_hex_prefix(s);
                if digits.len() != $len * 2 {
                    return Err(TypesError::InvalidWidth {
                        kind: stringify!($name),
                        expected: $len,
                        value: s.to_string(),
                    });
                }
                let mut out = [0u8; $len];
                hex::decode_to_slice(digits, &mut out).map_err(|_| TypesError::InvalidHex {
                    kind: stringify!($name),
                    value: s.to_string(),
                })?;
                Ok(Self(out))
            }

            /// Borrow the raw bytes
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Lowercase hex without the `0x` prefix
            pub fn to_plain_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(0x{})", stringify!($name), hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = TypesError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

define_fixed_bytes!(Address, 20, "A 20-byte ledger account or contract address");
define_fixed_bytes!(Bytes32, 32, "A 32-byte ledger word (agreement, condition and hash identifiers)");

/// Strip an optional `0x`/`0X` prefix
pub fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}
