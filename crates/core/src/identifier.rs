//! 22-character base-58 identifiers.
//!
//! Every document, claim, and search state is tagged with one. The string
//! form is the base-58 encoding of 16 random bytes, left-padded with `1`
//! (the base-58 zero digit) to exactly 22 characters, so identifiers sort
//! and compare as plain strings.

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::IdentifierError;

/// Base-58 alphabet (Bitcoin variant): no `0`, `O`, `I`, or `l`.
const ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Identifier length in characters. 58^22 > 2^128, so any 16-byte value fits.
pub const IDENTIFIER_LENGTH: usize = 22;

/// UUIDv5 namespace for well-known identifiers derived from mnemonics.
/// Fixed so that every deployment derives the same core property ids.
const MNEMONIC_NAMESPACE: Uuid = Uuid::from_u128(0x59c8_c8a3_9d56_4a24_8e2f_23d0_72b5_13cfu128);

/// An opaque 22-character identifier. Equality, ordering, and hashing are
/// those of the underlying string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identifier(String);

impl Identifier {
    /// A freshly-random identifier (UUIDv4 under the hood).
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self::from_uuid(Uuid::new_v4())
    }

    /// Base-58 encode the 16 UUID bytes, left-padded to 22 characters.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Identifier(base58(uuid.as_bytes()))
    }

    /// The well-known identifier for a core property mnemonic (`TYPE`,
    /// `PROPERTY`, `NAME`, ...). Deterministic via UUIDv5.
    pub fn core_property(mnemonic: &str) -> Self {
        Self::from_uuid(Uuid::new_v5(&MNEMONIC_NAMESPACE, mnemonic.as_bytes()))
    }

    /// Whether `s` is a well-formed identifier: exactly 22 characters, all
    /// from the base-58 alphabet.
    pub fn valid(s: &str) -> bool {
        s.len() == IDENTIFIER_LENGTH && s.bytes().all(|b| ALPHABET.contains(&b))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Convert 16 big-endian bytes to base-58 by repeated long division.
fn base58(bytes: &[u8; 16]) -> String {
    let mut out = Vec::with_capacity(IDENTIFIER_LENGTH);
    let mut input: Vec<u8> = bytes.iter().copied().skip_while(|&b| b == 0).collect();
    while !input.is_empty() {
        let mut remainder: u32 = 0;
        let mut next = Vec::with_capacity(input.len());
        for &b in &input {
            let acc = remainder * 256 + u32::from(b);
            let quotient = acc / 58;
            remainder = acc % 58;
            if !next.is_empty() || quotient != 0 {
                next.push(quotient as u8);
            }
        }
        out.push(ALPHABET[remainder as usize]);
        input = next;
    }
    while out.len() < IDENTIFIER_LENGTH {
        out.push(b'1');
    }
    out.reverse();
    String::from_utf8(out).expect("base-58 output is ASCII")
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if Identifier::valid(s) {
            Ok(Identifier(s.to_string()))
        } else {
            Err(IdentifierError(s.to_string()))
        }
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_identifiers_are_valid_and_distinct() {
        let a = Identifier::new();
        let b = Identifier::new();
        assert!(Identifier::valid(a.as_str()));
        assert!(Identifier::valid(b.as_str()));
        assert_ne!(a, b);
    }

    #[test]
    fn length_is_always_22() {
        for _ in 0..100 {
            assert_eq!(Identifier::new().as_str().len(), IDENTIFIER_LENGTH);
        }
    }

    #[test]
    fn zero_uuid_pads_to_all_ones() {
        let id = Identifier::from_uuid(Uuid::nil());
        assert_eq!(id.as_str(), "1111111111111111111111");
        assert!(Identifier::valid(id.as_str()));
    }

    #[test]
    fn max_uuid_still_fits_22_characters() {
        let id = Identifier::from_uuid(Uuid::from_u128(u128::MAX));
        assert_eq!(id.as_str().len(), IDENTIFIER_LENGTH);
    }

    #[test]
    fn core_properties_are_deterministic() {
        assert_eq!(Identifier::core_property("TYPE"), Identifier::core_property("TYPE"));
        assert_ne!(Identifier::core_property("TYPE"), Identifier::core_property("PROPERTY"));
    }

    #[test]
    fn validation_rejects_bad_input() {
        assert!(!Identifier::valid(""));
        assert!(!Identifier::valid("too-short"));
        assert!(!Identifier::valid("0000000000000000000000")); // '0' not in alphabet
        assert!(!Identifier::valid("IIIIIIIIIIIIIIIIIIIIII")); // 'I' not in alphabet
        assert!(!Identifier::valid("111111111111111111111")); // 21 chars
        assert!(!Identifier::valid("11111111111111111111111")); // 23 chars
        assert!(Identifier::valid("CAfaGKVcf5m1fVfJfB4fhg"));
    }

    #[test]
    fn string_round_trip() {
        let id = Identifier::new();
        let parsed: Identifier = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not an identifier".parse::<Identifier>().is_err());
    }

    #[test]
    fn serde_round_trip() {
        let id = Identifier::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let back: Identifier = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
        assert!(serde_json::from_str::<Identifier>("\"nope\"").is_err());
    }
}
