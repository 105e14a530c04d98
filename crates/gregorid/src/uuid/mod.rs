//! The 128-bit GUID value type and its RFC 4122 field codec.

mod fields;
mod namespaces;
mod version;

pub use namespaces::*;
pub use version::*;

use core::fmt;
use core::str::{self, FromStr};

/// A 128-bit universally unique identifier.
///
/// The value is stored as its canonical RFC 4122 wire bytes: each of the
/// `time_low`, `time_mid` and `time_hi_and_version` fields is big-endian, and
/// bytes 8..16 hold `clock_seq_hi_and_reserved`, `clock_seq_low` and the
/// 6-byte node field in order. All field accessors and mutators operate on
/// this fixed byte array by index and mask; a `Uuid` is immutable once built
/// and every mutator consumes `self` and returns a new value.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct Uuid([u8; 16]);

impl Uuid {
    /// The nil UUID, `00000000-0000-0000-0000-000000000000`.
    pub const NIL: Self = Self([0x00; 16]);

    /// The max UUID, `ffffffff-ffff-ffff-ffff-ffffffffffff`.
    pub const MAX: Self = Self([0xff; 16]);

    /// Returns a reference to the canonical wire bytes.
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for Uuid {
    /// Formats the value in the canonical 8-4-4-4-12 hexadecimal form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const DIGITS: &[u8; 16] = b"0123456789abcdef";
        let mut buffer = [0u8; 36];
        let mut pos = 0;
        for (i, byte) in self.0.iter().enumerate() {
            buffer[pos] = DIGITS[(byte >> 4) as usize];
            buffer[pos + 1] = DIGITS[(byte & 0x0f) as usize];
            pos += 2;
            if i == 3 || i == 5 || i == 7 || i == 9 {
                buffer[pos] = b'-';
                pos += 1;
            }
        }
        f.write_str(str::from_utf8(&buffer).map_err(|_| fmt::Error)?)
    }
}

impl fmt::Debug for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// The error returned when parsing an invalid UUID text form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseUuidError;

impl fmt::Display for ParseUuidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid UUID string representation")
    }
}

impl core::error::Error for ParseUuidError {}

impl FromStr for Uuid {
    type Err = ParseUuidError;

    /// Parses the canonical hyphenated form, case-insensitively, with an
    /// optional `urn:uuid:` prefix or surrounding braces.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("urn:uuid:").unwrap_or(s);
        let s = match (s.strip_prefix('{'), s.len()) {
            (Some(inner), 38) => inner.strip_suffix('}').ok_or(ParseUuidError)?,
            (Some(_), _) => return Err(ParseUuidError),
            (None, _) => s,
        };
        let text = s.as_bytes();
        if text.len() != 36 {
            return Err(ParseUuidError);
        }

        let mut bytes = [0u8; 16];
        let mut cursor = 0usize;
        for (i, byte) in bytes.iter_mut().enumerate() {
            if i == 4 || i == 6 || i == 8 || i == 10 {
                if text[cursor] != b'-' {
                    return Err(ParseUuidError);
                }
                cursor += 1;
            }
            let hi = hex_value(text[cursor]).ok_or(ParseUuidError)?;
            let lo = hex_value(text[cursor + 1]).ok_or(ParseUuidError)?;
            *byte = (hi << 4) | lo;
            cursor += 2;
        }
        Ok(Self(bytes))
    }
}

fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

impl From<Uuid> for [u8; 16] {
    fn from(src: Uuid) -> Self {
        src.0
    }
}

impl AsRef<[u8]> for Uuid {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(feature = "serde")]
mod serde_support {
    use super::Uuid;
    use core::fmt;
    use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

    impl Serialize for Uuid {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.collect_str(self)
        }
    }

    impl<'de> Deserialize<'de> for Uuid {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            struct Visitor;

            impl de::Visitor<'_> for Visitor {
                type Value = Uuid;

                fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                    f.write_str("a canonical UUID string")
                }

                fn visit_str<E: de::Error>(self, value: &str) -> Result<Uuid, E> {
                    value.parse().map_err(de::Error::custom)
                }
            }

            deserializer.deserialize_str(Visitor)
        }
    }
}
