use core::fmt;

use crate::error::Error;

/// The version of a [`Uuid`](super::Uuid), stored in the high nibble of
/// byte 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Version {
    /// The nil UUID.
    Empty = 0,
    /// RFC 4122 version 1, the Gregorian time-based version.
    TimeBased = 1,
    /// RFC 4122 version 2, DCE Security with an embedded local id.
    DceSecurity = 2,
    /// RFC 4122 version 3, name-based using MD5 hashing.
    NameBasedMd5 = 3,
    /// RFC 4122 version 4, randomly generated.
    Randomized = 4,
    /// RFC 4122 version 5, name-based using SHA-1 hashing.
    NameBasedSha1 = 5,
    /// RFC 9562 version 6, the reordered Gregorian time-based version.
    TimeBasedReordered = 6,
    /// RFC 9562 version 7, the Unix Epoch time-based version.
    UnixTimeBased = 7,
}

impl Version {
    /// Whether identifiers of this version embed the current time.
    pub const fn is_time_based(self) -> bool {
        matches!(
            self,
            Self::TimeBased | Self::DceSecurity | Self::TimeBasedReordered | Self::UnixTimeBased
        )
    }

    /// Whether identifiers of this version derive from a namespace and name.
    pub const fn is_name_based(self) -> bool {
        matches!(self, Self::NameBasedMd5 | Self::NameBasedSha1)
    }

    /// Whether identifiers of this version carry random data.
    pub const fn is_randomized(self) -> bool {
        matches!(self, Self::Randomized | Self::UnixTimeBased)
    }

    /// Whether identifiers of this version carry a clock sequence.
    pub const fn contains_clock_sequence(self) -> bool {
        matches!(
            self,
            Self::TimeBased | Self::DceSecurity | Self::TimeBasedReordered
        )
    }

    /// Whether identifiers of this version carry a node id.
    pub const fn contains_node_id(self) -> bool {
        matches!(
            self,
            Self::TimeBased | Self::DceSecurity | Self::TimeBasedReordered
        )
    }

    /// Whether identifiers of this version carry a DCE Security local id.
    pub const fn contains_local_id(self) -> bool {
        matches!(self, Self::DceSecurity)
    }
}

impl TryFrom<u8> for Version {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Empty),
            1 => Ok(Self::TimeBased),
            2 => Ok(Self::DceSecurity),
            3 => Ok(Self::NameBasedMd5),
            4 => Ok(Self::Randomized),
            5 => Ok(Self::NameBasedSha1),
            6 => Ok(Self::TimeBasedReordered),
            7 => Ok(Self::UnixTimeBased),
            other => Err(Error::UnsupportedVersion(other)),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

/// The variant of a [`Uuid`](super::Uuid), stored in the reserved high bits
/// of byte 8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Variant {
    /// Reserved for NCS backward compatibility.
    Ncs = 0,
    /// The variant specified by RFC 4122.
    Rfc4122 = 1,
    /// Reserved for Microsoft legacy GUIDs.
    Microsoft = 2,
    /// Reserved for future definition.
    Reserved = 3,
}

/// A DCE Security (version 2) identifier domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DceDomain {
    /// The Person domain; defaults to the local user id.
    Person = 0,
    /// The Group domain; defaults to the local group id.
    Group = 1,
    /// The Org domain; always requires an explicit local id.
    Org = 2,
}

impl fmt::Display for DceDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Person => "Person",
            Self::Group => "Group",
            Self::Org => "Org",
        };
        f.write_str(name)
    }
}
