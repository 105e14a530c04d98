//! Well-known namespace ids specified in RFC 4122 Appendix C.

use super::Uuid;

/// The namespace id for a fully-qualified domain name.
// 6ba7b810-9dad-11d1-80b4-00c04fd430c8
pub const NAMESPACE_DNS: Uuid = Uuid::from_wire_bytes([
    0x6b, 0xa7, 0xb8, 0x10, 0x9d, 0xad, 0x11, 0xd1, 0x80, 0xb4, 0x00, 0xc0, 0x4f, 0xd4, 0x30,
    0xc8,
]);

/// The namespace id for a URL.
// 6ba7b811-9dad-11d1-80b4-00c04fd430c8
pub const NAMESPACE_URL: Uuid = Uuid::from_wire_bytes([
    0x6b, 0xa7, 0xb8, 0x11, 0x9d, 0xad, 0x11, 0xd1, 0x80, 0xb4, 0x00, 0xc0, 0x4f, 0xd4, 0x30,
    0xc8,
]);

/// The namespace id for an ISO OID.
// 6ba7b812-9dad-11d1-80b4-00c04fd430c8
pub const NAMESPACE_OID: Uuid = Uuid::from_wire_bytes([
    0x6b, 0xa7, 0xb8, 0x12, 0x9d, 0xad, 0x11, 0xd1, 0x80, 0xb4, 0x00, 0xc0, 0x4f, 0xd4, 0x30,
    0xc8,
]);

/// The namespace id for an X.500 DN.
// 6ba7b814-9dad-11d1-80b4-00c04fd430c8
pub const NAMESPACE_X500: Uuid = Uuid::from_wire_bytes([
    0x6b, 0xa7, 0xb8, 0x14, 0x9d, 0xad, 0x11, 0xd1, 0x80, 0xb4, 0x00, 0xc0, 0x4f, 0xd4, 0x30,
    0xc8,
]);
