use thiserror::Error;

use crate::uuid::{DceDomain, Version};

/// Crate-level result alias.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All caller-visible errors produced by the generation engine.
///
/// Storage faults never appear here: they are reported through the storage
/// error hook (see [`crate::set_storage_error_hook`]) so that a broken state
/// file can never prevent identifier generation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The numeric version selector does not name a supported GUID version.
    #[error("unsupported GUID version selector: {0}")]
    UnsupportedVersion(u8),

    /// A name input was supplied to a generator that is not name-based.
    #[error("version {0} generators do not accept a namespace and name")]
    NameNotSupported(Version),

    /// A DCE Security domain was supplied to a generator that is not
    /// version 2.
    #[error("version {0} generators do not accept a DCE Security domain")]
    DceNotSupported(Version),

    /// The DCE Security `Org` domain requires an explicit local id; `Person`
    /// and `Group` require one on platforms without an OS local id source.
    #[error("DCE Security domain {0} requires an explicit local id")]
    MissingLocalId(DceDomain),

    /// No OS source exists for the requested identity on this platform.
    ///
    /// This is fatal and non-retryable; it is reported at the point of first
    /// use.
    #[error("the current platform does not support {0}")]
    UnsupportedPlatform(&'static str),

    /// The node identifier source `None` was asked for a node id.
    #[error("node identifier source `None` cannot supply a node id")]
    NodeIdUnavailable,

    /// The generator pool has been disposed and can no longer produce ids.
    #[error("the GUID generator pool has been disposed")]
    PoolDisposed,
}
