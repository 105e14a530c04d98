//! Version-specific GUID generators and the shared per-version registry.

mod dce;
mod empty;
mod name_based;
mod pool;
mod randomized;
mod time_based;
mod unix_time;


pub use dce::*;
pub use empty::*;
pub use name_based::*;
pub use pool::*;
pub use randomized::*;
pub use time_based::*;
pub use unix_time::*;

use crate::error::{Error, Result};
use crate::uuid::{DceDomain, Uuid, Variant, Version};

/// The generation contract consumed by CLI, service and native-export
/// collaborators.
///
/// The name and DCE overloads reject by default; only the generators whose
/// version supports the input accept it. No overload ever returns a partial
/// or garbage identifier: a contract violation fails before any state is
/// touched.
pub trait GuidGenerator: Send + Sync {
    /// The version of the generated identifiers.
    fn version(&self) -> Version;

    /// The variant of the generated identifiers.
    fn variant(&self) -> Variant {
        Variant::Rfc4122
    }

    /// Generates an identifier.
    fn new_guid(&self) -> Result<Uuid>;

    /// Generates an identifier from a namespace id and a name.
    fn new_guid_for_name(&self, namespace: &Uuid, name: &[u8]) -> Result<Uuid> {
        let _ = (namespace, name);
        Err(Error::NameNotSupported(self.version()))
    }

    /// Generates a DCE Security identifier for a domain and local id.
    fn new_guid_dce(&self, domain: DceDomain, local_id: Option<u32>) -> Result<Uuid> {
        let _ = (domain, local_id);
        Err(Error::DceNotSupported(self.version()))
    }
}

/// A stateful generator whose critical section can be probed without
/// blocking; the generator pool balances load across instances of these.
pub trait BlockingGuidGenerator: GuidGenerator {
    /// Attempts to generate without waiting on the instance's state lock;
    /// `None` means another thread currently holds it.
    fn try_new_guid(&self) -> Option<Uuid>;
}

/// Returns the shared generator for a version.
///
/// Every supported version has exactly one shared instance, created on first
/// use from its explicit registry.
pub fn of_version(version: Version) -> &'static dyn GuidGenerator {
    match version {
        Version::Empty => empty(),
        Version::TimeBased => time_based(),
        Version::DceSecurity => dce_security(),
        Version::NameBasedMd5 => name_based_md5(),
        Version::Randomized => randomized(),
        Version::NameBasedSha1 => name_based_sha1(),
        Version::TimeBasedReordered => time_based_reordered(),
        Version::UnixTimeBased => unix_time_based(),
    }
}

/// Returns the shared generator for a raw version selector, rejecting
/// selectors that name no supported version.
pub fn of_version_number(version: u8) -> Result<&'static dyn GuidGenerator> {
    Ok(of_version(Version::try_from(version)?))
}
