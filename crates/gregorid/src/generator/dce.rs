//! The DCE Security generator (version 2).

use std::sync::OnceLock;
#[cfg(unix)]
use std::time::Duration;

use super::{GuidGenerator, TimeBasedGuidGenerator};
use crate::error::{Error, Result};
use crate::uuid::{DceDomain, Uuid, Version};

/// A version 1 generator whose `time_low` field carries a numeric local id
/// and whose `clock_seq_low` byte carries the id's domain.
///
/// `Person` and `Group` resolve the local id from the operating system when
/// none is supplied; `Org` has no OS counterpart and always requires an
/// explicit id. The local id is resolved before the time fields are built, so
/// a rejected call leaves the generator state untouched.
pub struct DceSecurityGuidGenerator {
    time_based: TimeBasedGuidGenerator,
    local_ids: LocalIdProvider,
}

/// The shared version 2 generator.
pub fn dce_security() -> &'static DceSecurityGuidGenerator {
    static INSTANCE: OnceLock<DceSecurityGuidGenerator> = OnceLock::new();
    INSTANCE.get_or_init(|| DceSecurityGuidGenerator {
        time_based: TimeBasedGuidGenerator::version2(),
        local_ids: LocalIdProvider::new(),
    })
}

impl DceSecurityGuidGenerator {
    fn resolve_local_id(&self, domain: DceDomain, local_id: Option<u32>) -> Result<u32> {
        match (domain, local_id) {
            (_, Some(id)) => Ok(id),
            (DceDomain::Person, None) => self.local_ids.user_id(),
            (DceDomain::Group, None) => self.local_ids.group_id(),
            (DceDomain::Org, None) => Err(Error::MissingLocalId(DceDomain::Org)),
        }
    }
}

impl GuidGenerator for DceSecurityGuidGenerator {
    fn version(&self) -> Version {
        Version::DceSecurity
    }

    fn new_guid(&self) -> Result<Uuid> {
        self.new_guid_dce(DceDomain::Person, None)
    }

    fn new_guid_dce(&self, domain: DceDomain, local_id: Option<u32>) -> Result<Uuid> {
        let local_id = self.resolve_local_id(domain, local_id)?;
        let guid = self.time_based.new_guid()?;
        Ok(guid
            .with_time_low(local_id)
            .with_clock_seq_low(domain as u8))
    }
}

/// Resolves the OS-defined local user and group ids, cached with the same
/// refresh-with-idle-sleep policy as node identifiers.
struct LocalIdProvider {
    #[cfg(unix)]
    user: crate::cache::AutoRefreshCache<u32>,
    #[cfg(unix)]
    group: crate::cache::AutoRefreshCache<u32>,
}

#[cfg(unix)]
impl LocalIdProvider {
    fn new() -> Self {
        const REFRESH_PERIOD: Duration = Duration::from_secs(1);
        const SLEEP_AFTER: u32 = 10;
        Self {
            user: crate::cache::AutoRefreshCache::new(
                || unsafe { libc::getuid() as u32 },
                Some(REFRESH_PERIOD),
                SLEEP_AFTER,
            ),
            group: crate::cache::AutoRefreshCache::new(
                || unsafe { libc::getgid() as u32 },
                Some(REFRESH_PERIOD),
                SLEEP_AFTER,
            ),
        }
    }

    fn user_id(&self) -> Result<u32> {
        Ok(self.user.value())
    }

    fn group_id(&self) -> Result<u32> {
        Ok(self.group.value())
    }
}

#[cfg(not(unix))]
impl LocalIdProvider {
    fn new() -> Self {
        Self {}
    }

    fn user_id(&self) -> Result<u32> {
        Err(Error::UnsupportedPlatform("resolving the local user id"))
    }

    fn group_id(&self) -> Result<u32> {
        Err(Error::UnsupportedPlatform("resolving the local group id"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uuid::Variant;

    #[test]
    fn org_without_a_local_id_is_rejected() {
        let generator = dce_security();
        assert!(matches!(
            generator.new_guid_dce(DceDomain::Org, None),
            Err(Error::MissingLocalId(DceDomain::Org))
        ));
    }

    #[test]
    fn explicit_local_ids_are_embedded_verbatim() {
        let _shared = crate::state::SHARED_STATE_TEST_LOCK.lock();
        let generator = dce_security();
        let guid = generator
            .new_guid_dce(DceDomain::Org, Some(0x1234_5678))
            .expect("explicit id satisfies the Org domain");
        assert_eq!(guid.version_number(), 2);
        assert_eq!(guid.variant(), Variant::Rfc4122);
        assert_eq!(guid.time_low(), 0x1234_5678);
        assert_eq!(guid.clock_seq_low(), DceDomain::Org as u8);
    }

    #[cfg(unix)]
    #[test]
    fn person_and_group_default_to_the_os_ids() {
        let _shared = crate::state::SHARED_STATE_TEST_LOCK.lock();
        let generator = dce_security();
        let person = generator
            .new_guid_dce(DceDomain::Person, None)
            .expect("unix resolves the user id");
        assert_eq!(person.time_low(), unsafe { libc::getuid() as u32 });
        assert_eq!(person.clock_seq_low(), DceDomain::Person as u8);

        let group = generator
            .new_guid_dce(DceDomain::Group, None)
            .expect("unix resolves the group id");
        assert_eq!(group.time_low(), unsafe { libc::getgid() as u32 });
        assert_eq!(group.clock_seq_low(), DceDomain::Group as u8);
    }

    #[test]
    fn org_rejection_precedes_any_state_mutation() {
        let generator = DceSecurityGuidGenerator {
            time_based: TimeBasedGuidGenerator::version2_with_random_node(),
            local_ids: LocalIdProvider::new(),
        };
        let _ = generator
            .new_guid_dce(DceDomain::Org, Some(7))
            .expect("warm up the instance state");
        let before = generator.time_based.state_snapshot_for_test();
        assert!(generator.new_guid_dce(DceDomain::Org, None).is_err());
        let after = generator.time_based.state_snapshot_for_test();
        assert_eq!(before.last_timestamp, after.last_timestamp);
        assert_eq!(before.clock_sequence, after.clock_sequence);
        assert_eq!(before.last_node_id, after.last_node_id);
    }

    #[test]
    fn plain_new_guid_uses_the_person_domain() {
        let _shared = crate::state::SHARED_STATE_TEST_LOCK.lock();
        let generator = dce_security();
        match generator.new_guid() {
            Ok(guid) => assert_eq!(guid.clock_seq_low(), DceDomain::Person as u8),
            Err(Error::UnsupportedPlatform(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
}
