//! The randomized generator (version 4).

use std::sync::OnceLock;

use super::GuidGenerator;
use crate::error::Result;
use crate::random;
use crate::uuid::{Uuid, Version};

/// A generator whose every bit outside the version nibble and variant bits
/// comes from the buffered process-wide CSPRNG supply.
pub struct RandomizedGuidGenerator;

/// The shared version 4 generator.
pub fn randomized() -> &'static RandomizedGuidGenerator {
    static INSTANCE: OnceLock<RandomizedGuidGenerator> = OnceLock::new();
    INSTANCE.get_or_init(|| RandomizedGuidGenerator)
}

/// A fresh fully-randomized RFC 4122 identifier.
///
/// Also feeds the reseed material for the sub-tick counters and the random
/// tails of the version 6 and 7 generators.
pub(crate) fn random_guid() -> Uuid {
    Uuid::from_wire_bytes(random::next_bytes_16())
        .with_version(Version::Randomized)
        .with_variant_rfc4122()
}

impl GuidGenerator for RandomizedGuidGenerator {
    fn version(&self) -> Version {
        Version::Randomized
    }

    fn new_guid(&self) -> Result<Uuid> {
        Ok(random_guid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uuid::Variant;
    use std::collections::HashSet;

    #[test]
    fn version_and_variant_are_fixed() {
        for _ in 0..1_000 {
            let guid = randomized().new_guid().expect("v4 is infallible");
            assert_eq!(guid.version_number(), 4);
            assert_eq!(guid.variant(), Variant::Rfc4122);
        }
    }

    #[test]
    fn draws_are_unique_across_threads() {
        let mut seen = HashSet::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                std::thread::spawn(|| {
                    (0..2_000)
                        .map(|_| randomized().new_guid().expect("v4 is infallible"))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        for handle in handles {
            for guid in handle.join().expect("thread completes") {
                assert!(seen.insert(guid), "duplicate random identifier: {guid}");
            }
        }
    }
}
