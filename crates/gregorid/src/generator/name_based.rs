//! The name-based generators (versions 3 and 5).

use std::sync::OnceLock;

use md5::Md5;
use md5::digest::{Digest, FixedOutputReset};
use sha1::Sha1;

use super::GuidGenerator;
use crate::bounded::BoundedPool;
use crate::error::Result;
use crate::uuid::{Uuid, Version};

/// A deterministic generator hashing `namespace ++ name`.
///
/// The namespace contributes its big-endian wire bytes; the first 16 bytes of
/// the digest become the identifier with the version nibble and variant bits
/// overwritten. Hasher instances are pooled up to twice the available
/// parallelism purely to amortize allocation; a reused hasher is always reset
/// by the finalizing step, so pooling is unobservable in the output.
pub struct NameBasedGuidGenerator<D> {
    version: Version,
    hashers: BoundedPool<D>,
}

/// The version 3 (MD5) generator type.
pub type Md5GuidGenerator = NameBasedGuidGenerator<Md5>;

/// The version 5 (SHA-1) generator type.
pub type Sha1GuidGenerator = NameBasedGuidGenerator<Sha1>;

/// The shared version 3 generator.
pub fn name_based_md5() -> &'static Md5GuidGenerator {
    static INSTANCE: OnceLock<Md5GuidGenerator> = OnceLock::new();
    INSTANCE.get_or_init(|| NameBasedGuidGenerator::new(Version::NameBasedMd5))
}

/// The shared version 5 generator.
pub fn name_based_sha1() -> &'static Sha1GuidGenerator {
    static INSTANCE: OnceLock<Sha1GuidGenerator> = OnceLock::new();
    INSTANCE.get_or_init(|| NameBasedGuidGenerator::new(Version::NameBasedSha1))
}

impl<D: Digest + FixedOutputReset + Send> NameBasedGuidGenerator<D> {
    fn new(version: Version) -> Self {
        let parallelism = std::thread::available_parallelism().map_or(1, usize::from);
        Self {
            version,
            hashers: BoundedPool::with_capacity(Some(parallelism * 2)),
        }
    }

    fn hash_to_guid(&self, namespace: &Uuid, name: &[u8]) -> Uuid {
        let mut hasher = self.hashers.try_take().unwrap_or_else(D::new);
        Digest::update(&mut hasher, namespace.as_bytes());
        Digest::update(&mut hasher, name);
        let hash = Digest::finalize_reset(&mut hasher);
        let _ = self.hashers.try_put(hasher);

        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hash[..16]);
        Uuid::from_wire_bytes(bytes)
            .with_version(self.version)
            .with_variant_rfc4122()
    }
}

impl<D: Digest + FixedOutputReset + Send + Sync> GuidGenerator for NameBasedGuidGenerator<D> {
    fn version(&self) -> Version {
        self.version
    }

    fn new_guid(&self) -> Result<Uuid> {
        Ok(self.hash_to_guid(&Uuid::NIL, &[]))
    }

    fn new_guid_for_name(&self, namespace: &Uuid, name: &[u8]) -> Result<Uuid> {
        Ok(self.hash_to_guid(namespace, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uuid::{NAMESPACE_DNS, NAMESPACE_OID, NAMESPACE_URL, Variant};

    #[test]
    fn md5_url_namespace_vector() {
        let guid = name_based_md5()
            .new_guid_for_name(&NAMESPACE_URL, b"https://example.com/")
            .expect("name-based generation is infallible");
        assert_eq!(guid.to_string(), "b9dcdff8-af4a-365d-8043-0f8361942709");
    }

    #[test]
    fn sha1_url_namespace_vector() {
        let guid = name_based_sha1()
            .new_guid_for_name(&NAMESPACE_URL, b"https://example.com/")
            .expect("name-based generation is infallible");
        assert_eq!(guid.to_string(), "dd2c1780-811a-5296-81c5-178a0ef488bc");
    }

    #[test]
    fn dns_namespace_vectors() {
        let md5 = name_based_md5()
            .new_guid_for_name(&NAMESPACE_DNS, b"www.python.org")
            .expect("infallible");
        assert_eq!(md5.to_string(), "7ffc9d67-9009-37fc-827f-5d088dabcca2");

        let sha1 = name_based_sha1()
            .new_guid_for_name(&NAMESPACE_DNS, b"www.python.org")
            .expect("infallible");
        assert_eq!(sha1.to_string(), "64f1a3e2-189b-589b-9199-5a1d58ac7837");
    }

    #[test]
    fn empty_inputs_hash_the_nil_namespace() {
        let md5 = name_based_md5().new_guid().expect("infallible");
        assert_eq!(md5.to_string(), "4ae71336-e44b-39bf-b9d2-752e234818a5");
        let sha1 = name_based_sha1().new_guid().expect("infallible");
        assert_eq!(sha1.to_string(), "e129f27c-5103-5c5c-844b-cdf0a15e160d");
    }

    #[test]
    fn output_is_deterministic_and_input_sensitive() {
        let generator = name_based_sha1();
        let base = generator
            .new_guid_for_name(&NAMESPACE_URL, b"https://example.com/")
            .expect("infallible");
        for _ in 0..100 {
            let again = generator
                .new_guid_for_name(&NAMESPACE_URL, b"https://example.com/")
                .expect("infallible");
            assert_eq!(again, base);
        }
        assert_ne!(
            generator
                .new_guid_for_name(&NAMESPACE_URL, b"https://example.com")
                .expect("infallible"),
            base,
            "dropping one byte of the name must change the output"
        );
        assert_ne!(
            generator
                .new_guid_for_name(&NAMESPACE_DNS, b"https://example.com/")
                .expect("infallible"),
            base,
            "changing one namespace byte must change the output"
        );
    }

    #[test]
    fn version_and_variant_are_injected_over_the_hash() {
        for name in [&b"a"[..], b"b", b"abc", b""] {
            let md5 = name_based_md5()
                .new_guid_for_name(&NAMESPACE_OID, name)
                .expect("infallible");
            assert_eq!(md5.version_number(), 3);
            assert_eq!(md5.variant(), Variant::Rfc4122);
            let sha1 = name_based_sha1()
                .new_guid_for_name(&NAMESPACE_OID, name)
                .expect("infallible");
            assert_eq!(sha1.version_number(), 5);
            assert_eq!(sha1.variant(), Variant::Rfc4122);
        }
    }

    #[test]
    fn pooled_hashers_stay_unobservable_under_concurrency() {
        let generator = name_based_md5();
        let expected = generator
            .new_guid_for_name(&NAMESPACE_URL, b"https://example.com/")
            .expect("infallible");
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..500 {
                        let guid = generator
                            .new_guid_for_name(&NAMESPACE_URL, b"https://example.com/")
                            .expect("infallible");
                        assert_eq!(guid, expected);
                    }
                });
            }
        });
    }
}
