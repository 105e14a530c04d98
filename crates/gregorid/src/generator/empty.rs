use std::sync::OnceLock;

use super::GuidGenerator;
use crate::error::Result;
use crate::uuid::{Uuid, Variant, Version};

/// The stateless generator of the nil UUID.
pub struct EmptyGuidGenerator;

/// The shared nil-UUID generator.
pub fn empty() -> &'static EmptyGuidGenerator {
    static EMPTY: OnceLock<EmptyGuidGenerator> = OnceLock::new();
    EMPTY.get_or_init(|| EmptyGuidGenerator)
}

impl GuidGenerator for EmptyGuidGenerator {
    fn version(&self) -> Version {
        Version::Empty
    }

    fn variant(&self) -> Variant {
        Variant::Ncs
    }

    fn new_guid(&self) -> Result<Uuid> {
        Ok(Uuid::NIL)
    }
}
