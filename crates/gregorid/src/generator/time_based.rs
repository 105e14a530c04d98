//! The Gregorian time-based generators (versions 1 and 6).

use std::sync::OnceLock;

use super::{BlockingGuidGenerator, GuidGenerator};
use crate::error::Result;
use crate::node::{NodeId, NodeIdProvider};
use crate::random;
use crate::state::GeneratorState;
use crate::time::{GuidClock, TimestampSource};
use crate::uuid::{Uuid, Version};

enum NodeSupply {
    Shared(&'static NodeIdProvider),
    Owned(NodeIdProvider),
}

impl NodeSupply {
    fn provider(&self) -> &NodeIdProvider {
        match self {
            Self::Shared(provider) => provider,
            Self::Owned(provider) => provider,
        }
    }
}

enum StateHandle {
    Shared(&'static GeneratorState),
    Owned(GeneratorState),
}

impl StateHandle {
    fn state(&self) -> &GeneratorState {
        match self {
            Self::Shared(state) => state,
            Self::Owned(state) => state,
        }
    }
}

/// A generator embedding the Gregorian 100 ns timestamp, a clock sequence and
/// a node identifier.
///
/// Version 1 lays the timestamp out least-significant field first; version 6
/// reorders it most-significant first so the textual form sorts by time. The
/// version 2 DCE Security generator reuses this machinery through
/// [`DceSecurityGuidGenerator`](super::DceSecurityGuidGenerator).
pub struct TimeBasedGuidGenerator {
    version: Version,
    clock: &'static GuidClock,
    node: NodeSupply,
    state: StateHandle,
    /// Version 6 default mode: overwrite the clock sequence and node with
    /// fresh random bytes per identifier, keeping only the timestamp stable.
    randomize_tail: bool,
}

/// The shared version 1 generator over the physical node identity.
pub fn time_based() -> &'static TimeBasedGuidGenerator {
    static INSTANCE: OnceLock<TimeBasedGuidGenerator> = OnceLock::new();
    INSTANCE.get_or_init(TimeBasedGuidGenerator::version1)
}

/// The shared version 6 generator; its timestamp is stateful while the rest
/// of each identifier is randomized.
pub fn time_based_reordered() -> &'static TimeBasedGuidGenerator {
    static INSTANCE: OnceLock<TimeBasedGuidGenerator> = OnceLock::new();
    INSTANCE.get_or_init(TimeBasedGuidGenerator::version6)
}

/// The shared version 6 generator over the physical node identity.
pub fn time_based_reordered_physical() -> &'static TimeBasedGuidGenerator {
    static INSTANCE: OnceLock<TimeBasedGuidGenerator> = OnceLock::new();
    INSTANCE.get_or_init(TimeBasedGuidGenerator::version6_physical)
}

/// The shared version 6 generator over the persisted random node identity.
pub fn time_based_reordered_non_volatile() -> &'static TimeBasedGuidGenerator {
    static INSTANCE: OnceLock<TimeBasedGuidGenerator> = OnceLock::new();
    INSTANCE.get_or_init(TimeBasedGuidGenerator::version6_non_volatile)
}

impl TimeBasedGuidGenerator {
    /// The version 1 configuration: physical node identity, shared
    /// physical-class state.
    pub fn version1() -> Self {
        Self {
            version: Version::TimeBased,
            clock: GuidClock::shared(),
            node: NodeSupply::Shared(NodeIdProvider::physical()),
            state: StateHandle::Shared(GeneratorState::shared_physical()),
            randomize_tail: false,
        }
    }

    /// A version 1 generator with its own volatile random node identity and
    /// instance-local state; safe to pool.
    pub fn version1_with_random_node() -> Self {
        Self {
            version: Version::TimeBased,
            clock: GuidClock::shared(),
            node: NodeSupply::Owned(NodeIdProvider::volatile_random()),
            state: StateHandle::Owned(GeneratorState::volatile_instance()),
            randomize_tail: false,
        }
    }

    pub(crate) fn version2() -> Self {
        Self {
            version: Version::DceSecurity,
            ..Self::version1()
        }
    }

    #[cfg(test)]
    pub(crate) fn version2_with_random_node() -> Self {
        Self {
            version: Version::DceSecurity,
            ..Self::version1_with_random_node()
        }
    }

    #[cfg(test)]
    pub(crate) fn state_snapshot_for_test(&self) -> crate::state::StateSnapshot {
        self.state.state().snapshot()
    }

    /// The version 6 default: stateful timestamp, randomized tail.
    pub fn version6() -> Self {
        Self {
            version: Version::TimeBasedReordered,
            clock: GuidClock::shared(),
            node: NodeSupply::Owned(NodeIdProvider::volatile_random()),
            state: StateHandle::Owned(GeneratorState::volatile_instance()),
            randomize_tail: true,
        }
    }

    /// A version 6 generator carrying the physical node identity.
    pub fn version6_physical() -> Self {
        Self {
            version: Version::TimeBasedReordered,
            clock: GuidClock::shared(),
            node: NodeSupply::Shared(NodeIdProvider::physical()),
            state: StateHandle::Shared(GeneratorState::shared_physical()),
            randomize_tail: false,
        }
    }

    /// A version 6 generator carrying the persisted random node identity.
    pub fn version6_non_volatile() -> Self {
        Self {
            version: Version::TimeBasedReordered,
            clock: GuidClock::shared(),
            node: NodeSupply::Shared(NodeIdProvider::non_volatile_random()),
            state: StateHandle::Shared(GeneratorState::shared_random()),
            randomize_tail: false,
        }
    }

    fn build(&self, timestamp: i64, node: NodeId, clock_sequence: u16) -> Uuid {
        let guid = self.fill_timestamp(timestamp);
        let guid = if self.randomize_tail {
            let tail = random::next_bytes_16();
            let mut random_node = [0u8; 6];
            random_node.copy_from_slice(&tail[10..16]);
            random_node[0] |= 0x01;
            guid.with_clock_seq_hi_and_reserved(tail[8])
                .with_clock_seq_low(tail[9])
                .with_node_id(random_node)
        } else {
            guid.with_clock_sequence(clock_sequence & 0x3fff)
                .with_node_id(node)
        };
        guid.with_version(self.version).with_variant_rfc4122()
    }

    fn fill_timestamp(&self, timestamp: i64) -> Uuid {
        match self.version {
            Version::TimeBasedReordered => Uuid::NIL
                .with_time_low((timestamp >> 28) as u32)
                .with_time_mid((timestamp >> 12) as u16)
                .with_time_hi_and_version((timestamp & 0x0fff) as u16),
            _ => Uuid::NIL
                .with_time_low(timestamp as u32)
                .with_time_mid((timestamp >> 32) as u16)
                .with_time_hi_and_version((timestamp >> 48) as u16),
        }
    }
}

impl GuidGenerator for TimeBasedGuidGenerator {
    fn version(&self) -> Version {
        self.version
    }

    fn new_guid(&self) -> Result<Uuid> {
        let node = self.node.provider().node_id()?;
        let timestamp = self.clock.current_timestamp();
        let clock_sequence = self.state.state().refresh(timestamp, Some(node));
        Ok(self.build(timestamp, node, clock_sequence))
    }
}

impl BlockingGuidGenerator for TimeBasedGuidGenerator {
    fn try_new_guid(&self) -> Option<Uuid> {
        let node = self.node.provider().node_id().ok()?;
        let timestamp = self.clock.current_timestamp();
        let clock_sequence = self.state.state().try_refresh(timestamp, Some(node))?;
        Some(self.build(timestamp, node, clock_sequence))
    }
}
