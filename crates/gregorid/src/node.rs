//! Node-identifier resolution.
//!
//! A node id is the 6-byte field distinguishing the generating host. It can
//! come from a physical network interface, from per-provider volatile random
//! bytes, or from random bytes persisted with the generator state so they
//! survive restarts. Physical addresses can change while the process runs
//! (interfaces come and go), so lookups go through the refresh-with-idle-sleep
//! cache rather than hitting the OS on every call.

use std::sync::OnceLock;
use std::time::Duration;

use crate::cache::AutoRefreshCache;
use crate::error::{Error, Result};
use crate::random;
use crate::state::GeneratorState;

/// A 6-byte node identifier.
pub type NodeId = [u8; 6];

/// How often an active physical-address cache re-queries the interfaces.
const REFRESH_PERIOD: Duration = Duration::from_secs(1);

/// Idle refresh cycles before a cache goes dormant.
const SLEEP_AFTER: u32 = 10;

/// The strategy a generator uses to obtain its node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeIdSource {
    /// No node identity; querying a provider of this source is an error.
    None,
    /// The physical address of a network interface.
    PhysicalAddress,
    /// Fresh random bytes per provider instance, lost on drop.
    VolatileRandom,
    /// Random bytes persisted with the generator state across restarts.
    NonVolatileRandom,
}

impl NodeIdSource {
    /// Whether ids from this source carry the non-physical marker bit.
    pub const fn is_random(self) -> bool {
        matches!(self, Self::VolatileRandom | Self::NonVolatileRandom)
    }
}

/// Resolves and caches one node identifier.
pub struct NodeIdProvider {
    source: NodeIdSource,
    cache: Option<AutoRefreshCache<NodeId>>,
}

impl NodeIdProvider {
    /// A provider that refuses to supply a node id.
    pub fn none() -> Self {
        Self {
            source: NodeIdSource::None,
            cache: None,
        }
    }

    /// The shared physical-address provider, backed by the platform
    /// interface scan and falling back to the shared volatile-random id when
    /// no usable interface exists.
    pub fn physical() -> &'static NodeIdProvider {
        static PHYSICAL: OnceLock<NodeIdProvider> = OnceLock::new();
        PHYSICAL.get_or_init(|| Self::physical_with_source(scan_physical_address))
    }

    /// A physical-address provider over a supplied interface source.
    ///
    /// The engine treats address discovery as an input; hosts with exotic
    /// interface enumeration plug their own lookup in here.
    pub fn physical_with_source(
        fetch: impl Fn() -> Option<NodeId> + Send + Sync + 'static,
    ) -> Self {
        Self {
            source: NodeIdSource::PhysicalAddress,
            cache: Some(AutoRefreshCache::new(
                move || fetch().unwrap_or_else(|| Self::shared_volatile_random().cached_node_id()),
                Some(REFRESH_PERIOD),
                SLEEP_AFTER,
            )),
        }
    }

    /// A fresh volatile-random provider; the id is stable for the lifetime of
    /// the instance.
    pub fn volatile_random() -> Self {
        Self {
            source: NodeIdSource::VolatileRandom,
            cache: Some(AutoRefreshCache::new(random::next_node_id, None, 0)),
        }
    }

    /// The shared volatile-random provider: one random identity per process.
    pub fn shared_volatile_random() -> &'static NodeIdProvider {
        static SHARED_RANDOM: OnceLock<NodeIdProvider> = OnceLock::new();
        SHARED_RANDOM.get_or_init(Self::volatile_random)
    }

    /// The shared non-volatile random provider: the identity is planted in
    /// the random-class generator state and persisted with it, so it is
    /// stable across restarts until [`crate::state::reset_state`].
    pub fn non_volatile_random() -> &'static NodeIdProvider {
        non_volatile_random_instance()
    }

    /// The source this provider resolves.
    pub fn source(&self) -> NodeIdSource {
        self.source
    }

    /// Resolves the node id, erring only for the `None` source.
    pub fn node_id(&self) -> Result<NodeId> {
        match &self.cache {
            Some(cache) => Ok(cache.value()),
            None => Err(Error::NodeIdUnavailable),
        }
    }

    fn cached_node_id(&self) -> NodeId {
        match &self.cache {
            Some(cache) => cache.value(),
            None => random::next_node_id(),
        }
    }
}

fn non_volatile_random_instance() -> &'static NodeIdProvider {
    static NON_VOLATILE: OnceLock<NodeIdProvider> = OnceLock::new();
    NON_VOLATILE.get_or_init(|| NodeIdProvider {
        source: NodeIdSource::NonVolatileRandom,
        cache: Some(AutoRefreshCache::new(
            || GeneratorState::shared_random().node_id_or_seed_with(random::next_node_id),
            None,
            0,
        )),
    })
}

/// Forgets the cached non-volatile identity so the next query re-derives it
/// from the (freshly reset) generator state.
pub(crate) fn reset_non_volatile_random() {
    if let Some(cache) = &non_volatile_random_instance().cache {
        cache.invalidate();
    }
}

/// Picks the physical address of the first up, non-loopback, non-tunnel
/// interface carrying a nonzero 6-byte address; an interface that is valid
/// but down is the fallback.
#[cfg(target_os = "linux")]
fn scan_physical_address() -> Option<NodeId> {
    use std::fs;

    let mut down_candidate = None;
    for entry in fs::read_dir("/sys/class/net").ok()?.flatten() {
        let iface = entry.path();
        // ARPHRD_ETHER is 1; loopback and tunnel types read differently.
        let is_ethernet = fs::read_to_string(iface.join("type"))
            .map(|kind| kind.trim() == "1")
            .unwrap_or(false);
        if !is_ethernet {
            continue;
        }
        let Some(address) = fs::read_to_string(iface.join("address"))
            .ok()
            .and_then(|text| parse_mac(text.trim()))
        else {
            continue;
        };
        if address == [0u8; 6] {
            continue;
        }
        let is_up = fs::read_to_string(iface.join("operstate"))
            .map(|state| state.trim() == "up")
            .unwrap_or(false);
        if is_up {
            return Some(address);
        }
        down_candidate.get_or_insert(address);
    }
    down_candidate
}

#[cfg(not(target_os = "linux"))]
fn scan_physical_address() -> Option<NodeId> {
    None
}

#[cfg(target_os = "linux")]
fn parse_mac(text: &str) -> Option<NodeId> {
    let mut bytes = [0u8; 6];
    let mut parts = text.split(':');
    for byte in bytes.iter_mut() {
        *byte = u8::from_str_radix(parts.next()?, 16).ok()?;
    }
    parts.next().is_none().then_some(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_source_is_a_caller_error() {
        let provider = NodeIdProvider::none();
        assert_eq!(provider.source(), NodeIdSource::None);
        assert!(matches!(provider.node_id(), Err(Error::NodeIdUnavailable)));
    }

    #[test]
    fn volatile_random_ids_are_stable_per_instance() {
        let provider = NodeIdProvider::volatile_random();
        let first = provider.node_id().expect("random source always resolves");
        assert_eq!(first[0] & 0x01, 0x01);
        assert_eq!(provider.node_id().expect("still resolves"), first);

        let other = NodeIdProvider::volatile_random();
        assert_ne!(
            other.node_id().expect("random source always resolves"),
            first,
            "distinct providers should have distinct identities"
        );
    }

    #[test]
    fn physical_provider_falls_back_to_the_shared_random_id() {
        let provider = NodeIdProvider::physical_with_source(|| None);
        let node = provider.node_id().expect("fallback always resolves");
        assert_eq!(node[0] & 0x01, 0x01, "fallback id must be marked random");
        assert_eq!(
            node,
            NodeIdProvider::shared_volatile_random()
                .node_id()
                .expect("shared random id resolves")
        );
    }

    #[test]
    fn supplied_sources_win_over_the_fallback() {
        let mac = [0x00, 0x1b, 0x44, 0x11, 0x3a, 0xb7];
        let provider = NodeIdProvider::physical_with_source(move || Some(mac));
        assert_eq!(provider.node_id().expect("supplied source resolves"), mac);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn mac_text_parses_exactly_six_octets() {
        assert_eq!(
            parse_mac("00:1b:44:11:3a:b7"),
            Some([0x00, 0x1b, 0x44, 0x11, 0x3a, 0xb7])
        );
        assert_eq!(parse_mac("00:1b:44:11:3a"), None);
        assert_eq!(parse_mac("00:1b:44:11:3a:b7:ff"), None);
        assert_eq!(parse_mac("not-a-mac"), None);
    }
}
