//! The Unix Epoch time-based generator (version 7).

use std::sync::OnceLock;

use super::{GuidGenerator, randomized};
use crate::counter::ClockResetCounter;
use crate::error::Result;
use crate::time::{GREGORIAN_UNIX_OFFSET_TICKS, GuidClock, TICKS_PER_MILLISECOND, TimestampSource};
use crate::uuid::{Uuid, Version};

/// A generator embedding the millisecond Unix timestamp, a 12-bit
/// sub-millisecond fraction and a monotonic sub-tick sequence; the remaining
/// 48 bits are random.
///
/// The default configuration orders identifiers per generating thread; the
/// monotonic configuration routes every thread through the globally-shared
/// counter, totally ordering identifiers across the process at the cost of
/// contention on one atomic word.
pub struct UnixTimeGuidGenerator {
    clock: &'static GuidClock,
    counter: &'static ClockResetCounter,
}

/// The shared version 7 generator with per-thread ordering.
pub fn unix_time_based() -> &'static UnixTimeGuidGenerator {
    static INSTANCE: OnceLock<UnixTimeGuidGenerator> = OnceLock::new();
    INSTANCE.get_or_init(|| UnixTimeGuidGenerator {
        clock: GuidClock::shared(),
        counter: ClockResetCounter::thread_local(),
    })
}

/// The shared version 7 generator with process-wide strict ordering.
pub fn unix_time_based_monotonic() -> &'static UnixTimeGuidGenerator {
    static INSTANCE: OnceLock<UnixTimeGuidGenerator> = OnceLock::new();
    INSTANCE.get_or_init(|| UnixTimeGuidGenerator {
        clock: GuidClock::shared(),
        counter: ClockResetCounter::global(),
    })
}

/// The visible time prefix of a version 7 value: the 48-bit millisecond count
/// and the 12-bit sub-millisecond fraction. The sub-tick counter is keyed on
/// this quantum so that equal prefixes always carry strictly ordered
/// sequences.
fn time_prefix(timestamp: i64) -> (i64, u16) {
    let unix_ticks = timestamp - GREGORIAN_UNIX_OFFSET_TICKS;
    let unix_ms = unix_ticks / TICKS_PER_MILLISECOND;
    let sub_ms_ticks = unix_ticks % TICKS_PER_MILLISECOND;
    let fraction = ((sub_ms_ticks << 12) / TICKS_PER_MILLISECOND) as u16;
    (unix_ms, fraction)
}

impl GuidGenerator for UnixTimeGuidGenerator {
    fn version(&self) -> Version {
        Version::UnixTimeBased
    }

    fn new_guid(&self) -> Result<Uuid> {
        loop {
            let seed = randomized::random_guid();
            let timestamp = self.clock.current_timestamp();
            let (unix_ms, fraction) = time_prefix(timestamp);
            let prefix_quantum = (unix_ms << 12) | fraction as i64;
            if let Some(sequence) = self.counter.try_sequence(&seed, prefix_quantum) {
                return Ok(assemble(seed, unix_ms, fraction, sequence));
            }
            // Exhausted or transiently rewound; take a fresh timestamp.
            core::hint::spin_loop();
        }
    }
}

fn assemble(seed: Uuid, unix_ms: i64, fraction: u16, sequence: u16) -> Uuid {
    seed.with_time_low((unix_ms >> 16) as u32)
        .with_time_mid(unix_ms as u16)
        .with_time_hi_and_version(fraction)
        .with_clock_sequence(sequence)
        .with_version(Version::UnixTimeBased)
        .with_variant_rfc4122()
}
