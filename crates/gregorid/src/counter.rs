//! Sub-tick sequence counters for the strictly-ordered time-based versions.
//!
//! When several identifiers land on the same timestamp tick, these counters
//! hand out strictly increasing sequence values to keep the generated ids
//! totally ordered. The thread-confined strategy orders ids per thread with
//! zero contention; the globally-shared strategy runs a lock-free
//! compare-and-swap loop over one packed word and orders ids across every
//! thread in the process.
//!
//! On a tick change the sequence is reseeded from the clock-sequence bits of
//! a caller-supplied freshly-randomized id rather than reset to zero, so
//! bursts do not start from a predictable value.

use std::cell::Cell;
use std::sync::OnceLock;

use crossbeam_utils::CachePadded;
use portable_atomic::{AtomicU64, Ordering};

use crate::uuid::Uuid;

/// Counter values at or above this limit exhaust the tick.
///
/// The limit bit is also held out of reseed bases (the guard region), so a
/// full run of the counter can never carry into the bit above the 14-bit
/// sequence space.
pub(crate) const COUNTER_LIMIT: u16 = 1 << 12;

/// The 14-bit sequence space.
const SEQUENCE_MASK: u16 = (1 << 14) - 1;

/// Derives a reseed base from the clock-sequence bits of a fresh random id.
fn reseed_base(seed: &Uuid) -> u16 {
    seed.clock_sequence() & SEQUENCE_MASK & !COUNTER_LIMIT
}

/// A monotonic sub-tick sequence counter.
///
/// `try_sequence` returns `None` when the caller should obtain a fresh
/// timestamp and retry: either the sequence space for the tick is exhausted,
/// or the tick transiently regressed by one unit.
pub(crate) enum ClockResetCounter {
    ThreadLocal,
    Global(GlobalCounter),
}

impl ClockResetCounter {
    /// The shared thread-confined counter; sequences are ordered per thread.
    pub(crate) fn thread_local() -> &'static Self {
        static LOCAL: ClockResetCounter = ClockResetCounter::ThreadLocal;
        &LOCAL
    }

    /// The shared global counter; sequences are totally ordered across all
    /// threads for a given tick.
    pub(crate) fn global() -> &'static Self {
        static GLOBAL: OnceLock<ClockResetCounter> = OnceLock::new();
        GLOBAL.get_or_init(|| ClockResetCounter::Global(GlobalCounter::new()))
    }

    pub(crate) fn try_sequence(&self, seed: &Uuid, timestamp: i64) -> Option<u16> {
        match self {
            Self::ThreadLocal => thread_local_sequence(seed, timestamp),
            Self::Global(counter) => counter.try_sequence(seed, timestamp),
        }
    }
}

thread_local! {
    static LAST_TIMESTAMP: Cell<i64> = const { Cell::new(i64::MIN) };
    static BASE_SEQUENCE: Cell<u16> = const { Cell::new(0) };
    static COUNTER: Cell<u16> = const { Cell::new(0) };
}

fn thread_local_sequence(seed: &Uuid, timestamp: i64) -> Option<u16> {
    let last = LAST_TIMESTAMP.get();
    let sequence = if timestamp == last {
        let counter = COUNTER.get() + 1;
        if counter >= COUNTER_LIMIT {
            return None;
        }
        COUNTER.set(counter);
        BASE_SEQUENCE.get() + counter
    } else if timestamp == last.wrapping_sub(1) {
        // A one-tick transient rewind; make the caller re-read the clock.
        return None;
    } else {
        let base = reseed_base(seed);
        BASE_SEQUENCE.set(base);
        COUNTER.set(0);
        base
    };
    LAST_TIMESTAMP.set(timestamp);
    Some(sequence)
}

/// The packed-word CAS state machine.
///
/// Word layout: bits 63..32 hold the low 31 bits of the last-seen tick (all
/// ones until first use), bits 29..16 the reseed base, bits 13..0 the
/// counter. Incrementing the whole word bumps only the counter lane because
/// the counter is rejected before it can reach the lane boundary.
pub(crate) struct GlobalCounter {
    state: CachePadded<AtomicU64>,
}

impl GlobalCounter {
    const fn new() -> Self {
        Self {
            state: CachePadded::new(AtomicU64::new(u64::MAX)),
        }
    }

    fn try_sequence(&self, seed: &Uuid, timestamp: i64) -> Option<u16> {
        let tick_low31 = (timestamp & 0x7fff_ffff) as u32;
        let mut initial_tick = None;
        loop {
            let state = self.state.load(Ordering::Relaxed);
            let last_tick = (state >> 32) as u32;
            let initial = *initial_tick.get_or_insert(last_tick);
            if last_tick != initial {
                // Another thread rolled the tick mid-loop; the caller must
                // re-read the clock before retrying.
                return None;
            }
            if last_tick != u32::MAX && last_tick.wrapping_sub(tick_low31) == 1 {
                return None;
            }

            if tick_low31 == last_tick {
                let next = state + 1;
                let counter = next as u16;
                if counter >= COUNTER_LIMIT {
                    return None;
                }
                if self
                    .state
                    .compare_exchange_weak(state, next, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
                {
                    let base = (next >> 16) as u16 & SEQUENCE_MASK;
                    return Some(base + counter);
                }
            } else {
                let base = reseed_base(seed);
                let next = ((tick_low31 as u64) << 32) | ((base as u64) << 16);
                if self
                    .state
                    .compare_exchange_weak(state, next, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
                {
                    return Some(base);
                }
            }

            core::hint::spin_loop();
        }
    }
}
