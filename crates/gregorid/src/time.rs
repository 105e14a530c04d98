//! The monotonic 100 ns timestamp source behind the time-based versions.

use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use portable_atomic::{AtomicI64, Ordering};

/// 100 ns ticks between the Gregorian reform epoch (1582-10-15) and the Unix
/// epoch (1970-01-01).
pub const GREGORIAN_UNIX_OFFSET_TICKS: i64 = 122_192_928_000_000_000;

/// 100 ns ticks per second.
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// 100 ns ticks per millisecond.
pub const TICKS_PER_MILLISECOND: i64 = 10_000;

/// How often the anchored strategy re-checks the system clock.
const RESYNC_PERIOD: Duration = Duration::from_secs(1);

/// Anchor drift beyond which the anchored strategy re-synchronizes.
const RESYNC_DRIFT_TICKS: i64 = 100 * TICKS_PER_MILLISECOND;

/// A source of 100 ns ticks since 1582-10-15 00:00:00 UTC.
///
/// Implementations are expected to be monotonic non-decreasing as observed by
/// a single caller under normal operation. Tests substitute fixed or stepped
/// sources through this trait.
pub trait TimestampSource {
    /// Returns the current timestamp in 100 ns ticks since the Gregorian
    /// reform epoch.
    fn current_timestamp(&self) -> i64;
}

/// The process-wide adaptive timestamp source.
///
/// On first use the system clock is probed with a few spin-separated samples;
/// if it reports nonzero sub-10 ms deltas consistently it is read directly.
/// Otherwise a monotonic [`Instant`] is anchored to the system time and a
/// background task re-anchors it whenever the two drift more than 100 ms
/// apart, tolerating external clock adjustments. The last-resort strategy
/// (for hosts with no usable monotonic counter) serializes callers and bumps
/// the returned value by one tick whenever two consecutive reads would
/// otherwise collide, trading wall-clock accuracy for strict monotonicity.
pub struct GuidClock {
    strategy: Strategy,
}

enum Strategy {
    Direct,
    Anchored(Arc<AnchoredClock>),
    Incrementing(Mutex<IncrementingState>),
}

struct AnchoredClock {
    /// The instant the anchor ticks were captured at; never restarted.
    started: Instant,
    /// Gregorian ticks corresponding to `started`.
    anchor_ticks: AtomicI64,
}

impl AnchoredClock {
    fn now(&self) -> i64 {
        self.anchor_ticks.load(Ordering::Acquire) + elapsed_ticks(self.started)
    }
}

#[derive(Default)]
struct IncrementingState {
    last_returned: i64,
}

impl GuidClock {
    /// Returns the shared process-wide clock, probing the backing strategy on
    /// first use.
    pub fn shared() -> &'static GuidClock {
        static SHARED: OnceLock<GuidClock> = OnceLock::new();
        SHARED.get_or_init(GuidClock::probe)
    }

    /// Probes the system clock and picks the cheapest adequate strategy.
    pub fn probe() -> Self {
        if system_clock_is_hi_res() {
            Self {
                strategy: Strategy::Direct,
            }
        } else {
            Self::anchored()
        }
    }

    /// A clock anchored to the system time through a monotonic counter.
    pub fn anchored() -> Self {
        let anchored = Arc::new(AnchoredClock {
            started: Instant::now(),
            anchor_ticks: AtomicI64::new(system_ticks_now()),
        });
        spawn_resync_task(Arc::downgrade(&anchored));
        Self {
            strategy: Strategy::Anchored(anchored),
        }
    }

    /// The serialized increment-on-collision fallback strategy.
    pub fn incrementing() -> Self {
        Self {
            strategy: Strategy::Incrementing(Mutex::new(IncrementingState::default())),
        }
    }
}

impl TimestampSource for GuidClock {
    fn current_timestamp(&self) -> i64 {
        match &self.strategy {
            Strategy::Direct => system_ticks_now(),
            Strategy::Anchored(inner) => inner.now(),
            Strategy::Incrementing(state) => {
                let mut state = state.lock();
                let now = system_ticks_now().max(state.last_returned + 1);
                state.last_returned = now;
                now
            }
        }
    }
}

/// Re-anchors the monotonic counter to the system clock once per second while
/// the owning clock is alive.
fn spawn_resync_task(anchored: std::sync::Weak<AnchoredClock>) {
    thread::Builder::new()
        .name("gregorid-clock-resync".into())
        .spawn(move || {
            loop {
                thread::sleep(RESYNC_PERIOD);
                let Some(clock) = anchored.upgrade() else {
                    break;
                };
                let system = system_ticks_now();
                if (clock.now() - system).abs() >= RESYNC_DRIFT_TICKS {
                    let fresh = system_ticks_now() - elapsed_ticks(clock.started);
                    clock.anchor_ticks.store(fresh, Ordering::Release);
                }
            }
        })
        .ok();
}

/// Gregorian ticks from the system wall clock.
fn system_ticks_now() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => GREGORIAN_UNIX_OFFSET_TICKS + duration_to_ticks(elapsed),
        Err(before_epoch) => {
            GREGORIAN_UNIX_OFFSET_TICKS - duration_to_ticks(before_epoch.duration())
        }
    }
}

fn duration_to_ticks(duration: Duration) -> i64 {
    (duration.as_secs() as i64) * TICKS_PER_SECOND + (duration.subsec_nanos() / 100) as i64
}

fn elapsed_ticks(since: Instant) -> i64 {
    duration_to_ticks(since.elapsed())
}

/// Checks whether consecutive system clock reads move by nonzero sub-10 ms
/// amounts, which makes the wall clock directly usable at tick granularity.
fn system_clock_is_hi_res() -> bool {
    const SUB_10_MS: i64 = 10 * TICKS_PER_MILLISECOND;

    let mut samples = [0i64; 4];
    let _ = SystemTime::now();
    for sample in samples.iter_mut() {
        for _ in 0..64 {
            core::hint::spin_loop();
        }
        *sample = system_ticks_now();
    }
    let matches = samples
        .windows(2)
        .filter(|pair| {
            let delta = pair[1] - pair[0];
            delta > 0 && delta < SUB_10_MS
        })
        .count();
    matches >= 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_ticks_are_past_the_known_minimum() {
        // 2020-01-01 in Gregorian ticks; any sane host clock is later.
        const Y2020: i64 = GREGORIAN_UNIX_OFFSET_TICKS + 1_577_836_800 * TICKS_PER_SECOND;
        assert!(system_ticks_now() > Y2020);
    }

    #[test]
    fn shared_clock_is_monotonic_non_decreasing() {
        let clock = GuidClock::shared();
        let mut last = clock.current_timestamp();
        for _ in 0..10_000 {
            let now = clock.current_timestamp();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn anchored_clock_tracks_wall_time() {
        let clock = GuidClock::anchored();
        let delta = match &clock.strategy {
            Strategy::Anchored(inner) => (inner.now() - system_ticks_now()).abs(),
            _ => unreachable!("anchored() builds the anchored strategy"),
        };
        assert!(delta < TICKS_PER_SECOND, "anchored clock off by {delta}");
    }

    #[test]
    fn incrementing_clock_never_repeats() {
        let clock = GuidClock::incrementing();
        let mut last = clock.current_timestamp();
        for _ in 0..10_000 {
            let now = clock.current_timestamp();
            assert!(now > last);
            last = now;
        }
    }
}
