//! The process-wide buffered random-byte supply.
//!
//! Every randomized field in the engine draws from here. Each thread owns a
//! 4096-byte buffer refilled from the operating system CSPRNG in one call,
//! amortizing the syscall cost across hundreds of identifiers; exhausted
//! threads refill in place, and a thread returns its buffer to a shared spare
//! pool on exit so short-lived threads do not discard unused entropy.

use std::cell::RefCell;
use std::sync::OnceLock;

use rand::TryRngCore;
use rand::rngs::OsRng;

use crate::bounded::BoundedPool;

const BUFFER_SIZE: usize = 4096;

struct RandomBuffer {
    bytes: Box<[u8; BUFFER_SIZE]>,
    position: usize,
}

impl RandomBuffer {
    fn new() -> Self {
        Self {
            bytes: Box::new([0u8; BUFFER_SIZE]),
            // Starting exhausted defers the first refill to first use.
            position: BUFFER_SIZE,
        }
    }

    fn fill(&mut self, dest: &mut [u8]) {
        debug_assert!(dest.len() <= BUFFER_SIZE);
        if self.position + dest.len() > BUFFER_SIZE {
            OsRng
                .try_fill_bytes(&mut self.bytes[..])
                .expect("operating system entropy source failed");
            self.position = 0;
        }
        let taken = &mut self.bytes[self.position..self.position + dest.len()];
        dest.copy_from_slice(taken);
        // Wipe handed-out bytes so a pooled buffer cannot replay them.
        taken.fill(0);
        self.position += dest.len();
    }
}

/// Holds the thread's buffer and donates it back to the spare pool on thread
/// exit.
struct ThreadSlot {
    buffer: Option<RandomBuffer>,
}

impl Drop for ThreadSlot {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            let _ = spare_buffers().try_put(buffer);
        }
    }
}

thread_local! {
    static LOCAL_BUFFER: RefCell<ThreadSlot> = RefCell::new(ThreadSlot { buffer: None });
}

fn spare_buffers() -> &'static BoundedPool<RandomBuffer> {
    static SPARES: OnceLock<BoundedPool<RandomBuffer>> = OnceLock::new();
    SPARES.get_or_init(|| {
        let parallelism = std::thread::available_parallelism().map_or(1, usize::from);
        BoundedPool::with_capacity(Some(parallelism * 2))
    })
}

/// Fills `dest` with fresh, never-reused random bytes.
pub(crate) fn fill(dest: &mut [u8]) {
    debug_assert!(dest.len() <= BUFFER_SIZE);
    LOCAL_BUFFER.with(|slot| {
        let mut slot = slot.borrow_mut();
        let buffer = slot
            .buffer
            .get_or_insert_with(|| spare_buffers().try_take().unwrap_or_else(RandomBuffer::new));
        buffer.fill(dest);
    });
}

/// A fresh random `u32`.
pub(crate) fn next_u32() -> u32 {
    let mut bytes = [0u8; 4];
    fill(&mut bytes);
    u32::from_le_bytes(bytes)
}

/// A fresh random `[u8; 16]`.
pub(crate) fn next_bytes_16() -> [u8; 16] {
    let mut bytes = [0u8; 16];
    fill(&mut bytes);
    bytes
}

/// A fresh random 6-byte node id with the multicast bit forced on, marking it
/// as non-physical per RFC 4122 §4.1.6.
pub(crate) fn next_node_id() -> [u8; 6] {
    let mut node = [0u8; 6];
    fill(&mut node);
    node[0] |= 0x01;
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn consecutive_draws_differ() {
        let mut seen = HashSet::new();
        for _ in 0..1024 {
            assert!(seen.insert(next_bytes_16()));
        }
    }

    #[test]
    fn refill_boundary_is_seamless() {
        // An odd request size walks every alignment of the buffer boundary.
        let mut dest = [0u8; 33];
        for _ in 0..(BUFFER_SIZE / dest.len()) * 3 {
            fill(&mut dest);
        }
    }

    #[test]
    fn random_node_ids_are_flagged_non_physical() {
        for _ in 0..256 {
            assert_eq!(next_node_id()[0] & 0x01, 0x01);
        }
    }

    #[test]
    fn threads_draw_independent_bytes() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| (0..64).map(|_| next_bytes_16()).collect::<Vec<_>>()))
            .collect();
        let mut seen = HashSet::new();
        for handle in handles {
            for bytes in handle.join().expect("thread completes") {
                assert!(seen.insert(bytes));
            }
        }
    }
}
