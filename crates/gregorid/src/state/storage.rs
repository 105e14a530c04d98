//! Binary persistence for the generator state.
//!
//! The file is 32 bytes, little-endian: an `i32` format number (4122), an
//! `i32` field-presence bitmask, the `i64` last timestamp, an `i32` packing
//! the two per-class 16-bit clock sequences, then the 6-byte physical and
//! random node ids. Saves write a sibling temp file and atomically rename it
//! over the target so a concurrent reader only ever sees a fully valid file.
//!
//! Storage faults never propagate into generation: they are handed to the
//! registered error hook and the engine carries on with in-memory state.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use super::GeneratorState;
use crate::cache::AutoRefreshCache;
use crate::node;

/// The fixed format number leading every state file.
const FORMAT_NUMBER: i32 = 4122;

/// The serialized size of the state record.
const RECORD_SIZE: usize = 32;

/// Window during which repeated state mutations share one outstanding save.
const SAVE_DEBOUNCE: Duration = Duration::from_secs(10);

const FLAG_TIMESTAMP: i32 = 0x01;
const FLAG_COMBINED_SEQUENCE: i32 = 0x02;
const FLAG_PHYSICAL_NODE_ID: i32 = 0x04;
const FLAG_RANDOM_NODE_ID: i32 = 0x08;
const FLAG_PHYSICAL_SEQUENCE: i32 = 0x01 << 16;
const FLAG_RANDOM_SEQUENCE: i32 = 0x02 << 16;

/// Which storage operation an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOp {
    /// Loading the state file.
    Load,
    /// Saving the state file.
    Save,
}

/// The observer signature for storage faults.
///
/// Invoked synchronously on whichever thread hit the failure. A missing file
/// on the first load is expected and never reported.
pub type StorageErrorHook = dyn Fn(&io::Error, &Path, StorageOp) + Send + Sync;

struct StorageControl {
    path: Mutex<Option<PathBuf>>,
    hook: RwLock<Option<Box<StorageErrorHook>>>,
    /// Serializes file I/O against concurrent load/save/reset calls.
    io_lock: Mutex<()>,
}

fn control() -> &'static StorageControl {
    static CONTROL: OnceLock<StorageControl> = OnceLock::new();
    CONTROL.get_or_init(|| StorageControl {
        path: Mutex::new(None),
        hook: RwLock::new(None),
        io_lock: Mutex::new(()),
    })
}

fn debounce() -> &'static AutoRefreshCache<()> {
    static DEBOUNCE: OnceLock<AutoRefreshCache<()>> = OnceLock::new();
    DEBOUNCE.get_or_init(|| AutoRefreshCache::new(save_async, Some(SAVE_DEBOUNCE), 0))
}

/// Sets (or clears) the state storage file path and returns whether the
/// subsequent load succeeded.
pub fn set_state_storage_path(path: Option<impl Into<PathBuf>>) -> bool {
    *control().path.lock() = path.map(Into::into);
    load_from_storage()
}

/// The configured state storage file path, if any.
pub fn state_storage_path() -> Option<PathBuf> {
    control().path.lock().clone()
}

/// Registers the observer for storage faults, replacing any previous one.
pub fn set_storage_error_hook(hook: Option<Box<StorageErrorHook>>) {
    *control().hook.write() = hook;
}

/// Synchronously persists the current state.
///
/// Call this before process exit; skipping it risks losing the most recent
/// clock-sequence advance, which the next start covers by reseeding.
pub fn flush_state() -> bool {
    save_to_storage()
}

/// Flushes the state and parks the background save debouncer.
///
/// The explicit counterpart to a process-exit hook: host applications call
/// this once during their own shutdown sequence.
pub fn shutdown_state() -> bool {
    debounce().dispose();
    wait_for_pending_saves();
    save_to_storage()
}

/// Clears all in-memory and persisted state for both node-identity classes
/// and re-randomizes the non-volatile random node id.
pub fn reset_state() {
    GeneratorState::shared_physical().reset();
    GeneratorState::shared_random().reset();
    node::reset_non_volatile_random();
    save_to_storage();
}

/// In-flight asynchronous saves; lets shutdown and tests wait for
/// quiescence.
static PENDING_SAVES: std::sync::atomic::AtomicU32 = std::sync::atomic::AtomicU32::new(0);

/// Schedules a fire-and-forget save on a background thread.
pub(crate) fn save_async() {
    use std::sync::atomic::Ordering;

    if state_storage_path().is_none() {
        return;
    }
    PENDING_SAVES.fetch_add(1, Ordering::AcqRel);
    let spawned = thread::Builder::new()
        .name("gregorid-state-save".into())
        .spawn(|| {
            save_to_storage();
            PENDING_SAVES.fetch_sub(1, Ordering::AcqRel);
        });
    if spawned.is_err() {
        PENDING_SAVES.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Blocks until no asynchronous save is outstanding.
fn wait_for_pending_saves() {
    use std::sync::atomic::Ordering;

    while PENDING_SAVES.load(Ordering::Acquire) > 0 {
        thread::yield_now();
    }
}

/// Coalesces save requests: at most one asynchronous save is issued per
/// debounce window unless the clock sequence actually changed.
pub(crate) fn debounced_save() {
    debounce().value();
}

fn report(error: &io::Error, path: &Path, op: StorageOp) {
    if let Some(hook) = control().hook.read().as_ref() {
        hook(error, path, op);
    }
}

pub(crate) fn load_from_storage() -> bool {
    let Some(path) = state_storage_path() else {
        return false;
    };
    let _io = control().io_lock.lock();
    match read_record(&path) {
        Ok(record) => {
            apply_record(&record);
            debug!(path = %path.display(), "generator state loaded");
            true
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            // Benign first run; the engine starts from fresh defaults.
            debug!(path = %path.display(), "no generator state file yet");
            false
        }
        Err(error) => {
            warn!(path = %path.display(), %error, "failed to load generator state");
            report(&error, &path, StorageOp::Load);
            false
        }
    }
}

fn save_to_storage() -> bool {
    let Some(path) = state_storage_path() else {
        return false;
    };
    let _io = control().io_lock.lock();
    let record = snapshot_record();
    match write_record_atomically(&path, &record) {
        Ok(()) => {
            debug!(path = %path.display(), "generator state saved");
            true
        }
        Err(error) => {
            warn!(path = %path.display(), %error, "failed to save generator state");
            report(&error, &path, StorageOp::Save);
            false
        }
    }
}

struct StateRecord {
    field_flags: i32,
    last_timestamp: i64,
    packed_sequences: i32,
    physical_node_id: [u8; 6],
    random_node_id: [u8; 6],
}

fn snapshot_record() -> StateRecord {
    let physical = GeneratorState::shared_physical().snapshot();
    let random = GeneratorState::shared_random().snapshot();

    let mut flags = FLAG_TIMESTAMP
        | FLAG_COMBINED_SEQUENCE
        | FLAG_PHYSICAL_SEQUENCE
        | FLAG_RANDOM_SEQUENCE;
    let mut physical_node_id = [0u8; 6];
    if let Some(node) = physical.last_node_id {
        flags |= FLAG_PHYSICAL_NODE_ID;
        physical_node_id = node;
    }
    let mut random_node_id = [0u8; 6];
    if let Some(node) = random.last_node_id {
        flags |= FLAG_RANDOM_NODE_ID;
        random_node_id = node;
    }

    StateRecord {
        field_flags: flags,
        last_timestamp: physical.last_timestamp.max(random.last_timestamp),
        packed_sequences: (physical.clock_sequence as i32)
            | ((random.clock_sequence as i32) << 16),
        physical_node_id,
        random_node_id,
    }
}

fn apply_record(record: &StateRecord) {
    let flags = record.field_flags;
    let independent = (flags >> 16) != 0;
    let classes = [
        (
            GeneratorState::shared_physical(),
            FLAG_PHYSICAL_SEQUENCE,
            record.packed_sequences as u16,
            FLAG_PHYSICAL_NODE_ID,
            record.physical_node_id,
        ),
        (
            GeneratorState::shared_random(),
            FLAG_RANDOM_SEQUENCE,
            (record.packed_sequences >> 16) as u16,
            FLAG_RANDOM_NODE_ID,
            record.random_node_id,
        ),
    ];
    for (state, sequence_flag, sequence, node_flag, node) in classes {
        let timestamp =
            ((flags & FLAG_TIMESTAMP) == FLAG_TIMESTAMP).then_some(record.last_timestamp);
        let clock_sequence = if independent {
            ((flags & sequence_flag) == sequence_flag).then_some(sequence)
        } else {
            ((flags & FLAG_COMBINED_SEQUENCE) == FLAG_COMBINED_SEQUENCE)
                .then_some(record.packed_sequences as u16)
        };
        let node_id = ((flags & node_flag) == node_flag).then_some(node);
        state.restore(timestamp, clock_sequence, node_id);
    }
}

fn read_record(path: &Path) -> io::Result<StateRecord> {
    let mut file = fs::File::open(path)?;
    let mut buffer = [0u8; RECORD_SIZE];
    file.read_exact(&mut buffer)?;

    let format = i32::from_le_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]);
    if format != FORMAT_NUMBER {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unknown state format number: {format}"),
        ));
    }
    let mut record = StateRecord {
        field_flags: i32::from_le_bytes([buffer[4], buffer[5], buffer[6], buffer[7]]),
        last_timestamp: i64::from_le_bytes([
            buffer[8], buffer[9], buffer[10], buffer[11], buffer[12], buffer[13], buffer[14],
            buffer[15],
        ]),
        packed_sequences: i32::from_le_bytes([buffer[16], buffer[17], buffer[18], buffer[19]]),
        physical_node_id: [0u8; 6],
        random_node_id: [0u8; 6],
    };
    record.physical_node_id.copy_from_slice(&buffer[20..26]);
    record.random_node_id.copy_from_slice(&buffer[26..32]);
    Ok(record)
}

fn write_record_atomically(path: &Path, record: &StateRecord) -> io::Result<()> {
    let mut buffer = [0u8; RECORD_SIZE];
    buffer[0..4].copy_from_slice(&FORMAT_NUMBER.to_le_bytes());
    buffer[4..8].copy_from_slice(&record.field_flags.to_le_bytes());
    buffer[8..16].copy_from_slice(&record.last_timestamp.to_le_bytes());
    buffer[16..20].copy_from_slice(&record.packed_sequences.to_le_bytes());
    buffer[20..26].copy_from_slice(&record.physical_node_id);
    buffer[26..32].copy_from_slice(&record.random_node_id);

    let mut file_name = path.file_name().unwrap_or_default().to_os_string();
    file_name.push(".tmp");
    let temp_path = path.with_file_name(file_name);
    {
        let mut temp = fs::File::create(&temp_path)?;
        temp.write_all(&buffer)?;
        temp.sync_all()?;
    }
    fs::rename(&temp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    // The storage path and the state instances are process-global, so every
    // test here serializes on the shared-state lock and restores a clean
    // configuration before leaving.
    use crate::state::SHARED_STATE_TEST_LOCK;

    struct PathReset;

    impl Drop for PathReset {
        fn drop(&mut self) {
            set_state_storage_path(Option::<PathBuf>::None);
            set_storage_error_hook(None);
        }
    }

    fn state_file() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("temp dir for state file");
        let path = dir.path().join("gregorid.state.bin");
        (dir, path)
    }

    #[test]
    fn missing_file_is_a_benign_first_run() {
        let _guard = SHARED_STATE_TEST_LOCK.lock();
        let _reset = PathReset;
        let (_dir, path) = state_file();

        let faults = Arc::new(AtomicU32::new(0));
        let counted = Arc::clone(&faults);
        set_storage_error_hook(Some(Box::new(move |_, _, _| {
            counted.fetch_add(1, Ordering::SeqCst);
        })));

        assert!(!set_state_storage_path(Some(&path)));
        assert_eq!(faults.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn flush_and_shutdown_without_a_path_are_no_ops() {
        let _guard = SHARED_STATE_TEST_LOCK.lock();
        let _reset = PathReset;
        assert!(!flush_state());
        assert!(!shutdown_state());
    }

    #[test]
    fn state_round_trips_through_the_file() {
        let _guard = SHARED_STATE_TEST_LOCK.lock();
        let _reset = PathReset;
        let (_dir, path) = state_file();

        set_state_storage_path(Some(&path));
        let node = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55];
        GeneratorState::shared_physical().refresh(7_000, Some(node));
        wait_for_pending_saves();
        assert!(flush_state());

        let physical_before = GeneratorState::shared_physical().snapshot();
        let random_before = GeneratorState::shared_random().snapshot();

        // A simulated restart: clobber the in-memory state, then reload.
        GeneratorState::shared_physical().reset();
        GeneratorState::shared_random().reset();
        assert!(load_from_storage());

        let physical = GeneratorState::shared_physical().snapshot();
        assert_eq!(physical.last_node_id, Some(node));
        assert_eq!(physical.clock_sequence, physical_before.clock_sequence);
        assert_eq!(
            physical.last_timestamp,
            physical_before
                .last_timestamp
                .max(random_before.last_timestamp)
        );
        let random = GeneratorState::shared_random().snapshot();
        assert_eq!(random.clock_sequence, random_before.clock_sequence);
    }

    #[test]
    fn resumed_state_never_repeats_a_timestamp_sequence_pair() {
        let _guard = SHARED_STATE_TEST_LOCK.lock();
        let _reset = PathReset;
        let (_dir, path) = state_file();

        set_state_storage_path(Some(&path));
        let node = [0x00, 0xaa, 0xbb, 0xcc, 0xdd, 0xee];
        let state = GeneratorState::shared_physical();
        state.reset();
        let mut seen = std::collections::HashSet::new();
        for timestamp in [1_000i64, 1_000, 2_000] {
            let sequence = state.refresh(timestamp, Some(node));
            assert!(seen.insert((state.snapshot().last_timestamp, sequence)));
        }
        wait_for_pending_saves();
        assert!(flush_state());

        state.reset();
        assert!(load_from_storage());
        // The reloaded timestamp is the persisted one, so a stalled clock
        // still advances the sequence instead of repeating a pair.
        let sequence = state.refresh(2_000, Some(node));
        assert!(
            seen.insert((2_000, sequence)),
            "(timestamp, sequence) pair repeated across restart"
        );
    }

    #[test]
    fn wrong_format_number_is_a_reported_load_failure() {
        let _guard = SHARED_STATE_TEST_LOCK.lock();
        let _reset = PathReset;
        let (_dir, path) = state_file();

        let mut bogus = [0u8; RECORD_SIZE];
        bogus[0..4].copy_from_slice(&9999i32.to_le_bytes());
        fs::write(&path, bogus).expect("write bogus state file");

        let faults = Arc::new(AtomicU32::new(0));
        let counted = Arc::clone(&faults);
        set_storage_error_hook(Some(Box::new(move |error, _, op| {
            assert_eq!(op, StorageOp::Load);
            assert_eq!(error.kind(), io::ErrorKind::InvalidData);
            counted.fetch_add(1, Ordering::SeqCst);
        })));

        assert!(!set_state_storage_path(Some(&path)));
        assert_eq!(faults.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn truncated_file_is_a_reported_load_failure() {
        let _guard = SHARED_STATE_TEST_LOCK.lock();
        let _reset = PathReset;
        let (_dir, path) = state_file();

        fs::write(&path, FORMAT_NUMBER.to_le_bytes()).expect("write truncated state file");

        let faults = Arc::new(AtomicU32::new(0));
        let counted = Arc::clone(&faults);
        set_storage_error_hook(Some(Box::new(move |_, _, op| {
            assert_eq!(op, StorageOp::Load);
            counted.fetch_add(1, Ordering::SeqCst);
        })));

        assert!(!set_state_storage_path(Some(&path)));
        assert_eq!(faults.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn save_failure_reports_without_disturbing_generation() {
        let _guard = SHARED_STATE_TEST_LOCK.lock();
        let _reset = PathReset;
        let (_dir, dir_path) = state_file();
        // A directory path cannot be renamed over, forcing a save fault.
        fs::create_dir(&dir_path).expect("create blocking directory");

        let faults = Arc::new(AtomicU32::new(0));
        let counted = Arc::clone(&faults);
        set_storage_error_hook(Some(Box::new(move |_, _, op| {
            assert_eq!(op, StorageOp::Save);
            counted.fetch_add(1, Ordering::SeqCst);
        })));

        set_state_storage_path(Some(&dir_path));
        assert!(!flush_state());
        assert_eq!(faults.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reset_state_rewrites_the_file() {
        let _guard = SHARED_STATE_TEST_LOCK.lock();
        let _reset = PathReset;
        let (_dir, path) = state_file();

        set_state_storage_path(Some(&path));
        let node = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55];
        GeneratorState::shared_physical().refresh(1_000, Some(node));
        flush_state();

        reset_state();
        wait_for_pending_saves();
        let record = read_record(&path).expect("reset leaves a valid file");
        assert_eq!(record.field_flags & FLAG_PHYSICAL_NODE_ID, 0);
        assert_eq!(record.last_timestamp, 0);
    }
}
