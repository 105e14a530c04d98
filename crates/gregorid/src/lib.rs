//! # gregorid
//!
//! An RFC 4122/9562 GUID generation engine.
//!
//! The crate covers the stateful side of identifier generation that simple
//! wrappers leave out: a bit-exact field codec over the 128-bit value, a
//! monotonic 100 ns timestamp source, cached node-identity resolution, a
//! persistent per-identity-class clock-sequence state machine, sub-tick
//! counters for strictly ordered variants, and a bounded generator pool for
//! high-concurrency callers.
//!
//! ```
//! use gregorid::{GuidGenerator, Version, generator};
//!
//! let guid = generator::of_version(Version::UnixTimeBased)
//!     .new_guid()
//!     .expect("version 7 generation is infallible");
//! assert_eq!(guid.version_number(), 7);
//!
//! let name_based = generator::name_based_sha1()
//!     .new_guid_for_name(&gregorid::NAMESPACE_URL, b"https://example.com/")
//!     .expect("name-based generation is infallible");
//! assert_eq!(name_based.to_string(), "dd2c1780-811a-5296-81c5-178a0ef488bc");
//! ```
//!
//! Time-based generators share persistent clock-sequence state. Point the
//! engine at a storage file once at startup and flush before exit:
//!
//! ```no_run
//! gregorid::set_state_storage_path(Some("/var/lib/myapp/gregorid.state.bin"));
//! // ... generate ...
//! gregorid::flush_state();
//! ```

mod bounded;
mod cache;
mod counter;
mod error;
pub mod generator;
mod node;
mod random;
mod state;
mod time;
mod uuid;

pub use crate::error::*;
pub use crate::generator::{BlockingGuidGenerator, GuidGenerator, GuidGeneratorPool};
pub use crate::node::{NodeId, NodeIdProvider, NodeIdSource};
pub use crate::state::{
    StorageErrorHook, StorageOp, flush_state, reset_state, set_state_storage_path,
    set_storage_error_hook, shutdown_state, state_storage_path,
};
pub use crate::time::{
    GREGORIAN_UNIX_OFFSET_TICKS, GuidClock, TICKS_PER_MILLISECOND, TICKS_PER_SECOND,
    TimestampSource,
};
pub use crate::uuid::*;
