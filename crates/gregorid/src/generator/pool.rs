//! A bounded pool of stateful generators for high-concurrency callers.

use std::any::Any;
use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use super::{BlockingGuidGenerator, GuidGenerator, TimeBasedGuidGenerator};
use crate::error::{Error, Result};
use crate::uuid::{Uuid, Version};

/// Amortizes state-lock contention by spreading generation over multiple
/// generator instances.
///
/// With an uncapped capacity every calling thread lazily gets its own default
/// generator; with a capped capacity one default is shared and up to
/// `capacity - 1` spares sit in a bounded collection. A call first probes the
/// default without blocking, then a pooled spare, and finally creates a
/// throwaway generator that is donated back to the pool unless it is full.
/// After [`dispose`](Self::dispose) every call fails loudly instead of
/// returning a stale or garbage identifier.
pub struct GuidGeneratorPool<G: BlockingGuidGenerator + 'static> {
    id: usize,
    factory: Box<dyn Fn() -> G + Send + Sync>,
    capped: bool,
    spares: crate::bounded::BoundedPool<Arc<G>>,
    shared_default: Mutex<Option<Arc<G>>>,
    created_defaults: Mutex<Vec<Arc<G>>>,
    disposed: AtomicBool,
}

thread_local! {
    /// Per-thread default generators, keyed by pool id.
    static THREAD_DEFAULTS: RefCell<Vec<(usize, Arc<dyn Any + Send + Sync>)>> =
        const { RefCell::new(Vec::new()) };
}

fn next_pool_id() -> usize {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// A pool of version 6 generators, the variant whose per-instance state makes
/// pooling worthwhile.
pub fn pooled_time_based_reordered(
    capacity: Option<usize>,
) -> GuidGeneratorPool<TimeBasedGuidGenerator> {
    GuidGeneratorPool::new(TimeBasedGuidGenerator::version6, capacity)
}

impl<G: BlockingGuidGenerator + 'static> GuidGeneratorPool<G> {
    /// Builds a pool over a generator factory.
    ///
    /// `capacity` bounds the total retained generators; `None` means
    /// uncapped, which switches the default-generator strategy from one
    /// shared instance to one instance per calling thread.
    pub fn new(factory: impl Fn() -> G + Send + Sync + 'static, capacity: Option<usize>) -> Self {
        Self {
            id: next_pool_id(),
            factory: Box::new(factory),
            capped: capacity.is_some(),
            spares: crate::bounded::BoundedPool::with_capacity(
                capacity.map(|limit| limit.saturating_sub(1)),
            ),
            shared_default: Mutex::new(None),
            created_defaults: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        }
    }

    /// Generates an identifier, preferring whichever pooled instance is free.
    pub fn new_guid(&self) -> Result<Uuid> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(Error::PoolDisposed);
        }

        if let Some(guid) = self.default_generator().try_new_guid() {
            return Ok(guid);
        }
        if let Some(guid) = self.try_new_guid_by_pool() {
            return Ok(guid);
        }

        // Everything is busy: generate on a throwaway instance and donate it.
        let fresh = (self.factory)();
        let result = fresh.new_guid();
        if !self.disposed.load(Ordering::Acquire) {
            let _ = self.spares.try_put(Arc::new(fresh));
        }
        result
    }

    fn try_new_guid_by_pool(&self) -> Option<Uuid> {
        let spare = self.spares.try_take()?;
        let guid = spare.try_new_guid();
        if !self.disposed.load(Ordering::Acquire) {
            let _ = self.spares.try_put(spare);
        }
        guid
    }

    fn default_generator(&self) -> Arc<G> {
        if self.capped {
            return Arc::clone(
                self.shared_default
                    .lock()
                    .get_or_insert_with(|| self.create_tracked()),
            );
        }
        THREAD_DEFAULTS.with(|defaults| {
            let mut defaults = defaults.borrow_mut();
            if let Some((_, untyped)) = defaults.iter().find(|(id, _)| *id == self.id) {
                if let Ok(generator) = Arc::clone(untyped).downcast::<G>() {
                    return generator;
                }
            }
            let generator = self.create_tracked();
            defaults.push((self.id, Arc::clone(&generator) as Arc<dyn Any + Send + Sync>));
            generator
        })
    }

    fn create_tracked(&self) -> Arc<G> {
        let generator = Arc::new((self.factory)());
        self.created_defaults.lock().push(Arc::clone(&generator));
        generator
    }

    /// Drains and drops every pooled and default generator exactly once;
    /// subsequent calls to [`Self::new_guid`] fail with
    /// [`Error::PoolDisposed`].
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let spares = self.spares.drain();
        let defaults = core::mem::take(&mut *self.created_defaults.lock());
        *self.shared_default.lock() = None;
        debug!(
            spares = spares.len(),
            defaults = defaults.len(),
            "generator pool disposed"
        );
    }
}

impl<G: BlockingGuidGenerator + 'static> Drop for GuidGeneratorPool<G> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<G: BlockingGuidGenerator + 'static> GuidGenerator for GuidGeneratorPool<G> {
    fn version(&self) -> Version {
        self.default_generator().version()
    }

    fn new_guid(&self) -> Result<Uuid> {
        GuidGeneratorPool::new_guid(self)
    }
}
