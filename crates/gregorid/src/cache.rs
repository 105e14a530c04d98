//! A refresh-with-idle-sleep value cache.
//!
//! Wraps a refresh function behind a cached value that a background task
//! keeps warm while the cache is being read. After `sleep_after` refresh
//! periods with no reads, the task invalidates the value and parks itself so
//! an idle process causes no wake-ups; the next read refreshes inline and
//! restarts the task.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

pub(crate) struct AutoRefreshCache<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    refresh: Box<dyn Fn() -> T + Send + Sync>,
    /// `None` disables background refresh entirely: the value is cached until
    /// invalidated.
    refresh_period: Option<Duration>,
    sleep_after: u32,
    state: Mutex<CacheState<T>>,
    wake: Condvar,
}

struct CacheState<T> {
    value: Option<T>,
    sleep_countdown: u32,
    worker_running: bool,
    disposed: bool,
}

impl<T: Clone + Send + 'static> AutoRefreshCache<T> {
    pub(crate) fn new(
        refresh: impl Fn() -> T + Send + Sync + 'static,
        refresh_period: Option<Duration>,
        sleep_after: u32,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                refresh: Box::new(refresh),
                refresh_period,
                sleep_after,
                state: Mutex::new(CacheState {
                    value: None,
                    sleep_countdown: sleep_after,
                    worker_running: false,
                    disposed: false,
                }),
                wake: Condvar::new(),
            }),
        }
    }

    /// Returns the cached value, refreshing inline when the cache is cold.
    ///
    /// Every read re-arms the idle countdown, keeping the background task
    /// alive while the cache is in active use.
    pub(crate) fn value(&self) -> T {
        let mut state = self.inner.state.lock();
        state.sleep_countdown = self.inner.sleep_after;
        if let Some(value) = &state.value {
            return value.clone();
        }
        let value = (self.inner.refresh)();
        state.value = Some(value.clone());
        if self.inner.refresh_period.is_some() && !state.worker_running && !state.disposed {
            state.worker_running = true;
            spawn_refresh_task(Arc::clone(&self.inner));
        }
        value
    }

    /// Drops the cached value; the next read refreshes inline.
    pub(crate) fn invalidate(&self) {
        self.inner.state.lock().value = None;
    }

    /// Stops the background task and drops the cached value for good.
    pub(crate) fn dispose(&self) {
        let mut state = self.inner.state.lock();
        state.disposed = true;
        state.value = None;
        self.inner.wake.notify_all();
    }
}

impl<T> Drop for AutoRefreshCache<T> {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        state.disposed = true;
        self.inner.wake.notify_all();
    }
}

fn spawn_refresh_task<T: Clone + Send + 'static>(inner: Arc<Inner<T>>) {
    thread::Builder::new()
        .name("gregorid-cache-refresh".into())
        .spawn(move || {
            let period = match inner.refresh_period {
                Some(period) => period,
                None => return,
            };
            let mut state = inner.state.lock();
            loop {
                let timed_out = inner.wake.wait_for(&mut state, period).timed_out();
                if state.disposed {
                    state.worker_running = false;
                    return;
                }
                if !timed_out {
                    continue;
                }
                if state.sleep_countdown > 0 {
                    state.value = Some((inner.refresh)());
                    state.sleep_countdown -= 1;
                } else {
                    // Gone idle: invalidate and park until the next read.
                    state.value = None;
                    state.worker_running = false;
                    return;
                }
            }
        })
        .ok();
}
