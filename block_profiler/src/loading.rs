// Copyright 2026 the Block Profiler Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Asset-loading progress.
//!
//! [`LoadingProgress`] taps the loader collaborators through their [`MiddlewareChain`]s and counts
//! two kinds of work:
//!
//! - **download**: calls to the low-level data loader. The first call fetches the project file
//!   itself; every later call is a content download.
//! - **hydrate**: costume and sound decoding, each counted when requested and again when its
//!   future resolves.
//!
//! Every change samples memory (when a [`MemorySampler`] is available) and hands a fresh
//! [`LoadSnapshot`] to the listener. Failed loads propagate to the caller untouched and never
//! count as completed.

use core::fmt;
use core::time::Duration;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures::FutureExt as _;
use futures::future::LocalBoxFuture;
use tracing::debug;

use crate::middleware::MiddlewareChain;
use crate::schedule::Clock;

/// Future returned by intercepted loaders.
pub type LoadFuture<T> = LocalBoxFuture<'static, Result<T, LoadError>>;

/// A loader failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadError {
    message: Box<str>,
}

impl LoadError {
    /// Creates an error with a human-readable message.
    #[must_use]
    pub fn new(message: impl Into<Box<str>>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "load failed: {}", self.message)
    }
}

impl std::error::Error for LoadError {}

/// Source of heap usage samples.
pub trait MemorySampler {
    /// Returns the bytes currently in use, if the platform exposes it.
    fn used_bytes(&self) -> Option<u64>;
}

/// Sampler for platforms without memory introspection.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoMemorySampler;

impl MemorySampler for NoMemorySampler {
    fn used_bytes(&self) -> Option<u64> {
        None
    }
}

/// Milestones measured from the start of loading.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadTimings {
    /// The project file finished downloading.
    pub load_data_end: Option<Duration>,
    /// Every content download started so far has finished.
    pub download_end: Option<Duration>,
    /// The engine reported the project as loaded.
    pub load_end: Option<Duration>,
}

/// Counters reported to the progress listener.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadSnapshot {
    /// Whether the project file has been downloaded.
    pub data_loaded: bool,
    /// Content downloads requested.
    pub content_total: u32,
    /// Content downloads finished.
    pub content_complete: u32,
    /// Assets queued for hydration.
    pub hydrate_total: u32,
    /// Assets hydrated.
    pub hydrate_complete: u32,
    /// Most recent memory sample, in bytes.
    pub memory_current: u64,
    /// Highest memory sample seen, in bytes.
    pub memory_peak: u64,
    /// Load milestones.
    pub timings: LoadTimings,
}

/// Collaborators a [`LoadingProgress`] reads from.
pub struct LoadContext {
    /// Clock used to timestamp milestones.
    pub clock: Rc<dyn Clock>,
    /// Memory source.
    pub memory: Rc<dyn MemorySampler>,
}

impl LoadContext {
    /// Creates a context without memory sampling.
    #[must_use]
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            clock,
            memory: Rc::new(NoMemorySampler),
        }
    }

    /// Replaces the memory sampler.
    #[must_use]
    pub fn with_memory(mut self, memory: Rc<dyn MemorySampler>) -> Self {
        self.memory = memory;
        self
    }
}

impl fmt::Debug for LoadContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadContext")
            .field("now", &self.clock.now())
            .finish_non_exhaustive()
    }
}

struct Tracker {
    context: LoadContext,
    load_start: Duration,
    state: RefCell<LoadSnapshot>,
    listener: RefCell<Box<dyn FnMut(&LoadSnapshot)>>,
    /// Set when the state changes while the listener is running.
    stale: Cell<bool>,
}

impl Tracker {
    fn since_start(&self) -> Duration {
        self.context.clock.now().saturating_sub(self.load_start)
    }

    /// Applies `change`, samples memory, and notifies the listener.
    fn update(&self, change: impl FnOnce(&mut LoadSnapshot, Duration)) {
        let now = self.since_start();
        {
            let mut state = self.state.borrow_mut();
            change(&mut state, now);
            if let Some(used) = self.context.memory.used_bytes() {
                state.memory_current = used;
                state.memory_peak = state.memory_peak.max(used);
            }
        }
        self.notify();
    }

    /// Hands the latest snapshot to the listener.
    ///
    /// A change made from inside the listener is not delivered recursively; the running
    /// notification delivers it once the listener returns.
    fn notify(&self) {
        let Ok(mut listener) = self.listener.try_borrow_mut() else {
            self.stale.set(true);
            return;
        };
        loop {
            self.stale.set(false);
            let snapshot = self.state.borrow().clone();
            listener(&snapshot);
            if !self.stale.get() {
                break;
            }
        }
    }
}

/// Tracks download and hydrate progress of a project load.
///
/// Cloning yields another handle to the same counters.
#[derive(Clone)]
pub struct LoadingProgress {
    tracker: Rc<Tracker>,
}

impl LoadingProgress {
    /// Creates a tracker reporting every change to `listener`.
    ///
    /// The listener may start further tracked loads; their changes are reported after it
    /// returns, in a fresh snapshot.
    ///
    /// Load milestones are measured from the moment of creation.
    #[must_use]
    pub fn new(context: LoadContext, listener: impl FnMut(&LoadSnapshot) + 'static) -> Self {
        let load_start = context.clock.now();
        Self {
            tracker: Rc::new(Tracker {
                context,
                load_start,
                state: RefCell::new(LoadSnapshot::default()),
                listener: RefCell::new(Box::new(listener)),
                stale: Cell::new(false),
            }),
        }
    }

    /// Returns the current counters.
    #[must_use]
    pub fn snapshot(&self) -> LoadSnapshot {
        self.tracker.state.borrow().clone()
    }

    /// Taps the costume, sound, and data loaders.
    pub fn on<A1, T1, A2, T2, A3, T3>(
        &self,
        costumes: &MiddlewareChain<A1, LoadFuture<T1>>,
        sounds: &MiddlewareChain<A2, LoadFuture<T2>>,
        data: &MiddlewareChain<A3, LoadFuture<T3>>,
    ) where
        A1: 'static,
        T1: 'static,
        A2: 'static,
        T2: 'static,
        A3: 'static,
        T3: 'static,
    {
        self.attach_hydrate(costumes);
        self.attach_hydrate(sounds);
        self.attach_data(data);
    }

    /// Counts every call through `chain` as one asset hydration.
    pub fn attach_hydrate<A: 'static, T: 'static>(
        &self,
        chain: &MiddlewareChain<A, LoadFuture<T>>,
    ) {
        let tracker = Rc::clone(&self.tracker);
        chain.on_before_load(move |args, next| {
            tracker.update(|s, _| s.hydrate_total += 1);
            let pending = next.run(args);
            let tracker = Rc::clone(&tracker);
            async move {
                let value = pending.await?;
                tracker.update(|s, _| s.hydrate_complete += 1);
                Ok(value)
            }
            .boxed_local()
        });
    }

    /// Counts calls through `chain` as the project download followed by content downloads.
    pub fn attach_data<A: 'static, T: 'static>(&self, chain: &MiddlewareChain<A, LoadFuture<T>>) {
        let tracker = Rc::clone(&self.tracker);
        chain.on_before_load(move |args, next| {
            if !tracker.state.borrow().data_loaded {
                debug!("project data load started");
            }
            let pending = next.run(args);
            tracker.update(|s, _| {
                if s.data_loaded {
                    if s.content_total == 0 {
                        debug!("content download started");
                    }
                    s.content_total += 1;
                }
            });
            let tracker = Rc::clone(&tracker);
            async move {
                let value = pending.await?;
                tracker.update(|s, now| {
                    if s.data_loaded {
                        s.content_complete += 1;
                    } else {
                        debug!(elapsed = ?now, "project data loaded");
                        s.data_loaded = true;
                        s.timings.load_data_end = Some(now);
                    }
                    if s.content_complete > 0 && s.content_complete == s.content_total {
                        debug!(elapsed = ?now, "content downloads caught up");
                        s.timings.download_end = Some(now);
                    }
                });
                Ok(value)
            }
            .boxed_local()
        });
    }

    /// Records that the engine finished loading and hydrating the project.
    pub fn project_loaded(&self) {
        self.tracker.update(|s, now| {
            debug!(elapsed = ?now, "project loaded");
            s.timings.load_end = Some(now);
        });
    }
}

impl fmt::Debug for LoadingProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadingProgress")
            .field("state", &*self.tracker.state.borrow())
            .finish_non_exhaustive()
    }
}
