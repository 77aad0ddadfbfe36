// Copyright 2026 the Block Profiler Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A deterministic stand-in for a block engine and its asset loaders.

use std::cell::Cell;
use std::rc::Rc;

use block_profiler::record::{BLOCK_FUNCTION, RUNTIME_STEP, STEP_THREADS, STEP_THREADS_INNER};
use block_profiler::{
    Engine, EngineError, FrameCallback, FrameId, FrameRecord, Installed, LoadContext, LoadError,
    LoadFuture, LoadSnapshot, LoadingProgress, MemorySampler, MiddlewareChain, SymbolTable,
    Symbols, VirtualClock,
};
use futures::FutureExt as _;
use futures::executor::block_on;
use futures::future;
use tracing::debug;

/// Opcode and per-execution cost in milliseconds.
const WORKLOAD: &[(&str, f64)] = &[
    ("motion_movesteps", 0.000_8),
    ("motion_turnright", 0.000_6),
    ("looks_say", 0.004),
    ("control_repeat", 0.001_2),
    ("operator_add", 0.000_3),
    ("data_setvariableto", 0.000_5),
    ("pen_stamp", 0.18),
];

const THREADS: u64 = 4;

/// Engine that replays a fixed workload, one step per call to [`SimEngine::step`].
pub(crate) struct SimEngine {
    symbols: Rc<Symbols>,
    step_threads: FrameId,
    inner: FrameId,
    block_function: FrameId,
    runtime_step: FrameId,
    callback: Option<FrameCallback>,
    running: bool,
    steps: u64,
}

impl SimEngine {
    pub(crate) fn new() -> Self {
        let mut symbols = Symbols::new();
        Self {
            step_threads: symbols.intern(STEP_THREADS),
            inner: symbols.intern(STEP_THREADS_INNER),
            block_function: symbols.intern(BLOCK_FUNCTION),
            runtime_step: symbols.intern(RUNTIME_STEP),
            symbols: Rc::new(symbols),
            callback: None,
            running: false,
            steps: 0,
        }
    }

    /// Runs one frame of the workload and reports it to the profiler, if attached.
    pub(crate) fn step(&mut self, frame_ms: f64) {
        if !self.running {
            return;
        }
        self.steps += 1;
        let Some(callback) = self.callback.as_mut() else {
            return;
        };

        let mut blocks_ms = 0.0;
        for (i, &(opcode, cost)) in (0_u64..).zip(WORKLOAD) {
            // Vary counts per frame so the tables are not perfectly flat.
            let count = 10 + (self.steps * 7 + i * 13) % 30;
            let spent = cost * count as f64;
            blocks_ms += spent;
            callback(&FrameRecord::block_call(
                self.block_function,
                opcode,
                spent,
                spent,
                count,
            ));
        }
        let overhead = 0.05;
        callback(&FrameRecord::step(
            self.inner,
            overhead,
            blocks_ms + overhead,
            THREADS,
        ));
        callback(&FrameRecord::step(
            self.step_threads,
            overhead,
            blocks_ms + 2.0 * overhead,
            1,
        ));
        callback(&FrameRecord::step(self.runtime_step, 0.01, frame_ms, 1));
    }
}

impl Engine for SimEngine {
    fn enable_profiling(&mut self) -> Result<Rc<dyn SymbolTable>, EngineError> {
        Ok(self.symbols.clone())
    }

    fn attach_profiler(&mut self, callback: FrameCallback) -> Result<(), EngineError> {
        self.callback = Some(callback);
        Ok(())
    }

    fn detach_profiler(&mut self) {
        self.callback = None;
    }

    fn start(&mut self) {
        self.running = true;
    }

    fn stop_all(&mut self) {
        self.running = false;
    }

    fn cancel_stepping(&mut self) {
        debug!(steps = self.steps, "stepping cancelled");
    }
}

/// Memory that grows with every asset loaded.
#[derive(Debug, Default)]
struct SimMemory {
    used: Cell<u64>,
}

impl MemorySampler for SimMemory {
    fn used_bytes(&self) -> Option<u64> {
        let used = self.used.get() + 256 * 1024;
        self.used.set(used);
        Some(used)
    }
}

struct Loaders {
    costumes: Installed<&'static str, LoadFuture<usize>>,
    sounds: Installed<&'static str, LoadFuture<usize>>,
    data: Installed<&'static str, LoadFuture<usize>>,
}

/// Loader that takes `cost_ms` of virtual time and yields the asset size.
fn loader(
    cost_ms: u64,
) -> impl Fn(&Rc<VirtualClock>, &'static str) -> LoadFuture<usize> + 'static {
    move |clock, name| {
        clock.advance_ms(cost_ms);
        future::ready(Ok::<_, LoadError>(name.len() * 1024)).boxed_local()
    }
}

/// Loads `project_id` through tracked loaders and returns the final load snapshot.
pub(crate) fn load_project(
    clock: &Rc<VirtualClock>,
    project_id: &str,
) -> Result<LoadSnapshot, LoadError> {
    let costumes = MiddlewareChain::new();
    let sounds = MiddlewareChain::new();
    let data = MiddlewareChain::new();

    let context = LoadContext::new(clock.clone()).with_memory(Rc::new(SimMemory::default()));
    let progress = LoadingProgress::new(context, |snapshot: &LoadSnapshot| {
        debug!(
            content = snapshot.content_complete,
            content_total = snapshot.content_total,
            assets = snapshot.hydrate_complete,
            assets_total = snapshot.hydrate_total,
            "load progress"
        );
    });
    progress.on(&costumes, &sounds, &data);

    let loaders = Loaders {
        costumes: costumes.install(Rc::clone(clock), loader(3)),
        sounds: sounds.install(Rc::clone(clock), loader(7)),
        data: data.install(Rc::clone(clock), loader(40)),
    };

    block_on(async {
        debug!(project_id, "fetching project");
        loaders.data.call("project.json").await?;
        let downloads = ["backdrop.svg", "cat-a.svg", "cat-b.svg", "meow.wav", "pop.wav"]
            .map(|asset| loaders.data.call(asset));
        future::try_join_all(downloads).await?;
        for costume in ["backdrop.svg", "cat-a.svg", "cat-b.svg"] {
            loaders.costumes.call(costume).await?;
        }
        for sound in ["meow.wav", "pop.wav"] {
            loaders.sounds.call(sound).await?;
        }
        Ok::<_, LoadError>(())
    })?;
    progress.project_loaded();
    Ok(progress.snapshot())
}
