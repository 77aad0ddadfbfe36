// Copyright 2026 the Block Profiler Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Profiling harness for a block-execution engine.
//!
//! A [`ProfilerRun`] loads a project, lets it run through a warm-up window, records per-frame and
//! per-opcode timing samples from the engine's profiler for a fixed window, and finally renders
//! the results and packs them into a shareable [`SharePayload`].
//!
//! The crate is single-threaded. Phase changes are one-shot timers on a [`Scheduler`] that the
//! owner polls with [`ProfilerRun::tick`]; under a [`VirtualClock`] a whole run is deterministic.
//!
//! ## Layers
//! - [`record`]: the engine's frame records and symbol table.
//! - [`stat`] and [`aggregate`]: accumulators fed by frame records.
//! - [`table`]: rendering of accumulated statistics into rows.
//! - [`middleware`] and [`loading`]: interceptor chains around asset loaders, and the load tracker
//!   installed on them.
//! - [`schedule`], [`config`], [`payload`], [`run`]: orchestration and sharing.
//!
//! ## Example
//! ```ignore
//! use block_profiler::{ProfilerRun, RunConfig, SystemClock};
//!
//! let config = RunConfig::from_fragment("#130041250,4000,6000")?;
//! let mut run = ProfilerRun::new(engine, config, SystemClock::new(), messages)?;
//! // ... once the project has loaded:
//! run.workspace_ready()?;
//! while run.payload().is_none() {
//!     run.engine_mut().step();
//!     run.tick()?;
//! }
//! println!("{}", run.payload().unwrap().share_link()?);
//! ```

pub mod aggregate;
pub mod config;
pub mod loading;
pub mod middleware;
pub mod payload;
pub mod record;
pub mod run;
pub mod schedule;
pub mod stat;
pub mod table;

pub use aggregate::{Executed, FrameSink, Frames, Opcodes, RunningStats};
pub use config::{ConfigError, Fragment, RunConfig};
pub use loading::{
    LoadContext, LoadError, LoadFuture, LoadSnapshot, LoadTimings, LoadingProgress, MemorySampler,
    NoMemorySampler,
};
pub use middleware::{Installed, MiddlewareChain, Next};
pub use payload::{Fixture, PayloadError, SharePayload};
pub use record::{FrameId, FrameKind, FrameRecord, SymbolTable, Symbols};
pub use run::{
    Engine, EngineError, FrameCallback, NoopListener, Phase, ProfilerRun, ReplayRun, RunError,
    RunListener, RunMessage,
};
pub use schedule::{Clock, Scheduler, SystemClock, VirtualClock};
pub use stat::{StatError, StatRow, StatView};
pub use table::{
    FramesTable, OpcodeTable, RunningStatsRow, RunningStatsView, StatTable, TableTarget, TextTable,
};
