// Copyright 2026 the Block Profiler Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracy adapter for `block_profiler`.
//!
//! [`TracyListener`] forwards phase changes as Tracy messages and live counters as plots, and
//! can wrap another [`RunListener`](block_profiler::RunListener) so the host keeps receiving
//! everything. When no Tracy client is running, it only forwards.
//!
//! ## Example
//! ```ignore
//! use block_profiler::ProfilerRun;
//! use block_profiler_tracy::TracyListener;
//!
//! let listener = TracyListener::wrapping(host_listener);
//! let mut run = ProfilerRun::new(engine, config, clock, listener)?;
//! ```

mod listener;

pub use listener::TracyListener;
