// Copyright 2026 the Block Profiler Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use block_profiler::{NoopListener, RunListener, RunMessage, RunningStatsRow, StatRow};
use tracy_client::{Client, plot_name};

/// A [`RunListener`] that mirrors a run into Tracy.
#[derive(Debug)]
pub struct TracyListener<L = NoopListener> {
    inner: L,
}

impl TracyListener<NoopListener> {
    /// Create a listener that only reports to Tracy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for TracyListener<NoopListener> {
    fn default() -> Self {
        Self::wrapping(NoopListener)
    }
}

impl<L: RunListener> TracyListener<L> {
    /// Create a listener that reports to Tracy and then forwards to `inner`.
    #[must_use]
    pub fn wrapping(inner: L) -> Self {
        Self { inner }
    }

    /// Returns the wrapped listener.
    pub fn into_inner(self) -> L {
        self.inner
    }
}

fn describe(message: &RunMessage) -> String {
    match message {
        RunMessage::Loading => "block_profiler: loading".into(),
        RunMessage::WarmingUp => "block_profiler: warming up".into(),
        RunMessage::Active => "block_profiler: recording".into(),
        RunMessage::Complete { frames, opcodes } => format!(
            "block_profiler: complete ({} frames, {} opcodes)",
            frames.len(),
            opcodes.len()
        ),
    }
}

impl<L: RunListener> RunListener for TracyListener<L> {
    fn message(&mut self, message: &RunMessage) {
        if let Some(client) = Client::running() {
            client.message(&describe(message), 0);
        }
        self.inner.message(message);
    }

    fn running_stats(&mut self, row: &RunningStatsRow) {
        if let Some(client) = Client::running() {
            client.plot(plot_name!("block_profiler.steps"), row.steps as f64);
            client.plot(plot_name!("block_profiler.blocks"), row.blocks as f64);
            client.plot(plot_name!("block_profiler.progress"), row.progress_percent);
        }
        self.inner.running_stats(row);
    }

    fn tables(&mut self, frames: &[StatRow], opcodes: &[StatRow]) {
        if let Some(client) = Client::running() {
            for row in frames.iter().filter(|r| r.slow) {
                client.message(&format!("slow frame: {} ({} s)", row.name, row.self_time), 0);
            }
        }
        self.inner.tables(frames, opcodes);
    }
}
