// Copyright 2026 the Block Profiler Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tabular presentation of aggregated statistics.
//!
//! Rendering is a full redraw: the target is cleared and every row is pushed again. Output goes
//! to a [`TableTarget`], which may be a plain `Vec<StatRow>` or a [`TextTable`].

use core::fmt;
use core::time::Duration;

use crate::aggregate::{Frames, Opcodes, RunningStats};
use crate::stat::{StatRow, StatView};

/// Self time above which a row is flagged as slow, in milliseconds.
pub const SLOW_THRESHOLD: f64 = 0.1;

/// Destination for rendered rows.
pub trait TableTarget {
    /// Removes every existing row.
    fn clear(&mut self);

    /// Appends one row.
    fn push_row(&mut self, row: StatRow);
}

impl TableTarget for Vec<StatRow> {
    fn clear(&mut self) {
        Vec::clear(self);
    }

    fn push_row(&mut self, row: StatRow) {
        self.push(row);
    }
}

/// Key ordering, lookup, and flagging policy for a [`StatTable`].
pub trait StatSource {
    /// Key identifying one row.
    type Key;

    /// Returns the keys to render, in display order.
    fn keys(&self) -> Vec<Self::Key>;

    /// Resolves a key to its view.
    fn view_of(&self, key: &Self::Key) -> Option<&StatView>;

    /// Returns `true` if the row should be flagged.
    fn is_slow(&self, _key: &Self::Key, view: &StatView) -> bool {
        view.self_time > SLOW_THRESHOLD
    }
}

/// Renders a [`StatSource`] into a [`TableTarget`].
#[derive(Debug)]
pub struct StatTable<S> {
    source: S,
}

impl<S: StatSource> StatTable<S> {
    /// Creates a table over `source`.
    #[must_use]
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Clears `target` and renders every key.
    ///
    /// Keys that no longer resolve to a view are skipped.
    pub fn render(&self, target: &mut impl TableTarget) {
        target.clear();
        for key in self.source.keys() {
            let Some(view) = self.source.view_of(&key) else {
                continue;
            };
            target.push_row(view.render(|v| self.source.is_slow(&key, v)));
        }
    }
}

pub(crate) fn by_self_time_desc(a: &StatView, b: &StatView) -> core::cmp::Ordering {
    b.self_time.total_cmp(&a.self_time)
}

/// Frame statistics ordered by descending self time.
#[derive(Debug)]
pub struct FramesTable<'a> {
    frames: &'a Frames,
}

impl<'a> FramesTable<'a> {
    /// Creates a table view over `frames`.
    #[must_use]
    pub fn new(frames: &'a Frames) -> Self {
        Self { frames }
    }
}

impl StatSource for FramesTable<'_> {
    type Key = String;

    fn keys(&self) -> Vec<String> {
        let mut views: Vec<&StatView> = self.frames.views().iter().collect();
        views.sort_unstable_by(|a, b| by_self_time_desc(a, b));
        views.into_iter().map(|v| v.name.clone()).collect()
    }

    fn view_of(&self, key: &String) -> Option<&StatView> {
        self.frames.get(key)
    }
}

/// Opcode statistics ordered by descending self time.
#[derive(Debug)]
pub struct OpcodeTable<'a> {
    opcodes: &'a Opcodes,
}

impl<'a> OpcodeTable<'a> {
    /// Creates a table view over `opcodes`.
    #[must_use]
    pub fn new(opcodes: &'a Opcodes) -> Self {
        Self { opcodes }
    }
}

impl StatSource for OpcodeTable<'_> {
    type Key = String;

    fn keys(&self) -> Vec<String> {
        let mut entries: Vec<(&str, &StatView)> = self.opcodes.iter().collect();
        entries.sort_unstable_by(|(_, a), (_, b)| by_self_time_desc(a, b));
        entries.into_iter().map(|(k, _)| k.to_owned()).collect()
    }

    fn view_of(&self, key: &String) -> Option<&StatView> {
        self.opcodes.get(key)
    }
}

/// Error constructing a [`RunningStatsView`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZeroRecordingWindow;

impl fmt::Display for ZeroRecordingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "recording window must be positive")
    }
}

impl std::error::Error for ZeroRecordingWindow {}

/// Rendered live counters.
#[derive(Clone, Debug, PartialEq)]
pub struct RunningStatsRow {
    /// Thread steps executed.
    pub steps: u64,
    /// Blocks executed.
    pub blocks: u64,
    /// Recorded time in seconds with three decimals.
    pub recorded_seconds: String,
    /// Recording progress in `0.0..=100.0`.
    pub progress_percent: f64,
}

/// Presentation of [`RunningStats`] against the recording window.
#[derive(Copy, Clone, Debug)]
pub struct RunningStatsView {
    max_recorded_ms: f64,
}

impl RunningStatsView {
    /// Creates a view for a recording window of `max_recorded`.
    pub fn new(max_recorded: Duration) -> Result<Self, ZeroRecordingWindow> {
        if max_recorded.is_zero() {
            return Err(ZeroRecordingWindow);
        }
        Ok(Self {
            max_recorded_ms: max_recorded.as_secs_f64() * 1000.0,
        })
    }

    /// Returns the recording progress in percent, clamped to `0.0..=100.0`.
    #[must_use]
    pub fn progress(&self, recorded_ms: f64) -> f64 {
        (recorded_ms / self.max_recorded_ms).clamp(0.0, 1.0) * 100.0
    }

    /// Renders the current counters.
    #[must_use]
    pub fn render(&self, stats: &RunningStats) -> RunningStatsRow {
        RunningStatsRow {
            steps: stats.executed.steps,
            blocks: stats.executed.blocks,
            recorded_seconds: format!("{:.3}", stats.recorded_time / 1000.0),
            progress_percent: self.progress(stats.recorded_time),
        }
    }
}

/// Fixed-width text rendering of a stat table.
#[derive(Clone, Debug, Default)]
pub struct TextTable {
    rows: Vec<StatRow>,
}

impl TextTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the rows rendered so far.
    #[must_use]
    pub fn rows(&self) -> &[StatRow] {
        &self.rows
    }
}

impl TableTarget for TextTable {
    fn clear(&mut self) {
        self.rows.clear();
    }

    fn push_row(&mut self, row: StatRow) {
        self.rows.push(row);
    }
}

impl fmt::Display for TextTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .rows
            .iter()
            .map(|r| r.name.len())
            .max()
            .unwrap_or(0)
            .max("name".len());
        writeln!(
            f,
            "  {:<width$}  {:>10}  {:>10}  {:>10}",
            "name", "self (s)", "total (s)", "count"
        )?;
        for row in &self.rows {
            let marker = if row.slow { '*' } else { ' ' };
            writeln!(
                f,
                "{marker} {:<width$}  {:>10}  {:>10}  {:>10}",
                row.name, row.self_time, row.total_time, row.executions
            )?;
        }
        Ok(())
    }
}
