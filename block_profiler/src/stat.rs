// Copyright 2026 the Block Profiler Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-key statistic accumulator and its rendered row.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Placeholder shown for times that truncate to zero.
pub const EMPTY_TIME: &str = "---";

/// A statistic rejected by [`StatView::update`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StatError {
    /// `self_time` was negative or not finite.
    BadSelfTime(f64),
    /// `total_time` was negative or not finite.
    BadTotalTime(f64),
}

impl fmt::Display for StatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadSelfTime(t) => write!(f, "self time must be finite and >= 0, got {t}"),
            Self::BadTotalTime(t) => write!(f, "total time must be finite and >= 0, got {t}"),
        }
    }
}

impl std::error::Error for StatError {}

/// Accumulated self time, total time, and execution count for one named key.
///
/// Times are in milliseconds. All fields only ever grow.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatView {
    /// Identity of the statistic (frame name or opcode).
    pub name: String,
    /// Number of executions observed.
    pub executions: u64,
    /// Sum of self times.
    pub self_time: f64,
    /// Sum of total times.
    pub total_time: f64,
}

impl StatView {
    /// Creates an empty statistic named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds one sample.
    ///
    /// Rejects negative or non-finite times without modifying the view.
    pub fn update(&mut self, self_time: f64, total_time: f64, count: u64) -> Result<(), StatError> {
        check_times(self_time, total_time)?;
        self.executions = self.executions.saturating_add(count);
        self.self_time += self_time;
        self.total_time += total_time;
        Ok(())
    }

    /// Projects this view into a display row.
    ///
    /// `is_slow` is evaluated against the raw accumulated values, not the truncated text.
    #[must_use]
    pub fn render(&self, is_slow: impl FnOnce(&Self) -> bool) -> StatRow {
        StatRow {
            name: self.name.clone(),
            self_time: format_seconds(self.self_time),
            total_time: format_seconds(self.total_time),
            executions: self.executions,
            slow: is_slow(self),
        }
    }
}

/// One rendered table row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatRow {
    /// Statistic name.
    pub name: String,
    /// Self time in seconds with three decimals, or [`EMPTY_TIME`].
    pub self_time: String,
    /// Total time in seconds with three decimals, or [`EMPTY_TIME`].
    pub total_time: String,
    /// Execution count.
    pub executions: u64,
    /// Whether the row is flagged as slow.
    pub slow: bool,
}

/// Checks that both times are finite and non-negative.
pub(crate) fn check_times(self_time: f64, total_time: f64) -> Result<(), StatError> {
    if !(self_time.is_finite() && self_time >= 0.0) {
        return Err(StatError::BadSelfTime(self_time));
    }
    if !(total_time.is_finite() && total_time >= 0.0) {
        return Err(StatError::BadTotalTime(total_time));
    }
    Ok(())
}

/// Truncates `ms` to thousandths of a millisecond and formats it as seconds.
pub(crate) fn format_seconds(ms: f64) -> String {
    let truncated = (ms * 1000.0).floor() / 1000.0;
    if truncated > 0.0 {
        format!("{:.3}", truncated / 1000.0)
    } else {
        EMPTY_TIME.into()
    }
}
