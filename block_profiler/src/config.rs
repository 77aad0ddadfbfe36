// Copyright 2026 the Block Profiler Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Run configuration and location-fragment parsing.
//!
//! A hosting page addresses a run with a fragment of the form `projectId,warmUpMs,recordingMs`
//! (every part optional) and a shared result with `view/<payload>`.

use core::fmt;
use core::num::ParseIntError;
use core::time::Duration;

/// Project loaded when the fragment names none.
pub const DEFAULT_PROJECT: &str = "default_project";
/// Warm-up used when the fragment names none.
pub const DEFAULT_WARM_UP: Duration = Duration::from_millis(4000);
/// Recording window used when the fragment names none.
pub const DEFAULT_RECORDING: Duration = Duration::from_millis(6000);
/// Settle time between workspace readiness and the start of warm-up.
pub const PRE_ROLL: Duration = Duration::from_millis(100);

const VIEW_PREFIX: &str = "view/";

/// Invalid run configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The warm-up part of the fragment was not a whole number of milliseconds.
    BadWarmUp(ParseIntError),
    /// The recording window was zero.
    ZeroRecording,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadWarmUp(err) => write!(f, "invalid warm-up time: {err}"),
            Self::ZeroRecording => write!(f, "recording window must be positive"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::BadWarmUp(err) => Some(err),
            Self::ZeroRecording => None,
        }
    }
}

/// Parameters of one profiling run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunConfig {
    /// Identifier of the project under test.
    pub project_id: String,
    /// Execution time discarded before recording starts.
    pub warm_up: Duration,
    /// Length of the recording window.
    pub max_recorded: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            project_id: DEFAULT_PROJECT.into(),
            warm_up: DEFAULT_WARM_UP,
            max_recorded: DEFAULT_RECORDING,
        }
    }
}

impl RunConfig {
    /// Parses a `projectId,warmUpMs,recordingMs` fragment.
    ///
    /// A leading `#` is ignored. An empty project or warm-up keeps the default. A recording
    /// window that is missing, zero, or not a number falls back to the default.
    pub fn from_fragment(fragment: &str) -> Result<Self, ConfigError> {
        let fragment = fragment.strip_prefix('#').unwrap_or(fragment);
        let mut parts = fragment.split(',');
        let mut config = Self::default();

        if let Some(project) = parts.next().map(str::trim)
            && !project.is_empty()
        {
            config.project_id = project.into();
        }
        if let Some(warm_up) = parts.next().map(str::trim)
            && !warm_up.is_empty()
        {
            let ms = warm_up.parse::<u64>().map_err(ConfigError::BadWarmUp)?;
            config.warm_up = Duration::from_millis(ms);
        }
        config.max_recorded = parts
            .next()
            .and_then(|r| r.trim().parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map_or(DEFAULT_RECORDING, Duration::from_millis);

        Ok(config)
    }

    /// Checks invariants the run relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_recorded.is_zero() {
            return Err(ConfigError::ZeroRecording);
        }
        Ok(())
    }

    /// Renders the configuration back into fragment form.
    #[must_use]
    pub fn to_fragment(&self) -> String {
        format!(
            "{},{},{}",
            self.project_id,
            self.warm_up.as_millis(),
            self.max_recorded.as_millis()
        )
    }

    /// Offset from workspace readiness at which warm-up starts.
    #[must_use]
    pub fn warm_up_at(&self) -> Duration {
        PRE_ROLL
    }

    /// Offset from workspace readiness at which recording starts.
    #[must_use]
    pub fn active_at(&self) -> Duration {
        PRE_ROLL.saturating_add(self.warm_up)
    }

    /// Offset from workspace readiness at which the run completes.
    #[must_use]
    pub fn complete_at(&self) -> Duration {
        self.active_at().saturating_add(self.max_recorded)
    }
}

/// What a location fragment asks for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fragment<'a> {
    /// Replay a shared result; holds the encoded payload.
    View(&'a str),
    /// Start a run.
    Run(RunConfig),
}

impl<'a> Fragment<'a> {
    /// Classifies and parses `fragment`.
    pub fn parse(fragment: &'a str) -> Result<Self, ConfigError> {
        let bare = fragment.strip_prefix('#').unwrap_or(fragment);
        if let Some(encoded) = bare.strip_prefix(VIEW_PREFIX) {
            return Ok(Self::View(encoded));
        }
        RunConfig::from_fragment(bare).map(Self::Run)
    }
}
