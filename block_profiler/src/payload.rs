// Copyright 2026 the Block Profiler Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Serializable run results.
//!
//! A finished run is shared as JSON, base64-encoded into a `#view/<payload>` link. Field names
//! match what the hosting page reads (`projectId`, `warmUpTime`, `recordingTime`, `selfTime`,
//! `totalTime`).

use core::fmt;
use core::time::Duration;
use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde::{Deserialize, Serialize};

use crate::config::RunConfig;
use crate::stat::StatView;

/// A share payload that could not be decoded.
#[derive(Debug)]
pub enum PayloadError {
    /// The text was not valid base64.
    Base64(base64::DecodeError),
    /// The decoded bytes were not a valid payload document.
    Json(serde_json::Error),
    /// The link did not carry a `view/` fragment.
    NotAViewLink,
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base64(err) => write!(f, "share payload is not valid base64: {err}"),
            Self::Json(err) => write!(f, "share payload is not a valid document: {err}"),
            Self::NotAViewLink => write!(f, "link does not contain a view fragment"),
        }
    }
}

impl std::error::Error for PayloadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Base64(err) => Some(err),
            Self::Json(err) => Some(err),
            Self::NotAViewLink => None,
        }
    }
}

impl From<base64::DecodeError> for PayloadError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Base64(err)
    }
}

impl From<serde_json::Error> for PayloadError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

/// The parameters a payload was recorded with. Times are in milliseconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    /// Identifier of the project under test.
    pub project_id: String,
    /// Warm-up time.
    pub warm_up_time: u64,
    /// Recording window.
    pub recording_time: u64,
}

impl Fixture {
    /// Returns the equivalent run configuration.
    #[must_use]
    pub fn to_config(&self) -> RunConfig {
        RunConfig {
            project_id: self.project_id.clone(),
            warm_up: Duration::from_millis(self.warm_up_time),
            max_recorded: Duration::from_millis(self.recording_time),
        }
    }
}

impl From<&RunConfig> for Fixture {
    fn from(config: &RunConfig) -> Self {
        Self {
            project_id: config.project_id.clone(),
            warm_up_time: u64::try_from(config.warm_up.as_millis()).unwrap_or(u64::MAX),
            recording_time: u64::try_from(config.max_recorded.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Snapshot of a finished run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SharePayload {
    /// Run parameters.
    pub fixture: Fixture,
    /// Frame statistics by descending self time.
    pub frames: Vec<StatView>,
    /// Opcode statistics keyed by opcode.
    pub opcodes: BTreeMap<String, StatView>,
}

impl SharePayload {
    /// Serializes to JSON and base64-encodes the result.
    pub fn encode(&self) -> Result<String, PayloadError> {
        let json = serde_json::to_vec(self)?;
        Ok(BASE64_STANDARD.encode(json))
    }

    /// Reverses [`encode`](Self::encode).
    pub fn decode(encoded: &str) -> Result<Self, PayloadError> {
        let json = BASE64_STANDARD.decode(encoded.trim())?;
        Ok(serde_json::from_slice(&json)?)
    }

    /// Returns the `#view/<payload>` fragment for this payload.
    pub fn share_link(&self) -> Result<String, PayloadError> {
        Ok(format!("#view/{}", self.encode()?))
    }

    /// Decodes the payload out of a share link.
    ///
    /// Accepts a full URL, a fragment with or without `#`, or a bare `view/<payload>`.
    pub fn from_share_link(link: &str) -> Result<Self, PayloadError> {
        let fragment = link.rsplit_once('#').map_or(link, |(_, fragment)| fragment);
        let encoded = fragment
            .strip_prefix("view/")
            .ok_or(PayloadError::NotAViewLink)?;
        Self::decode(encoded)
    }
}
