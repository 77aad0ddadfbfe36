// Copyright 2026 the Block Profiler Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Profiling run orchestration.
//!
//! A [`ProfilerRun`] drives one session through four phases:
//!
//! ```text
//! Loading --ready+100ms--> WarmingUp --ready+100ms+warm_up--> Active --+max_recorded--> Complete
//! ```
//!
//! All three timers are scheduled at once, from the instant [`ProfilerRun::workspace_ready`] is
//! called, and fire whenever the owner calls [`ProfilerRun::tick`] after their deadline. A late
//! tick fires every overdue timer in deadline order; nothing is retried or caught up. If the
//! engine refuses the profiler when recording should start, the run moves to [`Phase::Failed`]
//! and the completion timer is dropped.
//!
//! The engine's profiler callback slot is written only by the run: it is cleared at
//! construction, filled when recording starts, and cleared again on completion. Frame records
//! are dispatched to [`RunningStats`], [`Opcodes`], and [`Frames`] in delivery order. A record
//! with a negative or non-finite time is dropped before any of them sees it.
//!
//! [`ReplayRun`] is the read-only counterpart that rebuilds the tables from a [`SharePayload`]
//! without an engine or timers.

use core::fmt;
use core::time::Duration;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::aggregate::{FrameSink, Frames, Opcodes, RunningStats};
use crate::config::{ConfigError, RunConfig};
use crate::payload::{Fixture, PayloadError, SharePayload};
use crate::record::{FrameId, FrameRecord, RUNTIME_STEP, SymbolTable, Symbols};
use crate::schedule::{Clock, Scheduler};
use crate::stat::{StatRow, StatView};
use crate::table::{
    FramesTable, OpcodeTable, RunningStatsRow, RunningStatsView, StatTable, TableTarget,
    by_self_time_desc,
};

/// Callback the engine invokes for every profiler frame.
pub type FrameCallback = Box<dyn FnMut(&FrameRecord)>;

/// The engine refused a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineError {
    message: Box<str>,
}

impl EngineError {
    /// Creates an error with a human-readable message.
    #[must_use]
    pub fn new(message: impl Into<Box<str>>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine error: {}", self.message)
    }
}

impl std::error::Error for EngineError {}

/// Capabilities the run needs from the block-execution engine.
pub trait Engine {
    /// Turns on the engine's profiler and returns its symbol table.
    fn enable_profiling(&mut self) -> Result<Rc<dyn SymbolTable>, EngineError>;

    /// Installs `callback` in the profiler's frame slot, replacing any previous one.
    fn attach_profiler(&mut self, callback: FrameCallback) -> Result<(), EngineError>;

    /// Empties the profiler's frame slot.
    fn detach_profiler(&mut self);

    /// Starts executing the project (the green flag).
    fn start(&mut self);

    /// Stops every running script.
    fn stop_all(&mut self);

    /// Cancels the pending step-scheduling timer, if any.
    fn cancel_stepping(&mut self);
}

/// Failure of the run itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunError {
    /// The configuration is unusable.
    Config(ConfigError),
    /// The engine rejected a profiler operation.
    Engine(EngineError),
    /// [`ProfilerRun::workspace_ready`] was called more than once.
    AlreadyReady,
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(err) => write!(f, "invalid run configuration: {err}"),
            Self::Engine(err) => write!(f, "{err}"),
            Self::AlreadyReady => write!(f, "workspace was already reported ready"),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Engine(err) => Some(err),
            Self::AlreadyReady => None,
        }
    }
}

impl From<ConfigError> for RunError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<EngineError> for RunError {
    fn from(err: EngineError) -> Self {
        Self::Engine(err)
    }
}

/// Notification posted to the hosting context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunMessage {
    /// The run was created and waits for the project.
    #[serde(rename = "BENCH_MESSAGE_LOADING")]
    Loading,
    /// The project started; samples are not recorded yet.
    #[serde(rename = "BENCH_MESSAGE_WARMING_UP")]
    WarmingUp,
    /// Samples are being recorded.
    #[serde(rename = "BENCH_MESSAGE_ACTIVE")]
    Active,
    /// Recording finished.
    #[serde(rename = "BENCH_MESSAGE_COMPLETE")]
    Complete {
        /// Frame statistics by descending self time.
        frames: Vec<StatView>,
        /// Opcode statistics keyed by opcode.
        opcodes: BTreeMap<String, StatView>,
    },
}

/// Observer of a run.
pub trait RunListener {
    /// Receives a phase notification.
    fn message(&mut self, message: &RunMessage);

    /// Receives refreshed live counters, once per runtime step while recording.
    fn running_stats(&mut self, _row: &RunningStatsRow) {}

    /// Receives the final frame and opcode tables.
    fn tables(&mut self, _frames: &[StatRow], _opcodes: &[StatRow]) {}
}

/// Listener that ignores everything.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopListener;

impl RunListener for NoopListener {
    fn message(&mut self, _message: &RunMessage) {}
}

impl RunListener for Vec<RunMessage> {
    fn message(&mut self, message: &RunMessage) {
        self.push(message.clone());
    }
}

/// Phase of a [`ProfilerRun`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Waiting for the workspace to become ready.
    Loading,
    /// Running without recording.
    WarmingUp,
    /// Recording frame samples.
    Active,
    /// Finished; the payload is available.
    Complete,
    /// Torn down by the host; every later transition is ignored.
    Disposed,
    /// The engine refused the profiler; nothing was recorded.
    Failed,
}

impl Phase {
    /// Returns `true` once no further transition can happen.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Disposed | Self::Failed)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum PhaseTimer {
    WarmUp,
    Activate,
    Complete,
}

/// Aggregates and listener shared with the engine's frame callback.
struct Session {
    running_stats: RunningStats,
    frames: Frames,
    opcodes: Opcodes,
    view: RunningStatsView,
    step_id: Option<FrameId>,
    listener: Box<dyn RunListener>,
}

impl Session {
    fn record(&mut self, record: &FrameRecord) {
        if let Err(err) = record.validate() {
            warn!(frame = %record.id, %err, "dropped frame record");
            return;
        }
        if self.step_id == Some(record.id) {
            let row = self.view.render(&self.running_stats);
            self.listener.running_stats(&row);
        }

        let sinks: [(&str, &mut dyn FrameSink); 3] = [
            ("running_stats", &mut self.running_stats),
            ("opcodes", &mut self.opcodes),
            ("frames", &mut self.frames),
        ];
        for (sink, aggregate) in sinks {
            if let Err(err) = aggregate.update(record) {
                warn!(sink, frame = %record.id, %err, "dropped frame record");
            }
        }
    }

    fn opcode_map(&self) -> BTreeMap<String, StatView> {
        self.opcodes
            .iter()
            .map(|(k, v)| (k.to_owned(), v.clone()))
            .collect()
    }
}

/// One live profiling session.
pub struct ProfilerRun<E, C> {
    engine: E,
    config: RunConfig,
    session: Rc<RefCell<Session>>,
    timers: Scheduler<PhaseTimer, C>,
    phase: Phase,
    ready_at: Option<Duration>,
    payload: Option<SharePayload>,
}

impl<E: Engine, C: Clock> ProfilerRun<E, C> {
    /// Prepares a run and posts [`RunMessage::Loading`].
    ///
    /// Enables the engine's profiler and leaves its frame slot empty until recording starts.
    pub fn new(
        mut engine: E,
        config: RunConfig,
        clock: C,
        listener: impl RunListener + 'static,
    ) -> Result<Self, RunError> {
        config.validate()?;
        let view = RunningStatsView::new(config.max_recorded)
            .map_err(|_| RunError::Config(ConfigError::ZeroRecording))?;

        let symbols = engine.enable_profiling()?;
        engine.detach_profiler();

        let session = Session {
            running_stats: RunningStats::new(&*symbols),
            frames: Frames::new(Rc::clone(&symbols)),
            opcodes: Opcodes::new(),
            view,
            step_id: symbols.id_by_name(RUNTIME_STEP),
            listener: Box::new(listener),
        };

        let run = Self {
            engine,
            config,
            session: Rc::new(RefCell::new(session)),
            timers: Scheduler::new(clock),
            phase: Phase::Loading,
            ready_at: None,
            payload: None,
        };
        info!(project = %run.config.project_id, "loading");
        run.post(&RunMessage::Loading);
        Ok(run)
    }

    /// Reports that the engine's workspace is ready and schedules every phase.
    pub fn workspace_ready(&mut self) -> Result<(), RunError> {
        if self.phase == Phase::Disposed {
            return Ok(());
        }
        if self.ready_at.is_some() {
            return Err(RunError::AlreadyReady);
        }
        let base = self.timers.now();
        self.ready_at = Some(base);

        self.timers
            .schedule_at(base + self.config.warm_up_at(), PhaseTimer::WarmUp);
        self.timers
            .schedule_at(base + self.config.active_at(), PhaseTimer::Activate);
        self.timers
            .schedule_at(base + self.config.complete_at(), PhaseTimer::Complete);
        Ok(())
    }

    /// Fires every timer whose deadline has passed.
    ///
    /// An engine error while starting to record is fatal: the run moves to [`Phase::Failed`] and
    /// later ticks do nothing.
    pub fn tick(&mut self) -> Result<(), RunError> {
        while let Some(timer) = self.timers.pop_due() {
            self.fire(timer)?;
        }
        Ok(())
    }

    /// Marks the run as torn down. Pending and later timers do nothing.
    pub fn dispose(&mut self) {
        if self.phase != Phase::Disposed {
            info!(project = %self.config.project_id, from = ?self.phase, "disposed");
        }
        self.phase = Phase::Disposed;
        self.timers.clear();
    }

    fn fire(&mut self, timer: PhaseTimer) -> Result<(), RunError> {
        if self.phase.is_terminal() {
            return Ok(());
        }
        let elapsed = self.elapsed();
        match timer {
            PhaseTimer::WarmUp => {
                self.phase = Phase::WarmingUp;
                info!(project = %self.config.project_id, ?elapsed, "warming up");
                self.post(&RunMessage::WarmingUp);
                self.engine.start();
            }
            PhaseTimer::Activate => {
                info!(project = %self.config.project_id, ?elapsed, "recording");
                let session = Rc::clone(&self.session);
                let attached = self
                    .engine
                    .attach_profiler(Box::new(move |record: &FrameRecord| {
                        session.borrow_mut().record(record);
                    }));
                if let Err(err) = attached {
                    error!(project = %self.config.project_id, %err, "cannot attach profiler");
                    self.engine.stop_all();
                    self.engine.cancel_stepping();
                    self.timers.clear();
                    self.phase = Phase::Failed;
                    return Err(err.into());
                }
                self.phase = Phase::Active;
                self.post(&RunMessage::Active);
            }
            PhaseTimer::Complete => {
                self.engine.stop_all();
                self.engine.cancel_stepping();
                self.engine.detach_profiler();
                self.phase = Phase::Complete;
                info!(project = %self.config.project_id, ?elapsed, "complete");
                self.finish();
            }
        }
        Ok(())
    }

    fn finish(&mut self) {
        let mut session = self.session.borrow_mut();
        let mut frame_rows = Vec::new();
        let mut opcode_rows = Vec::new();
        StatTable::new(FramesTable::new(&session.frames)).render(&mut frame_rows);
        StatTable::new(OpcodeTable::new(&session.opcodes)).render(&mut opcode_rows);
        session.listener.tables(&frame_rows, &opcode_rows);

        let mut frames = session.frames.views().to_vec();
        frames.sort_by(by_self_time_desc);
        let opcodes = session.opcode_map();
        session.listener.message(&RunMessage::Complete {
            frames: frames.clone(),
            opcodes: opcodes.clone(),
        });
        self.payload = Some(SharePayload {
            fixture: Fixture::from(&self.config),
            frames,
            opcodes,
        });
    }

    fn post(&self, message: &RunMessage) {
        self.session.borrow_mut().listener.message(message);
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the run's configuration.
    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Returns the engine.
    #[must_use]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Returns the engine mutably, e.g. to pump its scheduler.
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Returns the time since [`ProfilerRun::workspace_ready`], or zero before it.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.ready_at
            .map_or(Duration::ZERO, |base| self.timers.now().saturating_sub(base))
    }

    /// Returns the deadline of the next pending phase transition.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.next_deadline()
    }

    /// Returns a copy of the live counters.
    #[must_use]
    pub fn running_stats(&self) -> RunningStats {
        self.session.borrow().running_stats.clone()
    }

    /// Returns a copy of the frame statistics.
    #[must_use]
    pub fn frames(&self) -> Vec<StatView> {
        self.session.borrow().frames.views().to_vec()
    }

    /// Returns a copy of the opcode statistics.
    #[must_use]
    pub fn opcodes(&self) -> BTreeMap<String, StatView> {
        self.session.borrow().opcode_map()
    }

    /// Renders the frame table into `target`.
    pub fn render_frames(&self, target: &mut impl TableTarget) {
        StatTable::new(FramesTable::new(&self.session.borrow().frames)).render(target);
    }

    /// Renders the opcode table into `target`.
    pub fn render_opcodes(&self, target: &mut impl TableTarget) {
        StatTable::new(OpcodeTable::new(&self.session.borrow().opcodes)).render(target);
    }

    /// Returns the share payload once the run is complete.
    #[must_use]
    pub fn payload(&self) -> Option<&SharePayload> {
        self.payload.as_ref()
    }
}

impl<E: fmt::Debug, C: Clock> fmt::Debug for ProfilerRun<E, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfilerRun")
            .field("engine", &self.engine)
            .field("config", &self.config)
            .field("phase", &self.phase)
            .field("pending_timers", &self.timers.len())
            .finish_non_exhaustive()
    }
}

/// Read-only tables rebuilt from a [`SharePayload`].
#[derive(Debug)]
pub struct ReplayRun {
    fixture: Fixture,
    frames: Frames,
    opcodes: Opcodes,
}

impl ReplayRun {
    /// Rebuilds the tables from `payload`.
    ///
    /// With `symbols`, frame names are normalized through the engine's table (name to id and
    /// back); names the table does not know are kept as recorded.
    #[must_use]
    pub fn from_payload(payload: SharePayload, symbols: Option<Rc<dyn SymbolTable>>) -> Self {
        let symbols: Rc<dyn SymbolTable> = match symbols {
            Some(symbols) => symbols,
            None => Rc::new(Symbols::new()),
        };
        let frames_views = payload
            .frames
            .into_iter()
            .map(|mut view| {
                if let Some(name) = symbols
                    .id_by_name(&view.name)
                    .and_then(|id| symbols.name_by_id(id))
                {
                    view.name = name.to_owned();
                }
                view
            })
            .collect();

        let mut frames = Frames::new(symbols);
        frames.replace(frames_views);
        let mut opcodes = Opcodes::new();
        opcodes.replace(payload.opcodes);

        Self {
            fixture: payload.fixture,
            frames,
            opcodes,
        }
    }

    /// Decodes a share link and rebuilds the tables.
    ///
    /// Malformed links are an error rather than an empty replay.
    pub fn from_fragment(link: &str) -> Result<Self, PayloadError> {
        Ok(Self::from_payload(SharePayload::from_share_link(link)?, None))
    }

    /// Returns the recorded parameters.
    #[must_use]
    pub fn fixture(&self) -> &Fixture {
        &self.fixture
    }

    /// Returns the frame statistics.
    #[must_use]
    pub fn frames(&self) -> &Frames {
        &self.frames
    }

    /// Returns the opcode statistics.
    #[must_use]
    pub fn opcodes(&self) -> &Opcodes {
        &self.opcodes
    }

    /// Renders the frame table into `target`.
    pub fn render_frames(&self, target: &mut impl TableTarget) {
        StatTable::new(FramesTable::new(&self.frames)).render(target);
    }

    /// Renders the opcode table into `target`.
    pub fn render_opcodes(&self, target: &mut impl TableTarget) {
        StatTable::new(OpcodeTable::new(&self.opcodes)).render(target);
    }
}
