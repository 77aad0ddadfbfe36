// Copyright 2026 the Block Profiler Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Aggregators over the frame record stream.
//!
//! [`Frames`], [`Opcodes`], and [`RunningStats`] all consume the same records and differ only in
//! how they pick a key and what they keep. A run owns one of each and feeds every record to all
//! three, in delivery order.

use std::rc::Rc;

use hashbrown::HashMap;

use crate::record::{
    BLOCK_FUNCTION, FrameId, FrameRecord, STEP_THREADS, STEP_THREADS_INNER, SymbolTable,
    unresolved_label,
};
use crate::stat::{StatError, StatView};

/// Consumer of frame records.
pub trait FrameSink {
    /// Folds one record into the aggregate.
    ///
    /// A record that fails [`FrameRecord::validate`] is rejected as a whole and leaves the
    /// aggregate unchanged.
    fn update(&mut self, record: &FrameRecord) -> Result<(), StatError>;
}

/// Per-call-site statistics keyed by the frame's display name.
///
/// Distinct ids that resolve to the same name share one [`StatView`]. Views are kept in order of
/// first appearance.
pub struct Frames {
    symbols: Rc<dyn SymbolTable>,
    frames: Vec<StatView>,
}

impl Frames {
    /// Creates an empty aggregate resolving names through `symbols`.
    #[must_use]
    pub fn new(symbols: Rc<dyn SymbolTable>) -> Self {
        Self {
            symbols,
            frames: Vec::new(),
        }
    }

    /// Returns the views in order of first appearance.
    #[must_use]
    pub fn views(&self) -> &[StatView] {
        &self.frames
    }

    /// Returns the view named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&StatView> {
        self.frames.iter().find(|f| f.name == name)
    }

    /// Replaces the collected views, e.g. when replaying a payload.
    pub fn replace(&mut self, frames: Vec<StatView>) {
        self.frames = frames;
    }

    fn find_or_insert(&mut self, name: &str) -> &mut StatView {
        let index = match self.frames.iter().position(|f| f.name == name) {
            Some(index) => index,
            None => {
                self.frames.push(StatView::new(name));
                self.frames.len() - 1
            }
        };
        &mut self.frames[index]
    }
}

impl FrameSink for Frames {
    fn update(&mut self, record: &FrameRecord) -> Result<(), StatError> {
        record.validate()?;
        let symbols = Rc::clone(&self.symbols);
        let view = match symbols.name_by_id(record.id) {
            Some(name) => self.find_or_insert(name),
            None => self.find_or_insert(&unresolved_label(record.id)),
        };
        view.update(record.self_time, record.total_time, record.count)
    }
}

impl core::fmt::Debug for Frames {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Frames")
            .field("frames", &self.frames)
            .finish_non_exhaustive()
    }
}

/// Per-opcode statistics.
///
/// Records without an opcode are ignored.
#[derive(Clone, Debug, Default)]
pub struct Opcodes {
    opcodes: HashMap<String, StatView>,
}

impl Opcodes {
    /// Creates an empty aggregate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the view for `opcode`.
    #[must_use]
    pub fn get(&self, opcode: &str) -> Option<&StatView> {
        self.opcodes.get(opcode)
    }

    /// Iterates over every `(opcode, view)` pair in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &StatView)> + '_ {
        self.opcodes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the number of distinct opcodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.opcodes.len()
    }

    /// Returns `true` if no opcode has been observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.opcodes.is_empty()
    }

    /// Replaces the collected views, e.g. when replaying a payload.
    pub fn replace(&mut self, opcodes: impl IntoIterator<Item = (String, StatView)>) {
        self.opcodes = opcodes.into_iter().collect();
    }
}

impl FrameSink for Opcodes {
    fn update(&mut self, record: &FrameRecord) -> Result<(), StatError> {
        let Some(opcode) = record.kind.opcode() else {
            return Ok(());
        };
        record.validate()?;
        self.opcodes
            .entry_ref(opcode)
            .or_insert_with(|| StatView::new(opcode))
            .update(record.self_time, record.total_time, record.count)
    }
}

/// Executed-work counters.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Executed {
    /// Thread steps taken by the sequencer.
    pub steps: u64,
    /// Blocks executed.
    pub blocks: u64,
}

/// Run-level counters bound to three fixed call sites.
///
/// The anchors are resolved once at construction. An anchor the engine does not know is never
/// matched, so updates for it are no-ops.
#[derive(Clone, Debug, Default)]
pub struct RunningStats {
    step_threads: Option<FrameId>,
    step_threads_inner: Option<FrameId>,
    block_function: Option<FrameId>,
    /// Accumulated total time of the outer step loop, in milliseconds.
    pub recorded_time: f64,
    /// Executed-work counters.
    pub executed: Executed,
}

impl RunningStats {
    /// Creates counters anchored on the well-known sequencer and block frames.
    #[must_use]
    pub fn new(symbols: &dyn SymbolTable) -> Self {
        Self {
            step_threads: symbols.id_by_name(STEP_THREADS),
            step_threads_inner: symbols.id_by_name(STEP_THREADS_INNER),
            block_function: symbols.id_by_name(BLOCK_FUNCTION),
            ..Self::default()
        }
    }
}

impl FrameSink for RunningStats {
    fn update(&mut self, record: &FrameRecord) -> Result<(), StatError> {
        record.validate()?;
        let id = Some(record.id);
        if id == self.step_threads {
            self.recorded_time += record.total_time;
        } else if id == self.step_threads_inner {
            self.executed.steps = self.executed.steps.saturating_add(record.count);
        } else if id == self.block_function {
            self.executed.blocks = self.executed.blocks.saturating_add(record.count);
        }
        Ok(())
    }
}
