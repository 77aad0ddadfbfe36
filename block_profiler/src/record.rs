// Copyright 2026 the Block Profiler Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame records and the engine's symbol table.
//!
//! The engine's profiler identifies call sites by small integer ids. Records carry the id, an
//! optional opcode payload, and the timing observed for one or more executions of that site.

use core::fmt;

use hashbrown::HashMap;

use crate::stat::{StatError, check_times};

/// Outer step loop of the sequencer. Its total time is the run's recorded time.
pub const STEP_THREADS: &str = "Sequencer.stepThreads";
/// Inner step loop of the sequencer. Its count is the number of thread steps.
pub const STEP_THREADS_INNER: &str = "Sequencer.stepThreads#inner";
/// Per-block execution frame. Its count is the number of executed blocks.
pub const BLOCK_FUNCTION: &str = "blockFunction";
/// One runtime step. Live counters are refreshed whenever this frame is observed.
pub const RUNTIME_STEP: &str = "Runtime._step";

/// Identifier for a call site in the engine's profiler.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct FrameId(u32);

impl FrameId {
    /// Creates a new frame id.
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw integer backing this id.
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payload attached to a frame record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameKind {
    /// A frame without an opcode (sequencer loops, runtime steps, and so on).
    Step,
    /// A block call carrying the opcode of the executed block.
    BlockCall {
        /// Opcode of the block, e.g. `motion_movesteps`.
        opcode: Box<str>,
    },
}

impl FrameKind {
    /// Returns the opcode for block calls.
    #[must_use]
    #[inline]
    pub fn opcode(&self) -> Option<&str> {
        match self {
            Self::Step => None,
            Self::BlockCall { opcode } => Some(opcode),
        }
    }
}

/// One profiler-emitted sample.
///
/// Times are in milliseconds. The producer owns the relationship between `self_time` and
/// `total_time`; nothing here enforces `total_time >= self_time`.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameRecord {
    /// Call site identity.
    pub id: FrameId,
    /// Optional opcode payload.
    pub kind: FrameKind,
    /// Time spent in the call site excluding callees.
    pub self_time: f64,
    /// Time spent in the call site including callees.
    pub total_time: f64,
    /// Number of executions covered by this sample.
    pub count: u64,
}

impl FrameRecord {
    /// Creates a record for a frame without an opcode.
    #[must_use]
    pub fn step(id: FrameId, self_time: f64, total_time: f64, count: u64) -> Self {
        Self {
            id,
            kind: FrameKind::Step,
            self_time,
            total_time,
            count,
        }
    }

    /// Creates a record for a block call.
    #[must_use]
    pub fn block_call(
        id: FrameId,
        opcode: &str,
        self_time: f64,
        total_time: f64,
        count: u64,
    ) -> Self {
        Self {
            id,
            kind: FrameKind::BlockCall {
                opcode: opcode.into(),
            },
            self_time,
            total_time,
            count,
        }
    }

    /// Checks that both times are finite and non-negative.
    ///
    /// Aggregators reject the whole record when this fails, so a bad sample never leaves a
    /// partial update behind.
    pub fn validate(&self) -> Result<(), StatError> {
        check_times(self.self_time, self.total_time)
    }
}

/// Name lookup exposed by the engine's profiler.
pub trait SymbolTable {
    /// Resolves a call-site name to its id.
    ///
    /// Returns `None` if the engine never registered that name.
    fn id_by_name(&self, name: &str) -> Option<FrameId>;

    /// Resolves an id to its display name.
    fn name_by_id(&self, id: FrameId) -> Option<&str>;
}

/// Interning symbol table.
///
/// Ids are dense and assigned in registration order. Names are never removed.
#[derive(Clone, Debug, Default)]
pub struct Symbols {
    names: Vec<Box<str>>,
    ids: HashMap<Box<str>, FrameId>,
}

impl Symbols {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `name` and returns its id.
    ///
    /// If the name was previously interned, returns the existing id.
    ///
    /// # Panics
    ///
    /// Panics if the table already holds `u32::MAX + 1` names. Use [`Symbols::try_intern`] where
    /// the number of names is not bounded.
    pub fn intern(&mut self, name: &str) -> FrameId {
        match self.try_intern(name) {
            Some(id) => id,
            None => panic!("symbol table is full ({} names)", self.names.len()),
        }
    }

    /// Interns `name`, or returns `None` if every id is taken.
    ///
    /// A name that was previously interned always resolves.
    pub fn try_intern(&mut self, name: &str) -> Option<FrameId> {
        if let Some(id) = self.ids.get(name) {
            return Some(*id);
        }
        let id = next_id(self.names.len())?;
        self.names.push(name.into());
        self.ids.insert(name.into(), id);
        Some(id)
    }

    /// Returns the number of interned names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns `true` if no names have been interned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<'a> FromIterator<&'a str> for Symbols {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut symbols = Self::new();
        for name in iter {
            symbols.intern(name);
        }
        symbols
    }
}

impl SymbolTable for Symbols {
    fn id_by_name(&self, name: &str) -> Option<FrameId> {
        self.ids.get(name).copied()
    }

    fn name_by_id(&self, id: FrameId) -> Option<&str> {
        self.names.get(id.as_u32() as usize).map(|n| &**n)
    }
}

/// Id for the name registered after `len` others, if it fits.
fn next_id(len: usize) -> Option<FrameId> {
    u32::try_from(len).ok().map(FrameId::new)
}

/// Fallback label for ids the symbol table cannot resolve.
pub(crate) fn unresolved_label(id: FrameId) -> String {
    format!("frame:{id}")
}
