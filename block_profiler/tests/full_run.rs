// Copyright 2026 the Block Profiler Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Drives a scripted engine through a complete run on a virtual clock.

use std::cell::RefCell;
use std::rc::Rc;

use block_profiler::record::{BLOCK_FUNCTION, RUNTIME_STEP, STEP_THREADS, STEP_THREADS_INNER};
use block_profiler::{
    Engine, EngineError, FrameCallback, FrameId, FrameRecord, Phase, ProfilerRun, ReplayRun,
    RunConfig, RunListener, RunMessage, RunningStatsRow, StatRow, SymbolTable, Symbols,
    VirtualClock,
};

struct ScriptedEngine {
    symbols: Rc<Symbols>,
    ids: [FrameId; 4],
    callback: Option<FrameCallback>,
    running: bool,
    stepping: bool,
}

impl ScriptedEngine {
    fn new() -> Self {
        let mut symbols = Symbols::new();
        let ids = [
            symbols.intern(STEP_THREADS),
            symbols.intern(STEP_THREADS_INNER),
            symbols.intern(BLOCK_FUNCTION),
            symbols.intern(RUNTIME_STEP),
        ];
        Self {
            symbols: Rc::new(symbols),
            ids,
            callback: None,
            running: false,
            stepping: false,
        }
    }

    /// One engine step: the records a real profiler reports after a frame.
    fn step(&mut self) {
        if !self.running {
            return;
        }
        let [step_threads, inner, block_function, runtime_step] = self.ids;
        let Some(callback) = self.callback.as_mut() else {
            return;
        };
        callback(&FrameRecord::step(runtime_step, 0.5, 16.0, 1));
        callback(&FrameRecord::step(step_threads, 1.0, 15.0, 1));
        callback(&FrameRecord::step(inner, 2.0, 14.0, 3));
        callback(&FrameRecord::block_call(
            block_function,
            "motion_movesteps",
            0.25,
            0.25,
            40,
        ));
        callback(&FrameRecord::block_call(
            block_function,
            "looks_say",
            0.125,
            0.125,
            2,
        ));
    }

    /// Reports a single record, as a misbehaving profiler might.
    fn emit(&mut self, record: &FrameRecord) {
        if let Some(callback) = self.callback.as_mut() {
            callback(record);
        }
    }
}

impl Engine for ScriptedEngine {
    fn enable_profiling(&mut self) -> Result<Rc<dyn SymbolTable>, EngineError> {
        Ok(self.symbols.clone())
    }

    fn attach_profiler(&mut self, callback: FrameCallback) -> Result<(), EngineError> {
        self.callback = Some(callback);
        Ok(())
    }

    fn detach_profiler(&mut self) {
        self.callback = None;
    }

    fn start(&mut self) {
        self.running = true;
        self.stepping = true;
    }

    fn stop_all(&mut self) {
        self.running = false;
    }

    fn cancel_stepping(&mut self) {
        self.stepping = false;
    }
}

#[derive(Default)]
struct Observed {
    messages: Vec<RunMessage>,
    live: Vec<RunningStatsRow>,
    frame_rows: Vec<StatRow>,
}

#[derive(Clone, Default)]
struct Observer(Rc<RefCell<Observed>>);

impl RunListener for Observer {
    fn message(&mut self, message: &RunMessage) {
        self.0.borrow_mut().messages.push(message.clone());
    }

    fn running_stats(&mut self, row: &RunningStatsRow) {
        self.0.borrow_mut().live.push(row.clone());
    }

    fn tables(&mut self, frames: &[StatRow], _opcodes: &[StatRow]) {
        self.0.borrow_mut().frame_rows = frames.to_vec();
    }
}

fn complete_count(observer: &Observer) -> usize {
    observer
        .0
        .borrow()
        .messages
        .iter()
        .filter(|m| matches!(m, RunMessage::Complete { .. }))
        .count()
}

#[test]
fn default_run_walks_every_phase() {
    let clock = VirtualClock::new();
    let observer = Observer::default();
    let mut run = ProfilerRun::new(
        ScriptedEngine::new(),
        RunConfig::default(),
        &clock,
        observer.clone(),
    )
    .expect("valid run");
    assert_eq!(observer.0.borrow().messages, [RunMessage::Loading]);
    assert!(run.engine().callback.is_none(), "detached while loading");

    run.workspace_ready().expect("first ready");

    clock.advance_ms(100);
    run.tick().expect("warm up");
    assert_eq!(run.phase(), Phase::WarmingUp);
    assert!(run.engine().running, "project started");
    assert!(
        run.engine().callback.is_none(),
        "not recording during warm-up"
    );
    run.engine_mut().step();
    assert_eq!(run.running_stats().executed.steps, 0, "warm-up is not counted");

    clock.advance_ms(4000);
    run.tick().expect("activate");
    assert_eq!(run.phase(), Phase::Active);
    assert!(run.engine().callback.is_some(), "recording after warm-up");

    for _ in 0..3 {
        run.engine_mut().step();
        clock.advance_ms(16);
        run.tick().expect("nothing due yet");
    }
    let stats = run.running_stats();
    assert_eq!(stats.executed.steps, 9);
    assert_eq!(stats.executed.blocks, 126);
    assert_eq!(stats.recorded_time, 45.0);
    assert_eq!(observer.0.borrow().live.len(), 3, "one live row per step");
    assert_eq!(complete_count(&observer), 0, "not complete yet");

    clock.advance_ms(6000);
    run.tick().expect("complete");
    assert_eq!(run.phase(), Phase::Complete);
    assert!(run.engine().callback.is_none(), "detached on completion");
    assert!(!run.engine().running, "scripts stopped");
    assert!(!run.engine().stepping, "stepping cancelled");
    assert_eq!(complete_count(&observer), 1);

    run.engine_mut().step();
    clock.advance_ms(60_000);
    run.tick().expect("nothing left");
    assert_eq!(complete_count(&observer), 1, "complete is posted once");

    let observed = observer.0.borrow();
    let types: Vec<&RunMessage> = observed.messages.iter().take(3).collect();
    assert_eq!(
        types,
        [&RunMessage::Loading, &RunMessage::WarmingUp, &RunMessage::Active]
    );
    let Some(RunMessage::Complete { frames, opcodes }) = observed.messages.last() else {
        panic!("last message is the completion");
    };
    assert_eq!(frames.len(), 4, "every frame kind recorded");
    let names: Vec<&str> = frames.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(
        names,
        [STEP_THREADS_INNER, STEP_THREADS, RUNTIME_STEP, BLOCK_FUNCTION],
        "sorted by self time"
    );
    let movesteps = &opcodes["motion_movesteps"];
    assert_eq!(movesteps.executions, 120);
    assert_eq!(movesteps.self_time, 0.75);
    assert_eq!(observed.frame_rows[0].name, STEP_THREADS_INNER, "sorted by self time");
}

#[test]
fn payload_replays_to_the_same_tables() {
    let clock = VirtualClock::new();
    let config = RunConfig::from_fragment("#130041250,0,50").expect("valid fragment");
    let mut run = ProfilerRun::new(
        ScriptedEngine::new(),
        config,
        &clock,
        Vec::<RunMessage>::new(),
    )
    .expect("valid run");
    run.workspace_ready().expect("first ready");

    clock.advance_ms(100);
    run.tick().expect("warm up and activate");
    assert_eq!(run.phase(), Phase::Active, "zero warm-up activates at once");
    run.engine_mut().step();
    clock.advance_ms(50);
    run.tick().expect("complete");

    let mut live_rows: Vec<StatRow> = Vec::new();
    run.render_frames(&mut live_rows);

    let link = run
        .payload()
        .expect("payload after completion")
        .share_link()
        .expect("encodes");
    let replay = ReplayRun::from_fragment(&link).expect("decodes");
    assert_eq!(replay.fixture().project_id, "130041250");
    assert_eq!(replay.fixture().recording_time, 50);

    let mut replay_rows: Vec<StatRow> = Vec::new();
    replay.render_frames(&mut replay_rows);
    assert_eq!(replay_rows, live_rows);
    assert_eq!(replay.opcodes().len(), 2);
}

#[test]
fn bad_records_are_dropped_without_stopping_the_run() {
    let clock = VirtualClock::new();
    let observer = Observer::default();
    let mut run = ProfilerRun::new(
        ScriptedEngine::new(),
        RunConfig::default(),
        &clock,
        observer.clone(),
    )
    .expect("valid run");
    run.workspace_ready().expect("first ready");
    clock.advance(run.config().active_at());
    run.tick().expect("activate");
    assert_eq!(run.phase(), Phase::Active);
    run.engine_mut().step();

    let stats = run.running_stats();
    let frames = run.frames();
    let opcodes = run.opcodes();

    let [step_threads, _, block_function, _] = run.engine().ids;
    run.engine_mut().emit(&FrameRecord::block_call(
        block_function,
        "looks_say",
        -1.0,
        1.0,
        5,
    ));
    run.engine_mut().emit(&FrameRecord::block_call(
        block_function,
        "pen_stamp",
        1.0,
        f64::NAN,
        5,
    ));
    run.engine_mut().emit(&FrameRecord::step(step_threads, 1.0, -16.0, 1));

    assert_eq!(run.running_stats().executed, stats.executed, "counters untouched");
    assert_eq!(run.running_stats().recorded_time, stats.recorded_time);
    assert_eq!(run.frames(), frames, "no new or changed frame rows");
    assert_eq!(run.opcodes(), opcodes, "no new or changed opcode rows");
    assert!(!run.opcodes().contains_key("pen_stamp"), "no phantom opcode");

    clock.advance(run.config().complete_at());
    run.tick().expect("complete");
    assert_eq!(run.phase(), Phase::Complete);
    assert_eq!(complete_count(&observer), 1);
    let payload = run.payload().expect("payload after completion");
    assert_eq!(payload.opcodes["looks_say"].executions, 2);
    assert_eq!(payload.frames.len(), 4);
}
