// Copyright 2026 the Block Profiler Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use block_profiler::record::{BLOCK_FUNCTION, RUNTIME_STEP, STEP_THREADS, STEP_THREADS_INNER};
use block_profiler::{
    Engine, EngineError, FrameCallback, FrameId, FrameRecord, FrameSink, Frames, FramesTable,
    MiddlewareChain, NoopListener, Opcodes, Phase, ProfilerRun, RunConfig, StatRow, StatTable,
    SymbolTable, Symbols, VirtualClock,
};
use std::rc::Rc;

/// Entry point for `block_profiler` wind-tunnel benchmarks.
///
/// Covers the per-frame hot path (every record the engine reports during recording goes through
/// it), interceptor dispatch around loaders, and final table rendering.
fn bench_dispatch(c: &mut Criterion) {
    bench_run_dispatch(c);
    bench_opcode_aggregation(c);
    bench_middleware_depth(c);
    bench_frames_render(c);
}

struct PumpEngine {
    symbols: Rc<Symbols>,
    records: Vec<FrameRecord>,
    callback: Option<FrameCallback>,
}

impl PumpEngine {
    fn new(opcodes: usize) -> Self {
        let mut symbols = Symbols::new();
        let step_threads = symbols.intern(STEP_THREADS);
        let inner = symbols.intern(STEP_THREADS_INNER);
        let block_function = symbols.intern(BLOCK_FUNCTION);
        let runtime_step = symbols.intern(RUNTIME_STEP);

        let mut records = vec![
            FrameRecord::step(runtime_step, 0.1, 16.0, 1),
            FrameRecord::step(step_threads, 0.2, 15.0, 1),
            FrameRecord::step(inner, 0.3, 14.0, 4),
        ];
        for i in 0..opcodes {
            records.push(FrameRecord::block_call(
                block_function,
                &format!("opcode_{i}"),
                0.01,
                0.01,
                8,
            ));
        }
        Self {
            symbols: Rc::new(symbols),
            records,
            callback: None,
        }
    }

    fn pump(&mut self) {
        if let Some(callback) = self.callback.as_mut() {
            for record in &self.records {
                callback(record);
            }
        }
    }
}

impl Engine for PumpEngine {
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

    fn start(&mut self) {}

    fn stop_all(&mut self) {}

    fn cancel_stepping(&mut self) {}
}

/// One engine step's worth of records through a recording run.
///
/// Includes the live-counter render on `Runtime._step` and all three aggregators.
fn bench_run_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("run_dispatch");
    for &opcodes in &[8_usize, 64, 256] {
        let clock = VirtualClock::new();
        let mut run = ProfilerRun::new(
            PumpEngine::new(opcodes),
            RunConfig::default(),
            &clock,
            NoopListener,
        )
        .unwrap();
        run.workspace_ready().unwrap();
        clock.advance(run.config().active_at());
        run.tick().unwrap();
        assert_eq!(run.phase(), Phase::Active, "recording before measuring");

        group.bench_with_input(BenchmarkId::from_parameter(opcodes), &opcodes, |b, _| {
            b.iter(|| run.engine_mut().pump());
        });
    }
    group.finish();
}

/// Opcode aggregation alone, with a growing number of distinct opcodes.
fn bench_opcode_aggregation(c: &mut Criterion) {
    let mut group = c.benchmark_group("opcode_update");
    for &distinct in &[8_usize, 64, 256] {
        let records: Vec<FrameRecord> = (0..distinct)
            .map(|i| FrameRecord::block_call(FrameId::new(2), &format!("op_{i}"), 0.01, 0.01, 1))
            .collect();
        let mut opcodes = Opcodes::new();
        group.bench_with_input(BenchmarkId::from_parameter(distinct), &distinct, |b, _| {
            b.iter(|| {
                for record in &records {
                    opcodes.update(black_box(record)).unwrap();
                }
            });
        });
    }
    group.finish();
}

/// Cost of a call through `depth` pass-through interceptors.
fn bench_middleware_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("middleware_depth");
    for &depth in &[0_usize, 4, 16] {
        let chain: MiddlewareChain<u64, u64> = MiddlewareChain::new();
        for _ in 0..depth {
            chain.push(|x, next| next.run(x.wrapping_add(1)));
        }
        let wrapped = chain.install((), |_, x| x);
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| wrapped.call(black_box(1)));
        });
    }
    group.finish();
}

/// Sorting and formatting the frame table.
fn bench_frames_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("frames_render");
    for &len in &[16_usize, 256, 1_024] {
        let mut symbols = Symbols::new();
        let ids: Vec<FrameId> = (0..len).map(|i| symbols.intern(&format!("frame_{i}"))).collect();
        let mut frames = Frames::new(Rc::new(symbols));
        for (i, id) in ids.into_iter().enumerate() {
            let t = (i % 97) as f64 * 0.013;
            frames.update(&FrameRecord::step(id, t, t * 2.0, 1)).unwrap();
        }
        let mut rows: Vec<StatRow> = Vec::new();
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, _| {
            b.iter(|| StatTable::new(FramesTable::new(&frames)).render(&mut rows));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_dispatch);
criterion_main!(benches);
