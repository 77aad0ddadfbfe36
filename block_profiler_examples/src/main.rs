// Copyright 2026 the Block Profiler Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Runs a simulated profiling session on a virtual clock, or replays a share link.
//!
//! ```text
//! block_profiler_demo --warm-up-ms 500 --recording-ms 2000
//! block_profiler_demo --fragment '#my_project,500,2000'
//! block_profiler_demo replay '#view/eyJmaXh0dXJlIjp7...'
//! ```

mod sim;

use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use block_profiler::{
    Fragment, ProfilerRun, ReplayRun, RunConfig, RunListener, RunMessage, RunningStatsRow,
    StatRow, TableTarget, TextTable, VirtualClock,
};
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Project identifier to load.
    #[arg(long)]
    project: Option<String>,

    /// Warm-up time in milliseconds.
    #[arg(long)]
    warm_up_ms: Option<u64>,

    /// Recording window in milliseconds.
    #[arg(long)]
    recording_ms: Option<u64>,

    /// A location fragment (`projectId,warmUpMs,recordingMs` or `view/<payload>`).
    #[arg(long, conflicts_with_all = ["project", "warm_up_ms", "recording_ms"])]
    fragment: Option<String>,

    /// Simulated frame length in milliseconds.
    #[arg(long, default_value_t = 16)]
    frame_ms: u64,

    /// Print the completion message as JSON instead of text tables.
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rebuild the tables from a share link or a bare encoded payload.
    Replay {
        /// `#view/<payload>`, a URL ending in one, or the payload itself.
        link: String,
    },
}

/// Prints phase changes and the final tables.
struct ConsoleListener {
    json: bool,
    steps_seen: u64,
}

impl RunListener for ConsoleListener {
    fn message(&mut self, message: &RunMessage) {
        if self.json {
            if let RunMessage::Complete { .. } = message {
                match serde_json::to_string_pretty(message) {
                    Ok(json) => println!("{json}"),
                    Err(err) => tracing::error!(%err, "cannot serialize completion"),
                }
            }
            return;
        }
        match message {
            RunMessage::Loading => println!("loading..."),
            RunMessage::WarmingUp => println!("warming up..."),
            RunMessage::Active => println!("recording..."),
            RunMessage::Complete { frames, opcodes } => {
                println!(
                    "complete: {} frames, {} opcodes",
                    frames.len(),
                    opcodes.len()
                );
            }
        }
    }

    fn running_stats(&mut self, row: &RunningStatsRow) {
        self.steps_seen += 1;
        if self.steps_seen.is_multiple_of(60) {
            info!(
                steps = row.steps,
                blocks = row.blocks,
                recorded_s = %row.recorded_seconds,
                progress = format_args!("{:.0}%", row.progress_percent),
                "recording"
            );
        }
    }

    fn tables(&mut self, frames: &[StatRow], opcodes: &[StatRow]) {
        if self.json {
            return;
        }
        print_table("frames", frames);
        print_table("opcodes", opcodes);
    }
}

fn print_table(title: &str, rows: &[StatRow]) {
    let mut table = TextTable::new();
    for row in rows {
        table.push_row(row.clone());
    }
    println!("\n{title}\n{table}");
}

impl Cli {
    fn fragment(&self) -> Result<Option<Fragment<'_>>> {
        self.fragment
            .as_deref()
            .map(Fragment::parse)
            .transpose()
            .context("invalid --fragment")
    }

    fn run_config(&self) -> RunConfig {
        let mut config = RunConfig::default();
        if let Some(project) = &self.project {
            config.project_id.clone_from(project);
        }
        if let Some(ms) = self.warm_up_ms {
            config.warm_up = Duration::from_millis(ms);
        }
        if let Some(ms) = self.recording_ms {
            config.max_recorded = Duration::from_millis(ms);
        }
        config
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Some(Command::Replay { link }) = &cli.command {
        return replay(link);
    }
    match cli.fragment()? {
        Some(Fragment::View(encoded)) => replay(&format!("#view/{encoded}")),
        Some(Fragment::Run(config)) => simulate(config, &cli),
        None => simulate(cli.run_config(), &cli),
    }
}

fn simulate(config: RunConfig, cli: &Cli) -> Result<()> {
    config.validate().context("invalid run configuration")?;
    if cli.frame_ms == 0 {
        bail!("--frame-ms must be positive");
    }

    let clock = Rc::new(VirtualClock::new());
    let listener = ConsoleListener {
        json: cli.json,
        steps_seen: 0,
    };
    let mut run = ProfilerRun::new(sim::SimEngine::new(), config, Rc::clone(&clock), listener)?;

    let loaded =
        sim::load_project(&clock, &run.config().project_id).context("cannot load project")?;
    info!(
        assets = loaded.hydrate_complete,
        downloads = loaded.content_complete,
        peak_memory = loaded.memory_peak,
        load_end = ?loaded.timings.load_end,
        "project loaded"
    );

    run.workspace_ready()?;
    let frame = Duration::from_millis(cli.frame_ms);
    let frame_ms = cli.frame_ms as f64;
    while run.payload().is_none() {
        if run.next_deadline().is_none() {
            bail!("run stopped in {:?} before completing", run.phase());
        }
        run.engine_mut().step(frame_ms);
        clock.advance(frame);
        run.tick()?;
    }

    if let Some(payload) = run.payload()
        && !cli.json
    {
        println!("\nshare: {}", payload.share_link()?);
    }
    Ok(())
}

fn replay(link: &str) -> Result<()> {
    let link = link.trim();
    let replay = if link.contains("view/") {
        ReplayRun::from_fragment(link)
    } else {
        ReplayRun::from_fragment(&format!("#view/{link}"))
    }
    .context("cannot decode share link")?;

    let fixture = replay.fixture();
    println!(
        "{} (warm-up {} ms, recording {} ms)",
        fixture.project_id, fixture.warm_up_time, fixture.recording_time
    );
    let mut frames = TextTable::new();
    replay.render_frames(&mut frames);
    let mut opcodes = TextTable::new();
    replay.render_opcodes(&mut opcodes);
    println!("\nframes\n{frames}\nopcodes\n{opcodes}");
    Ok(())
}
