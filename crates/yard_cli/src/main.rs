use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use yard_core::{
    MemorySettingsStore, SettingsRepository, SettingsStore, StructureProvider, YardId, YardState,
};
use yard_runtime::{
    compute_draw_frame, Pipeline, PipelineRunner, Session, SessionConfig, SessionHandle,
    StatsKind, StatsScanner, TickOutcome, SCAN_PLACEHOLDER,
};
use yard_world::{
    generate_scrapyard, load_config, load_scenario, JsonSettingsStore, RecordingBroadcast,
    SandboxTools, SandboxWorld, Scenario,
};

const TICK: Duration = Duration::from_millis(100);
const STATS_POLL_LIMIT: u32 = 1_000;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "yard_cli", about = "Headless construction yard driver")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Weld,
    Grind,
}

impl Mode {
    fn state(self) -> YardState {
        match self {
            Mode::Weld => YardState::Weld,
            Mode::Grind => YardState::Grind,
        }
    }

    fn stats_kind(self) -> StatsKind {
        match self {
            Mode::Weld => StatsKind::Weld,
            Mode::Grind => StatsKind::Grind,
        }
    }
}

/// Where the starting world comes from.
#[derive(clap::Args)]
struct Source {
    /// Load a scenario JSON file. Mutually exclusive with --seed.
    #[arg(long, conflicts_with = "seed")]
    scenario: Option<PathBuf>,
    /// Generate a scrapyard with this seed. Mutually exclusive with --scenario.
    #[arg(long, conflicts_with = "scenario")]
    seed: Option<u64>,
    /// Persist yard settings to this JSON file.
    #[arg(long)]
    settings: Option<PathBuf>,
    /// Session config JSON. Missing fields take defaults.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive the yards for a fixed number of 100 ms ticks.
    Run {
        #[command(flatten)]
        source: Source,
        #[arg(long)]
        ticks: u64,
        /// Command every yard into this mode instead of the scenario's command.
        #[arg(long, value_enum)]
        mode: Option<Mode>,
        #[arg(long, default_value_t = 50)]
        print_every: u64,
        /// Print the final draw frame of every yard as JSON.
        #[arg(long)]
        draw: bool,
    },
    /// Scan the yards and print grind or weld estimates.
    Stats {
        #[command(flatten)]
        source: Source,
        #[arg(long, value_enum, default_value = "weld")]
        mode: Mode,
    },
}

// ---------------------------------------------------------------------------
// Session setup
// ---------------------------------------------------------------------------

struct Driver {
    world: Arc<SandboxWorld>,
    tools: SandboxTools,
    broadcast: Arc<RecordingBroadcast>,
    runner: PipelineRunner,
    handle: SessionHandle,
    yards: Vec<YardId>,
    now: Duration,
}

impl Driver {
    fn start(source: &Source) -> Result<(Self, Scenario)> {
        let scenario = match (&source.scenario, source.seed) {
            (Some(path), _) => load_scenario(path)?,
            (None, Some(seed)) => generate_scrapyard(seed),
            (None, None) => bail!("either --scenario or --seed is required"),
        };
        let config = match &source.config {
            Some(path) => load_config(path)?,
            None => SessionConfig::default(),
        };

        let world = Arc::new(SandboxWorld::new(scenario.build_world()));
        let broadcast = Arc::new(RecordingBroadcast::new());
        let settings = open_settings(source.settings.as_deref(), &scenario, &broadcast)?;
        let session = Session::new(world.clone(), settings, config);
        let handle = session.handle();

        let mut tools = SandboxTools::new(Arc::clone(&world));
        for spec in &scenario.yards {
            tools.attach_yard(spec);
            handle.register_yard(spec.clone());
        }
        let yards = scenario.yards.iter().map(|y| y.id).collect();
        let mut driver = Self {
            world,
            tools,
            broadcast,
            runner: PipelineRunner::new(Pipeline::standard(session)),
            handle,
            yards,
            now: Duration::ZERO,
        };
        // Registration and the first detection land before any command.
        driver.step()?;
        Ok((driver, scenario))
    }

    fn step(&mut self) -> Result<()> {
        match self
            .runner
            .tick(self.now, &mut self.tools, &*self.broadcast)
            .context("dispatching pass")?
        {
            TickOutcome::Recovered(fault) => tracing::warn!(%fault, "pass skipped"),
            TickOutcome::Closing => bail!("runner closed"),
            TickOutcome::Dispatched | TickOutcome::Busy => {}
        }
        self.runner
            .finish_pass(&mut self.tools, &*self.broadcast)
            .context("collecting pass")?;
        self.world.advance(TICK.as_secs_f64());
        self.now += TICK;
        Ok(())
    }

    fn session(&self) -> Result<&Session> {
        self.runner.session().context("pass still in flight")
    }
}

/// With a settings file the file wins; scenario settings only seed a file
/// that does not exist yet.
fn open_settings(
    path: Option<&Path>,
    scenario: &Scenario,
    broadcast: &Arc<RecordingBroadcast>,
) -> Result<Arc<SettingsRepository>> {
    let Some(path) = path else {
        return Ok(Arc::new(SettingsRepository::open(
            Box::new(MemorySettingsStore::with_entries(scenario.settings_map())),
            broadcast.clone(),
        )));
    };
    let store = JsonSettingsStore::new(path);
    let fresh = store
        .load()
        .with_context(|| format!("reading settings file: {}", path.display()))?
        .is_none();
    let repo = Arc::new(SettingsRepository::open(Box::new(store), broadcast.clone()));
    if fresh {
        for (yard, settings) in scenario.settings_map() {
            repo.set(yard, &settings);
        }
        tracing::info!(path = %path.display(), "settings file created");
    }
    Ok(repo)
}

// ---------------------------------------------------------------------------
// Run loop
// ---------------------------------------------------------------------------

fn run(
    source: &Source,
    ticks: u64,
    mode: Option<Mode>,
    print_every: u64,
    draw: bool,
) -> Result<()> {
    let (mut driver, scenario) = Driver::start(source)?;
    match mode {
        Some(mode) => {
            for yard in &driver.yards {
                driver.handle.request_transition(*yard, mode.state());
            }
        }
        None => {
            if let Some(command) = scenario.command {
                driver.handle.request_transition(command.yard, command.state);
            }
        }
    }

    println!(
        "Starting yards: ticks={ticks} yards={} structures={}",
        driver.yards.len(),
        scenario.structures.len(),
    );
    println!("{}", "-".repeat(80));

    for tick in 1..=ticks {
        driver.step()?;
        if print_every > 0 && tick % print_every == 0 {
            print_status(&driver, tick);
        }
    }

    println!("{}", "-".repeat(80));
    println!("Done after {ticks} ticks:");
    print_status(&driver, ticks);
    if draw {
        print_draw_frames(&driver)?;
    }

    let now = driver.now;
    driver
        .runner
        .shutdown(now, &mut driver.tools, &*driver.broadcast)
        .context("shutting down")?;
    Ok(())
}

fn print_status(driver: &Driver, tick: u64) {
    for yard in &driver.yards {
        let state = driver
            .handle
            .yard_state(*yard)
            .map_or_else(|| "gone".to_string(), |s| s.to_string());
        println!(
            "[tick={tick:05}  yard={yard}]  state={state:<8}  power={power:.1}  events={events}",
            power = driver.tools.total_power(),
            events = driver.broadcast.len(),
        );
        if let Some(status) = driver.handle.status(*yard) {
            for line in status.lines() {
                println!("    {line}");
            }
        }
    }
}

fn print_draw_frames(driver: &Driver) -> Result<()> {
    let session = driver.session()?;
    for yard in session.yards() {
        let frame = compute_draw_frame(yard, session.provider().as_ref());
        let json = serde_json::to_string_pretty(&frame).context("serializing draw frame")?;
        println!("yard {} draw frame:\n{json}", yard.id());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

fn stats(source: &Source, mode: Mode) -> Result<()> {
    let (mut driver, _) = Driver::start(source)?;
    // Let detection fill the contained set before scanning.
    let warmup = driver.session()?.config().detection_interval();
    while driver.now <= warmup {
        driver.step()?;
    }

    let session = driver.session()?;
    let provider: Arc<dyn StructureProvider> = Arc::clone(session.provider());
    let scanner = StatsScanner::new(provider, session.config().tuning.clone());
    for yard in session.yards() {
        let mut now = driver.now;
        let mut output = scanner.poll(mode.stats_kind(), yard, now);
        let mut polls = 0;
        while output == SCAN_PLACEHOLDER {
            polls += 1;
            if polls > STATS_POLL_LIMIT {
                bail!("stats scan for yard {} never finished", yard.id());
            }
            std::thread::sleep(Duration::from_millis(10));
            now += TICK;
            output = scanner.poll(mode.stats_kind(), yard, now);
        }
        println!("yard {}:\n{output}", yard.id());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            source,
            ticks,
            mode,
            print_every,
            draw,
        } => run(&source, ticks, mode, print_every, draw)?,
        Commands::Stats { source, mode } => stats(&source, mode)?,
    }
    Ok(())
}
