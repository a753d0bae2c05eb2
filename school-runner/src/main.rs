use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use school_runner::{load_config, run, RunOptions};
use school_shared::{ResetMode, TankConfig};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ResetArg {
    Fireworks,
    Fishsplosion,
}

impl From<ResetArg> for ResetMode {
    fn from(arg: ResetArg) -> Self {
        match arg {
            ResetArg::Fireworks => ResetMode::Fireworks,
            ResetArg::Fishsplosion => ResetMode::Fishsplosion,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless fish school flocking simulation", long_about = None)]
struct Args {
    /// Tank configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of schools
    #[arg(short, long)]
    schools: Option<u32>,

    /// Fish in every school, overriding the roster
    #[arg(short, long)]
    fish: Option<u32>,

    /// Worker threads used per frame
    #[arg(short, long)]
    threads: Option<u32>,

    /// Frames to simulate
    #[arg(long, default_value_t = 300)]
    frames: u64,

    /// Simulated seconds per frame
    #[arg(long, default_value_t = 1.0 / 60.0)]
    frame_time: f32,

    /// Frames the simulated renderer lags behind
    #[arg(long, default_value_t = 2)]
    gpu_latency: u64,

    /// Disable school avoidance
    #[arg(long)]
    no_avoidance: bool,

    /// Record draws on the main thread instead of the workers
    #[arg(long)]
    main_thread_rendering: bool,

    /// Fish per draw call (0 draws a school at once)
    #[arg(short, long)]
    batch_size: Option<u32>,

    /// Flocking complexity, 1 to 5
    #[arg(long)]
    complexity: Option<u32>,

    /// Where schools start
    #[arg(long, value_enum)]
    reset_mode: Option<ResetArg>,

    /// Seed for school placement and fish spawning
    #[arg(long)]
    seed: Option<u64>,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

impl Args {
    fn apply(&self, config: &mut TankConfig) {
        if let Some(schools) = self.schools {
            config.schools = schools;
        }
        if let Some(fish) = self.fish {
            config.fish_per_school = Some(fish);
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        if self.no_avoidance {
            config.avoidance = false;
        }
        if self.main_thread_rendering {
            config.threaded_rendering = false;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(complexity) = self.complexity {
            config.complexity = complexity;
        }
        if let Some(mode) = self.reset_mode {
            config.reset_mode = mode.into();
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    if args.debug {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();
    }

    if args.frames == 0 {
        anyhow::bail!("--frames must be at least 1");
    }
    if !args.frame_time.is_finite() || args.frame_time <= 0.0 {
        anyhow::bail!("--frame-time must be a positive number of seconds");
    }

    let mut config = load_config(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate().context("Invalid tank configuration")?;

    log::info!("School runner starting...");
    log::info!("Schools: {}, threads: {}", config.schools, config.threads);

    let options = RunOptions {
        frames: args.frames,
        frame_time: args.frame_time,
        gpu_latency: args.gpu_latency,
    };
    let summary = run(config, &options).context("Simulation error")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to encode summary")?
        );
    } else {
        log::info!(
            "{} frames, {:.1} FPS, {:.0} us per frame, {} draw calls, {} skipped uploads",
            summary.frames,
            summary.frames_per_second,
            summary.mean_cpu_time_us,
            summary.draw_calls,
            summary.skipped_uploads
        );
    }

    Ok(())
}
