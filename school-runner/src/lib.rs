use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use school_core::FishTank;
use school_shared::{FrameStats, TankConfig};
use serde::Serialize;

/// How a headless run is driven
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunOptions {
    pub frames: u64,
    /// Simulated seconds per frame
    pub frame_time: f32,
    /// Frames the simulated renderer lags behind the simulation
    pub gpu_latency: u64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            frames: 300,
            frame_time: 1.0 / 60.0,
            gpu_latency: 2,
        }
    }
}

/// Totals reported at the end of a run
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct RunSummary {
    pub frames: u64,
    pub last: FrameStats,
    pub draw_calls: u64,
    pub skipped_uploads: u64,
    pub mean_cpu_time_us: f64,
    pub frames_per_second: f64,
}

/// Load a tank configuration from a JSON file, or the defaults without one
pub fn load_config(path: Option<&Path>) -> Result<TankConfig> {
    let Some(path) = path else {
        return Ok(TankConfig::default());
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config = TankConfig::from_json_str(&json)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Run the tank for `options.frames` frames.
///
/// Ring slots are retired `gpu_latency` frames after they were submitted,
/// standing in for a renderer that finishes frames late.
pub fn run(config: TankConfig, options: &RunOptions) -> Result<RunSummary> {
    let mut tank = FishTank::new(config).context("Failed to create fish tank")?;
    log::info!(
        "Running {} frames: {} schools, {} threads, latency {} frames",
        options.frames,
        tank.num_schools(),
        tank.thread_count(),
        options.gpu_latency
    );

    let started = Instant::now();
    let mut summary = RunSummary::default();
    let mut total_cpu_us = 0u64;
    let mut frame_count = 0;
    let mut last_fps_time = Instant::now();

    for _ in 0..options.frames {
        let stats = tank
            .frame(options.frame_time)
            .with_context(|| format!("Frame {} failed", tank.frame_number()))?;
        if let Some(completed) = stats.frame.checked_sub(options.gpu_latency) {
            tank.complete_frames_through(completed);
        }

        summary.frames += 1;
        summary.draw_calls += u64::from(stats.draw_calls);
        summary.skipped_uploads += u64::from(stats.skipped_uploads);
        summary.last = stats;
        total_cpu_us += stats.cpu_time_us;

        frame_count += 1;
        if last_fps_time.elapsed().as_secs() >= 1 {
            let fps = frame_count as f64 / last_fps_time.elapsed().as_secs_f64();
            log::info!(
                "frame {}: {:.1} FPS, {} fish, {} draw calls",
                stats.frame,
                fps,
                stats.fish,
                stats.draw_calls
            );
            frame_count = 0;
            last_fps_time = Instant::now();
        }
    }

    if summary.frames > 0 {
        summary.mean_cpu_time_us = total_cpu_us as f64 / summary.frames as f64;
        summary.frames_per_second = summary.frames as f64 / started.elapsed().as_secs_f64();
    }
    if summary.skipped_uploads > 0 {
        log::warn!(
            "{} uploads skipped; gpu latency {} may exceed the ring depth",
            summary.skipped_uploads,
            options.gpu_latency
        );
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_config() -> TankConfig {
        TankConfig {
            schools: 3,
            fish_per_school: Some(5),
            max_schools: 8,
            max_fish_per_school: 10,
            threads: 2,
            max_threads: 2,
            ..TankConfig::default()
        }
    }

    #[test]
    fn test_load_default_config() {
        assert_eq!(load_config(None).unwrap(), TankConfig::default());
    }

    #[test]
    fn test_missing_config_file() {
        let err = load_config(Some(Path::new("/nonexistent/tank.json"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_run_counts_frames() {
        let options = RunOptions {
            frames: 12,
            ..RunOptions::default()
        };
        let summary = run(tiny_config(), &options).unwrap();
        assert_eq!(summary.frames, 12);
        assert_eq!(summary.last.frame, 12);
        assert_eq!(summary.last.fish, 15);
        assert_eq!(summary.skipped_uploads, 0);
    }

    #[test]
    fn test_latency_deeper_than_ring_skips_uploads() {
        let options = RunOptions {
            frames: 10,
            gpu_latency: 6,
            ..RunOptions::default()
        };
        let summary = run(tiny_config(), &options).unwrap();
        assert!(summary.skipped_uploads > 0);
    }
}
