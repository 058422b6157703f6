use anyhow::{Context, Result};
use std::time::Instant;
use std::fs::File;
use std::io::{BufWriter, Write};
use log::{info, warn, error, debug, trace};
use rand::rngs::StdRng;
use rand::SeedableRng;

mod grid;
mod motion;
mod pendulum;
mod scheduler;
mod simulation;

use pendulum::DoublePendulum;
use pendulum_common::{FrameSnapshot, OutputFormat, SimulationConfig};
use scheduler::{FixedRateScheduler, FrameScheduler};
use simulation::SimulationDriver;

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();

    info!("Starting Pendulum Grid Engine...");

    // --- Load Configuration ---
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = SimulationConfig::load(&config_path)?;
    info!("Loaded configuration from {}", config_path);
    debug!("Configuration: {:#?}", config);

    // --- Initialize Driver ---
    let rng = match config.initial_conditions.seed {
        Some(seed) => {
            info!("Seeding initialization RNG with {}", seed);
            StdRng::seed_from_u64(seed)
        }
        None => StdRng::from_os_rng(),
    };
    let mut driver = SimulationDriver::new(FixedRateScheduler::new(config.timing.frame_rate_hz), rng);
    match driver.scheduler().frame_interval() {
        Some(interval) => info!("Pacing frames every {:.2} ms.", interval.as_secs_f64() * 1000.0),
        None => info!("Running headless without frame pacing."),
    }

    // Ctrl-C ends the loop after the current frame; recorded data is still saved.
    let token = driver.cancellation_token();
    ctrlc::set_handler(move || token.cancel()).context("Failed to install Ctrl-C handler")?;

    // --- Animation Loop ---
    let start_time = Instant::now();
    let recording = animate(&mut driver, &config)?;
    debug!(
        "Final state: {} ticks since last reset on a {}x{} grid in a {}x{} viewport ({})",
        driver.frame(),
        driver.layout().grid_dim,
        driver.layout().grid_dim,
        driver.viewport().width,
        driver.viewport().height,
        driver.params()
    );
    driver.stop();

    let total_duration = start_time.elapsed();
    info!(
        "Animation finished: {} frames in {:.3} seconds.",
        recording.frames_done,
        total_duration.as_secs_f64()
    );

    // --- Save Recorded Data ---
    info!("Saving recorded data...");
    let base_filename = &config.output.base_filename;
    if config.output.save_snapshots {
        let format = config.output.output_format();
        let filename = format!("{}_snapshots.{}", base_filename, format.extension());
        match write_snapshots(&filename, format, &recording.snapshots) {
            Ok(()) => info!("{} snapshots saved to {}", recording.snapshots.len(), filename),
            Err(e) => error!("Error saving snapshots to '{}': {:#}", filename, e),
        }
    } else {
        info!("Skipping saving snapshots as per config (save_snapshots is false).");
    }

    // Final poses, separate from the snapshot stream
    if config.output.save_final_poses {
        let filename = format!("{}_final_poses.csv", base_filename);
        match write_final_poses(&filename, driver.pendulums()) {
            Ok(()) => info!("Final poses saved to {}", filename),
            Err(e) => error!("Error saving CSV file '{}': {:#}", filename, e),
        }
    } else {
        info!("Skipping saving final poses as per config.");
    }

    info!("Simulation Complete.");
    Ok(())
}

/// What the host loop produced.
struct Recording {
    snapshots: Vec<FrameSnapshot>,
    /// Frames drawn across every reset.
    frames_done: u64,
}

/// Configures the driver from `config` and runs the host loop for `total_frames` frames.
///
/// Each `[[changes]]` event splits the run: the segment up to its frame runs first,
/// then the event resets the population. Snapshots are kept at frame 0, every
/// `record_interval_frames`, and on the last frame, counting frames globally.
fn animate<S: FrameScheduler>(driver: &mut SimulationDriver<S>, config: &SimulationConfig) -> Result<Recording> {
    let mut viewport = config.viewport();
    let mut params = config.get_sim_params();
    driver.configure(params, viewport)?;

    let total_frames = config.timing.total_frames;
    let record_interval = config.timing.record_interval_frames.max(1);
    let save_snapshots = config.output.save_snapshots;
    info!("Recording a snapshot every {} frames.", record_interval);
    info!("Starting animation loop for {} frames...", total_frames);

    let mut recorded: Vec<FrameSnapshot> = Vec::new();
    let mut changes = config.changes.iter().peekable();
    let mut frames_done = 0u64;
    let start_time = Instant::now();
    let mut previous_print_time = start_time;
    let print_interval_secs = 5.0;

    while frames_done < total_frames {
        // Host events due now: resize or slider move. Each one is a full reset.
        while let Some(change) = changes.next_if(|c| c.at_frame <= frames_done) {
            let (next_viewport, next_params) = change.apply(viewport, params);
            info!("Host change at frame {}: reconfiguring.", frames_done);
            if next_params == params {
                driver.reconfigure_viewport(next_viewport)?;
            } else if next_viewport == viewport {
                driver.reconfigure_params(next_params)?;
            } else {
                driver.configure(next_params, next_viewport)?;
            }
            (viewport, params) = (next_viewport, next_params);
        }

        let segment_end = changes.peek().map_or(total_frames, |c| c.at_frame.min(total_frames));
        let base = frames_done;
        let mut offset = 0u64;
        let ran = driver.run(segment_end - base, |snapshot| {
            let global_frame = base + offset;
            offset += 1;

            // Frame 0, every interval, and the last frame
            let is_record_frame = global_frame % record_interval == 0 || global_frame + 1 == total_frames;
            if save_snapshots && is_record_frame {
                recorded.push(snapshot.clone());
            }

            let now = Instant::now();
            if now.duration_since(previous_print_time).as_secs_f64() >= print_interval_secs {
                info!(
                    "Frame [{}/{}] ({:.2} time units since reset) | Recorded: {} | Elapsed: {:.2} s",
                    global_frame + 1,
                    total_frames,
                    snapshot.time,
                    recorded.len(),
                    start_time.elapsed().as_secs_f64()
                );
                previous_print_time = now;
            } else {
                trace!("Frame [{}/{}] drawn", global_frame + 1, total_frames);
            }
            Ok(())
        })?;
        frames_done += ran;

        let non_finite = driver.non_finite_count();
        if non_finite > 0 {
            warn!("{} pendulums have non-finite state at frame {}.", non_finite, frames_done);
        }
        if ran < segment_end - base {
            warn!("Animation loop stopped early at frame {}.", frames_done);
            break;
        }
    }

    Ok(Recording { snapshots: recorded, frames_done })
}

/// Serializes the recorded snapshots as one sequence in the requested format.
fn write_snapshots(filename: &str, format: OutputFormat, snapshots: &[FrameSnapshot]) -> Result<()> {
    let file = File::create(filename).with_context(|| format!("Failed to create '{}'", filename))?;
    let mut writer = BufWriter::new(file);
    match format {
        OutputFormat::Json => serde_json::to_writer(&mut writer, snapshots)
            .context("Failed to serialize snapshots to JSON")?,
        OutputFormat::Bincode => bincode::serialize_into(&mut writer, snapshots)
            .context("Failed to serialize snapshots to bincode")?,
        OutputFormat::MessagePack => rmp_serde::encode::write(&mut writer, snapshots)
            .context("Failed to serialize snapshots to MessagePack")?,
    }
    writer.flush()?;
    Ok(())
}

/// One CSV row per pendulum: index and the three joint positions.
fn write_final_poses(filename: &str, pendulums: &[DoublePendulum]) -> Result<()> {
    let mut writer = csv::Writer::from_path(filename)?;
    writer.write_record(["index", "origin_x", "origin_y", "elbow_x", "elbow_y", "tip_x", "tip_y"])?;
    for (i, pendulum) in pendulums.iter().enumerate() {
        let origin = pendulum.origin();
        let pose = pendulum.pose();
        writer.write_record(&[
            i.to_string(),
            format!("{:.4}", origin.x),
            format!("{:.4}", origin.y),
            format!("{:.4}", pose.elbow.x),
            format!("{:.4}", pose.elbow.y),
            format!("{:.4}", pose.tip.x),
            format!("{:.4}", pose.tip.y),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
