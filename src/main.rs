use mls_mpm::sink::start_simulation;
use mls_mpm::{MpmParameters, MpmSimulation, SimulationStatistics};

use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;

use eyre::WrapErr;
use structopt::StructOpt;
use tracing::{debug, info, Level};

#[derive(StructOpt, Debug)]
#[structopt(name = "mls_mpm")]
struct Opt {
    /// JSON simulation config. Missing fields take their defaults.
    #[structopt(short, long)]
    config: Option<PathBuf>,
    /// Where to write one MessagePack file per frame. Without it the simulation runs headless.
    #[structopt(short, long)]
    output_dir: Option<PathBuf>,
    #[structopt(short, long, default_value = "300")]
    frames: usize,
    /// -v for debug output, -vv for per-phase traces.
    #[structopt(short, long, parse(from_occurrences))]
    verbose: u8,
}

fn main() -> eyre::Result<()> {
    let opt = Opt::from_args();

    let level = match opt.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let params: MpmParameters = match &opt.config {
        Some(config) => std::fs::read(config)
            .wrap_err_with(|| format!("Failed to read JSON settings file: {:?}", config))
            .and_then(|json| {
                serde_json::from_slice(&json).wrap_err("Serde failed to deserialize JSON.")
            })?,
        None => MpmParameters::default(),
    };

    let sim = MpmSimulation::initialize(params).wrap_err("Invalid simulation config")?;

    match opt.output_dir {
        Some(path) => write_frames(sim, &path, opt.frames),
        None => run_headless(sim, opt.frames),
    }
}

/// Runs the simulation on a worker thread and writes every frame to `path/NNN.dat`, plus the
/// group names and colours to `path/groups.json`.
fn write_frames(sim: MpmSimulation, path: &Path, frames: usize) -> eyre::Result<()> {
    std::fs::create_dir_all(path)
        .wrap_err_with(|| format!("Failed to create output directory: {:?}", path))?;

    let groups_path = path.join("groups.json");
    let writer = std::fs::File::create(&groups_path)
        .wrap_err_with(|| format!("Failed to create {:?}", groups_path))?;
    serde_json::to_writer_pretty(writer, sim.groups())?;

    let (stop_tx, stop_rx) = channel();
    let (frame_rx, handle) = start_simulation(sim, stop_rx);

    for frame in 0..frames {
        debug!("Writing frame {}", frame);
        let snapshot = frame_rx.recv()?;
        let frame_path = path.join(format!("{:03}.dat", frame));
        let mut writer = std::fs::File::create(&frame_path)
            .wrap_err_with(|| format!("Failed to create {:?}", frame_path))?;
        rmp_serde::encode::write(&mut writer, &snapshot)?;
    }

    drop(stop_tx);
    drop(frame_rx);
    let summary = handle
        .join()
        .map_err(|_| eyre::eyre!("Simulation thread panicked"))?;
    info!("Final state: {:?}", summary);

    Ok(())
}

fn run_headless(mut sim: MpmSimulation, frames: usize) -> eyre::Result<()> {
    for _ in 0..frames {
        sim.advance();
        for (i, group) in sim.groups().iter().enumerate() {
            if let Some(centroid) = sim.particles.centroid(i) {
                debug!(
                    frame = sim.frame,
                    group = %group.name,
                    "centroid = [{:.3}, {:.3}]",
                    centroid.x,
                    centroid.y
                );
            }
        }
    }

    info!(
        time = sim.total_time(),
        kinetic_energy = sim.total_energy(),
        "Ran {} frames",
        frames
    );
    let summary = sim.shutdown();
    info!("Final state: {:?}", summary);

    Ok(())
}
