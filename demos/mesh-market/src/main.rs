use std::io::Write;

use clap::Parser;
use env_logger::Builder;
use log::info;
use serde::Serialize;

use dslab_core::simulation::Simulation;
use dslab_mesh::core::application::Application;
use dslab_mesh::core::config::SimulationConfig;
use dslab_mesh::core::scheduler::EpochSummary;
use dslab_mesh::simulation::MeshSimulation;

#[derive(Parser, Debug)]
#[clap(about, long_about = None)]
/// Runs market-based allocation of mesh nodes to a generated workload and reports per-epoch statistics.
struct Args {
    /// Path to simulation config (defaults are used if omitted)
    #[clap(short, long)]
    config: Option<String>,

    /// Overrides simulation length from config
    #[clap(short, long)]
    epochs: Option<u64>,

    /// Overrides price model from config, e.g. Stress[base=0.05,step=0.01,decay=0.9]
    #[clap(short, long)]
    price_model: Option<String>,

    /// Path to CSV file for per-epoch trace
    #[clap(short, long)]
    trace: Option<String>,

    /// Path to CSV file for per-application results
    #[clap(short, long)]
    apps: Option<String>,
}

#[derive(Serialize)]
struct AppRecord {
    id: u32,
    arrival: u64,
    lifetime: u64,
    parallelism: f64,
    sigma: f64,
    mapping_time: Option<u64>,
    wait_time: Option<u64>,
    status: String,
    nodes: u32,
}

impl AppRecord {
    fn new(app: &Application) -> Self {
        Self {
            id: app.id,
            arrival: app.arrival,
            lifetime: app.lifetime,
            parallelism: app.parallelism,
            sigma: app.sigma,
            mapping_time: app.mapping_time,
            wait_time: app.mapping_time.map(|t| t.saturating_sub(app.arrival)),
            status: format!("{:?}", app.status),
            nodes: app.core_count(),
        }
    }
}

fn save_csv<T: Serialize>(path: &str, records: impl IntoIterator<Item = T>) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_path(path)?;
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

fn main() {
    Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => SimulationConfig::from_file(path),
        None => SimulationConfig::default(),
    };
    if let Some(epochs) = args.epochs {
        config.simulation_length = epochs;
    }
    if let Some(price_model) = args.price_model {
        config.price_model = price_model;
    }

    let mut sim = MeshSimulation::new(Simulation::new(config.seed), config);
    sim.step_until_no_events();

    let scheduler = sim.scheduler();
    let scheduler = scheduler.borrow();
    let history = scheduler.history();
    let placed: Vec<&Application> = scheduler.applications().filter(|app| app.mapping_time.is_some()).collect();
    let mean_wait = if placed.is_empty() {
        0.
    } else {
        placed
            .iter()
            .map(|app| app.mapping_time.unwrap_or(app.arrival) - app.arrival)
            .sum::<u64>() as f64
            / placed.len() as f64
    };
    let active: Vec<&EpochSummary> = history.iter().filter(|summary| !summary.reset).collect();
    let node_count = sim.sim_config().topology().node_count() as f64;
    let utilization = if active.is_empty() {
        0.
    } else {
        active.iter().map(|summary| summary.occupied as f64 / node_count).sum::<f64>() / active.len() as f64
    };

    info!("Simulated {} epochs", history.len());
    info!("Placed applications: {}/{}", placed.len(), scheduler.applications().count());
    info!("Mean wait time: {:.2} epochs", mean_wait);
    info!("Mean mesh utilization: {:.3}", utilization);
    info!(
        "Invaded nodes: {}, released nodes: {}",
        active.iter().map(|summary| summary.invaded).sum::<u32>(),
        active.iter().map(|summary| summary.released).sum::<u32>()
    );

    if let Some(path) = &args.trace {
        save_csv(path, history.iter()).unwrap_or_else(|e| panic!("Can't write trace to {}: {}", path, e));
        info!("Saved epoch trace to {}", path);
    }
    if let Some(path) = &args.apps {
        save_csv(path, scheduler.applications().map(AppRecord::new))
            .unwrap_or_else(|e| panic!("Can't write application results to {}: {}", path, e));
        info!("Saved application results to {}", path);
    }
}
