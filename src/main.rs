//! Status report CLI over a simulated LODCM.
//!
//! Handy for eyeballing the report format and the derivation logic without
//! beamline hardware. Loads a TOML config when given one, otherwise uses the
//! built-in XPP catalog.

use anyhow::Result;
use clap::Parser;
use log::info;
use std::path::PathBuf;

use lodcm::config::LodcmConfig;
use lodcm::sim::SimLodcm;

#[derive(Parser, Debug)]
#[command(name = "lodcm_status", about = "Print a LODCM status report")]
struct Args {
    /// Path to a TOML device configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Emit the snapshot as JSON instead of the table.
    #[arg(long)]
    json: bool,

    /// Remove all diagnostics before reporting.
    #[arg(long)]
    clear_diagnostics: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => LodcmConfig::from_file(path)?,
        None => LodcmConfig::default(),
    };
    info!("building simulated LODCM '{}'", config.name);
    let sim = SimLodcm::new(config)?;

    if args.clear_diagnostics {
        sim.device
            .remove_all_diagnostics(true, Some(std::time::Duration::from_secs(10)))
            .await?;
    }

    let snapshot = sim.device.status().await;
    if args.json {
        println!("{}", snapshot.to_json()?);
    } else {
        print!("{}", snapshot.render());
    }
    Ok(())
}
