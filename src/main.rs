use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use learning_to_pair::{
    config::{Config, TrackingBackend},
    env::python::PyBackend,
    experiment::{execute, prepare},
    logging,
    tracking::{local::LocalSink, wandb::WandbSink},
};
use tracing::{info, Level};

fn main() -> anyhow::Result<()> {
    println!("{}", "Start".green());

    let config = Config::parse();
    logging::init(Level::INFO);
    info!(?config, "configuration");

    let mut backend = PyBackend;
    let prepared = prepare(&config, &mut backend).context("preparing run")?;

    let record = match config.tracking {
        TrackingBackend::Wandb => {
            let mut sink = WandbSink::init(&config).context("starting wandb run")?;
            let record = execute(&config, &prepared, &mut backend, &mut sink);
            sink.finish_with(record)
        }
        TrackingBackend::Local => {
            let mut sink = LocalSink::create(&config.tracking_dir, &config)
                .context("creating local tracking run")?;
            execute(&config, &prepared, &mut backend, &mut sink)
        }
    }
    .context("running experiment")?;

    info!(
        sharpe_ratio = record.metrics.sharpe_ratio,
        reward = record.metrics.reward,
        "done"
    );
    println!("{}", "End".green());
    Ok(())
}
