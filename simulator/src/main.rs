use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use sweepcore::prelude::EventSink;
use tokio::runtime::Builder as TokioBuilder;
use workflow::config::ScenarioConfig;
use workflow::runner::Runner;

mod generator;
mod sink;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Offline scenario driver for the sweep core")]
struct Args {
    /// Load a scenario from YAML instead of the built-in default
    #[arg(long)]
    scenario: Option<PathBuf>,
    /// Controller pump cycles to run before summarizing
    #[arg(long, default_value_t = 25)]
    cycles: usize,
    /// Append every engine event to this JSONL file
    #[arg(long)]
    events: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let scenario = if let Some(path) = args.scenario {
        ScenarioConfig::load(path)?
    } else {
        ScenarioConfig::default()
    };

    let event_sink: Option<Arc<dyn EventSink>> = match args.events {
        Some(path) => {
            let sink: Arc<dyn EventSink> = Arc::new(sink::JsonlSink::create(&path)?);
            Some(sink)
        }
        None => None,
    };

    let runner = Runner::new(scenario);
    let runtime = TokioBuilder::new_multi_thread()
        .enable_all()
        .build()
        .context("creating simulator runtime")?;
    let summary = runtime.block_on(runner.execute(args.cycles, event_sink))?;

    println!(
        "Scenario run -> samples {}, anomalies {}, bearings {}, mode switches {}, faults {}, final mode {}",
        summary.metrics.samples,
        summary.metrics.anomalies,
        summary.metrics.bearings,
        summary.metrics.mode_switches,
        summary.metrics.faults,
        summary.final_state
    );

    Ok(())
}
