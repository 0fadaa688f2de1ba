use anyhow::Context;
use clap::Parser;
use fdsn::FdsnClient;
use generator::synthetic::SyntheticService;
use log::info;
use seiscore::taup::PhasePredictor;
use std::path::PathBuf;
use workflow::config::WorkflowConfig;
use workflow::runner::Runner;

mod fdsn;
mod generator;
mod workflow;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Plot one station's record of an earthquake against predicted phase arrivals"
)]
struct Args {
    /// Load the run configuration from YAML
    #[arg(long)]
    config: Option<PathBuf>,
    /// Use a seeded synthetic waveform instead of the FDSN service
    #[arg(long, default_value_t = false)]
    offline: bool,
    /// Seed for the offline waveform
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Figure path; `.svg` writes vector output, `.png` a bitmap
    #[arg(long)]
    output: Option<PathBuf>,
    /// Velocity model name (iasp91) or path to a .nd file
    #[arg(long)]
    model: Option<String>,
    /// Comma-separated phase list, e.g. P,S,PKIKP
    #[arg(long, value_delimiter = ',')]
    phases: Option<Vec<String>>,
    /// FDSN web-service base URL
    #[arg(long)]
    service_url: Option<String>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut workflow_config = if let Some(path) = &args.config {
        WorkflowConfig::load(path)?
    } else {
        WorkflowConfig::default()
    };
    if let Some(output) = args.output {
        workflow_config.output = output;
    }
    if let Some(model) = args.model {
        workflow_config.model = model;
    }
    if let Some(phases) = args.phases {
        workflow_config.phases = phases;
    }
    if let Some(url) = args.service_url {
        workflow_config.service_url = url;
    }

    let predictor = PhasePredictor::new(workflow_config.load_model()?);
    let validated = workflow_config.validate(&predictor)?;
    let runner = Runner::new(validated, predictor);

    let result = if args.offline {
        let prediction = runner.predict()?;
        let service = SyntheticService::with_arrivals(args.seed, &prediction.arrivals);
        info!("offline run with seed {}", args.seed);
        runner.finish(&service, prediction)?
    } else {
        let client = FdsnClient::new(&runner.config().service_url)
            .context("creating FDSN client")?;
        runner.execute(&client)?
    };

    let arrivals: Vec<String> = result
        .prediction
        .arrivals
        .iter()
        .map(|arrival| format!("{} {:.1} s", arrival.phase, arrival.time))
        .collect();
    println!(
        "{} at {} -> {} ({} samples; {})",
        runner.config().id,
        result.prediction.distance,
        result.output.display(),
        result.trace.samples.len(),
        if arrivals.is_empty() {
            "no arrivals".to_string()
        } else {
            arrivals.join(", ")
        }
    );
    Ok(())
}
