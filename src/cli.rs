use anyhow::{Result, bail};
use clap::Parser;
use math_explainer::config::Config;
use math_explainer::init;
use math_explainer::pipeline::{JobRequest, Pipeline};
use math_explainer::render::Quality;
use std::path::PathBuf;
use std::sync::Arc;

/// Generates one narrated math explainer video and prints its path.
#[derive(Debug, Parser)]
#[command(name = "math-explainer-cli", version)]
struct Args {
    /// Topic or problem to explain, e.g. "Solve 2x+5=9".
    topic: String,

    /// Render quality: low, medium or high.
    #[arg(long, default_value = "low", value_parser = parse_quality)]
    quality: Quality,

    /// Path to config.json; defaults to $MATH_EXPLAINER_CONFIG or ./config.json.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn parse_quality(raw: &str) -> std::result::Result<Quality, String> {
    Quality::parse(raw).ok_or_else(|| format!("unknown quality {raw:?}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let cfg = match &args.config {
        Some(path) => Config::load(path).await?,
        None => Config::load_default().await?,
    };
    init::ensure_directories(&cfg).await?;
    init::check_tools(&cfg).await;

    let client = reqwest::Client::builder().gzip(true).build()?;
    let pipeline = Pipeline::new(Arc::new(cfg), client);
    let request = JobRequest {
        prompt: args.topic,
        quality: args.quality,
    };

    match pipeline.run(&request).await {
        Ok(output) => {
            println!("{}", output.video_path.display());
            Ok(())
        }
        Err(failure) => {
            if let Some(job) = failure.job {
                eprintln!("Artifacts: {}", job.dir.display());
            }
            bail!("{} ({})", failure.error, failure.error.kind())
        }
    }
}
