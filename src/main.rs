use std::{path::PathBuf, process::ExitCode, time::Duration};

use anyhow::Context;
use bear_classifier::{
    ClassificationOutcome, ClientConfig, FetchMode, ImagePayload, InferenceClient,
    config::DEFAULT_BASE_URL,
    logging::{LoggingConfig, init_logging, parse_level},
};
use clap::Parser;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(name = "bear-classifier", about = "Classify an image with the remote bear classifier")]
struct Args {
    /// Image file to classify
    image: PathBuf,

    /// Base URL of the inference service API
    #[arg(long, env = "BEAR_CLASSIFIER_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    #[arg(long, default_value_t = 60)]
    upload_timeout_secs: u64,

    #[arg(long, default_value_t = 30)]
    submit_timeout_secs: u64,

    #[arg(long, default_value_t = 120)]
    fetch_timeout_secs: u64,

    /// Print the raw result body instead of the decoded label
    #[arg(long)]
    verbatim: bool,

    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn client_config(&self) -> anyhow::Result<ClientConfig> {
        let fetch_mode = if self.verbatim {
            FetchMode::Verbatim
        } else {
            FetchMode::Structured
        };
        let config = ClientConfig::builder()
            .base_url(&self.base_url)
            .upload_timeout(Duration::from_secs(self.upload_timeout_secs))
            .submit_timeout(Duration::from_secs(self.submit_timeout_secs))
            .fetch_timeout(Duration::from_secs(self.fetch_timeout_secs))
            .fetch_mode(fetch_mode)
            .build()?;
        Ok(config)
    }
}

async fn run(args: Args) -> anyhow::Result<ClassificationOutcome> {
    let client = InferenceClient::new(args.client_config()?)?;
    let image = ImagePayload::from_path(&args.image)
        .await
        .with_context(|| format!("Failed to read image {}", args.image.display()))?;

    log::info!(
        "Classifying {} via {}",
        args.image.display(),
        client.config().base_url
    );
    let handle = client.spawn(image);
    let token = handle.cancellation_token();
    let outcome = tokio::select! {
        outcome = handle.outcome() => outcome,
        _ = signal::ctrl_c() => {
            log::info!("Received Ctrl+C, cancelling");
            token.cancel();
            return Err(anyhow::anyhow!("cancelled by user"));
        }
    };
    Ok(outcome)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(LoggingConfig {
        level: parse_level(&args.log_level),
        ..LoggingConfig::default()
    });

    match run(args).await {
        Ok(ClassificationOutcome::Success { label }) => {
            println!("{}", label);
            ExitCode::SUCCESS
        }
        Ok(failure) => {
            eprintln!("{}", failure);
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
