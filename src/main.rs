mod cli;
mod config;
mod engine;
mod error;
mod notifier;
mod qstash;
mod scheduler;
mod sequence;
mod server;

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use config::StepflowConfig;
use engine::SequencerEngine;
use error::StepflowError;
use qstash::QstashClient;
use scheduler::{LocalScheduler, SchedulingAdapter};
use sequence::Sequence;
use server::{AppContext, start_server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = StepflowConfig::load()?;

    match cli.command {
        Command::Serve { port, local } => serve(config, port, local).await,
        Command::Trigger { file, delay } => {
            trigger(&config, &file, delay).await.map_err(Into::into)
        }
        Command::Validate { file } => validate(&file).map_err(Into::into),
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "stepflow=debug,info"
    } else {
        "stepflow=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn serve(
    mut config: StepflowConfig,
    port_override: Option<u16>,
    local: bool,
) -> anyhow::Result<()> {
    if let Some(port) = port_override {
        config.port = port;
    }
    let timeout = Duration::from_secs(config.request_timeout_secs);

    let scheduler: Arc<dyn SchedulingAdapter> = if local {
        Arc::new(LocalScheduler::new(timeout))
    } else {
        Arc::new(QstashClient::new(
            config.qstash_token.clone(),
            config.qstash_url.clone(),
        ))
    };

    let engine = SequencerEngine::new(scheduler, config.handler_url(), timeout);
    let ctx = Arc::new(AppContext {
        engine,
        started_at: Instant::now(),
    });

    start_server(ctx, config.port).await
}

/// Validate a sequence file and publish it to the handler through the broker.
async fn trigger(
    config: &StepflowConfig,
    file: &str,
    delay_seconds: u64,
) -> Result<(), StepflowError> {
    let contents = std::fs::read_to_string(file)?;
    let raw: serde_json::Value = serde_json::from_str(&contents)?;
    let sequence = Sequence::parse(&raw)?;

    let client = QstashClient::new(config.qstash_token.clone(), config.qstash_url.clone());
    let body = serde_json::to_value(&sequence)?;
    let response = client
        .publish_json(&config.handler_url(), &body, delay_seconds)
        .await?;

    println!(
        "Queued sequence with {} step(s), message id: {}",
        sequence.total_steps(),
        response.message_id
    );
    Ok(())
}

fn validate(file: &str) -> Result<(), StepflowError> {
    let contents = std::fs::read_to_string(file)?;
    let raw: serde_json::Value = serde_json::from_str(&contents)?;

    match Sequence::parse(&raw) {
        Ok(sequence) => {
            println!(
                "OK: {} step(s), cursor {}, state {}",
                sequence.total_steps(),
                sequence.current_step_index,
                sequence.state()
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("Invalid sequence payload:");
            for violation in &e.violations {
                eprintln!("  {}: {}", violation.path, violation.message);
            }
            Err(StepflowError::Validation(e))
        }
    }
}
