//! Shepherd - Entry Point
//!
//! One maintenance operation per invocation; the CI layer chains
//! operations based on the exit code.

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shepherd::cli::{self, CliOptions};
use shepherd::error::Result;
use shepherd::manager::{Operation, PoolManager};
use shepherd::Config;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("SHEPHERD_LOG")
                .unwrap_or_else(|_| "shepherd=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            2
        }
    };
    std::process::exit(code);
}

async fn run() -> Result<i32> {
    let Some(options) = cli::parse()? else {
        print!("{}", cli::USAGE);
        return Ok(0);
    };

    let mut config = Config::load(&options.config_path)?;
    if let Some(snapshot_path) = &options.snapshot_path {
        config.pool.snapshot_path = snapshot_path.clone();
    }
    info!(
        operation = options.operation.as_str(),
        config = %options.config_path.display(),
        snapshot = %config.pool.snapshot_path.display(),
        "Starting Shepherd"
    );

    let manager = PoolManager::new(config)?;
    let report = dispatch(&manager, &options).await?;

    // The outcome summary is the contract with the orchestration layer;
    // it is printed even when the threshold was missed.
    println!("{}", report.summary());
    Ok(report.exit_code())
}

async fn dispatch(manager: &PoolManager, options: &CliOptions) -> Result<shepherd::OperationReport> {
    match options.operation {
        Operation::Update => {
            manager
                .update(options.min_count, options.timeout, options.source)
                .await
        }
        Operation::Rebuild => manager.rebuild(options.min_count, options.timeout).await,
        Operation::Validate => manager.validate(options.timeout).await,
        Operation::Clean => manager.clean().await,
        Operation::Recover => manager.recover(options.threshold, options.timeout).await,
    }
}
