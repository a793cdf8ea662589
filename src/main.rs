use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use repo_scribe::analysis::{AnalysisOrchestrator, AnalysisSettings, OutlineSummarizer};
use repo_scribe::cli::{Cli, Commands};
use repo_scribe::config::AppConfig;
use repo_scribe::providers::{all_providers, ModelRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise --verbose lowers the default to debug.
    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    let config = AppConfig::load().context("Could not load configuration")?;
    let registry = ModelRegistry::initialize(
        all_providers(&config),
        config.default_model.clone(),
        cli.verbose,
    )
    .await
    .context("Could not build the model catalog")?;

    match cli.command {
        Commands::Analyze {
            path,
            model,
            stream,
            ignore,
            expertise,
        } => {
            let settings = AnalysisSettings {
                path: canonical(path)?,
                model,
                stream,
                verbose: cli.verbose,
                extra_ignores: ignore,
                expertise,
            };
            let mut orchestrator =
                AnalysisOrchestrator::new(config, registry, Box::new(OutlineSummarizer));
            let output = orchestrator.run(&settings).await?;
            println!("Analysis written to {}", output.display());
        }
        Commands::Models => {
            for entry in registry.catalog() {
                println!(
                    "{:<24} {:<12} {:>9} tokens",
                    entry.name, entry.provider_id, entry.token_limit
                );
            }
        }
        Commands::Readme {
            path,
            model,
            stream,
        } => {
            let settings = AnalysisSettings {
                path: canonical(path)?,
                model,
                stream,
                verbose: cli.verbose,
                extra_ignores: Vec::new(),
                expertise: None,
            };
            let orchestrator =
                AnalysisOrchestrator::new(config, registry, Box::new(OutlineSummarizer));
            let readme = orchestrator.generate_readme(&settings).await?;
            println!("README written to {}", readme.display());
        }
    }

    Ok(())
}

fn canonical(path: PathBuf) -> Result<PathBuf> {
    path.canonicalize()
        .with_context(|| format!("Cannot resolve {}", path.display()))
}
