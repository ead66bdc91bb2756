//! # Resilience Configuration Validator
//!
//! Command-line tool for validating resilience configuration files across
//! environments before starting a consumer.

use std::path::{Path, PathBuf};
use std::process;

use anyhow::Context;
use clap::{Parser, Subcommand};
use resilient_consumer::config::{ConfigManager, ResilienceConfig};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate resilient consumer configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment to validate (development, test, production, ...)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Configuration directory path (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate the layered configuration
    Validate,

    /// Print the effective configuration as JSON
    Show,

    /// List environments that have an override file
    Environments,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::Validate) | None => validate(&cli),
        Some(Commands::Show) => show(&cli),
        Some(Commands::Environments) => list_environments(&cli),
    };

    match result {
        Ok(()) => {
            info!("Configuration validation completed successfully");
            process::exit(0);
        }
        Err(e) => {
            error!("Configuration validation failed: {:#}", e);
            eprintln!("❌ {e:#}");
            process::exit(1);
        }
    }
}

fn load(cli: &Cli) -> anyhow::Result<ResilienceConfig> {
    let manager = ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &cli.environment)
        .with_context(|| format!("loading configuration for environment '{}'", cli.environment))?;
    Ok(manager.config().clone())
}

fn validate(cli: &Cli) -> anyhow::Result<()> {
    println!("🔧 Validating Resilience Configuration");
    println!("Environment: {}", cli.environment);
    if let Some(dir) = &cli.config_dir {
        println!("Config Directory: {}", dir.display());
    }
    println!();

    let config = load(cli)?;
    println!("✅ Configuration loaded and validated");
    println!();
    println!("📋 Consumer");
    println!("   service_name: {}", config.consumer.service_name);
    println!("   dead_letter_topic: {}", config.consumer.dead_letter_topic);
    println!("   max_retries: {}", config.consumer.max_retries);
    println!(
        "   routing_failure_policy: {:?}",
        config.consumer.routing_failure_policy
    );
    println!("📋 Dedup");
    println!("   ttl_ms: {}", config.dedup.ttl_ms);
    println!("   max_size: {}", config.dedup.max_size);
    println!("📋 Backoff");
    println!("   initial_delay_ms: {}", config.backoff.initial_delay_ms);
    println!("   max_delay_ms: {}", config.backoff.max_delay_ms);
    println!("   multiplier: {}", config.backoff.multiplier);
    println!("📋 Inline retry");
    println!("   business_retries: {}", config.inline_retry.business_retries);
    println!("   publish_retries: {}", config.inline_retry.publish_retries);

    if config.consumer.max_retries == 0 {
        println!();
        println!("⚠️  max_retries is 0: every delivery will be dead-lettered before processing");
    }

    println!("\n🎉 All configuration validation checks passed!");
    Ok(())
}

fn show(cli: &Cli) -> anyhow::Result<()> {
    let config = load(cli)?;
    let json = serde_json::to_string_pretty(&config).context("serializing configuration")?;
    println!("{json}");
    Ok(())
}

fn list_environments(cli: &Cli) -> anyhow::Result<()> {
    let dir = cli
        .config_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("config"));
    println!("📋 Available Environments in {}:", dir.display());

    let mut environments = environment_overrides(&dir)?;
    environments.sort();
    if environments.is_empty() {
        println!("   (none; only base configuration found)");
    }
    for environment in environments {
        println!("   • {environment}");
    }
    Ok(())
}

fn environment_overrides(dir: &Path) -> anyhow::Result<Vec<String>> {
    if !dir.exists() {
        anyhow::bail!("configuration directory not found: {}", dir.display());
    }

    let mut environments = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let file_name = entry?.file_name();
        let name = file_name.to_string_lossy();
        if let Some(environment) = name
            .strip_prefix("resilience.")
            .and_then(|rest| rest.strip_suffix(".toml"))
        {
            environments.push(environment.to_string());
        }
    }
    Ok(environments)
}
