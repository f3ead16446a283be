//! # Transport Configuration Validator
//!
//! Command-line tool for validating `pirina-transport.yaml` across environments
//! before starting a provider.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pirina_transport::config::{ConfigManager, TransportConfig};
use std::path::PathBuf;
use std::process;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

const KNOWN_ENVIRONMENTS: [&str; 3] = ["development", "test", "production"];

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate Pirina transport configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment to validate (development, test, production)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Configuration directory (default: $PIRINA_CONFIG_DIR, ./config or ../config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format for `show` (json, yaml)
    #[arg(long, default_value = "json")]
    format: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate the configuration
    Validate,

    /// Print the resolved configuration with secrets masked
    Show,

    /// Validate every known environment
    Environments,

    /// Show the effective circuit breaker settings for a queue
    Queue {
        /// Queue name
        name: String,
    },
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
        Some(Commands::Environments) => validate_environments(&cli),
        Some(Commands::Queue { name }) => show_queue(&cli, name),
    };

    match result {
        Ok(()) => {
            info!("Configuration validation completed successfully");
            process::exit(0);
        }
        Err(e) => {
            error!("Configuration validation failed: {e:#}");
            eprintln!("❌ {e:#}");
            process::exit(1);
        }
    }
}

fn load(cli: &Cli, environment: &str) -> Result<std::sync::Arc<ConfigManager>> {
    ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), environment)
        .with_context(|| format!("failed to load configuration for '{environment}'"))
}

fn validate(cli: &Cli) -> Result<()> {
    println!("🔧 Validating transport configuration");
    println!("Environment: {}", cli.environment);

    let manager = load(cli, &cli.environment)?;
    println!(
        "✅ Loaded from {}",
        manager.config_directory().display()
    );

    print_summary(manager.config());
    println!("\n🎉 Configuration is valid");
    Ok(())
}

fn show(cli: &Cli) -> Result<()> {
    let manager = load(cli, &cli.environment)?;
    let sanitized = manager.debug_config();

    let rendered = match cli.format.to_lowercase().as_str() {
        "json" => serde_json::to_string_pretty(&sanitized)?,
        "yaml" => serde_yaml::to_string(&sanitized)?,
        other => bail!("unknown output format '{other}' (expected json or yaml)"),
    };

    println!("{rendered}");
    Ok(())
}

fn validate_environments(cli: &Cli) -> Result<()> {
    let mut failures = 0;

    for environment in KNOWN_ENVIRONMENTS {
        match load(cli, environment) {
            Ok(_) => println!("✅ {environment}"),
            Err(e) => {
                failures += 1;
                println!("❌ {environment}: {e:#}");
            }
        }
    }

    if failures > 0 {
        bail!("{failures} environment(s) failed validation");
    }
    Ok(())
}

fn show_queue(cli: &Cli, queue_name: &str) -> Result<()> {
    let manager = load(cli, &cli.environment)?;
    let breakers = &manager.config().circuit_breakers;
    let queue_config = breakers.config_for_queue(queue_name);

    println!("🛡️ Circuit breaker for queue '{queue_name}'");
    println!("  Enabled: {}", breakers.enabled);
    println!(
        "  Override: {}",
        if breakers.queue_configs.contains_key(queue_name) {
            "yes"
        } else {
            "no (default)"
        }
    );
    println!(
        "  Exceptions allowed before breaking: {}",
        queue_config.exceptions_allowed_before_breaking
    );
    println!(
        "  Duration of break: {}s",
        queue_config.duration_of_break_seconds
    );
    Ok(())
}

fn print_summary(config: &TransportConfig) {
    let breakers = &config.circuit_breakers;
    println!("\n📋 Summary");
    println!("  Circuit breakers enabled: {}", breakers.enabled);
    println!(
        "  Default threshold: {} failures, break {}s",
        breakers.default_config.exceptions_allowed_before_breaking,
        breakers.default_config.duration_of_break_seconds
    );
    println!("  Queue overrides: {}", breakers.queue_configs.len());
    println!(
        "  In-memory max delivery count: {}",
        config.in_memory.max_delivery_count
    );
}
