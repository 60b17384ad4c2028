//! Cutover Daemon - stack reconciliation service
//!
//! The cutover daemon provides:
//! - Reconciliation loop driving stacks through their deployment states
//! - Traffic cutover and retirement of superseded versions
//! - One-shot commands for direct stack operations

use anyhow::Context;
use clap::{Parser, Subcommand};
use cutover_daemon::{DaemonConfig, Server};
use cutover_types::{DeploymentStrategy, NewStack, StackId};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Cutover Daemon CLI
#[derive(Parser)]
#[command(name = "cutoverd")]
#[command(about = "Cutover Daemon - stack reconciliation service", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "CUTOVER_CONFIG")]
    config: Option<String>,

    /// Cloud region passed to the deployment tool
    #[arg(short, long, env = "CUTOVER_REGION")]
    region: Option<String>,

    /// Deployment tool program
    #[arg(long, env = "CUTOVER_PROGRAM")]
    program: Option<String>,

    /// Log level
    #[arg(long, env = "CUTOVER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "CUTOVER_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile periodically until interrupted
    Run,

    /// Run a single reconciliation cycle
    Reconcile,

    /// Create a stack
    Create {
        /// Deployment template file
        #[arg(long)]
        template: String,

        /// Container image version
        #[arg(long)]
        image_version: String,

        /// Stack version; derived from the application or image version if unset
        #[arg(long)]
        stack_version: Option<String>,

        /// Application version
        #[arg(long)]
        application_version: Option<String>,

        /// Target traffic percentage
        #[arg(long, default_value_t = 100)]
        traffic: u8,

        /// Number of older versions to keep
        #[arg(long, default_value_t = 1)]
        keep: u32,

        /// Positional template parameter (repeatable)
        #[arg(long = "param")]
        parameters: Vec<String>,

        /// Tag as KEY=VALUE (repeatable)
        #[arg(long = "tag", value_parser = parse_tag)]
        tags: Vec<(String, String)>,

        /// Keep a failed stack instead of rolling it back
        #[arg(long)]
        disable_rollback: bool,

        /// Deployment strategy
        #[arg(long, default_value = "cutover")]
        strategy: DeploymentStrategy,
    },

    /// Change the traffic percentage of a stack
    Traffic { stack_id: String, percentage: u8 },

    /// Replace the machine image of a stack's instances
    Image { stack_id: String, image: String },

    /// Delete a stack
    Delete { stack_id: String },

    /// Show a stack
    Get { stack_id: String },

    /// List all stacks
    List,
}

fn parse_tag(value: &str) -> Result<(String, String), String> {
    value
        .split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got {}", value))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    // Override with CLI args
    if let Some(region) = cli.region {
        config.executor.region = region;
    }
    if let Some(program) = cli.program {
        config.executor.program = program;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let server = Server::new(config).await?;

    if !matches!(cli.command, Command::Run) {
        server.require_persistent_storage()?;
    }

    match cli.command {
        Command::Run => server.run().await?,
        Command::Reconcile => {
            let report = server.reconcile_once().await?;
            println!("{}", report);
        }
        Command::Create {
            template,
            image_version,
            stack_version,
            application_version,
            traffic,
            keep,
            parameters,
            tags,
            disable_rollback,
            strategy,
        } => {
            let template_body = tokio::fs::read_to_string(&template)
                .await
                .with_context(|| format!("Failed to read template {}", template))?;
            let record = server
                .service()
                .create(NewStack {
                    stack_name: None,
                    stack_version,
                    image_version,
                    application_version,
                    traffic_weight: traffic,
                    keep_count: keep,
                    template_body,
                    parameters,
                    tags: tags.into_iter().collect::<BTreeMap<_, _>>(),
                    disable_rollback,
                    strategy,
                })
                .await?;
            print_json(&record)?;
        }
        Command::Traffic {
            stack_id,
            percentage,
        } => {
            let record = server
                .service()
                .change_traffic(&StackId::new(stack_id), percentage)
                .await?;
            print_json(&record)?;
        }
        Command::Image { stack_id, image } => {
            let record = server
                .service()
                .update_image(&StackId::new(stack_id), &image)
                .await?;
            print_json(&record)?;
        }
        Command::Delete { stack_id } => {
            server.service().delete(&StackId::new(stack_id)).await?;
        }
        Command::Get { stack_id } => {
            let record = server.service().get(&StackId::new(stack_id)).await?;
            print_json(&record)?;
        }
        Command::List => {
            print_json(&server.service().list().await?)?;
        }
    }

    Ok(())
}
