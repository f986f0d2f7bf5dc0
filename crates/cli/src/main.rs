//! devinit CLI
//!
//! Infers a development environment descriptor from a deployment that is
//! already running in Kubernetes.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use commands::{forwards, init, Settings};
use devinit_lib::PortForward;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// devinit CLI
#[derive(Parser)]
#[command(name = "devinit")]
#[command(author, version, about = "Infer a dev environment from a running Kubernetes deployment", long_about = None)]
pub struct Cli {
    /// Path to kubeconfig file (uses the client defaults if not specified)
    #[arg(long, global = true)]
    pub kubeconfig: Option<String>,

    /// Kubeconfig context to use
    #[arg(long, global = true)]
    pub context: Option<String>,

    /// Output format
    #[arg(long, short, global = true)]
    pub format: Option<output::OutputFormat>,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Infer a dev descriptor from a running deployment
    Init {
        /// Deployment name
        deployment: String,

        /// Namespace of the deployment (defaults to the context namespace)
        #[arg(long, short)]
        namespace: Option<String>,

        /// Container to introspect (defaults to the first container)
        #[arg(long, short)]
        container: Option<String>,

        /// Existing JSON descriptor to merge into
        #[arg(long)]
        from: Option<PathBuf>,
    },

    /// Show the local ports that would be assigned to remote ports
    Forwards {
        /// Remote ports, in declaration order
        #[arg(required = true)]
        ports: Vec<u16>,

        /// Forwards already present, as LOCAL:REMOTE
        #[arg(long, value_parser = forwards::parse_forward)]
        existing: Vec<PortForward>,
    },
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON lines
    Json,
}

/// Install the tracing subscriber; logs go to stderr so stdout stays
/// parseable
fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("warn,devinit={level},devinit_lib={level}"))
    });
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = config::CliConfig::load()?;

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        cli.log_level
            .clone()
            .or_else(|| config.log_level.clone())
            .unwrap_or_else(|| "warn".to_string())
    };
    init_tracing(&level, cli.log_format);

    let format = match cli.format {
        Some(format) => format,
        None => match config.default_format.as_deref() {
            Some(name) => output::OutputFormat::from_str(name, true)
                .map_err(|e| anyhow::anyhow!("invalid default_format in config: {}", e))?,
            None => output::OutputFormat::default(),
        },
    };

    let settings = Settings {
        kubeconfig: config::kubeconfig_path(cli.kubeconfig.as_deref(), &config),
        context: cli.context,
        namespace: config.default_namespace,
        format,
    };

    match cli.command {
        Commands::Init {
            deployment,
            namespace,
            container,
            from,
        } => {
            init::run_init(
                &settings,
                init::InitArgs {
                    deployment,
                    namespace,
                    container,
                    from,
                },
            )
            .await?;
        }
        Commands::Forwards { ports, existing } => {
            forwards::run_forwards(&ports, &existing, settings.format)?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}
