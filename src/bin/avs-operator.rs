//! # AVS Operator
//!
//! Thin wrapper binary for running the operator daemon and managing its signing key.
//!
//! ## Usage
//!
//! ```bash
//! # Create an encrypted signing key (password from OPERATOR_SIGNING_KEY_PASSWORD)
//! avs-operator keystore new --out keys/operator.key.json
//!
//! # Print the public key of an existing keystore
//! avs-operator keystore inspect --path keys/operator.key.json
//!
//! # Run the operator
//! OPERATOR_ENV=production avs-operator run --config config/operator.toml
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{error, info};

use avs_operator::config::ConfigManager;
use avs_operator::identity::keystore::{password_from_env, Keystore, DEFAULT_PBKDF2_ITERATIONS};
use avs_operator::identity::OperatorKeypair;
use avs_operator::logging;
use avs_operator::operator::{AuxiliaryMonitor, OperatorBootstrap, OperatorStats};

#[derive(Parser)]
#[command(name = "avs-operator")]
#[command(about = "Attest to on-chain compute tasks and report signed results")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the operator until Ctrl+C or SIGTERM
    Run {
        /// Base configuration file
        #[arg(short, long, default_value = "config/operator.toml")]
        config: PathBuf,
    },

    /// Manage the encrypted signing key
    Keystore {
        #[command(subcommand)]
        command: KeystoreCommands,
    },
}

#[derive(Subcommand)]
enum KeystoreCommands {
    /// Generate a new BLS (BN254) signing key and write it encrypted
    New {
        /// Destination keystore file
        #[arg(short, long)]
        out: PathBuf,

        /// Environment variable holding the keystore password
        #[arg(long, default_value = "OPERATOR_SIGNING_KEY_PASSWORD")]
        password_env: String,

        /// PBKDF2 iterations
        #[arg(long, default_value_t = DEFAULT_PBKDF2_ITERATIONS)]
        iterations: u32,
    },

    /// Print the public key stored in a keystore
    Inspect {
        #[arg(short, long)]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_structured_logging();

    let outcome = match cli.command {
        Commands::Run { config } => run(config).await,
        Commands::Keystore { command } => keystore(command),
    };

    if let Err(e) = outcome {
        error!(error = %format!("{e:#}"), "avs-operator exited with an error");
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(config_path: PathBuf) -> anyhow::Result<()> {
    info!("🚀 Starting AVS operator...");
    info!("   Version: {}", env!("CARGO_PKG_VERSION"));

    let manager = ConfigManager::load_from_path(&config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path.display()))?;
    info!("   Environment: {}", manager.environment());

    let operator = OperatorBootstrap::from_config(manager.config())
        .await
        .context("failed to bootstrap operator")?;

    let auxiliary = match manager.config().health.stats_interval_secs {
        Some(secs) => {
            let (reporter, monitor) = AuxiliaryMonitor::channel();
            let stats_task = tokio::spawn(report_stats(operator.stats(), Duration::from_secs(secs)));
            reporter.supervise("stats-reporter", stats_task);
            monitor
        }
        None => AuxiliaryMonitor::disabled(),
    };

    let (stop, shutdown) = oneshot::channel();
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = stop.send(());
    });

    info!("   Press Ctrl+C to shutdown gracefully");
    operator.start(shutdown, auxiliary).await?;

    info!("👋 AVS operator shutdown complete");
    Ok(())
}

fn keystore(command: KeystoreCommands) -> anyhow::Result<()> {
    match command {
        KeystoreCommands::New {
            out,
            password_env,
            iterations,
        } => {
            if out.exists() {
                bail!("refusing to overwrite existing keystore {}", out.display());
            }
            let password = password_from_env(&password_env);
            let keypair = OperatorKeypair::generate();
            Keystore::encrypt(&keypair, &password, iterations)?.save(&out)?;

            info!(path = %out.display(), "Wrote new keystore");
            println!("{}", keypair.public_key());
        }
        KeystoreCommands::Inspect { path } => {
            let keystore = Keystore::load(&path)?;
            println!("{}", keystore.public_key);
        }
    }
    Ok(())
}

/// Periodically log a stats snapshot
async fn report_stats(stats: std::sync::Arc<OperatorStats>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await;
    loop {
        interval.tick().await;
        let snapshot = stats.snapshot();
        info!(
            tasks_received = snapshot.tasks_received,
            duplicates_skipped = snapshot.duplicates_skipped,
            delegate_failures = snapshot.delegate_failures,
            signing_failures = snapshot.signing_failures,
            responses_dispatched = snapshot.responses_dispatched,
            responses_delivered = snapshot.responses_delivered,
            delivery_failures = snapshot.delivery_failures,
            deliveries_in_flight = snapshot.deliveries_in_flight(),
            resubscriptions = snapshot.resubscriptions,
            last_task_index = ?snapshot.last_task_index,
            last_task_at = ?snapshot.last_task_at,
            "📊 Operator stats"
        );
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received SIGTERM");
        },
    }
}
