use anyhow::{Context, Result};
use clap::Parser;
use scout_core::config::{ActivationMode, AppConfig};
use scout_dyncfg::function::FunctionReader;
use scout_dyncfg::wire::WireWriter;
use scout_pipeline::manager::ManagerTiming;
use scout_pipeline::pipeline::DefaultFactory;
use scout_sd::{ConfDirProvider, SdOpts, ServiceDiscovery};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Scout - service discovery engine for the metrics-collection agent
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Additional directories scanned for *.conf declarations
    #[arg(short = 'd', long = "conf-dir")]
    conf_dirs: Vec<PathBuf>,

    /// Override the agent name used in protocol ids
    #[arg(long)]
    agent_name: Option<String>,

    /// Hold newly exposed file configs until an explicit enable/disable
    #[arg(long)]
    wait_for_command: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("Failed to load config file: {path:?}"))?,
        None => AppConfig::default(),
    };
    config.conf_dirs.extend(args.conf_dirs.iter().cloned());
    if let Some(name) = args.agent_name {
        config.agent_name = name;
    }
    if args.wait_for_command {
        config.activation = ActivationMode::WaitForCommand;
    }
    config.validate().context("Invalid configuration")?;

    // Protocol frames go to stdout; logs must stay on stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!(agent = %config.agent_name, dirs = config.conf_dirs.len(), "starting scout");

    let cancel = CancellationToken::new();
    let (out_tx, mut out_rx) = mpsc::channel(256);
    let (file_tx, file_rx) = mpsc::channel(64);

    let (sd, cmd_rx) = ServiceDiscovery::new(SdOpts {
        agent_name: config.agent_name.clone(),
        activation: config.activation,
        factory: Arc::new(DefaultFactory),
        writer: WireWriter::new(std::io::stdout()),
        out: out_tx,
        cancel: cancel.clone(),
        timing: ManagerTiming::default(),
    });
    let sd = Arc::new(sd);

    ConfDirProvider::new(
        config.conf_dirs.clone(),
        Duration::from_secs(config.rescan_interval_secs),
    )
    .spawn(cancel.clone(), file_tx);

    // Downstream consumer. The collector modules that turn job groups into
    // configurations live in the parent agent; standalone we account for
    // the batches and surface them at debug level.
    tokio::spawn(async move {
        while let Some(groups) = out_rx.recv().await {
            for group in &groups {
                if group.is_removal() {
                    debug!(source = %group.source, "job group removed");
                } else {
                    debug!(source = %group.source, targets = group.targets.len(), "job group");
                }
            }
        }
    });

    // Command reader. End of stdin means the parent is gone.
    let reader_sd = Arc::clone(&sd);
    let reader_cancel = cancel.clone();
    tokio::spawn(async move {
        let mut reader = FunctionReader::new(tokio::io::stdin());
        loop {
            match reader.next().await {
                Ok(Some(function)) => reader_sd.dispatch(function),
                Ok(None) => {
                    info!("command stream closed; shutting down");
                    reader_cancel.cancel();
                    return;
                }
                Err(e) => warn!(error = %e, "ignoring malformed command frame"),
            }
        }
    });

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
            return;
        }
        info!("shutdown signal received");
        signal_cancel.cancel();
    });

    sd.run(file_rx, cmd_rx).await;

    Ok(())
}
