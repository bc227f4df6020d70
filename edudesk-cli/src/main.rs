mod cli;

use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use edudesk_client::auth::{AuthPipeline, FileTokenStore, ReqwestTransport, RequestDescriptor};
use edudesk_client::config::{ClientConfig, MonitorConfig};
use edudesk_client::connectivity::{
    ConnectivityEvent, ConnectivityMonitor, HttpProbe, ReachabilityProbe,
};
use edudesk_client::{Method, TokenPair, TokenStore};

use crate::cli::{Args, Commands};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    if let Err(e) = run(args).await {
        error!("Application error: {e:#}");
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_level(verbose))
        .init();
}

fn client_config(args: &Args) -> Result<ClientConfig> {
    let config = ClientConfig::from_env();
    match &args.base_url {
        Some(base) => Ok(config
            .with_base_url(base)
            .with_context(|| format!("invalid base URL {base:?}"))?),
        None => Ok(config),
    }
}

async fn run(args: Args) -> Result<()> {
    let config = client_config(&args)?;

    match &args.command {
        Commands::Ping => ping(&config).await,
        Commands::Watch { interval_secs } => watch(&config, *interval_secs).await,
        Commands::Call { method, path, body } => {
            call(&args, config, method, path, body.as_deref()).await
        }
        Commands::Login { access, refresh } => {
            let store = FileTokenStore::new(&args.token_file);
            store
                .save(&TokenPair::new(access.clone(), refresh.clone()))
                .await?;
            info!(path = %args.token_file.display(), "credentials stored");
            Ok(())
        }
        Commands::Logout => {
            let store = FileTokenStore::new(&args.token_file);
            store.clear().await?;
            info!(path = %args.token_file.display(), "credentials cleared");
            Ok(())
        }
    }
}

async fn ping(config: &ClientConfig) -> Result<()> {
    let probe = HttpProbe::new(config, &MonitorConfig::from_env())?;
    info!(url = %probe.url(), "probing backend");

    match probe.probe().await {
        Ok(()) => {
            println!("online");
            Ok(())
        }
        Err(e) => {
            println!("offline");
            bail!("backend unreachable at {}: {e}", config.base_url)
        }
    }
}

async fn watch(config: &ClientConfig, interval_secs: Option<u64>) -> Result<()> {
    let mut monitor_config = MonitorConfig::from_env();
    if let Some(secs) = interval_secs {
        monitor_config.interval = Duration::from_secs(secs);
    }

    let probe = Arc::new(HttpProbe::new(config, &monitor_config)?);
    let monitor = Arc::new(ConnectivityMonitor::new(probe, monitor_config));
    let mut events = monitor.subscribe();

    let (_signals_tx, signals_rx) = tokio::sync::mpsc::channel(8);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(monitor.clone().run(signals_rx, cancel.clone()));

    println!("{}", monitor.current());
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(ConnectivityEvent::StateChanged { from, to, timestamp }) => {
                    println!("{timestamp}  {from} -> {to}");
                }
                Ok(ConnectivityEvent::ProbeCompleted { .. }) => {}
                Err(e) => {
                    error!("event stream closed: {e}");
                    break;
                }
            },
        }
    }

    cancel.cancel();
    task.await.context("monitor task panicked")?;
    Ok(())
}

async fn call(
    args: &Args,
    config: ClientConfig,
    method: &str,
    path: &str,
    body: Option<&str>,
) -> Result<()> {
    let method = Method::from_bytes(method.to_uppercase().as_bytes())
        .with_context(|| format!("invalid HTTP method {method:?}"))?;

    let transport = Arc::new(ReqwestTransport::new(config)?);
    let store: Arc<dyn TokenStore> = Arc::new(FileTokenStore::new(&args.token_file));
    let pipeline = AuthPipeline::new(transport, store);

    let mut descriptor = RequestDescriptor::new(method, path);
    if let Some(body) = body {
        let json: serde_json::Value =
            serde_json::from_str(body).context("request body is not valid JSON")?;
        descriptor = descriptor.with_json(&json)?;
    }

    let response = pipeline.send(&descriptor).await?;
    info!(status = %response.status, "response received");
    println!("{}", response.text());

    if !response.is_success() {
        bail!("request failed with HTTP {}", response.status);
    }
    Ok(())
}
