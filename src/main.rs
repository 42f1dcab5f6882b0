// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::Result;
use axum::{routing::get, Router};
use clap::Parser;
use gslby::{
    assistant::GslbAssistant,
    config::{self, LoggerConfig},
    constants::{
        DEFAULT_LEASE_DURATION_SECS, DEFAULT_LEASE_RETRY_PERIOD_SECS, DEFAULT_METRICS_ADDR,
        LEASE_NAME, METRICS_SERVER_PATH, TOKIO_WORKER_THREADS,
    },
    dns, fakedns, metrics,
    reconciler::{run_controller, Context},
};
use kube::Client;
use kube_lease_manager::LeaseManagerBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

/// GSLB controller for Kubernetes.
#[derive(Debug, Parser)]
#[command(name = "gslby", about = "A GSLB controller steering traffic across clusters via DNS")]
struct Args {
    /// The address the metric endpoint binds to.
    #[arg(long = "metrics-addr", default_value = DEFAULT_METRICS_ADDR)]
    metrics_addr: String,

    /// Enable leader election for the controller.
    /// Enabling this will ensure there is only one active controller.
    #[arg(long = "enable-leader-election", default_value_t = false)]
    enable_leader_election: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("gslby-controller")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<()> {
    // The logger is built even when the configuration is broken, so the
    // configuration error itself gets logged.
    let config = match config::resolve_operator_config() {
        Ok(config) => {
            config::init_logging(&config.logger);
            config
        }
        Err(e) => {
            config::init_logging(&LoggerConfig::default());
            error!(error = %e, "reading config env variables");
            anyhow::bail!("invalid configuration: {e}");
        }
    };

    info!("Starting GSLB controller");

    // Fail startup, not the first scrape, when the registry is unusable
    metrics::register_all();
    let metrics_listener = bind_metrics_listener(&args.metrics_addr).await?;
    let _metrics_handle = start_metrics_server(metrics_listener);

    let client = Client::try_default().await?;

    if config.overrides.fake_dns_enabled {
        warn!("OVERRIDE_FAKE_DNS is enabled, starting in-process fake DNS server");
        fakedns::spawn();
    }

    let assistant = Arc::new(GslbAssistant::new(
        client.clone(),
        &config.namespace,
        &config.edge_dns_server,
    ));
    info!("starting DNS provider");
    let provider = dns::provider_for(config.clone(), assistant);
    info!(provider = %provider, geo_tag = %config.cluster_geo_tag, "provider selected");

    let ctx = Arc::new(Context {
        client: client.clone(),
        config: config.clone(),
        provider,
    });

    if args.enable_leader_election {
        wait_for_leadership(client, &config.namespace).await?;
    } else {
        warn!("Leader election disabled - running without high availability");
    }

    run_with_signal_handling(ctx).await?;
    info!("Graceful shutdown completed successfully");
    Ok(())
}

/// Resolve the `--metrics-addr` flag (`:8080` means every interface) and
/// bind it. A bind failure is a startup failure.
async fn bind_metrics_listener(metrics_addr: &str) -> Result<tokio::net::TcpListener> {
    let addr: SocketAddr = if metrics_addr.starts_with(':') {
        format!("0.0.0.0{metrics_addr}").parse()?
    } else {
        metrics_addr.parse()?
    };
    Ok(tokio::net::TcpListener::bind(addr).await?)
}

/// Serve the Prometheus metrics endpoint.
fn start_metrics_server(listener: tokio::net::TcpListener) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        async fn metrics_handler() -> String {
            match metrics::gather_metrics() {
                Ok(text) => text,
                Err(e) => {
                    error!(error = %e, "Failed to gather metrics");
                    String::from("# Error gathering metrics\n")
                }
            }
        }

        let app = Router::new().route(METRICS_SERVER_PATH, get(metrics_handler));
        match listener.local_addr() {
            Ok(addr) => info!("Metrics server listening on http://{addr}{METRICS_SERVER_PATH}"),
            Err(_) => info!("Metrics server listening"),
        }

        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Metrics server error");
        }
    })
}

/// Block until this instance holds the leadership lease.
async fn wait_for_leadership(client: Client, namespace: &str) -> Result<()> {
    let identity = std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("gslby-{}", rand::random::<u32>()));

    info!(
        lease_name = LEASE_NAME,
        lease_namespace = namespace,
        identity = %identity,
        "Leader election enabled, waiting to acquire leadership"
    );

    let lease_manager = LeaseManagerBuilder::new(client, LEASE_NAME)
        .with_namespace(namespace)
        .with_identity(&identity)
        .with_duration(DEFAULT_LEASE_DURATION_SECS)
        .with_grace(DEFAULT_LEASE_RETRY_PERIOD_SECS)
        .build()
        .await?;

    let (leader_rx, _lease_handle) = lease_manager.watch().await;
    let mut rx = leader_rx.clone();
    while !*rx.borrow_and_update() {
        rx.changed().await?;
    }

    info!("Leadership acquired, starting controller");
    Ok(())
}

/// Run the controller until it exits or a shutdown signal arrives.
async fn run_with_signal_handling(ctx: Arc<Context>) -> Result<()> {
    tokio::select! {
        // SIGINT (Ctrl+C)
        result = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, initiating graceful shutdown");
            result.map_err(anyhow::Error::from)
        }

        // SIGTERM (Kubernetes sends this when deleting pods)
        result = async {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                let mut sigterm = signal(SignalKind::terminate())?;
                sigterm.recv().await;
                Ok::<(), anyhow::Error>(())
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
                Ok::<(), anyhow::Error>(())
            }
        } => {
            info!("Received SIGTERM, initiating graceful shutdown");
            result
        }

        // The controller itself; it should never return on its own
        result = run_controller(ctx) => {
            error!("Gslb controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Gslb controller exited unexpectedly without error")
        }
    }
}
