use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use etcd_custodian::{
    controller::{self, KubeStore, StatefulSetHealth},
    telemetry, CustodianConfig, Error,
};
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the custodian
    Run(RunArgs),
    /// Show version and build information
    Version,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Namespace to watch (all namespaces when unset)
    #[arg(long, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,

    /// Number of Etcds reconciled concurrently
    #[arg(long, env = "CUSTODIAN_WORKERS", default_value_t = 3)]
    workers: u16,

    /// Seconds to wait before looking again at an Etcd without a StatefulSet
    #[arg(long, default_value_t = 5)]
    requeue_delay_secs: u64,

    /// Seconds to wait before retrying a failed reconciliation
    #[arg(long, default_value_t = 1)]
    error_requeue_secs: u64,

    /// Listen address of the HTTP API
    #[arg(long, default_value = "0.0.0.0:8080")]
    api_addr: SocketAddr,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,
}

impl RunArgs {
    fn config(&self) -> CustodianConfig {
        CustodianConfig {
            namespace: self.namespace.clone(),
            workers: self.workers,
            requeue_delay: Duration::from_secs(self.requeue_delay_secs),
            error_requeue_delay: Duration::from_secs(self.error_requeue_secs),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("etcd-custodian v{}", env!("CARGO_PKG_VERSION"));
            println!("Build Date: {}", env!("BUILD_DATE"));
            println!("Git SHA: {}", env!("GIT_SHA"));
            println!("Rust Version: {}", env!("RUST_VERSION"));
            Ok(())
        }
        Commands::Run(run_args) => run_custodian(run_args).await,
    }
}

fn init_tracing(log_json: bool) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let (plain_layer, json_layer) = if log_json {
        (None, Some(fmt::layer().json().with_target(true)))
    } else {
        (Some(fmt::layer().with_target(true)), None)
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(plain_layer)
        .with(json_layer);

    if !telemetry::otel_enabled() {
        registry.init();
        info!("OpenTelemetry tracing disabled (OTEL_EXPORTER_OTLP_ENDPOINT not set)");
        return;
    }

    match telemetry::init_telemetry(&registry) {
        Ok(otel_layer) => {
            registry.with(otel_layer).init();
            info!("OpenTelemetry tracing initialized");
        }
        Err(e) => {
            registry.init();
            warn!("Failed to initialize OpenTelemetry tracing: {}", e);
        }
    }
}

async fn run_custodian(args: RunArgs) -> Result<(), Error> {
    init_tracing(args.log_json);

    info!("Starting etcd-custodian v{}", env!("CARGO_PKG_VERSION"));

    let config = args.config();
    if config.workers == 0 {
        return Err(Error::ConfigError("--workers must be at least 1".to_string()));
    }
    match &config.namespace {
        Some(ns) => info!("Watching namespace {}", ns),
        None => info!("Watching all namespaces"),
    }

    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;

    info!("Connected to Kubernetes cluster");

    let state = Arc::new(controller::ControllerState {
        store: Arc::new(KubeStore::new(client.clone())),
        health: Arc::new(StatefulSetHealth),
        config,
    });

    #[cfg(feature = "rest-api")]
    {
        let api_state = state.clone();
        let addr = args.api_addr;
        tokio::spawn(async move {
            if let Err(e) = etcd_custodian::rest_api::run_server(api_state, addr).await {
                tracing::error!("REST API server error: {:?}", e);
            }
        });
    }
    #[cfg(not(feature = "rest-api"))]
    let _ = args.api_addr;

    let result = controller::run_controller(client, state).await;

    // Flush any remaining traces
    telemetry::shutdown_telemetry();

    result
}
