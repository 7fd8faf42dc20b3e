// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context, Result};
use clap::Parser;
use kube::Client;
use nodedns::{
    cloudflare::CloudflareClient,
    config::{AnnotationKeys, ControllerConfig},
    constants::{
        CLOUDFLARE_API_BASE, CLOUDFLARE_REQUEST_TIMEOUT_SECS, DEFAULT_NAMESPACE,
        DEFAULT_WATCH_TIMEOUT_SECS, METRICS_SERVER_BIND_ADDRESS, METRICS_SERVER_PORT,
        TOKIO_WORKER_THREADS,
    },
    controller::Controller,
    kube_cluster::KubeCluster,
    labels::{ANNOTATION_NODE_DNS, ANNOTATION_NODE_DNS_PROXIED},
    metrics,
};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Keep DNS records pointing at the nodes annotated pods run on
#[derive(Parser, Debug)]
#[command(name = "nodedns", version, about)]
struct Cli {
    /// Namespace whose pods are observed
    #[arg(long, env = "NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    namespace: String,

    /// Log planned record changes without applying them
    #[arg(long, env = "DRY_RUN")]
    dry_run: bool,

    /// Pod annotation holding the requested hostname
    #[arg(long, env = "HOSTNAME_ANNOTATION", default_value = ANNOTATION_NODE_DNS)]
    hostname_annotation: String,

    /// Pod annotation asking for the hostname to be proxied
    #[arg(long, env = "PROXY_ANNOTATION", default_value = ANNOTATION_NODE_DNS_PROXIED)]
    proxy_annotation: String,

    /// Cloudflare API token with DNS edit permission
    #[arg(long, env = "CF_API_TOKEN", hide_env_values = true)]
    cf_api_token: String,

    /// Cloudflare API base URL
    #[arg(long, env = "CLOUDFLARE_API_URL", default_value = CLOUDFLARE_API_BASE)]
    cloudflare_api_url: String,

    /// Port for the metrics and health endpoints
    #[arg(long, env = "METRICS_PORT", default_value_t = METRICS_SERVER_PORT)]
    metrics_port: u16,

    /// Server-side timeout of each pod watch request, in seconds
    #[arg(
        long,
        env = "WATCH_TIMEOUT_SECS",
        default_value_t = DEFAULT_WATCH_TIMEOUT_SECS,
        value_parser = clap::value_parser!(u32).range(1..295)
    )]
    watch_timeout_secs: u32,
}

impl Cli {
    fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            namespace: self.namespace.clone(),
            dry_run: self.dry_run,
            annotations: AnnotationKeys {
                hostname: self.hostname_annotation.clone(),
                proxy: self.proxy_annotation.clone(),
            },
        }
    }

    fn metrics_addr(&self) -> Result<SocketAddr> {
        format!("{METRICS_SERVER_BIND_ADDRESS}:{}", self.metrics_port)
            .parse()
            .context("Invalid metrics bind address")
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("nodedns-controller")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

fn init_logging() {
    // Respects RUST_LOG (default INFO) and RUST_LOG_FORMAT=json|text
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main(cli: Cli) -> Result<()> {
    init_logging();

    let config = cli.controller_config();
    info!(
        namespace = %config.namespace,
        dry_run = config.dry_run,
        hostname_annotation = %config.annotations.hostname,
        proxy_annotation = %config.annotations.proxy,
        "Starting node DNS controller"
    );
    if config.dry_run {
        warn!("Dry-run enabled: DNS records will not be changed");
    }

    // kube and reqwest may pull in different rustls backends; pick one process-wide
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }

    debug!("Initializing Kubernetes client");
    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let cluster = KubeCluster::new(client, cli.watch_timeout_secs);

    let provider = CloudflareClient::new(
        cli.cf_api_token.clone(),
        &cli.cloudflare_api_url,
        Duration::from_secs(CLOUDFLARE_REQUEST_TIMEOUT_SECS),
    )?;

    let mut controller = Controller::new(cluster, provider, config);
    let metrics_addr = cli.metrics_addr()?;

    tokio::select! {
        result = controller.run() => {
            error!("CRITICAL: control loop exited: {:?}", result);
            result?;
            anyhow::bail!("Control loop exited unexpectedly without error")
        }
        result = metrics::serve(metrics_addr) => {
            error!("CRITICAL: metrics server exited: {:?}", result);
            result?;
            anyhow::bail!("Metrics server exited unexpectedly without error")
        }
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Received shutdown signal, exiting");
            Ok(())
        }
    }
}
