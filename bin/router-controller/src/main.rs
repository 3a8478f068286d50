use anyhow::Result;
use clap::Parser;
use k8s_openapi::api::networking::v1::Ingress;
use kube::{Api, Client};
use router_admin::AdminClient;
use router_api::{v2, v2beta3};
use router_core::{
    Controller, ControllerMetrics, ResourceKind, SchemaVersion, StatusReporter, SyncExecutor,
    SyncRegistry,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;
mod kube_store;
mod server;
mod watch;

use config::{Args, ControllerConfig, LogFormat};
use kube_store::{matches_class, KubeStore};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = ControllerConfig::load(&args)?;
    init_tracing(config.log_format);

    info!("Starting router-controller...");
    if config.disable_status {
        info!("Status updates are disabled");
    }

    let route_version = config.route_version()?;
    let upstream_version = config.upstream_version()?;
    let client = Client::try_default().await?;
    let metrics = ControllerMetrics::new()?;

    let store = Arc::new(KubeStore::new(
        client.clone(),
        route_version,
        upstream_version,
        config.ingress_class.clone(),
    ));
    let dataplane = Arc::new(AdminClient::new(config.admin())?);
    info!("Admin API at {}", dataplane.base_url());

    let executor = SyncExecutor::new(
        dataplane,
        Arc::new(SyncRegistry::new()),
        config.cluster_domain.clone(),
    );
    let reporter = StatusReporter::new(config.global(), store.clone());
    let controller = Arc::new(Controller::new(
        store,
        executor,
        reporter,
        config.backoff(),
        metrics.clone(),
    ));

    spawn_watchers(&client, &config, route_version, upstream_version, &controller);

    let resync_controller = controller.clone();
    let resync_interval = config.resync_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(resync_interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            resync_controller.resync();
        }
    });

    let metrics_addr = config.metrics_addr;
    tokio::spawn(async move {
        if let Err(e) = server::serve(metrics_addr, metrics).await {
            error!("Metrics server error: {}", e);
        }
    });

    let workers = tokio::spawn(controller.clone().run(config.workers));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, draining workers...");
    controller.shutdown();
    if tokio::time::timeout(Duration::from_secs(30), workers).await.is_err() {
        error!("Workers did not stop within 30s, exiting anyway");
    }

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Plain => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn accept_all<K>(_: &K) -> bool {
    true
}

fn spawn_watchers(
    client: &Client,
    config: &ControllerConfig,
    route_version: SchemaVersion,
    upstream_version: SchemaVersion,
    controller: &Arc<Controller>,
) {
    match route_version {
        SchemaVersion::V2 => {
            let api: Api<v2::ApisixRoute> = Api::all(client.clone());
            tokio::spawn(watch::watch(api, ResourceKind::Route, controller.clone(), accept_all));
        }
        SchemaVersion::V2beta3 => {
            let api: Api<v2beta3::ApisixRoute> = Api::all(client.clone());
            tokio::spawn(watch::watch(api, ResourceKind::Route, controller.clone(), accept_all));
        }
    }

    match upstream_version {
        SchemaVersion::V2 => {
            let api: Api<v2::ApisixUpstream> = Api::all(client.clone());
            tokio::spawn(watch::watch(api, ResourceKind::Upstream, controller.clone(), accept_all));
        }
        SchemaVersion::V2beta3 => {
            let api: Api<v2beta3::ApisixUpstream> = Api::all(client.clone());
            tokio::spawn(watch::watch(api, ResourceKind::Upstream, controller.clone(), accept_all));
        }
    }

    let class = config.ingress_class.clone();
    let api: Api<Ingress> = Api::all(client.clone());
    tokio::spawn(watch::watch(
        api,
        ResourceKind::Ingress,
        controller.clone(),
        move |ingress: &Ingress| matches_class(ingress, &class),
    ));
}
