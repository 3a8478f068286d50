//! Command line and file configuration for the controller process

use clap::{Parser, ValueEnum};
use router_admin::AdminConfig;
use router_core::{BackoffPolicy, CoreError, GlobalConfig, Result, SchemaVersion};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

/// Command line flags. Every value set here overrides the config file.
#[derive(Parser, Debug, Default)]
#[command(name = "router-controller", version, about = "Gateway ingress status controller")]
pub struct Args {
    /// YAML config file
    #[arg(long, env = "ROUTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Suppress all status, condition and load balancer writes
    #[arg(long, env = "ROUTER_DISABLE_STATUS")]
    pub disable_status: bool,

    /// Address published on Ingress load balancer status
    #[arg(long, env = "ROUTER_PUBLISH_ADDRESS")]
    pub publish_address: Option<String>,

    #[arg(long, env = "ROUTER_INGRESS_CLASS")]
    pub ingress_class: Option<String>,

    /// ApisixRoute version to watch (v2 or v2beta3)
    #[arg(long, env = "ROUTER_ROUTE_VERSION")]
    pub route_version: Option<String>,

    /// ApisixUpstream version to watch (v2 or v2beta3)
    #[arg(long, env = "ROUTER_UPSTREAM_VERSION")]
    pub upstream_version: Option<String>,

    /// Base URL of the data-plane admin API
    #[arg(long, env = "ROUTER_ADMIN_URL")]
    pub admin_url: Option<String>,

    #[arg(long, env = "ROUTER_ADMIN_KEY", hide_env_values = true)]
    pub admin_key: Option<String>,

    #[arg(long, env = "ROUTER_REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: Option<u64>,

    #[arg(long, env = "ROUTER_CLUSTER_DOMAIN")]
    pub cluster_domain: Option<String>,

    /// Concurrent reconcile workers
    #[arg(long, env = "ROUTER_WORKERS")]
    pub workers: Option<usize>,

    #[arg(long, env = "ROUTER_MAX_RETRIES")]
    pub max_retries: Option<u32>,

    #[arg(long, env = "ROUTER_INITIAL_BACKOFF_MS")]
    pub initial_backoff_ms: Option<u64>,

    #[arg(long, env = "ROUTER_MAX_BACKOFF_SECS")]
    pub max_backoff_secs: Option<u64>,

    /// Interval for re-applying every known resource
    #[arg(long, env = "ROUTER_RESYNC_INTERVAL_SECS")]
    pub resync_interval_secs: Option<u64>,

    /// Listen address for /metrics and /healthz
    #[arg(long, env = "ROUTER_METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,

    #[arg(long, env = "ROUTER_LOG_FORMAT", value_enum)]
    pub log_format: Option<LogFormat>,
}

/// Effective controller configuration
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    pub disable_status: bool,
    pub publish_address: Option<String>,
    pub ingress_class: String,
    pub route_version: String,
    pub upstream_version: String,
    pub admin_url: String,
    pub admin_key: Option<String>,
    pub request_timeout_secs: u64,
    pub cluster_domain: String,
    pub workers: usize,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_secs: u64,
    pub resync_interval_secs: u64,
    pub metrics_addr: SocketAddr,
    pub log_format: LogFormat,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        let admin = AdminConfig::default();
        let backoff = BackoffPolicy::default();
        Self {
            disable_status: false,
            publish_address: None,
            ingress_class: "apisix".to_string(),
            route_version: "v2".to_string(),
            upstream_version: "v2".to_string(),
            admin_url: admin.base_url,
            admin_key: None,
            request_timeout_secs: admin.timeout.as_secs(),
            cluster_domain: "cluster.local".to_string(),
            workers: 4,
            max_retries: backoff.max_retries,
            initial_backoff_ms: backoff.initial_delay.as_millis() as u64,
            max_backoff_secs: backoff.max_delay.as_secs(),
            resync_interval_secs: 300,
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 9090)),
            log_format: LogFormat::Plain,
        }
    }
}

impl ControllerConfig {
    /// Build the effective config from an optional file plus flags
    pub fn load(args: &Args) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.merge(args);
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CoreError::config(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&text)
            .map_err(|e| CoreError::config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| CoreError::config(e.to_string()))
    }

    fn merge(&mut self, args: &Args) {
        if args.disable_status {
            self.disable_status = true;
        }
        override_with(&mut self.publish_address, args.publish_address.clone().map(Some));
        override_with(&mut self.ingress_class, args.ingress_class.clone());
        override_with(&mut self.route_version, args.route_version.clone());
        override_with(&mut self.upstream_version, args.upstream_version.clone());
        override_with(&mut self.admin_url, args.admin_url.clone());
        override_with(&mut self.admin_key, args.admin_key.clone().map(Some));
        override_with(&mut self.request_timeout_secs, args.request_timeout_secs);
        override_with(&mut self.cluster_domain, args.cluster_domain.clone());
        override_with(&mut self.workers, args.workers);
        override_with(&mut self.max_retries, args.max_retries);
        override_with(&mut self.initial_backoff_ms, args.initial_backoff_ms);
        override_with(&mut self.max_backoff_secs, args.max_backoff_secs);
        override_with(&mut self.resync_interval_secs, args.resync_interval_secs);
        override_with(&mut self.metrics_addr, args.metrics_addr);
        override_with(&mut self.log_format, args.log_format);
    }

    pub fn validate(&self) -> Result<()> {
        self.global().validate()?;
        self.route_version()?;
        self.upstream_version()?;

        if self.workers == 0 {
            return Err(CoreError::config("workers must be at least 1"));
        }
        if self.ingress_class.trim().is_empty() {
            return Err(CoreError::config("ingress class must not be empty"));
        }
        if self.request_timeout_secs == 0 {
            return Err(CoreError::config("request timeout must be at least one second"));
        }
        if self.resync_interval_secs == 0 {
            return Err(CoreError::config("resync interval must be at least one second"));
        }
        let backoff = self.backoff();
        if backoff.initial_delay > backoff.max_delay {
            return Err(CoreError::config(format!(
                "initial backoff {:?} exceeds max backoff {:?}",
                backoff.initial_delay, backoff.max_delay
            )));
        }
        router_admin::AdminClient::new(self.admin())?;
        Ok(())
    }

    pub fn global(&self) -> GlobalConfig {
        GlobalConfig {
            status_updates_enabled: !self.disable_status,
            published_address: self.publish_address.clone(),
        }
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_backoff_ms),
            max_delay: Duration::from_secs(self.max_backoff_secs),
            ..Default::default()
        }
    }

    pub fn admin(&self) -> AdminConfig {
        AdminConfig {
            base_url: self.admin_url.clone(),
            api_key: self.admin_key.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn route_version(&self) -> Result<SchemaVersion> {
        self.route_version.parse()
    }

    pub fn upstream_version(&self) -> Result<SchemaVersion> {
        self.upstream_version.parse()
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }
}

fn override_with<T>(field: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *field = value;
    }
}
