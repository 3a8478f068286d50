//! Status reporter: writes sync outcomes back onto resources

use crate::condition::{
    new_condition, upsert_condition, ConditionStatus, MESSAGE_SYNCED, REASON_SUCCEEDED,
    RESOURCES_AVAILABLE,
};
use crate::config::GlobalConfig;
use crate::error::{CoreError, Result};
use crate::executor::SyncOutcome;
use crate::resource::{LoadBalancerIngress, ResourceKey, ResourceKind, ResourceStatus};
use crate::store::{ResourceStore, StatusWrite};
use chrono::Utc;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Status writes are attempted this many times before deferring
const WRITE_ATTEMPTS: usize = 2;

/// What a call to [`StatusReporter::report`] did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Status updates are globally disabled
    Disabled,
    Written,
    /// The resource already carried the computed status
    Unchanged,
    /// A newer generation exists; its own reconcile will report
    Stale,
    Deleted,
    /// Nothing to write for this kind and outcome
    NotApplicable,
}

pub struct StatusReporter {
    config: GlobalConfig,
    store: Arc<dyn ResourceStore>,
}

impl StatusReporter {
    pub fn new(config: GlobalConfig, store: Arc<dyn ResourceStore>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    /// Persist the status for `outcome` onto the resource at `observed_generation`.
    ///
    /// Writes are conditional on the resourceVersion read just before. A
    /// conflict re-reads and retries once, then returns [`CoreError::Conflict`].
    pub async fn report(
        &self,
        key: &ResourceKey,
        outcome: &SyncOutcome,
        observed_generation: i64,
    ) -> Result<ReportOutcome> {
        if !self.config.status_updates_enabled {
            return Ok(ReportOutcome::Disabled);
        }

        if key.kind == ResourceKind::Ingress {
            if let Some(detail) = outcome.error_detail() {
                warn!("Ingress {} failed to sync: {}", key, detail);
                return Ok(ReportOutcome::NotApplicable);
            }
            if self.config.published_address.is_none() {
                return Ok(ReportOutcome::NotApplicable);
            }
        }

        for attempt in 1..=WRITE_ATTEMPTS {
            let Some(current) = self.store.get(key).await? else {
                debug!("{} was deleted before its status was written", key);
                return Ok(ReportOutcome::Deleted);
            };

            if current.generation != observed_generation {
                debug!(
                    "Skipping stale status for {}: observed generation {}, current {}",
                    key, observed_generation, current.generation
                );
                return Ok(ReportOutcome::Stale);
            }

            let Some(desired) =
                self.desired_status(key, &current.status, outcome, observed_generation)
            else {
                return Ok(ReportOutcome::Unchanged);
            };

            match self
                .store
                .update_status(key, &current.resource_version, &desired)
                .await?
            {
                StatusWrite::Updated => {
                    debug!("Updated status of {}", key);
                    return Ok(ReportOutcome::Written);
                }
                StatusWrite::Conflict => {
                    debug!("Status write conflict on {} (attempt {})", key, attempt);
                }
            }
        }

        Err(CoreError::Conflict(format!(
            "status of {} changed concurrently {} times",
            key, WRITE_ATTEMPTS
        )))
    }

    // Returns None when the current status already matches
    fn desired_status(
        &self,
        key: &ResourceKey,
        current: &ResourceStatus,
        outcome: &SyncOutcome,
        observed_generation: i64,
    ) -> Option<ResourceStatus> {
        let mut desired = current.clone();
        match key.kind {
            ResourceKind::Ingress => {
                let address = self.config.published_address.as_deref()?;
                desired.load_balancer = vec![load_balancer_ingress(address)];
                if desired == *current {
                    return None;
                }
            }
            ResourceKind::Route | ResourceKind::Upstream => {
                let condition = match outcome.error() {
                    None => new_condition(
                        RESOURCES_AVAILABLE,
                        ConditionStatus::True,
                        REASON_SUCCEEDED,
                        MESSAGE_SYNCED,
                        observed_generation,
                        Utc::now(),
                    ),
                    Some(err) => new_condition(
                        RESOURCES_AVAILABLE,
                        ConditionStatus::False,
                        err.reason(),
                        &err.to_string(),
                        observed_generation,
                        Utc::now(),
                    ),
                };
                if !upsert_condition(&mut desired.conditions, condition) {
                    return None;
                }
            }
        }
        Some(desired)
    }
}

fn load_balancer_ingress(address: &str) -> LoadBalancerIngress {
    if address.parse::<IpAddr>().is_ok() {
        LoadBalancerIngress {
            ip: Some(address.to_string()),
            hostname: None,
        }
    } else {
        LoadBalancerIngress {
            ip: None,
            hostname: Some(address.to_string()),
        }
    }
}
