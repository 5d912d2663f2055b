//! Capacity gatekeeping
//!
//! Runs before a cluster is launched:
//! 1. Best-effort deletion of leaked clusters for the same instance type and
//!    region (a pipeline killed mid-stage leaves its cluster behind)
//! 2. Polling the on-demand capacity reservation (ODCR) until it has room
//! 3. A fixed pause for instance types prone to insufficient-capacity errors
//!
//! Nothing reserves capacity between the wait and the launch, so two stages
//! of the same instance type can both pass the check and then race for the
//! same slots.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::naming::sanitize;
use crate::exec::{shell_quote, CommandExecutor, ExecError};
use crate::pipeline::config::CloudCli;

/// Cluster status that needs no further cleanup
const DELETE_IN_PROGRESS: &str = "DELETE_IN_PROGRESS";

#[derive(Debug, thiserror::Error)]
pub enum CapacityError {
    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    #[error("Capacity query for {odcr_id} exited with status {exit_status}")]
    QueryFailed { odcr_id: String, exit_status: i32 },

    #[error("Unexpected capacity output for {odcr_id}: {output:?}")]
    UnexpectedOutput { odcr_id: String, output: String },

    #[error("Timed out after {waited:?} waiting for {needed} instances in {odcr_id} (last seen: {available})")]
    Timeout {
        odcr_id: String,
        needed: u32,
        available: i64,
        waited: Duration,
    },

    #[error("Listing clusters exited with status {0}")]
    ListFailed(i32),

    #[error("Invalid cluster listing: {0}")]
    Listing(#[from] serde_json::Error),

    #[error("Invalid cluster pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Polling and delay knobs for the gatekeeper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacitySettings {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Instance types that get a pause before launch
    #[serde(default = "default_ice_instance_types")]
    pub ice_instance_types: Vec<String>,

    #[serde(default = "default_ice_delay_secs")]
    pub ice_delay_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_timeout_secs() -> u64 {
    3 * 60 * 60
}

fn default_ice_instance_types() -> Vec<String> {
    vec!["p5.48xlarge".to_string()]
}

fn default_ice_delay_secs() -> u64 {
    150
}

impl Default for CapacitySettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            timeout_secs: default_timeout_secs(),
            ice_instance_types: default_ice_instance_types(),
            ice_delay_secs: default_ice_delay_secs(),
        }
    }
}

impl CapacitySettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn ice_delay(&self) -> Duration {
        Duration::from_secs(self.ice_delay_secs)
    }

    pub fn is_ice_prone(&self, instance_type: &str) -> bool {
        self.ice_instance_types.iter().any(|t| t == instance_type)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClusterListing {
    #[serde(default)]
    clusters: Vec<ClusterEntry>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClusterEntry {
    cluster_name: String,
    #[serde(default)]
    cluster_status: Option<String>,
}

/// Wildcard for clusters launched with `instance_type`, e.g. `*p4d24xlarge*`
pub fn stale_cluster_pattern(instance_type: &str) -> String {
    format!("*{}*", sanitize(instance_type))
}

/// Compile a `*` wildcard into an anchored regex
pub fn wildcard_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{}$", body))
}

pub struct CapacityGatekeeper {
    executor: Arc<dyn CommandExecutor>,
    cloud: CloudCli,
    settings: CapacitySettings,
}

impl CapacityGatekeeper {
    pub fn new(executor: Arc<dyn CommandExecutor>, cloud: CloudCli, settings: CapacitySettings) -> Self {
        Self {
            executor,
            cloud,
            settings,
        }
    }

    /// Clean up, wait for capacity, then apply the ICE pause
    #[instrument(skip(self))]
    pub async fn prepare(
        &self,
        instance_type: &str,
        region: &str,
        instance_count: u32,
        odcr_id: &str,
    ) -> Result<(), CapacityError> {
        self.cleanup_stale_clusters(instance_type, region).await;
        self.wait_for_capacity(odcr_id, region, instance_count).await?;

        if self.settings.is_ice_prone(instance_type) {
            info!(
                "Pausing {:?} before launching {} to avoid back-to-back capacity errors",
                self.settings.ice_delay(),
                instance_type
            );
            tokio::time::sleep(self.settings.ice_delay()).await;
        }

        Ok(())
    }

    /// Delete leftover clusters for `instance_type`; returns how many were deleted.
    /// Failures are logged and otherwise ignored.
    pub async fn cleanup_stale_clusters(&self, instance_type: &str, region: &str) -> usize {
        let pattern = stale_cluster_pattern(instance_type);
        match self.delete_matching(&pattern, region).await {
            Ok(deleted) => {
                if deleted > 0 {
                    info!("Deleted {} stale cluster(s) matching {} in {}", deleted, pattern, region);
                }
                deleted
            }
            Err(e) => {
                warn!("Stale cluster cleanup for {} in {} failed: {}", pattern, region, e);
                0
            }
        }
    }

    /// Every cluster in `region`, following `nextToken` across pages
    async fn list_clusters(&self, region: &str) -> Result<Vec<ClusterEntry>, CapacityError> {
        let mut clusters = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let mut list = format!(
                "{} list-clusters --region {}",
                shell_quote(&self.cloud.pcluster),
                shell_quote(region)
            );
            if let Some(token) = &next_token {
                list.push_str(&format!(" --next-token {}", shell_quote(token)));
            }

            let result = self.executor.run(&list, true).await?;
            if !result.is_success() {
                return Err(CapacityError::ListFailed(result.exit_status));
            }

            let page: ClusterListing = serde_json::from_str(result.stdout_trimmed())?;
            clusters.extend(page.clusters);

            match page.next_token {
                Some(token) if next_token.as_ref() != Some(&token) => next_token = Some(token),
                _ => break,
            }
        }

        Ok(clusters)
    }

    async fn delete_matching(&self, pattern: &str, region: &str) -> Result<usize, CapacityError> {
        let matcher = wildcard_regex(pattern)?;
        let mut deleted = 0;

        for cluster in self.list_clusters(region).await? {
            if !matcher.is_match(&cluster.cluster_name) {
                continue;
            }
            if cluster.cluster_status.as_deref() == Some(DELETE_IN_PROGRESS) {
                debug!("Cluster {} is already being deleted", cluster.cluster_name);
                continue;
            }

            let delete = format!(
                "{} delete-cluster --cluster-name {} --region {}",
                shell_quote(&self.cloud.pcluster),
                shell_quote(&cluster.cluster_name),
                shell_quote(region)
            );
            match self.executor.run(&delete, false).await {
                Ok(result) if result.is_success() => deleted += 1,
                Ok(result) => warn!(
                    "Deleting cluster {} exited with status {}",
                    cluster.cluster_name, result.exit_status
                ),
                Err(e) => warn!("Deleting cluster {} failed: {}", cluster.cluster_name, e),
            }
        }

        Ok(deleted)
    }

    /// Current number of free instances in the reservation
    pub async fn available_capacity(&self, odcr_id: &str, region: &str) -> Result<i64, CapacityError> {
        let query = format!(
            "{} ec2 describe-capacity-reservations --capacity-reservation-ids {} --region {} \
             --query 'CapacityReservations[0].AvailableInstanceCount' --output text",
            shell_quote(&self.cloud.aws),
            shell_quote(odcr_id),
            shell_quote(region)
        );
        let result = self.executor.run(&query, true).await?;
        if !result.is_success() {
            return Err(CapacityError::QueryFailed {
                odcr_id: odcr_id.to_string(),
                exit_status: result.exit_status,
            });
        }

        let output = result.stdout_trimmed();
        output.parse().map_err(|_| CapacityError::UnexpectedOutput {
            odcr_id: odcr_id.to_string(),
            output: output.to_string(),
        })
    }

    /// Block until the reservation reports at least `needed` free instances
    pub async fn wait_for_capacity(
        &self,
        odcr_id: &str,
        region: &str,
        needed: u32,
    ) -> Result<(), CapacityError> {
        let started = Instant::now();
        let deadline = started + self.settings.timeout();

        loop {
            let available = self.available_capacity(odcr_id, region).await?;
            if available >= i64::from(needed) {
                info!("{} has {} free instance(s), {} needed", odcr_id, available, needed);
                return Ok(());
            }

            if Instant::now() + self.settings.poll_interval() > deadline {
                return Err(CapacityError::Timeout {
                    odcr_id: odcr_id.to_string(),
                    needed,
                    available,
                    waited: started.elapsed(),
                });
            }

            info!(
                "{} has {} free instance(s), waiting for {}",
                odcr_id, available, needed
            );
            tokio::time::sleep(self.settings.poll_interval()).await;
        }
    }
}
