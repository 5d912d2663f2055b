use serde::{Deserialize, Serialize};

use super::lock::LockRequest;

/// Everything needed to run one test configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestStageSpec {
    pub stage_name: String,
    pub build_tag: String,
    pub os: String,
    pub instance_type: String,
    pub region: String,
    pub lock_label: String,
    /// Lock slots to hold; also the number of instances the test launches
    pub lock_count: u32,
    pub config_path: String,
    pub odcr_id: String,
    pub extra_args: String,
}

impl TestStageSpec {
    pub fn lock_request(&self) -> LockRequest {
        LockRequest {
            label: self.lock_label.clone(),
            quantity: self.lock_count,
        }
    }

    pub fn instance_count(&self) -> u32 {
        self.lock_count
    }
}
