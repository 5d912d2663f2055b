//! Cluster lifecycle helpers
//!
//! - `naming` - Bounded, sanitized cluster names with a random suffix
//! - `capacity` - Stale cluster cleanup and capacity-reservation waiting

pub mod capacity;
pub mod naming;

pub use capacity::{CapacityError, CapacityGatekeeper, CapacitySettings};
pub use naming::{cluster_name, cluster_name_with_rng, sanitize, ClusterNamer, DEFAULT_BUILD_TAG_PREFIX};
