//! Cluster naming
//!
//! Names look like `{build_tag}-{os}-{instance_type}-{suffix}`, e.g.
//! `PR-123-ubuntu2004-p4d24xlarge-a8Kz01Qp`. They never contain `.` and
//! never exceed [`MAX_NAME_LEN`] characters. Uniqueness relies on the random
//! suffix alone; nothing checks the name against live clusters.

use rand::distributions::Alphanumeric;
use rand::Rng;

pub const DEFAULT_BUILD_TAG_PREFIX: &str = "jenkins-";
pub const MAX_NAME_LEN: usize = 60;
pub const BUILD_TAG_LEN: usize = 28;
pub const OS_LEN: usize = 10;
pub const SUFFIX_LEN: usize = 8;

/// Remove `.` and line breaks
pub fn sanitize(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, '.' | '\n' | '\r'))
        .collect()
}

fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

/// Generate a cluster name using the thread-local RNG
pub fn cluster_name(prefix: &str, build_tag: &str, os: &str, instance_type: &str) -> String {
    cluster_name_with_rng(&mut rand::thread_rng(), prefix, build_tag, os, instance_type)
}

/// Generate a cluster name drawing the suffix from `rng`
pub fn cluster_name_with_rng<R: Rng + ?Sized>(
    rng: &mut R,
    prefix: &str,
    build_tag: &str,
    os: &str,
    instance_type: &str,
) -> String {
    let tag = build_tag.strip_prefix(prefix).unwrap_or(build_tag).replace(' ', "");
    let tag = truncate(&tag, BUILD_TAG_LEN);
    let os = truncate(os, OS_LEN);

    let head = sanitize(&format!("{}-{}-{}", tag, os, instance_type));
    let head = truncate(&head, MAX_NAME_LEN - SUFFIX_LEN - 1);
    let head = head.trim_end_matches('-');

    let suffix: String = rng
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(char::from)
        .collect();

    format!("{}-{}", head, suffix)
}

/// Names clusters for one pipeline run
#[derive(Debug, Clone)]
pub struct ClusterNamer {
    build_tag_prefix: String,
}

impl ClusterNamer {
    pub fn new(build_tag_prefix: impl Into<String>) -> Self {
        Self {
            build_tag_prefix: build_tag_prefix.into(),
        }
    }

    pub fn name(&self, build_tag: &str, os: &str, instance_type: &str) -> String {
        cluster_name(&self.build_tag_prefix, build_tag, os, instance_type)
    }
}

impl Default for ClusterNamer {
    fn default() -> Self {
        Self::new(DEFAULT_BUILD_TAG_PREFIX)
    }
}
