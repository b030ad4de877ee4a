use crate::policy::UploadPolicy;

/// Immutable configuration for a pipeline instance. Built once at startup
/// and shared between workers behind an `Arc`.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub policy: UploadPolicy,
    /// Number of worker threads for background execution.
    pub worker_count: usize,
}

impl PipelineConfig {
    pub fn with_policy(policy: UploadPolicy) -> Self {
        Self {
            policy,
            worker_count: num_cpus::get().max(1),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::with_policy(UploadPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_workers() {
        let config = PipelineConfig::default();
        assert!(config.worker_count >= 1);
        assert_eq!(config.policy.max_entries, 10_000);
    }
}
