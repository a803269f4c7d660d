//! Performance/efficiency core partition and CPU identification.
//!
//! Both are read once at startup and never re-detected.

use serde::{Deserialize, Serialize};

use crate::platform::HostPlatform;

/// Split of logical cores between performance and efficiency clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreTopology {
    pub performance_cores: usize,
    pub efficiency_cores: usize,
}

impl CoreTopology {
    /// Build a topology from the per-level counts the platform reported.
    ///
    /// The split is trusted only when both levels are positive and they add
    /// up to `total`. Anything else reports every core as performance with no
    /// efficiency cores; there is no partial split.
    pub fn from_counts(performance: Option<usize>, efficiency: Option<usize>, total: usize) -> Self {
        match (performance, efficiency) {
            (Some(p), Some(e)) if p > 0 && e > 0 && p + e == total => Self {
                performance_cores: p,
                efficiency_cores: e,
            },
            _ => Self::undifferentiated(total),
        }
    }

    pub fn undifferentiated(total: usize) -> Self {
        Self {
            performance_cores: total,
            efficiency_cores: 0,
        }
    }

    /// Query `hw.perflevel0` / `hw.perflevel1` (or the platform's equivalent).
    pub fn detect(platform: &dyn HostPlatform) -> Self {
        let total = platform.logical_cpu_count();
        let topology = Self::from_counts(
            platform.perf_level_cpu_count(0),
            platform.perf_level_cpu_count(1),
            total,
        );
        log::debug!(
            "core topology: {} performance, {} efficiency",
            topology.performance_cores,
            topology.efficiency_cores
        );
        topology
    }

    pub fn total_cores(&self) -> usize {
        self.performance_cores + self.efficiency_cores
    }

    pub fn is_heterogeneous(&self) -> bool {
        self.efficiency_cores > 0
    }
}

/// Static CPU description: brand, counts, cache sizes, feature flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuIdentity {
    pub brand: String,
    pub logical_cpus: usize,
    pub physical_cpus: usize,
    pub l1d_cache_bytes: u64,
    pub l2_cache_bytes: u64,
    pub features: Vec<String>,
}

impl CpuIdentity {
    pub fn has_feature(&self, name: &str) -> bool {
        self.features.iter().any(|f| f.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedLevels {
        total: usize,
        p: Option<usize>,
        e: Option<usize>,
    }

    impl HostPlatform for FixedLevels {
        fn name(&self) -> &'static str {
            "fixed"
        }
        fn logical_cpu_count(&self) -> usize {
            self.total
        }
        fn perf_level_cpu_count(&self, level: u32) -> Option<usize> {
            match level {
                0 => self.p,
                1 => self.e,
                _ => None,
            }
        }
    }

    #[test]
    fn accepts_consistent_split() {
        let t = CoreTopology::from_counts(Some(8), Some(2), 10);
        assert_eq!(t.performance_cores, 8);
        assert_eq!(t.efficiency_cores, 2);
        assert!(t.is_heterogeneous());
    }

    #[test]
    fn zero_counts_fall_back() {
        let t = CoreTopology::from_counts(Some(0), Some(0), 10);
        assert_eq!(t, CoreTopology::undifferentiated(10));
    }

    #[test]
    fn inconsistent_sum_falls_back() {
        let t = CoreTopology::from_counts(Some(6), Some(2), 10);
        assert_eq!(t.performance_cores, 10);
        assert_eq!(t.efficiency_cores, 0);
    }

    #[test]
    fn missing_level_falls_back() {
        let t = CoreTopology::from_counts(Some(8), None, 8);
        assert_eq!(t, CoreTopology::undifferentiated(8));
        assert!(!t.is_heterogeneous());
    }

    #[test]
    fn detect_reads_platform_levels() {
        let platform = FixedLevels {
            total: 12,
            p: Some(8),
            e: Some(4),
        };
        let t = CoreTopology::detect(&platform);
        assert_eq!(t.total_cores(), 12);
        assert_eq!(t.efficiency_cores, 4);
    }

    #[test]
    fn feature_lookup_is_case_insensitive() {
        let id = CpuIdentity {
            features: vec!["NEON".into(), "AES".into()],
            ..CpuIdentity::default()
        };
        assert!(id.has_feature("neon"));
        assert!(!id.has_feature("sve"));
    }
}
