//! Sampling plans for large datasets.
//!
//! Planning is pure selection logic over dataset metadata: no I/O happens
//! here. The descriptor carries a fixed seed so repeated plans over identical
//! inputs produce reproducible samples, which cache keys depend on.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// How a dataset is reduced before validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleMethod {
    /// Validate every row
    Full,
    /// Seeded random row selection
    Random,
    /// Stratified selection; falls back to systematic stepping when no
    /// strata are configured
    Stratified,
}

impl std::fmt::Display for SampleMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Random => write!(f, "random"),
            Self::Stratified => write!(f, "stratified"),
        }
    }
}

/// Concrete sampling decision for one dataset snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleDescriptor {
    pub method: SampleMethod,
    /// Effective fraction of rows retained, in (0, 1]
    pub fraction: f64,
    /// Number of rows the sample targets
    pub sample_rows: u64,
    /// Seed driving row selection
    pub seed: u64,
}

impl SampleDescriptor {
    /// Descriptor for validating the full dataset.
    pub fn full(row_count: u64, seed: u64) -> Self {
        Self {
            method: SampleMethod::Full,
            fraction: 1.0,
            sample_rows: row_count,
            seed,
        }
    }

    /// Stable string form used inside cache keys.
    pub fn cache_token(&self) -> String {
        format!(
            "{}:{:.6}:{}:{}",
            self.method, self.fraction, self.sample_rows, self.seed
        )
    }
}

/// One tier of the size -> method table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingTier {
    /// Tier applies to datasets strictly larger than this many rows
    pub min_rows_exclusive: u64,
    pub method: SampleMethod,
    pub fraction: f64,
    /// Floor on the sample size in rows
    pub min_sample_rows: u64,
}

/// Sampler configuration: the tier table plus the deterministic seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Tiers evaluated from the largest threshold down
    pub tiers: Vec<SamplingTier>,
    pub seed: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            tiers: vec![
                SamplingTier {
                    min_rows_exclusive: 10_000_000,
                    method: SampleMethod::Stratified,
                    fraction: 0.05,
                    min_sample_rows: 500_000,
                },
                SamplingTier {
                    min_rows_exclusive: 999_999,
                    method: SampleMethod::Random,
                    fraction: 0.10,
                    min_sample_rows: 100_000,
                },
            ],
            seed: 42,
        }
    }
}

/// Chooses a representative subset for large datasets.
#[derive(Debug, Clone, Default)]
pub struct Sampler {
    config: SamplerConfig,
}

impl Sampler {
    /// Creates a sampler with the given configuration.
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    /// Plans the sample for a dataset of the given size.
    ///
    /// Deterministic: identical inputs always yield the same descriptor.
    pub fn plan(&self, row_count: u64) -> SampleDescriptor {
        let tier = self
            .config
            .tiers
            .iter()
            .filter(|t| row_count > t.min_rows_exclusive)
            .max_by_key(|t| t.min_rows_exclusive);

        let descriptor = match tier {
            None => SampleDescriptor::full(row_count, self.config.seed),
            Some(tier) => {
                let target = ((row_count as f64) * tier.fraction).round() as u64;
                let sample_rows = target.max(tier.min_sample_rows).min(row_count);
                let fraction = if row_count == 0 {
                    1.0
                } else {
                    sample_rows as f64 / row_count as f64
                };
                SampleDescriptor {
                    method: tier.method,
                    fraction,
                    sample_rows,
                    seed: self.config.seed,
                }
            }
        };

        debug!(
            rows = row_count,
            method = %descriptor.method,
            fraction = descriptor.fraction,
            sample_rows = descriptor.sample_rows,
            "Planned sample"
        );
        descriptor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_datasets_use_full_scan() {
        let sampler = Sampler::default();
        let plan = sampler.plan(500_000);
        assert_eq!(plan.method, SampleMethod::Full);
        assert_eq!(plan.sample_rows, 500_000);
        assert_eq!(plan.fraction, 1.0);
    }

    #[test]
    fn test_five_million_rows_random_ten_percent() {
        let sampler = Sampler::default();
        let plan = sampler.plan(5_000_000);
        assert_eq!(plan.method, SampleMethod::Random);
        assert!((plan.fraction - 0.10).abs() < 1e-9);
        assert_eq!(plan.sample_rows, 500_000);
    }

    #[test]
    fn test_min_sample_floor_applies() {
        let sampler = Sampler::default();
        // 10% of 1M is 100_000, exactly the floor
        let plan = sampler.plan(1_000_000);
        assert_eq!(plan.method, SampleMethod::Random);
        assert_eq!(plan.sample_rows, 100_000);

        // Just above the tier boundary the floor dominates
        let plan = sampler.plan(1_000_001);
        assert_eq!(plan.sample_rows, 100_000);
    }

    #[test]
    fn test_huge_datasets_stratified() {
        let sampler = Sampler::default();
        let plan = sampler.plan(20_000_000);
        assert_eq!(plan.method, SampleMethod::Stratified);
        assert_eq!(plan.sample_rows, 1_000_000);
        assert!((plan.fraction - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_plan_is_deterministic() {
        let sampler = Sampler::default();
        assert_eq!(sampler.plan(5_000_000), sampler.plan(5_000_000));
        assert_eq!(
            sampler.plan(5_000_000).cache_token(),
            sampler.plan(5_000_000).cache_token()
        );
    }
}
