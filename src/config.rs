//! Engine configuration.
//!
//! Values are merged in order from built-in defaults, an optional TOML file and
//! environment variables with the `SQLMISC_` prefix:
//!
//! ```toml
//! dnf_conjunction_budget = 128
//! many_duplicates_threshold = 25
//! disabled_checks = [22, 85]
//!
//! [sampler]
//! max_rows = 5000
//! timeout_ms = 1500
//! ```
//!
//! Environment variable overrides use `__` for nesting:
//! ```bash
//! SQLMISC_SAMPLER__TIMEOUT_MS=500
//! SQLMISC_DNF_CONJUNCTION_BUDGET=64
//! ```

use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "SQLMISC_";

/// Configuration consumed by the analysis engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of conjunctions a single predicate may expand to during
    /// DNF normalization before the predicate is treated as inconclusive.
    pub dnf_conjunction_budget: usize,
    /// Number of duplicate output rows from which "many duplicates" is reported.
    pub many_duplicates_threshold: u64,
    /// Misconception IDs whose checks are skipped.
    pub disabled_checks: Vec<u16>,
    /// Schema used to resolve unqualified relation names.
    pub default_schema: String,
    /// Limits applied to every sample-database probe.
    pub sampler: SamplerConfig,
}

/// Row, time and concurrency limits for sample-database probes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Maximum number of rows a single probe may read.
    pub max_rows: u64,
    /// Per-probe timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum number of concurrent sample connections.
    pub pool_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dnf_conjunction_budget: default_dnf_conjunction_budget(),
            many_duplicates_threshold: default_many_duplicates_threshold(),
            disabled_checks: Vec::new(),
            default_schema: default_schema(),
            sampler: SamplerConfig::default(),
        }
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            max_rows: default_max_rows(),
            timeout_ms: default_timeout_ms(),
            pool_size: default_pool_size(),
        }
    }
}

fn default_dnf_conjunction_budget() -> usize {
    256
}

fn default_many_duplicates_threshold() -> u64 {
    10
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_max_rows() -> u64 {
    10_000
}

fn default_timeout_ms() -> u64 {
    2_000
}

fn default_pool_size() -> u32 {
    4
}

impl EngineConfig {
    /// Load configuration from defaults, an optional TOML file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(EngineConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
    }

    /// Returns true when checks for `id` should not run.
    pub fn is_disabled(&self, id: u16) -> bool {
        self.disabled_checks.contains(&id)
    }
}

impl SamplerConfig {
    /// Per-probe timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied_without_sources() {
        figment::Jail::expect_with(|_jail| {
            let config = EngineConfig::load(None)?;
            assert_eq!(config, EngineConfig::default());
            assert_eq!(config.sampler.timeout(), Duration::from_millis(2_000));
            Ok(())
        });
    }

    #[test]
    fn toml_and_env_override_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "sqlmisc.toml",
                r#"
                dnf_conjunction_budget = 8
                disabled_checks = [22]

                [sampler]
                max_rows = 50
                "#,
            )?;
            jail.set_env("SQLMISC_SAMPLER__TIMEOUT_MS", "75");

            let config = EngineConfig::load(Some(Path::new("sqlmisc.toml")))?;
            assert_eq!(config.dnf_conjunction_budget, 8);
            assert!(config.is_disabled(22));
            assert_eq!(config.sampler.max_rows, 50);
            assert_eq!(config.sampler.timeout_ms, 75);
            assert_eq!(config.sampler.pool_size, 4);
            assert_eq!(config.default_schema, "public");
            Ok(())
        });
    }
}
