use std::fs;
use std::path::Path;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{DistQueueError, Result};

/// Distributor service configuration, deserialized from `distributor.toml`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributorConfig {
    /// TCP port the Distributor's HTTP API binds to.
    pub port: u16,
    /// Seconds without a heartbeat before an in-progress task is considered timed out.
    pub task_timeout_seconds: u64,
    /// Retries allowed per task before it is marked terminally failed.
    pub max_retries: u32,
    /// Queue depth above which the monitor logs a backpressure warning and
    /// notifies a registered supervisor.
    pub backpressure_threshold: u64,
    /// How often the background monitor scans for timeouts and backpressure.
    pub monitor_interval_seconds: u64,
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            task_timeout_seconds: 30,
            max_retries: 3,
            backpressure_threshold: 100,
            monitor_interval_seconds: 5,
        }
    }
}

impl DistributorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.task_timeout_seconds == 0 {
            return Err(DistQueueError::Validation(
                "task_timeout_seconds must be greater than zero".into(),
            ));
        }
        if self.monitor_interval_seconds == 0 {
            return Err(DistQueueError::Validation(
                "monitor_interval_seconds must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// A single weight, or an explicit per-analyzer list. Cycled or truncated to
/// the pool size at startup (see `expand_weights`).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WeightSpec {
    Scalar(f64),
    List(Vec<f64>),
}

/// Default weight cycle used when no weights are configured, matching the
/// source's `[0.4, 0.3, 0.2, 0.1]` pattern.
pub const DEFAULT_WEIGHT_PATTERN: [f64; 4] = [0.4, 0.3, 0.2, 0.1];

/// Expand a `WeightSpec` (or its absence) into exactly `count` weights.
pub fn expand_weights(spec: Option<&WeightSpec>, count: usize) -> Vec<f64> {
    match spec {
        None => (0..count)
            .map(|i| DEFAULT_WEIGHT_PATTERN[i % DEFAULT_WEIGHT_PATTERN.len()])
            .collect(),
        Some(WeightSpec::Scalar(w)) => vec![*w; count],
        Some(WeightSpec::List(weights)) => {
            if weights.is_empty() {
                return (0..count)
                    .map(|i| DEFAULT_WEIGHT_PATTERN[i % DEFAULT_WEIGHT_PATTERN.len()])
                    .collect();
            }
            if weights.len() < count {
                (0..count).map(|i| weights[i % weights.len()]).collect()
            } else {
                weights[..count].to_vec()
            }
        }
    }
}

/// Autoscaling supervisor configuration, deserialized from `supervisor.toml`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Base URL of the Distributor this supervisor's fleet pulls work from.
    pub distributor_url: String,
    /// Number of Analyzer workers to start with.
    pub num_analyzers: u32,
    /// Per-analyzer weight, cycled or truncated to `num_analyzers`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights: Option<WeightSpec>,
    pub analyzer_prefix: String,
    pub processing_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub work_request_timeout_ms: u64,

    pub enable_autoscaling: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u32>,
    pub scale_up_threshold: u64,
    pub scale_down_threshold: u64,
    pub scale_check_interval_seconds: u64,
    pub scale_cooldown_seconds: u64,
    pub scale_up_count: u32,
    pub scale_down_count: u32,
    pub scale_weight: f64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            distributor_url: "http://localhost:8000".into(),
            num_analyzers: 4,
            weights: None,
            analyzer_prefix: "analyzer".into(),
            processing_delay_ms: 100,
            poll_interval_ms: 1000,
            heartbeat_interval_ms: 5000,
            work_request_timeout_ms: 10_000,
            enable_autoscaling: false,
            min_size: None,
            max_size: None,
            scale_up_threshold: 50,
            scale_down_threshold: 10,
            scale_check_interval_seconds: 10,
            scale_cooldown_seconds: 30,
            scale_up_count: 1,
            scale_down_count: 1,
            scale_weight: 0.5,
        }
    }
}

impl SupervisorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_analyzers == 0 {
            return Err(DistQueueError::Validation(
                "num_analyzers must be greater than zero".into(),
            ));
        }
        if self.scale_check_interval_seconds == 0 {
            return Err(DistQueueError::Validation(
                "scale_check_interval_seconds must be greater than zero".into(),
            ));
        }
        let min_size = self.min_size.unwrap_or(self.num_analyzers);
        let max_size = self.max_size.unwrap_or(self.num_analyzers * 4);
        if min_size > max_size {
            return Err(DistQueueError::Validation(format!(
                "min_size ({min_size}) cannot exceed max_size ({max_size})"
            )));
        }
        Ok(())
    }

    pub fn resolved_min_size(&self) -> u32 {
        self.min_size.unwrap_or(self.num_analyzers)
    }

    pub fn resolved_max_size(&self) -> u32 {
        self.max_size.unwrap_or(self.num_analyzers * 4)
    }
}

/// Load and validate a TOML config file from `path`. Callers should treat a
/// failure here as fatal — refuse to start rather than run with defaults the
/// operator never asked for.
pub fn load_toml_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let contents = fs::read_to_string(path).map_err(|e| {
        DistQueueError::Config(format!("failed to read {}: {e}", path.display()))
    })?;
    toml::from_str(&contents)
        .map_err(|e| DistQueueError::Config(format!("failed to parse {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_weights_defaults_to_cycle_pattern() {
        let weights = expand_weights(None, 7);
        assert_eq!(weights, vec![0.4, 0.3, 0.2, 0.1, 0.4, 0.3, 0.2]);
    }

    #[test]
    fn expand_weights_scalar_replicates() {
        let weights = expand_weights(Some(&WeightSpec::Scalar(0.2)), 3);
        assert_eq!(weights, vec![0.2, 0.2, 0.2]);
    }

    #[test]
    fn expand_weights_list_shorter_than_pool_cycles() {
        let weights = expand_weights(Some(&WeightSpec::List(vec![0.1, 0.9])), 5);
        assert_eq!(weights, vec![0.1, 0.9, 0.1, 0.9, 0.1]);
    }

    #[test]
    fn expand_weights_list_longer_than_pool_truncates() {
        let weights = expand_weights(Some(&WeightSpec::List(vec![0.1, 0.2, 0.3])), 2);
        assert_eq!(weights, vec![0.1, 0.2]);
    }

    #[test]
    fn distributor_config_rejects_zero_timeout() {
        let mut config = DistributorConfig::default();
        config.task_timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn supervisor_config_rejects_inverted_bounds() {
        let mut config = SupervisorConfig::default();
        config.min_size = Some(10);
        config.max_size = Some(2);
        assert!(config.validate().is_err());
    }
}
