use serde::Deserialize;

/// LLM calls run from sub-second to minutes
pub const DEFAULT_BLOCK_DURATION_BUCKETS: &[f64] =
    &[0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

/// Prometheus exporter settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Route the exposition is served on
    pub path: String,
    /// Histogram buckets, in seconds, for `engine_block_duration_seconds`
    pub block_duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/metrics".to_string(),
            block_duration_buckets: DEFAULT_BLOCK_DURATION_BUCKETS.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_section_keeps_defaults() {
        let config: MetricsConfig = serde_json::from_str(r#"{"path": "/internal/metrics"}"#).unwrap();
        assert!(config.enabled);
        assert_eq!(config.path, "/internal/metrics");
        assert_eq!(config.block_duration_buckets.len(), DEFAULT_BLOCK_DURATION_BUCKETS.len());
    }
}
