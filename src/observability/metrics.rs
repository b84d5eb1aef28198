//! Metrics for the claims pipeline, following Prometheus naming
//! conventions. A typed catalog keeps the names out of call sites.

use std::fmt;
use std::sync::OnceLock;

use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;

/// Every metric name used in the system; no magic strings at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    PipelineRunsStarted,
    NormalizeBatchesProcessed,
    NormalizeBatchSize,
    RulesFlagsRaised,
    OutlierFlagsRaised,
    AggregateCleanRecords,
    AggregateAnomalousRecords,
    ExplainGenerated,
    ApiCacheReloads,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::PipelineRunsStarted => "claimsight_pipeline_runs_started_total",
            MetricName::NormalizeBatchesProcessed => "claimsight_normalize_batches_processed_total",
            MetricName::NormalizeBatchSize => "claimsight_normalize_batch_size",
            MetricName::RulesFlagsRaised => "claimsight_rules_flags_raised_total",
            MetricName::OutlierFlagsRaised => "claimsight_outlier_flags_raised_total",
            MetricName::AggregateCleanRecords => "claimsight_aggregate_clean_records",
            MetricName::AggregateAnomalousRecords => "claimsight_aggregate_anomalous_records",
            MetricName::ExplainGenerated => "claimsight_explain_generated_total",
            MetricName::ApiCacheReloads => "claimsight_api_cache_reloads_total",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Call once at process start when the
/// metrics endpoint is wanted; recording without it is a no-op.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {}", e))?;
    PROMETHEUS_HANDLE.set(handle).ok();
    info!("Metrics recorder installed");
    Ok(())
}

/// Render the current metrics in Prometheus exposition format.
pub fn render() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

pub mod pipeline {
    use super::MetricName;

    pub fn run_started() {
        ::metrics::counter!(MetricName::PipelineRunsStarted.as_str()).increment(1);
    }
}

pub mod normalize {
    use super::MetricName;

    pub fn batch_processed(size: usize) {
        ::metrics::counter!(MetricName::NormalizeBatchesProcessed.as_str()).increment(1);
        ::metrics::histogram!(MetricName::NormalizeBatchSize.as_str()).record(size as f64);
    }
}

pub mod rules {
    use super::MetricName;

    pub fn flags_raised(rule: &str, count: u64) {
        ::metrics::counter!(MetricName::RulesFlagsRaised.as_str(), "rule" => rule.to_string())
            .increment(count);
    }
}

pub mod outliers {
    use super::MetricName;

    pub fn flags_raised(partition: &str, count: u64) {
        ::metrics::counter!(MetricName::OutlierFlagsRaised.as_str(), "partition" => partition.to_string())
            .increment(count);
    }
}

pub mod aggregate {
    use super::MetricName;

    pub fn partitions_published(clean: usize, anomalous: usize) {
        ::metrics::gauge!(MetricName::AggregateCleanRecords.as_str()).set(clean as f64);
        ::metrics::gauge!(MetricName::AggregateAnomalousRecords.as_str()).set(anomalous as f64);
    }
}

pub mod explain {
    use super::MetricName;

    pub fn explanations_generated(count: u64) {
        ::metrics::counter!(MetricName::ExplainGenerated.as_str()).increment(count);
    }
}

pub mod api {
    use super::MetricName;

    pub fn cache_reloaded() {
        ::metrics::counter!(MetricName::ApiCacheReloads.as_str()).increment(1);
    }
}
