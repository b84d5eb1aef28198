use async_trait::async_trait;

use crate::domain::{AnomalyClaim, CanonicalClaim, RawClaim};

/// Input boundary: hands the pipeline one batch of raw claims. The adapter
/// owns file formats and schema checks; an absent source is a stage-fatal
/// `PipelineError::MissingSource`.
#[async_trait]
pub trait ClaimSourcePort: Send + Sync {
    async fn fetch_batch(&self) -> crate::error::Result<Vec<RawClaim>>;
}

/// Output boundary: receives both partitions of a finished run. The adapter
/// owns the on-disk format and must publish atomically; a reader never sees
/// one partition from run N and the other from run N-1 mid-write.
#[async_trait]
pub trait PartitionSinkPort: Send + Sync {
    async fn publish(
        &self,
        clean: &[CanonicalClaim],
        anomalies: &[AnomalyClaim],
    ) -> anyhow::Result<()>;
}

/// Explanation boundary: turns an anomaly record (identifying fields plus
/// reasons) into human-readable text. Treated as a pure function with
/// unspecified latency; callers bound it with a timeout and fall back to the
/// local template.
#[async_trait]
pub trait ExplainerPort: Send + Sync {
    async fn explain(&self, record: &AnomalyClaim) -> anyhow::Result<String>;
}
