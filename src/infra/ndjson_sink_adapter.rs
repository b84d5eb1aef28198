use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::app::ports::PartitionSinkPort;
use crate::domain::{AnomalyClaim, CanonicalClaim};
use crate::pipeline::storage;

/// File-based implementation of PartitionSinkPort. Publishes the clean and
/// anomaly partitions as NDJSON under the gold directory; each file is
/// written to a temp path and renamed into place so no partial batch is ever
/// visible.
pub struct NdjsonPartitionSink {
    gold_dir: PathBuf,
}

impl NdjsonPartitionSink {
    pub fn new(gold_dir: impl Into<PathBuf>) -> Self {
        Self {
            gold_dir: gold_dir.into(),
        }
    }

    pub fn clean_path(&self) -> PathBuf {
        self.gold_dir.join("claims_clean.ndjson")
    }

    pub fn anomalies_path(&self) -> PathBuf {
        self.gold_dir.join("anomalies.ndjson")
    }
}

/// Anomalies file path under an arbitrary gold directory; the serving cache
/// reads the same location the sink writes.
pub fn anomalies_path_in(gold_dir: &Path) -> PathBuf {
    gold_dir.join("anomalies.ndjson")
}

#[async_trait]
impl PartitionSinkPort for NdjsonPartitionSink {
    async fn publish(
        &self,
        clean: &[CanonicalClaim],
        anomalies: &[AnomalyClaim],
    ) -> anyhow::Result<()> {
        storage::write_ndjson(&self.clean_path(), clean)?;
        storage::write_ndjson(&self.anomalies_path(), anomalies)?;
        Ok(())
    }
}
