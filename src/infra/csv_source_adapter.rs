use std::path::PathBuf;

use async_trait::async_trait;

use crate::app::ports::ClaimSourcePort;
use crate::domain::RawClaim;
use crate::pipeline::ingestion;

/// File-based implementation of ClaimSourcePort over a claims CSV.
pub struct CsvClaimSource {
    path: PathBuf,
}

impl CsvClaimSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ClaimSourcePort for CsvClaimSource {
    async fn fetch_batch(&self) -> crate::error::Result<Vec<RawClaim>> {
        ingestion::read_claims_csv(&self.path)
    }
}
