pub mod synthetic;

use std::path::Path;

use serde_json::Value;
use tracing::{info, warn};

use crate::domain::RawClaim;
use crate::error::{PipelineError, Result};

/// Columns a claims feed is expected to carry. A feed missing some of these
/// still loads; the gaps surface as rule flags downstream, not as ingest
/// failures.
pub const EXPECTED_COLUMNS: [&str; 8] = [
    "claim_id",
    "member_id",
    "provider_id",
    "claim_amount",
    "service_date",
    "icd_code",
    "cpt_code",
    "claim_status",
];

/// Read a claims CSV into a batch of raw records, one untyped field map per
/// row. The file being absent is fatal for the run; cell-level problems are
/// not ours to judge here.
pub fn read_claims_csv(path: &Path) -> Result<Vec<RawClaim>> {
    if !path.exists() {
        return Err(PipelineError::MissingSource {
            stage: "ingestion",
            path: path.display().to_string(),
        });
    }

    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    validate_columns(&headers);

    let mut batch = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut raw = RawClaim::new();
        for (header, field) in headers.iter().zip(record.iter()) {
            raw.insert(header.to_string(), Value::String(field.to_string()));
        }
        batch.push(raw);
    }

    info!(path = %path.display(), rows = batch.len(), "loaded claims batch");
    Ok(batch)
}

fn validate_columns(headers: &csv::StringRecord) {
    let present: Vec<&str> = headers.iter().collect();
    let missing: Vec<&str> = EXPECTED_COLUMNS
        .iter()
        .copied()
        .filter(|col| !present.contains(col))
        .collect();
    if !missing.is_empty() {
        warn!(?missing, "claims feed is missing expected columns");
    }
}
