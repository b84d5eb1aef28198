use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A raw claim as handed over by the ingestion boundary: an untyped mapping
/// of column name to whatever the source file contained. Ephemeral; only the
/// normalizer ever looks at one.
pub type RawClaim = serde_json::Map<String, serde_json::Value>;

/// A claim after normalization. Every field that failed normalization is an
/// explicit `None`, never an error and never a sentinel string, so the rule
/// engine can treat absence uniformly. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalClaim {
    pub claim_id: Option<String>,
    pub member_id: Option<String>,
    pub provider_id: Option<String>,
    pub claim_amount: Option<f64>,
    pub service_date: Option<NaiveDate>,
    pub icd_code: Option<String>,
    pub cpt_code: Option<String>,
    pub claim_status: Option<String>,
}

/// One named boolean outcome series, aligned by position to the batch that
/// produced it.
#[derive(Debug, Clone)]
pub struct FlagSeries {
    pub id: String,
    pub mask: Vec<bool>,
}

impl FlagSeries {
    pub fn new(id: impl Into<String>, mask: Vec<bool>) -> Self {
        Self { id: id.into(), mask }
    }

    /// Number of records the series flags.
    pub fn flagged_count(&self) -> usize {
        self.mask.iter().filter(|f| **f).count()
    }
}

/// A canonical claim decorated with its anomaly verdict. Produced once per
/// pipeline run; the next run supersedes it wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyClaim {
    #[serde(flatten)]
    pub claim: CanonicalClaim,
    /// Flag ids in evaluation order: rules first, then outlier detectors.
    pub reasons: Vec<String>,
    /// Comma-joined rendering of `reasons`.
    pub reasons_text: String,
    pub num_flags: usize,
    pub is_anomalous: bool,
    /// Filled for the top-N worst anomalies only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Summary of one pipeline run, for logs and the CLI report.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub total_claims: usize,
    pub clean_claims: usize,
    pub anomalous_claims: usize,
    /// (flag id, flagged record count), in flag evaluation order.
    pub reason_counts: Vec<(String, usize)>,
    pub explanations_generated: usize,
}

impl RunSummary {
    pub fn anomaly_rate(&self) -> f64 {
        if self.total_claims == 0 {
            return 0.0;
        }
        self.anomalous_claims as f64 / self.total_claims as f64 * 100.0
    }
}
