use std::collections::HashMap;
use std::time::Duration;

use once_cell::sync::Lazy;
use tracing::{debug, warn};

use crate::app::ports::ExplainerPort;
use crate::domain::AnomalyClaim;

/// One fixed sentence per known flag id.
static FLAG_DESCRIPTIONS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("missing_mandatory", "Missing required fields (member_id, provider_id, claim_amount, or service_date)"),
        ("duplicate_claim", "This claim ID appears multiple times in the dataset"),
        ("invalid_date", "Service date is missing, invalid, or in the future"),
        ("invalid_amount", "Claim amount is missing, zero, or negative"),
        ("invalid_icd", "ICD-10 diagnosis code is missing or has invalid format"),
        ("invalid_cpt", "CPT procedure code is missing or has invalid format"),
        ("outlier_amount", "Claim amount is a statistical outlier versus the whole batch"),
        ("zscore_global", "Claim amount is unusually high or low compared to all claims"),
        ("zscore_by_provider", "Claim amount is unusual for this provider's typical billing"),
        ("zscore_by_cpt", "Claim amount is unusual for this procedure code"),
    ])
});

/// Remediation suggestion per flag id.
static FLAG_REMEDIATIONS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("missing_mandatory", "Verify source data and ensure all required fields are populated before submission."),
        ("duplicate_claim", "Check for duplicate submissions and verify whether this is a valid resubmission."),
        ("invalid_date", "Verify the service date with the provider and correct the date format."),
        ("invalid_amount", "Review billing records and correct the claim amount to reflect actual charges."),
        ("invalid_icd", "Validate the diagnosis code against ICD-10 reference and correct the format."),
        ("invalid_cpt", "Verify the procedure code against CPT reference and ensure 5-digit format."),
        ("outlier_amount", "Review for potential billing errors, upcoding, or legitimate high-cost services."),
        ("zscore_global", "Investigate whether the amount reflects actual services or requires adjustment."),
        ("zscore_by_provider", "Compare with the provider's historical billing patterns for this service type."),
        ("zscore_by_cpt", "Verify the amount aligns with typical reimbursement for this procedure."),
    ])
});

pub fn describe_flag(flag: &str) -> Option<&'static str> {
    FLAG_DESCRIPTIONS.get(flag).copied()
}

pub fn remediation_for(flag: &str) -> Option<&'static str> {
    FLAG_REMEDIATIONS.get(flag).copied()
}

/// Deterministic templated explanation: the known flags' sentences joined,
/// plus the first applicable remediation. Pure function of the record.
pub fn template_explanation(record: &AnomalyClaim) -> String {
    let claim_id = record.claim.claim_id.as_deref().unwrap_or("Unknown");
    let amount = record
        .claim
        .claim_amount
        .map(|a| format!("{:.2}", a))
        .unwrap_or_else(|| "N/A".to_string());

    if record.reasons.is_empty() {
        return format!(
            "Claim {claim_id} was flagged for review but no specific anomaly type was recorded. Please review manually."
        );
    }

    let descriptions: Vec<&str> = record
        .reasons
        .iter()
        .filter_map(|flag| describe_flag(flag))
        .collect();
    let explanation = if descriptions.is_empty() {
        format!(
            "Claim {claim_id} (${amount}) was flagged for: {}.",
            record.reasons.join(", ")
        )
    } else {
        format!(
            "Claim {claim_id} (${amount}) was flagged due to: {}.",
            descriptions.join("; ")
        )
    };

    let remediation = record
        .reasons
        .iter()
        .find_map(|flag| remediation_for(flag))
        .unwrap_or("Please review this claim manually and verify all details.");

    format!("{explanation} Recommended action: {remediation}")
}

/// Two-step explanation strategy: attempt the external explainer under a
/// bounded timeout, fall back unconditionally to the deterministic template
/// on any failure or absent configuration. No retries; the fallback is
/// deterministic and side-effect-free.
pub struct ExplanationService {
    external: Option<Box<dyn ExplainerPort>>,
    timeout: Duration,
}

impl ExplanationService {
    pub fn new(external: Option<Box<dyn ExplainerPort>>, timeout: Duration) -> Self {
        Self { external, timeout }
    }

    /// Template-only service.
    pub fn local_only() -> Self {
        Self {
            external: None,
            timeout: Duration::from_secs(0),
        }
    }

    pub async fn explain(&self, record: &AnomalyClaim) -> String {
        if let Some(external) = &self.external {
            match tokio::time::timeout(self.timeout, external.explain(record)).await {
                Ok(Ok(text)) if !text.trim().is_empty() => return text,
                Ok(Ok(_)) => debug!("external explainer returned empty text, using template"),
                Ok(Err(e)) => warn!("external explainer failed: {e}, using template"),
                Err(_) => warn!(timeout_secs = self.timeout.as_secs(), "external explainer timed out, using template"),
            }
        }
        template_explanation(record)
    }
}
