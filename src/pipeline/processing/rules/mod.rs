use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::domain::{CanonicalClaim, FlagSeries};
use crate::pipeline::processing::normalize::{is_valid_cpt_shape, is_valid_icd_shape};
use crate::pipeline::processing::outliers::{self, AmountPartition};

/// Inputs a rule may depend on besides the batch itself. The evaluation
/// instant is injected so the future-date check is testable; the production
/// path passes the wall clock at rule-run time.
#[derive(Debug, Clone)]
pub struct RuleContext {
    pub evaluated_at: DateTime<Utc>,
    pub zscore_threshold: f64,
}

impl RuleContext {
    pub fn now(zscore_threshold: f64) -> Self {
        Self {
            evaluated_at: Utc::now(),
            zscore_threshold,
        }
    }
}

/// A named data-quality rule over a whole batch. Rules see the full batch
/// because some conditions (duplicates, the global outlier cut) are
/// cross-record; each returns exactly one boolean per input record, aligned
/// by position.
pub struct Rule {
    pub id: &'static str,
    pub eval: fn(&[CanonicalClaim], &RuleContext) -> Vec<bool>,
}

/// The rule registry in evaluation order. Order is significant: it is the
/// order flags are appended to each record's reasons.
pub fn registry() -> Vec<Rule> {
    vec![
        Rule { id: "missing_mandatory", eval: missing_mandatory },
        Rule { id: "duplicate_claim", eval: duplicate_claim },
        Rule { id: "invalid_date", eval: invalid_date },
        Rule { id: "invalid_amount", eval: invalid_amount },
        Rule { id: "invalid_icd", eval: invalid_icd },
        Rule { id: "invalid_cpt", eval: invalid_cpt },
        Rule { id: "outlier_amount", eval: outlier_amount },
    ]
}

/// Run every registered rule against the batch, in registry order.
pub fn evaluate_all(claims: &[CanonicalClaim], ctx: &RuleContext) -> Vec<FlagSeries> {
    registry()
        .iter()
        .map(|rule| FlagSeries::new(rule.id, (rule.eval)(claims, ctx)))
        .collect()
}

/// Any mandatory field absent. Fail-closed: a missing field always flags.
fn missing_mandatory(claims: &[CanonicalClaim], _ctx: &RuleContext) -> Vec<bool> {
    claims
        .iter()
        .map(|c| {
            c.claim_id.is_none()
                || c.member_id.is_none()
                || c.provider_id.is_none()
                || c.claim_amount.is_none()
                || c.service_date.is_none()
        })
        .collect()
}

/// claim_id seen at least twice in the batch. Every occurrence is flagged,
/// not just the second and later ones. Null ids never participate; they are
/// already fail-closed under missing_mandatory.
fn duplicate_claim(claims: &[CanonicalClaim], _ctx: &RuleContext) -> Vec<bool> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for claim in claims {
        if let Some(id) = claim.claim_id.as_deref() {
            *counts.entry(id).or_insert(0) += 1;
        }
    }
    claims
        .iter()
        .map(|c| {
            c.claim_id
                .as_deref()
                .map(|id| counts[id] >= 2)
                .unwrap_or(false)
        })
        .collect()
}

/// service_date absent or strictly in the future relative to the evaluation
/// instant.
fn invalid_date(claims: &[CanonicalClaim], ctx: &RuleContext) -> Vec<bool> {
    let today = ctx.evaluated_at.date_naive();
    claims
        .iter()
        .map(|c| match c.service_date {
            Some(date) => date > today,
            None => true,
        })
        .collect()
}

/// claim_amount absent, zero, or negative. This operates on the
/// numeric-coerced amount independent of the normalizer's negative-to-null
/// policy, so it re-detects negativity on its own when handed an
/// un-normalized batch.
fn invalid_amount(claims: &[CanonicalClaim], _ctx: &RuleContext) -> Vec<bool> {
    claims
        .iter()
        .map(|c| match c.claim_amount {
            Some(amount) => amount <= 0.0,
            None => true,
        })
        .collect()
}

/// icd_code absent or failing the shape check. The shape is re-validated
/// here rather than trusting upstream normalization.
fn invalid_icd(claims: &[CanonicalClaim], _ctx: &RuleContext) -> Vec<bool> {
    claims
        .iter()
        .map(|c| match c.icd_code.as_deref() {
            Some(code) => !is_valid_icd_shape(code),
            None => true,
        })
        .collect()
}

/// cpt_code absent or failing the shape check.
fn invalid_cpt(claims: &[CanonicalClaim], _ctx: &RuleContext) -> Vec<bool> {
    claims
        .iter()
        .map(|c| match c.cpt_code.as_deref() {
            Some(code) => !is_valid_cpt_shape(code),
            None => true,
        })
        .collect()
}

/// Batch-global z-score cut on claim_amount, sharing the detector's scoring
/// and edge policy.
fn outlier_amount(claims: &[CanonicalClaim], ctx: &RuleContext) -> Vec<bool> {
    outliers::detect_outliers(claims, AmountPartition::Global, ctx.zscore_threshold)
}
