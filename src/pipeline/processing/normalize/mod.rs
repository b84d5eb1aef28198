use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::domain::{CanonicalClaim, RawClaim};

/// ICD-10-like shape: one letter, two digits, optional '.' plus trailing
/// digits, optional trailing letter. A format check only; no registry lookup.
static ICD_SHAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]\d{2}\.?\d*[A-Z]?$").unwrap());

/// CPT-like shape: exactly five digits.
static CPT_SHAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{5}$").unwrap());

/// Strings the source files use to mean "no value".
const NULL_SENTINELS: [&str; 6] = ["", "nan", "NaN", "None", "null", "NULL"];

/// Date layouts accepted by the permissive calendar parser.
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%m-%d-%Y"];

/// Trait for normalizing raw claims into the canonical shape.
pub trait ClaimNormalizer {
    /// Numeric coercion of every field without the amount sign policy:
    /// a negative amount survives here. This is the view the rule engine
    /// evaluates, so negativity is flagged as a business-rule violation
    /// rather than vanishing into a null before the rules ever run.
    fn coerce(&self, raw: &RawClaim) -> CanonicalClaim;

    /// Transform a raw claim into its canonical claim: coercion plus the
    /// amount policy (negative values become null, not clamped, not
    /// dropped). Total: malformed input never errors, it lands as `None`.
    fn normalize(&self, raw: &RawClaim) -> CanonicalClaim {
        let mut claim = self.coerce(raw);
        if matches!(claim.claim_amount, Some(a) if a < 0.0) {
            claim.claim_amount = None;
        }
        claim
    }
}

/// Default normalizer implementing the canonical field policies.
#[derive(Debug, Default)]
pub struct DefaultClaimNormalizer;

impl DefaultClaimNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Batch conveniences; per-record normalization has no cross-record
    /// dependency.
    pub fn coerce_batch(&self, raw: &[RawClaim]) -> Vec<CanonicalClaim> {
        raw.iter().map(|r| self.coerce(r)).collect()
    }

    pub fn normalize_batch(&self, raw: &[RawClaim]) -> Vec<CanonicalClaim> {
        raw.iter().map(|r| self.normalize(r)).collect()
    }
}

impl ClaimNormalizer for DefaultClaimNormalizer {
    fn coerce(&self, raw: &RawClaim) -> CanonicalClaim {
        CanonicalClaim {
            claim_id: clean_string(raw.get("claim_id")),
            member_id: clean_string(raw.get("member_id")),
            provider_id: clean_string(raw.get("provider_id")),
            claim_amount: parse_amount(raw.get("claim_amount")),
            service_date: parse_service_date(raw.get("service_date")),
            icd_code: normalize_icd_code(raw.get("icd_code")),
            cpt_code: normalize_cpt_code(raw.get("cpt_code")),
            claim_status: clean_string(raw.get("claim_status")).map(|s| s.to_uppercase()),
        }
    }
}

/// Trim surrounding whitespace and map null sentinels to `None`.
/// Numbers pass through as their textual rendering (ids are strings to us
/// even when a source writes them unquoted).
fn clean_string(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => return None,
        _ => return None,
    };
    if NULL_SENTINELS.contains(&text.as_str()) || text.eq_ignore_ascii_case("n/a") {
        return None;
    }
    Some(text)
}

/// Decimal coercion. Non-numeric and non-finite input becomes `None`. Sign
/// is preserved; the negative-to-null policy belongs to `normalize`, not to
/// coercion, so the rule engine can still observe raw negativity.
fn parse_amount(value: Option<&Value>) -> Option<f64> {
    let amount = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let trimmed = s.trim();
            if NULL_SENTINELS.contains(&trimmed) || trimmed.eq_ignore_ascii_case("n/a") {
                return None;
            }
            trimmed.parse::<f64>().ok()?
        }
        _ => return None,
    };
    amount.is_finite().then_some(amount)
}

/// Permissive calendar-date parse. Impossible dates (month 13, day 45) fail
/// every layout and become `None`; no partial guessing.
fn parse_service_date(value: Option<&Value>) -> Option<NaiveDate> {
    let text = clean_string(value)?;
    // Sources sometimes carry a full timestamp; the calendar date is the
    // leading token either way.
    let date_part = text
        .split(|c| c == ' ' || c == 'T')
        .next()
        .unwrap_or(text.as_str());
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

fn normalize_icd_code(value: Option<&Value>) -> Option<String> {
    let code = clean_string(value)?.to_uppercase();
    ICD_SHAPE.is_match(&code).then_some(code)
}

fn normalize_cpt_code(value: Option<&Value>) -> Option<String> {
    let code = clean_string(value)?;
    CPT_SHAPE.is_match(&code).then_some(code)
}

/// Re-checks used by the rule engine; the rules re-validate shapes instead of
/// trusting that their input already went through normalization.
pub fn is_valid_icd_shape(code: &str) -> bool {
    ICD_SHAPE.is_match(code)
}

pub fn is_valid_cpt_shape(code: &str) -> bool {
    CPT_SHAPE.is_match(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(fields: serde_json::Value) -> RawClaim {
        fields.as_object().unwrap().clone()
    }

    #[test]
    fn normalizes_complete_claim() {
        let normalizer = DefaultClaimNormalizer::new();
        let claim = normalizer.normalize(&raw(json!({
            "claim_id": " CLM001 ",
            "member_id": "MBR001",
            "provider_id": "PRV001",
            "claim_amount": "125.50",
            "service_date": "2024-01-15",
            "icd_code": "a00.0",
            "cpt_code": "99213",
            "claim_status": "paid"
        })));

        assert_eq!(claim.claim_id.as_deref(), Some("CLM001"));
        assert_eq!(claim.claim_amount, Some(125.50));
        assert_eq!(claim.service_date, NaiveDate::from_ymd_opt(2024, 1, 15));
        assert_eq!(claim.icd_code.as_deref(), Some("A00.0"));
        assert_eq!(claim.cpt_code.as_deref(), Some("99213"));
        assert_eq!(claim.claim_status.as_deref(), Some("PAID"));
    }

    #[test]
    fn null_sentinels_become_none() {
        let normalizer = DefaultClaimNormalizer::new();
        for sentinel in ["", "  ", "nan", "None", "null", "N/A"] {
            let claim = normalizer.normalize(&raw(json!({ "member_id": sentinel })));
            assert_eq!(claim.member_id, None, "sentinel {:?}", sentinel);
        }
        let claim = normalizer.normalize(&raw(json!({})));
        assert_eq!(claim.claim_id, None);
    }

    #[test]
    fn impossible_dates_become_none() {
        let normalizer = DefaultClaimNormalizer::new();
        for bad in ["2024/13/45", "not-a-date", "2024-00-15", "31-02-2024", ""] {
            let claim = normalizer.normalize(&raw(json!({ "service_date": bad })));
            assert_eq!(claim.service_date, None, "input {:?}", bad);
        }
    }

    #[test]
    fn datetime_strings_keep_the_calendar_date() {
        let normalizer = DefaultClaimNormalizer::new();
        let claim = normalizer.normalize(&raw(json!({ "service_date": "2024-03-10 00:00:00" })));
        assert_eq!(claim.service_date, NaiveDate::from_ymd_opt(2024, 3, 10));
    }

    #[test]
    fn negative_amounts_are_nulled_not_clamped() {
        let normalizer = DefaultClaimNormalizer::new();
        let claim = normalizer.normalize(&raw(json!({ "claim_amount": -50.0 })));
        assert_eq!(claim.claim_amount, None);

        let claim = normalizer.normalize(&raw(json!({ "claim_amount": "abc" })));
        assert_eq!(claim.claim_amount, None);

        // Zero survives normalization; the rule engine owns that policy.
        let claim = normalizer.normalize(&raw(json!({ "claim_amount": 0.0 })));
        assert_eq!(claim.claim_amount, Some(0.0));
    }

    #[test]
    fn coercion_preserves_negative_amounts_for_the_rules() {
        let normalizer = DefaultClaimNormalizer::new();
        let coerced = normalizer.coerce(&raw(json!({ "claim_amount": "-5" })));
        assert_eq!(coerced.claim_amount, Some(-5.0));

        let canonical = normalizer.normalize(&raw(json!({ "claim_amount": "-5" })));
        assert_eq!(canonical.claim_amount, None);
    }

    #[test]
    fn code_shapes_are_enforced() {
        let normalizer = DefaultClaimNormalizer::new();

        for good in ["A00.0", "B20", "C34.90", "I10", "S72.001A"] {
            let claim = normalizer.normalize(&raw(json!({ "icd_code": good })));
            assert_eq!(claim.icd_code.as_deref(), Some(good), "icd {:?}", good);
        }
        for bad in ["INVALID", "123", "ZZZ.ZZ", "A", "12345678"] {
            let claim = normalizer.normalize(&raw(json!({ "icd_code": bad })));
            assert_eq!(claim.icd_code, None, "icd {:?}", bad);
        }

        let claim = normalizer.normalize(&raw(json!({ "cpt_code": "99213" })));
        assert_eq!(claim.cpt_code.as_deref(), Some("99213"));
        for bad in ["XXXXX", "123", "999999", "0"] {
            let claim = normalizer.normalize(&raw(json!({ "cpt_code": bad })));
            assert_eq!(claim.cpt_code, None, "cpt {:?}", bad);
        }
    }

    #[test]
    fn normalization_is_idempotent() {
        let normalizer = DefaultClaimNormalizer::new();
        let first = normalizer.normalize(&raw(json!({
            "claim_id": "CLM001",
            "member_id": "MBR001",
            "provider_id": "PRV001",
            "claim_amount": 100.0,
            "service_date": "2024-01-15",
            "icd_code": "A00.0",
            "cpt_code": "99213",
            "claim_status": "PAID"
        })));

        // Round-trip the canonical record back through the normalizer.
        let as_raw: RawClaim = serde_json::from_value(serde_json::to_value(&first).unwrap()).unwrap();
        let second = normalizer.normalize(&as_raw);
        assert_eq!(first, second);
    }
}
