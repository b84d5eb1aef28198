use crate::domain::{AnomalyClaim, CanonicalClaim, FlagSeries};
use crate::error::{PipelineError, Result};

/// Merge rule flags and outlier flags into one anomaly verdict per claim.
///
/// Reasons are assembled in the order the series are given: rule flags in
/// registry order first, then detector flags in invocation order. The merge
/// refuses to run if any series is not aligned with the batch; silently
/// misattaching flags to records would be worse than failing the run.
pub fn aggregate(
    claims: &[CanonicalClaim],
    rule_flags: &[FlagSeries],
    outlier_flags: &[FlagSeries],
) -> Result<Vec<AnomalyClaim>> {
    for series in rule_flags.iter().chain(outlier_flags) {
        if series.mask.len() != claims.len() {
            return Err(PipelineError::MisalignedFlags {
                flag: series.id.clone(),
                expected: claims.len(),
                actual: series.mask.len(),
            });
        }
    }

    Ok(claims
        .iter()
        .enumerate()
        .map(|(i, claim)| {
            let reasons: Vec<String> = rule_flags
                .iter()
                .chain(outlier_flags)
                .filter(|series| series.mask[i])
                .map(|series| series.id.clone())
                .collect();
            let num_flags = reasons.len();
            AnomalyClaim {
                claim: claim.clone(),
                reasons_text: reasons.join(","),
                reasons,
                num_flags,
                is_anomalous: num_flags > 0,
                explanation: None,
            }
        })
        .collect())
}

/// Split an aggregated batch into its clean and anomalous partitions. Both
/// come out of the same pass and together cover the whole input.
pub fn partition(batch: Vec<AnomalyClaim>) -> (Vec<AnomalyClaim>, Vec<AnomalyClaim>) {
    batch.into_iter().partition(|record| !record.is_anomalous)
}

/// Per-flag flagged-record counts across a set of series, in series order.
pub fn reason_counts(series: &[FlagSeries]) -> Vec<(String, usize)> {
    series
        .iter()
        .map(|s| (s.id.clone(), s.flagged_count()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn claim(id: &str) -> CanonicalClaim {
        CanonicalClaim {
            claim_id: Some(id.to_string()),
            member_id: Some("MBR001".to_string()),
            provider_id: Some("PRV001".to_string()),
            claim_amount: Some(100.0),
            service_date: NaiveDate::from_ymd_opt(2024, 1, 15),
            icd_code: Some("A00.0".to_string()),
            cpt_code: Some("99213".to_string()),
            claim_status: Some("PAID".to_string()),
        }
    }

    #[test]
    fn reasons_keep_rule_then_detector_order() {
        let claims = vec![claim("CLM001"), claim("CLM002")];
        let rule_flags = vec![
            FlagSeries::new("missing_mandatory", vec![false, true]),
            FlagSeries::new("invalid_amount", vec![true, true]),
        ];
        let outlier_flags = vec![FlagSeries::new("zscore_global", vec![true, false])];

        let merged = aggregate(&claims, &rule_flags, &outlier_flags).unwrap();
        assert_eq!(merged[0].reasons, vec!["invalid_amount", "zscore_global"]);
        assert_eq!(merged[0].reasons_text, "invalid_amount,zscore_global");
        assert_eq!(merged[1].reasons, vec!["missing_mandatory", "invalid_amount"]);
        assert_eq!(merged[1].num_flags, 2);
        assert!(merged[1].is_anomalous);
    }

    #[test]
    fn unflagged_records_are_clean() {
        let claims = vec![claim("CLM001")];
        let rule_flags = vec![FlagSeries::new("missing_mandatory", vec![false])];
        let merged = aggregate(&claims, &rule_flags, &[]).unwrap();
        assert_eq!(merged[0].num_flags, 0);
        assert!(!merged[0].is_anomalous);
        assert!(merged[0].reasons.is_empty());
        assert_eq!(merged[0].reasons_text, "");
    }

    #[test]
    fn misaligned_series_is_refused() {
        let claims = vec![claim("CLM001"), claim("CLM002")];
        let rule_flags = vec![FlagSeries::new("missing_mandatory", vec![false])];
        let err = aggregate(&claims, &rule_flags, &[]).unwrap_err();
        match err {
            PipelineError::MisalignedFlags { flag, expected, actual } => {
                assert_eq!(flag, "missing_mandatory");
                assert_eq!(expected, 2);
                assert_eq!(actual, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn partitions_cover_the_batch_and_are_disjoint() {
        let claims = vec![claim("CLM001"), claim("CLM002"), claim("CLM003")];
        let rule_flags = vec![FlagSeries::new("invalid_amount", vec![true, false, true])];
        let merged = aggregate(&claims, &rule_flags, &[]).unwrap();
        let total = merged.len();

        let (clean, anomalous) = partition(merged);
        assert_eq!(clean.len() + anomalous.len(), total);
        assert!(clean.iter().all(|r| !r.is_anomalous));
        assert!(anomalous.iter().all(|r| r.is_anomalous));
    }
}
