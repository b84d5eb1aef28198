use std::collections::HashMap;

use crate::domain::{CanonicalClaim, FlagSeries};

/// The amount partitions the detector is run over. Each invocation produces
/// an independently named flag over the same numeric field, so one claim can
/// accumulate several outlier flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountPartition {
    Global,
    ByProvider,
    ByCpt,
}

impl AmountPartition {
    /// The three invocations of the full pipeline, in flag-append order.
    pub const ALL: [AmountPartition; 3] = [
        AmountPartition::Global,
        AmountPartition::ByProvider,
        AmountPartition::ByCpt,
    ];

    pub fn flag_id(&self) -> &'static str {
        match self {
            AmountPartition::Global => "zscore_global",
            AmountPartition::ByProvider => "zscore_by_provider",
            AmountPartition::ByCpt => "zscore_by_cpt",
        }
    }

    /// Grouping key for a claim; `None` both for the global partition and for
    /// claims missing the key field.
    fn group_key<'a>(&self, claim: &'a CanonicalClaim) -> Option<&'a str> {
        match self {
            AmountPartition::Global => Some(""),
            AmountPartition::ByProvider => claim.provider_id.as_deref(),
            AmountPartition::ByCpt => claim.cpt_code.as_deref(),
        }
    }
}

/// Running sums for one group; finalized into mean/std after the
/// accumulation pass.
#[derive(Debug, Default)]
struct GroupAccumulator {
    count: usize,
    sum: f64,
    sum_sq: f64,
}

impl GroupAccumulator {
    fn push(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.sum_sq += value * value;
    }

    /// Sample mean and sample standard deviation (n-1 denominator).
    /// `None` when the group has fewer than two samples.
    fn finalize(&self) -> Option<(f64, f64)> {
        if self.count < 2 {
            return None;
        }
        let n = self.count as f64;
        let mean = self.sum / n;
        let variance = (self.sum_sq - n * mean * mean) / (n - 1.0);
        // Guard against tiny negative variance from float rounding.
        let std = variance.max(0.0).sqrt();
        Some((mean, std))
    }
}

/// Standardized score per claim for one partition of the batch.
///
/// Scoring requires a full pass over each group before any member can be
/// scored, so this runs in two phases: accumulate, then score. Records that
/// cannot be scored meaningfully -- null amount, null group key, group with
/// undefined or zero standard deviation -- score exactly 0 and can therefore
/// never cross a positive threshold.
pub fn amount_zscores(claims: &[CanonicalClaim], partition: AmountPartition) -> Vec<f64> {
    let mut groups: HashMap<&str, GroupAccumulator> = HashMap::new();
    for claim in claims {
        if let (Some(key), Some(amount)) = (partition.group_key(claim), claim.claim_amount) {
            groups.entry(key).or_default().push(amount);
        }
    }

    let stats: HashMap<&str, (f64, f64)> = groups
        .iter()
        .filter_map(|(key, acc)| acc.finalize().map(|s| (*key, s)))
        .collect();

    claims
        .iter()
        .map(|claim| {
            let key = match partition.group_key(claim) {
                Some(k) => k,
                None => return 0.0,
            };
            let amount = match claim.claim_amount {
                Some(a) => a,
                None => return 0.0,
            };
            match stats.get(key) {
                Some((mean, std)) if *std > 0.0 => (amount - mean) / std,
                _ => 0.0,
            }
        })
        .collect()
}

/// Boolean outlier mask for one partition: |z| strictly greater than the
/// threshold.
pub fn detect_outliers(
    claims: &[CanonicalClaim],
    partition: AmountPartition,
    threshold: f64,
) -> Vec<bool> {
    amount_zscores(claims, partition)
        .into_iter()
        .map(|z| z.abs() > threshold)
        .collect()
}

/// All three detector invocations, in flag-append order.
pub fn detect_all(claims: &[CanonicalClaim], threshold: f64) -> Vec<FlagSeries> {
    AmountPartition::ALL
        .iter()
        .map(|partition| {
            FlagSeries::new(
                partition.flag_id(),
                detect_outliers(claims, *partition, threshold),
            )
        })
        .collect()
}
