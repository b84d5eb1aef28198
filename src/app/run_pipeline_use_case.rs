use anyhow::Result;
use tracing::info;
use uuid::Uuid;

use crate::app::ports::{ClaimSourcePort, PartitionSinkPort};
use crate::domain::{AnomalyClaim, RunSummary};
use crate::explain::ExplanationService;
use crate::observability::metrics;
use crate::pipeline::processing::aggregate;
use crate::pipeline::processing::normalize::DefaultClaimNormalizer;
use crate::pipeline::processing::outliers;
use crate::pipeline::processing::rules::{self, RuleContext};

/// Orchestrates one batch run: fetch, normalize, evaluate rules and outlier
/// detectors, aggregate, explain the worst offenders, publish both
/// partitions. The stages only ever read their predecessor's output; the
/// aggregator is the single point where the two flag sets meet.
pub struct RunPipelineUseCase {
    source: Box<dyn ClaimSourcePort>,
    sink: Box<dyn PartitionSinkPort>,
    explainer: ExplanationService,
    zscore_threshold: f64,
    explain_top_n: usize,
}

impl RunPipelineUseCase {
    pub fn new(
        source: Box<dyn ClaimSourcePort>,
        sink: Box<dyn PartitionSinkPort>,
        explainer: ExplanationService,
        zscore_threshold: f64,
        explain_top_n: usize,
    ) -> Self {
        Self {
            source,
            sink,
            explainer,
            zscore_threshold,
            explain_top_n,
        }
    }

    pub async fn run(&self) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        info!(%run_id, "starting pipeline run");
        metrics::pipeline::run_started();

        // Ingest. A missing source aborts the run before anything is written.
        let raw_batch = self.source.fetch_batch().await?;
        let total = raw_batch.len();

        // Normalize. Per-record, no cross-record dependency. The rules get
        // the coerced view (signed amounts) so negativity is their finding;
        // everything downstream sees the canonical form.
        let normalizer = DefaultClaimNormalizer::new();
        let coerced = normalizer.coerce_batch(&raw_batch);
        let claims = normalizer.normalize_batch(&raw_batch);
        drop(raw_batch);
        metrics::normalize::batch_processed(total);
        info!(records = total, "normalized batch");

        // Rules and outlier detectors run independently; neither observes
        // the other's output.
        let ctx = RuleContext::now(self.zscore_threshold);
        let rule_flags = rules::evaluate_all(&coerced, &ctx);
        drop(coerced);
        for series in &rule_flags {
            metrics::rules::flags_raised(&series.id, series.flagged_count() as u64);
            info!(rule = %series.id, flagged = series.flagged_count(), "rule evaluated");
        }

        let outlier_flags = outliers::detect_all(&claims, self.zscore_threshold);
        for series in &outlier_flags {
            metrics::outliers::flags_raised(&series.id, series.flagged_count() as u64);
            info!(detector = %series.id, flagged = series.flagged_count(), "outlier partition scored");
        }

        let mut reason_counts = aggregate::reason_counts(&rule_flags);
        reason_counts.extend(aggregate::reason_counts(&outlier_flags));

        // Merge; refuses misaligned series before anything is attached.
        let merged = aggregate::aggregate(&claims, &rule_flags, &outlier_flags)?;
        let (clean, mut anomalous) = aggregate::partition(merged);

        let explanations_generated = self.explain_worst(&mut anomalous).await;

        metrics::aggregate::partitions_published(clean.len(), anomalous.len());
        let clean_claims: Vec<_> = clean.into_iter().map(|r| r.claim).collect();
        self.sink.publish(&clean_claims, &anomalous).await?;

        let summary = RunSummary {
            run_id,
            total_claims: total,
            clean_claims: clean_claims.len(),
            anomalous_claims: anomalous.len(),
            reason_counts,
            explanations_generated,
        };
        info!(
            %run_id,
            total = summary.total_claims,
            clean = summary.clean_claims,
            anomalous = summary.anomalous_claims,
            "pipeline run complete"
        );
        Ok(summary)
    }

    /// Attach explanations to the top-N anomalies by flag count. Ordering is
    /// stable so equal-count records keep batch order.
    async fn explain_worst(&self, anomalous: &mut [AnomalyClaim]) -> usize {
        if anomalous.is_empty() || self.explain_top_n == 0 {
            return 0;
        }

        let mut order: Vec<usize> = (0..anomalous.len()).collect();
        order.sort_by_key(|&i| std::cmp::Reverse(anomalous[i].num_flags));

        let mut generated = 0;
        for &idx in order.iter().take(self.explain_top_n) {
            let text = self.explainer.explain(&anomalous[idx]).await;
            anomalous[idx].explanation = Some(text);
            generated += 1;
        }
        metrics::explain::explanations_generated(generated as u64);
        generated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::{ClaimSourcePort, PartitionSinkPort};
    use crate::domain::{CanonicalClaim, RawClaim};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    struct StaticSource {
        rows: Vec<RawClaim>,
    }

    #[async_trait]
    impl ClaimSourcePort for StaticSource {
        async fn fetch_batch(&self) -> crate::error::Result<Vec<RawClaim>> {
            Ok(self.rows.clone())
        }
    }

    struct MissingSource;

    #[async_trait]
    impl ClaimSourcePort for MissingSource {
        async fn fetch_batch(&self) -> crate::error::Result<Vec<RawClaim>> {
            Err(crate::error::PipelineError::MissingSource {
                stage: "ingestion",
                path: "data/claims.csv".to_string(),
            })
        }
    }

    #[derive(Default)]
    struct MockSink {
        published: Arc<Mutex<Vec<(Vec<CanonicalClaim>, Vec<AnomalyClaim>)>>>,
    }

    #[async_trait]
    impl PartitionSinkPort for MockSink {
        async fn publish(
            &self,
            clean: &[CanonicalClaim],
            anomalies: &[AnomalyClaim],
        ) -> anyhow::Result<()> {
            self.published
                .lock()
                .await
                .push((clean.to_vec(), anomalies.to_vec()));
            Ok(())
        }
    }

    fn raw(fields: serde_json::Value) -> RawClaim {
        fields.as_object().unwrap().clone()
    }

    fn row(claim_id: &str, amount: &str) -> RawClaim {
        raw(json!({
            "claim_id": claim_id,
            "member_id": "MBR001",
            "provider_id": "PRV001",
            "claim_amount": amount,
            "service_date": "2024-01-15",
            "icd_code": "A00.0",
            "cpt_code": "99213",
            "claim_status": "PAID"
        }))
    }

    fn use_case(rows: Vec<RawClaim>, sink: MockSink) -> RunPipelineUseCase {
        RunPipelineUseCase::new(
            Box::new(StaticSource { rows }),
            Box::new(sink),
            ExplanationService::local_only(),
            3.0,
            20,
        )
    }

    #[tokio::test]
    async fn duplicate_and_negative_scenario() {
        let sink = MockSink::default();
        let published = sink.published.clone();
        let rows = vec![row("C1", "100"), row("C1", "100"), row("C2", "-5")];

        let summary = use_case(rows, sink).run().await.unwrap();
        assert_eq!(summary.total_claims, 3);

        let runs = published.lock().await;
        let (clean, anomalous) = &runs[0];
        assert!(clean.is_empty());
        assert_eq!(anomalous.len(), 3);

        let by_id = |id: &str| -> Vec<&AnomalyClaim> {
            anomalous
                .iter()
                .filter(|r| r.claim.claim_id.as_deref() == Some(id))
                .collect()
        };

        // Both C1 occurrences carry duplicate_claim.
        for record in by_id("C1") {
            assert!(record.reasons.contains(&"duplicate_claim".to_string()));
        }
        // The rules saw the signed coercion: C2's -5 is an amount violation,
        // not a missing field, even though its published canonical amount is
        // null.
        let c2 = by_id("C2");
        assert!(c2[0].reasons.contains(&"invalid_amount".to_string()));
        assert!(!c2[0].reasons.contains(&"duplicate_claim".to_string()));
        assert!(anomalous.iter().all(|r| !r.reasons.contains(&"missing_mandatory".to_string())));
        assert_eq!(c2[0].claim.claim_amount, None);
    }

    #[tokio::test]
    async fn partition_completeness_holds() {
        let sink = MockSink::default();
        let published = sink.published.clone();
        let mut rows: Vec<RawClaim> = (0..20)
            .map(|i| row(&format!("CLM{:03}", i), &format!("{}", 100 + i * 5)))
            .collect();
        rows.push(row("CLM020", "500000"));
        rows.push(raw(json!({ "claim_id": "CLM021" })));

        let summary = use_case(rows, sink).run().await.unwrap();

        let runs = published.lock().await;
        let (clean, anomalous) = &runs[0];
        assert_eq!(clean.len() + anomalous.len(), summary.total_claims);
        assert_eq!(summary.clean_claims, clean.len());
        assert_eq!(summary.anomalous_claims, anomalous.len());

        // The extreme amount is the only global outlier.
        let outliers: Vec<_> = anomalous
            .iter()
            .filter(|r| r.reasons.iter().any(|f| f == "zscore_global"))
            .collect();
        assert_eq!(outliers.len(), 1);
        assert_eq!(outliers[0].claim.claim_id.as_deref(), Some("CLM020"));
    }

    #[tokio::test]
    async fn worst_anomalies_get_explanations() {
        let sink = MockSink::default();
        let published = sink.published.clone();
        let rows = vec![row("C1", "100"), raw(json!({ "claim_id": "C2" })), row("C3", "250")];

        let use_case = RunPipelineUseCase::new(
            Box::new(StaticSource { rows }),
            Box::new(sink),
            ExplanationService::local_only(),
            3.0,
            1,
        );
        let summary = use_case.run().await.unwrap();
        assert_eq!(summary.explanations_generated, 1);

        let runs = published.lock().await;
        let (_, anomalous) = &runs[0];
        let explained: Vec<_> = anomalous.iter().filter(|r| r.explanation.is_some()).collect();
        assert_eq!(explained.len(), 1);
        // The all-null record carries the most flags and wins the single slot.
        assert_eq!(explained[0].claim.claim_id.as_deref(), Some("C2"));
    }

    #[tokio::test]
    async fn missing_source_aborts_without_publishing() {
        let sink = MockSink::default();
        let published = sink.published.clone();
        let use_case = RunPipelineUseCase::new(
            Box::new(MissingSource),
            Box::new(sink),
            ExplanationService::local_only(),
            3.0,
            20,
        );

        let err = use_case.run().await.unwrap_err();
        assert!(err.to_string().contains("ingestion"));
        assert!(published.lock().await.is_empty());
    }
}
