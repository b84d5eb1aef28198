use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::domain::AnomalyClaim;
use crate::explain::template_explanation;
use crate::infra::ndjson_sink_adapter::anomalies_path_in;
use crate::observability::metrics;
use crate::pipeline::storage;

/// Read-through cache over the published anomaly partition. Loaded on first
/// use, reused until explicitly invalidated via the refresh endpoint; a
/// pipeline re-run therefore becomes visible on demand, not mid-request.
pub struct OutputCache {
    gold_dir: PathBuf,
    anomalies: tokio::sync::RwLock<Option<Arc<Vec<AnomalyClaim>>>>,
}

impl OutputCache {
    pub fn new(gold_dir: impl Into<PathBuf>) -> Self {
        Self {
            gold_dir: gold_dir.into(),
            anomalies: tokio::sync::RwLock::new(None),
        }
    }

    pub async fn load(&self) -> Result<Arc<Vec<AnomalyClaim>>, String> {
        if let Some(cached) = self.anomalies.read().await.as_ref() {
            return Ok(cached.clone());
        }

        let path = anomalies_path_in(&self.gold_dir);
        if !path.exists() {
            return Err("No anomalies data found. Run the pipeline first.".to_string());
        }
        let records: Vec<AnomalyClaim> =
            storage::read_ndjson(&path).map_err(|e| format!("failed to read anomalies: {e}"))?;

        let shared = Arc::new(records);
        *self.anomalies.write().await = Some(shared.clone());
        info!(records = shared.len(), "anomaly cache loaded");
        Ok(shared)
    }

    pub async fn invalidate(&self) {
        *self.anomalies.write().await = None;
        metrics::api::cache_reloaded();
    }
}

#[derive(Debug, Deserialize)]
pub struct AnomalyFilter {
    pub provider_id: Option<String>,
    /// Minimum number of flags a record must carry.
    pub min_flags: Option<usize>,
    pub limit: Option<usize>,
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "claimsight-api",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn list_anomalies(
    Query(filter): Query<AnomalyFilter>,
    Extension(cache): Extension<Arc<OutputCache>>,
) -> impl IntoResponse {
    let records = match cache.load().await {
        Ok(records) => records,
        Err(message) => return not_found(message),
    };

    let limit = filter.limit.unwrap_or(100).min(1000);
    let matches: Vec<&AnomalyClaim> = records
        .iter()
        .filter(|r| match &filter.provider_id {
            Some(provider) => r.claim.provider_id.as_deref() == Some(provider.as_str()),
            None => true,
        })
        .filter(|r| match filter.min_flags {
            Some(min) => r.num_flags >= min,
            None => true,
        })
        .take(limit)
        .collect();

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "total": matches.len(),
            "anomalies": matches,
        })),
    )
}

async fn claim_explanation(
    Path(claim_id): Path<String>,
    Extension(cache): Extension<Arc<OutputCache>>,
) -> impl IntoResponse {
    let records = match cache.load().await {
        Ok(records) => records,
        Err(message) => return not_found(message),
    };

    let record = records
        .iter()
        .find(|r| r.claim.claim_id.as_deref() == Some(claim_id.as_str()));
    let record = match record {
        Some(record) => record,
        None => return not_found(format!("Claim {claim_id} not found in anomalies")),
    };

    // Records outside the run's top-N carry no stored explanation; the
    // deterministic template fills the gap on demand.
    let explanation = record
        .explanation
        .clone()
        .unwrap_or_else(|| template_explanation(record));

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "claim_id": claim_id,
            "anomaly_record": record,
            "explanation": explanation,
        })),
    )
}

async fn stats(Extension(cache): Extension<Arc<OutputCache>>) -> impl IntoResponse {
    let records = match cache.load().await {
        Ok(records) => records,
        Err(message) => return not_found(message),
    };

    let unique = |f: fn(&AnomalyClaim) -> Option<&str>| -> usize {
        let mut values: Vec<&str> = records.iter().filter_map(f).collect();
        values.sort_unstable();
        values.dedup();
        values.len()
    };

    let mut reason_counts: HashMap<&str, usize> = HashMap::new();
    for record in records.iter() {
        for reason in &record.reasons {
            *reason_counts.entry(reason.as_str()).or_insert(0) += 1;
        }
    }

    let avg_flags = if records.is_empty() {
        0.0
    } else {
        records.iter().map(|r| r.num_flags).sum::<usize>() as f64 / records.len() as f64
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "total_anomalies": records.len(),
            "unique_providers": unique(|r| r.claim.provider_id.as_deref()),
            "unique_members": unique(|r| r.claim.member_id.as_deref()),
            "avg_flags_per_anomaly": (avg_flags * 100.0).round() / 100.0,
            "max_flags": records.iter().map(|r| r.num_flags).max().unwrap_or(0),
            "anomaly_types": reason_counts,
        })),
    )
}

async fn refresh(Extension(cache): Extension<Arc<OutputCache>>) -> impl IntoResponse {
    cache.invalidate().await;
    match cache.load().await {
        Ok(records) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ok",
                "message": "Cache refreshed successfully",
                "records": records.len(),
            })),
        ),
        Err(message) => not_found(message),
    }
}

async fn metrics_text() -> impl IntoResponse {
    match metrics::render() {
        Some(body) => (StatusCode::OK, body),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed".to_string(),
        ),
    }
}

fn not_found(message: String) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "detail": message })),
    )
}

pub fn router(cache: Arc<OutputCache>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);
    Router::new()
        .route("/health", get(health))
        .route("/anomalies", get(list_anomalies))
        .route("/claims/:claim_id/explanation", get(claim_explanation))
        .route("/stats", get(stats))
        .route("/refresh", post(refresh))
        .route("/metrics", get(metrics_text))
        .layer(ServiceBuilder::new().layer(cors).layer(Extension(cache)))
}

/// Serve the read-only API over the gold outputs until interrupted.
pub async fn run_server(addr: SocketAddr, gold_dir: PathBuf) -> anyhow::Result<()> {
    let cache = Arc::new(OutputCache::new(gold_dir));
    let app = router(cache);

    info!(%addr, "serving claims API");
    hyper::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CanonicalClaim;
    use crate::pipeline::storage::write_ndjson;

    fn record(id: &str, reasons: &[&str]) -> AnomalyClaim {
        AnomalyClaim {
            claim: CanonicalClaim {
                claim_id: Some(id.to_string()),
                member_id: Some("MBR001".to_string()),
                provider_id: Some("PRV001".to_string()),
                claim_amount: Some(100.0),
                service_date: chrono::NaiveDate::from_ymd_opt(2024, 1, 15),
                icd_code: Some("A00.0".to_string()),
                cpt_code: Some("99213".to_string()),
                claim_status: Some("PAID".to_string()),
            },
            reasons: reasons.iter().map(|s| s.to_string()).collect(),
            reasons_text: reasons.join(","),
            num_flags: reasons.len(),
            is_anomalous: true,
            explanation: None,
        }
    }

    #[tokio::test]
    async fn cache_is_read_through_and_invalidatable() {
        let dir = tempfile::tempdir().unwrap();
        let path = anomalies_path_in(dir.path());
        write_ndjson(&path, &[record("CLM001", &["invalid_amount"])]).unwrap();

        let cache = OutputCache::new(dir.path());
        let first = cache.load().await.unwrap();
        assert_eq!(first.len(), 1);

        // A new run supersedes the file; the cache keeps serving the old
        // snapshot until invalidated.
        write_ndjson(
            &path,
            &[
                record("CLM002", &["duplicate_claim"]),
                record("CLM003", &["invalid_icd"]),
            ],
        )
        .unwrap();
        assert_eq!(cache.load().await.unwrap().len(), 1);

        cache.invalidate().await;
        assert_eq!(cache.load().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_gold_dir_is_reported_not_panicked() {
        let dir = tempfile::tempdir().unwrap();
        let cache = OutputCache::new(dir.path().join("nope"));
        let err = cache.load().await.unwrap_err();
        assert!(err.contains("Run the pipeline first"));
    }
}
