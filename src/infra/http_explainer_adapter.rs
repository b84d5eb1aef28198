use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::app::ports::ExplainerPort;
use crate::domain::AnomalyClaim;

/// Chat-completions style explainer. Sends the claim's identifying fields
/// and reasons to a configured endpoint and returns the model's text. All
/// failure handling lives in the caller's fallback; this adapter just
/// reports errors.
pub struct HttpExplainer {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl HttpExplainer {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            // dotenv is loaded at startup; either variable name works.
            api_key: std::env::var("CLAIMSIGHT_EXPLAINER_API_KEY")
                .or_else(|_| std::env::var("OPENAI_API_KEY"))
                .ok(),
        }
    }

    fn build_prompt(record: &AnomalyClaim) -> String {
        let claim = &record.claim;
        let field = |v: &Option<String>| v.clone().unwrap_or_else(|| "N/A".to_string());
        let amount = claim
            .claim_amount
            .map(|a| format!("{:.2}", a))
            .unwrap_or_else(|| "N/A".to_string());
        let date = claim
            .service_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "N/A".to_string());

        format!(
            "You are a healthcare claims analyst. Analyze this flagged claim and provide a brief explanation.\n\n\
             Claim Details:\n\
             - Claim ID: {}\n\
             - Claim Amount: ${}\n\
             - Provider ID: {}\n\
             - Member ID: {}\n\
             - Service Date: {}\n\
             - ICD-10 Code: {}\n\
             - CPT Code: {}\n\
             - Flags: {}\n\n\
             Provide a 2-sentence explanation of why this claim was flagged, followed by 1 specific remediation suggestion.\n\
             Keep the response concise and actionable.",
            field(&claim.claim_id),
            amount,
            field(&claim.provider_id),
            field(&claim.member_id),
            date,
            field(&claim.icd_code),
            field(&claim.cpt_code),
            if record.reasons.is_empty() { "Unknown".to_string() } else { record.reasons.join(", ") },
        )
    }
}

#[async_trait]
impl ExplainerPort for HttpExplainer {
    async fn explain(&self, record: &AnomalyClaim) -> anyhow::Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("no explainer API key configured"))?;

        let body = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You are a healthcare claims analyst providing brief, actionable explanations."
                },
                { "role": "user", "content": Self::build_prompt(record) }
            ],
            "max_tokens": 200,
            "temperature": 0.3
        });

        debug!(endpoint = %self.endpoint, "calling external explainer");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let payload: serde_json::Value = response.json().await?;
        let text = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("explainer response had no message content"))?
            .trim()
            .to_string();
        Ok(text)
    }
}
