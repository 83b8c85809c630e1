// 📮 Webhook delivery - Forward a finished analysis to an external endpoint
//
// One POST per call, no retries. The orchestrator logs and swallows failures;
// the manual re-delivery endpoint reports them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::analysis::AnalysisResult;
use crate::config::WebhookConfig;
use crate::error::{AnalysisError, RiskResult};

pub const USER_AGENT: &str = concat!("risk-analytics/", env!("CARGO_PKG_VERSION"));
pub const SOURCE_HEADER: &str = "X-Webhook-Source";
pub const SECRET_HEADER: &str = "X-Webhook-Secret";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub user_id: Uuid,
    pub analysis_result: AnalysisResult,
    pub timestamp: DateTime<Utc>,
}

impl WebhookPayload {
    pub fn new(result: &AnalysisResult) -> Self {
        WebhookPayload {
            user_id: result.user_id,
            analysis_result: result.clone(),
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, payload: &WebhookPayload) -> RiskResult<()>;
}

/// POSTs JSON payloads to a single configured URL
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    secret: Option<String>,
}

impl WebhookNotifier {
    pub fn new(config: &WebhookConfig) -> RiskResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AnalysisError::Webhook(e.to_string()))?;

        Ok(WebhookNotifier {
            client,
            url: config.url.clone(),
            secret: config.secret.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, payload: &WebhookPayload) -> RiskResult<()> {
        let mut request = self
            .client
            .post(&self.url)
            .header(SOURCE_HEADER, "risk-analytics")
            .json(payload);

        if let Some(secret) = &self.secret {
            request = request.header(SECRET_HEADER, secret);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AnalysisError::Webhook(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AnalysisError::Webhook(format!(
                "{} responded with HTTP {}",
                self.url, status
            )));
        }

        info!(url = %self.url, user_id = %payload.user_id, status = status.as_u16(), "webhook delivered");
        Ok(())
    }
}
