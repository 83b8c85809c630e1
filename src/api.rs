// 🌐 REST API with Axum
//
// Thin HTTP layer over `RiskAnalyzer`. Every response uses the same
// `ApiResponse` envelope; `AnalysisError` decides the status code.

use axum::{
    extract::{Path, Query, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;
use uuid::Uuid;

use crate::analysis::AnalysisResult;
use crate::analyzer::RiskAnalyzer;
use crate::config::WebhookConfig;
use crate::error::AnalysisError;
use crate::webhook::{Notifier, WebhookNotifier, WebhookPayload};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub analyzer: RiskAnalyzer,

    /// Secret and timeout reused for manual re-delivery to arbitrary URLs
    pub webhook_defaults: Option<WebhookConfig>,
}

impl AppState {
    pub fn new(analyzer: RiskAnalyzer, webhook_defaults: Option<WebhookConfig>) -> Self {
        AppState {
            analyzer,
            webhook_defaults,
        }
    }
}

/// API Response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
            error: None,
            timestamp: Utc::now(),
        }
    }
}

impl ApiResponse<()> {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }
}

impl IntoResponse for AnalysisError {
    fn into_response(self) -> Response {
        let status = match &self {
            AnalysisError::UserNotFound { .. } | AnalysisError::ResultNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            AnalysisError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AnalysisError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AnalysisError::Webhook(_) => StatusCode::BAD_GATEWAY,
            AnalysisError::Computation(_) | AnalysisError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            error!(error = %self, "request failed");
        }

        (status, Json(ApiResponse::failure(self.to_string()))).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, AnalysisError>;

// ============================================================================
// Request / response bodies
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AnalyzeParams {
    pub account_no: String,
    #[serde(alias = "ifsc", alias = "ifsc_code")]
    pub bank_code: String,
}

#[derive(Debug, Deserialize)]
pub struct WebhookTrigger {
    pub user_id: Uuid,
    pub webhook_url: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct WebhookSent {
    pub user_id: Uuid,
    pub webhook_url: String,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET / - Service information
async fn service_info() -> impl IntoResponse {
    Json(ApiResponse::ok(
        serde_json::json!({
            "name": "Transaction Risk Analytics API",
            "version": crate::VERSION,
            "endpoints": {
                "analyze": "/api/analyze?account_no=...&bank_code=...",
                "results": "/api/results/{user_id}",
                "webhook": "/api/webhook",
                "health": "/api/health",
            },
        }),
        "Transaction Risk Analytics API is running",
    ))
}

/// GET /api/health - Health check
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let health = match state.analyzer.store().health_check() {
        Ok(()) => HealthResponse {
            status: "healthy",
            database: "connected",
            version: crate::VERSION,
        },
        Err(e) => {
            error!(error = %e, "health check failed");
            HealthResponse {
                status: "degraded",
                database: "disconnected",
                version: crate::VERSION,
            }
        }
    };

    let healthy = health.database == "connected";
    let mut response = ApiResponse::ok(health, "Service is running");
    response.success = healthy;
    Json(response)
}

/// GET /api/analyze?account_no=..&bank_code=.. - Run the full pipeline
async fn analyze(
    State(state): State<AppState>,
    Query(params): Query<AnalyzeParams>,
) -> ApiResult<AnalysisResult> {
    if params.account_no.trim().is_empty() || params.bank_code.trim().is_empty() {
        return Err(AnalysisError::InvalidRequest(
            "account_no and bank_code must not be empty".to_string(),
        ));
    }

    let result = state
        .analyzer
        .analyze(&params.account_no, &params.bank_code)
        .await?;

    let message = format!("Analysis completed for user {}", result.user_id);
    Ok(Json(ApiResponse::ok(result, message)))
}

/// GET /api/results/:user_id - Latest stored result
async fn latest_result(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<AnalysisResult> {
    let result = state.analyzer.latest_result(user_id)?;
    Ok(Json(ApiResponse::ok(
        result,
        "Latest analysis results retrieved successfully",
    )))
}

/// POST /api/webhook - Re-deliver the latest result to the given URL
async fn trigger_webhook(
    State(state): State<AppState>,
    Json(trigger): Json<WebhookTrigger>,
) -> ApiResult<WebhookSent> {
    let url = trigger.webhook_url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(AnalysisError::InvalidRequest(format!(
            "webhook_url must be an http(s) URL: {}",
            url
        )));
    }

    let result = state.analyzer.latest_result(trigger.user_id)?;

    let mut config = state.webhook_defaults.clone().unwrap_or(WebhookConfig {
        url: String::new(),
        secret: None,
        timeout_secs: 30,
    });
    config.url = url.to_string();

    WebhookNotifier::new(&config)?
        .deliver(&WebhookPayload::new(&result))
        .await?;

    Ok(Json(ApiResponse::ok(
        WebhookSent {
            user_id: trigger.user_id,
            webhook_url: config.url,
        },
        "Webhook sent successfully",
    )))
}

async fn not_found(uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::failure(format!("Endpoint not found: {}", uri.path()))),
    )
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/analyze", get(analyze))
        .route("/results/:user_id", get(latest_result))
        .route("/webhook", post(trigger_webhook))
        .with_state(state);

    Router::new()
        .route("/", get(service_info))
        .nest("/api", api_routes)
        .fallback(not_found)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
