//! Health check handlers

use axum::{extract::State, Json};
use serde::Serialize;
use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub database: CheckResult,
    pub extractor: CheckResult,
}

#[derive(Serialize)]
pub struct CheckResult {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Liveness probe - always returns healthy if server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

/// Readiness probe - checks the store and the model credential
pub async fn ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    let start = std::time::Instant::now();

    let db_check = match state.db.ping().await {
        Ok(_) => CheckResult {
            status: "up".to_string(),
            latency_ms: Some(start.elapsed().as_millis() as u64),
            error: None,
        },
        Err(e) => CheckResult {
            status: "down".to_string(),
            latency_ms: None,
            error: Some(e.to_string()),
        },
    };

    let extractor_check = if state.extractor.is_configured() {
        CheckResult {
            status: "up".to_string(),
            latency_ms: None,
            error: None,
        }
    } else {
        CheckResult {
            status: "down".to_string(),
            latency_ms: None,
            error: Some("model API key not configured".to_string()),
        }
    };

    let all_healthy = db_check.status == "up" && extractor_check.status == "up";

    Json(ReadyResponse {
        status: if all_healthy { "ready" } else { "not_ready" }.to_string(),
        checks: HealthChecks {
            database: db_check,
            extractor: extractor_check,
        },
    })
}

#[cfg(test)]
mod tests {
    use crate::test_support;
    use axum::http::StatusCode;
    use claimforge_common::extraction::ScriptedProvider;
    use serde_json::json;
    use std::sync::Arc;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health() {
        let state = test_support::state(Arc::new(ScriptedProvider::new()), None).await;
        let response = test_support::router(state)
            .oneshot(test_support::get("/health"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(test_support::body_json(response).await, json!({"status": "healthy"}));
    }

    #[tokio::test]
    async fn test_ready_with_credential() {
        let state = test_support::state(Arc::new(ScriptedProvider::new()), Some("key")).await;
        let response = test_support::router(state)
            .oneshot(test_support::get("/ready"))
            .await
            .unwrap();

        let body = test_support::body_json(response).await;
        assert_eq!(body["status"], "ready");
        assert_eq!(body["checks"]["database"]["status"], "up");
        assert_eq!(body["checks"]["extractor"]["status"], "up");
    }

    #[tokio::test]
    async fn test_not_ready_without_credential() {
        let state = test_support::state(Arc::new(ScriptedProvider::new()), None).await;
        let response = test_support::router(state)
            .oneshot(test_support::get("/ready"))
            .await
            .unwrap();

        let body = test_support::body_json(response).await;
        assert_eq!(body["status"], "not_ready");
        assert_eq!(body["checks"]["extractor"]["status"], "down");
    }
}
