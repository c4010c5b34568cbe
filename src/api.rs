// 🌐 HTTP API - the scoring engine behind a small axum router
//
//   GET  /api/health     liveness
//   GET  /api/policy     active scoring policy
//   POST /api/validate   check a record snapshot without scoring it
//   POST /api/score      validate then score a record snapshot
//
// The server keeps no records: every request carries the snapshot it wants scored.

use crate::composer::{CredibilityEngine, CredibilityScore};
use crate::policy::ScoringPolicy;
use crate::records::{validate_records, NormalizedRecord};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    engine: Arc<CredibilityEngine>,
}

/// API Response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub records: usize,
    pub valid: bool,
}

pub fn router(engine: Arc<CredibilityEngine>) -> Router {
    let state = AppState { engine };

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/policy", get(get_policy))
        .route("/validate", post(validate_snapshot))
        .route("/score", post(score_snapshot))
        .with_state(state);

    Router::new().nest("/api", api_routes)
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/policy - Active scoring policy
async fn get_policy(State(state): State<AppState>) -> Json<ApiResponse<ScoringPolicy>> {
    Json(ApiResponse::ok(state.engine.policy().clone()))
}

/// POST /api/validate - Structural check only
async fn validate_snapshot(Json(records): Json<Vec<NormalizedRecord>>) -> Response {
    match validate_records(&records) {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::ok(ValidationSummary {
                records: records.len(),
                valid: true,
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "snapshot rejected");
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ApiResponse::<ValidationSummary>::err(e.to_string())),
            )
                .into_response()
        }
    }
}

/// POST /api/score - Full credibility score for the posted snapshot
async fn score_snapshot(
    State(state): State<AppState>,
    Json(records): Json<Vec<NormalizedRecord>>,
) -> Response {
    if let Err(e) = validate_records(&records) {
        tracing::warn!(error = %e, "snapshot rejected");
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ApiResponse::<CredibilityScore>::err(e.to_string())),
        )
            .into_response();
    }

    let score = state.engine.score(&records);
    (StatusCode::OK, Json(ApiResponse::ok(score))).into_response()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn create_test_router() -> Router {
        router(Arc::new(CredibilityEngine::default()))
    }

    async fn read_json_body(response: Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn post_json(uri: &str, payload: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&payload).unwrap()))
            .unwrap()
    }

    fn create_test_snapshot() -> Value {
        json!([
            {"kind": "transaction", "id": "t1", "source": "bank_statement", "date": "2025-01-10",
             "provenance": "document_backed", "direction": "credit", "amount": 120000},
            {"kind": "invoice", "id": "i1", "source": "invoice", "date": "2025-01-05",
             "provenance": "document_backed", "invoice_number": "INV-1",
             "total": 120000, "vat_amount": 18000}
        ])
    }

    #[tokio::test]
    async fn test_health_route() {
        let response = create_test_router()
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let payload = read_json_body(response).await;
        assert_eq!(payload["data"], "OK");
    }

    #[tokio::test]
    async fn test_policy_route_returns_defaults() {
        let response = create_test_router()
            .oneshot(Request::get("/api/policy").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let payload = read_json_body(response).await;
        assert_eq!(payload["data"]["composite"]["weights"]["evidence"], 40);
    }

    #[tokio::test]
    async fn test_score_route_scores_snapshot() {
        let response = create_test_router()
            .oneshot(post_json("/api/score", create_test_snapshot()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let payload = read_json_body(response).await;
        assert_eq!(payload["success"], true);
        assert_eq!(payload["data"]["dataPoints"], 2);
        assert_eq!(payload["data"]["trustTier"]["tier"], 2);
        assert!(payload["data"]["crossSourceReconciliation"]["passed"]
            .as_bool()
            .unwrap());
    }

    #[tokio::test]
    async fn test_score_route_rejects_duplicate_ids() {
        let snapshot = json!([
            {"kind": "transaction", "id": "dup", "source": "bank_statement", "date": "2025-01-10",
             "provenance": "document_backed", "direction": "credit", "amount": 1000},
            {"kind": "transaction", "id": "dup", "source": "bank_statement", "date": "2025-01-11",
             "provenance": "document_backed", "direction": "debit", "amount": 500}
        ]);

        let response = create_test_router()
            .oneshot(post_json("/api/score", snapshot))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let payload = read_json_body(response).await;
        assert_eq!(payload["success"], false);
        assert!(payload["error"].as_str().unwrap().contains("dup"));
    }

    #[tokio::test]
    async fn test_validate_route() {
        let response = create_test_router()
            .oneshot(post_json("/api/validate", create_test_snapshot()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let payload = read_json_body(response).await;
        assert_eq!(payload["data"]["records"], 2);
        assert_eq!(payload["data"]["valid"], true);
    }
}
