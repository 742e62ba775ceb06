//! HTTP server for lesson generation

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::cache::CacheStats;
use crate::error::LessonError;
use crate::export::{export, ExportFormat};
use crate::lesson_builder::LessonBuilder;
use crate::types::{DifficultyBand, Lesson, LessonOptions};

/// HTTP lesson request; option fields sit at the top level
#[derive(Debug, Deserialize)]
pub struct LessonRequestHttp {
    pub theme: String,
    pub difficulty: String,
    #[serde(alias = "desired_count")]
    pub count: usize,
    #[serde(flatten)]
    pub options: LessonOptions,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub found: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested: Option<usize>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct ThemeSummary {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub sub_themes: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CacheStatsResponse {
    pub enabled: bool,
    pub stats: Option<CacheStats>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(e: LessonError) -> ApiError {
    let status = match &e {
        LessonError::Validation(_) => StatusCode::BAD_REQUEST,
        LessonError::ThemeNotFound(_) => StatusCode::NOT_FOUND,
        LessonError::InsufficientExamples { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        LessonError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        LessonError::NarrativeGeneration(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let (found, requested) = match &e {
        LessonError::InsufficientExamples { found, requested, .. } => (Some(*found), Some(*requested)),
        _ => (None, None),
    };
    if status.is_server_error() {
        error!(error = %e, "Lesson request failed");
    } else {
        warn!(error = %e, "Lesson request rejected");
    }
    (
        status,
        Json(ErrorResponse {
            error: e.code().to_string(),
            details: Some(e.to_string()),
            found,
            requested,
        }),
    )
}

async fn build_lesson(builder: &LessonBuilder, req: LessonRequestHttp) -> Result<Lesson, ApiError> {
    info!(
        theme = %req.theme,
        difficulty = %req.difficulty,
        count = req.count,
        "Received lesson request"
    );
    let difficulty: DifficultyBand = req.difficulty.parse().map_err(error_response)?;
    builder
        .generate_lesson(&req.theme, difficulty, req.count, req.options)
        .await
        .map_err(error_response)
}

/// Generate lesson handler
async fn lesson_handler(
    State(builder): State<Arc<LessonBuilder>>,
    Json(req): Json<LessonRequestHttp>,
) -> Result<Json<Lesson>, ApiError> {
    build_lesson(&builder, req).await.map(Json)
}

/// Generate and export in one call
async fn export_handler(
    State(builder): State<Arc<LessonBuilder>>,
    Query(query): Query<ExportQuery>,
    Json(req): Json<LessonRequestHttp>,
) -> Result<Response, ApiError> {
    let format = match query.format.as_deref() {
        Some(f) => f.parse::<ExportFormat>().map_err(error_response)?,
        None => ExportFormat::default(),
    };
    let lesson = build_lesson(&builder, req).await?;
    let body = export(&lesson, format).map_err(|e| {
        error!("Export failed: {:?}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "export_failed".to_string(),
                details: Some(e.to_string()),
                found: None,
                requested: None,
            }),
        )
    })?;
    Ok(([(header::CONTENT_TYPE, format.content_type())], body).into_response())
}

async fn themes_handler(State(builder): State<Arc<LessonBuilder>>) -> Json<Vec<ThemeSummary>> {
    let themes = builder
        .config()
        .themes
        .iter()
        .map(|(name, info)| ThemeSummary {
            name: name.clone(),
            display_name: info.display_name.clone(),
            description: info.description.clone(),
            sub_themes: info.sub_themes.clone(),
        })
        .collect();
    Json(themes)
}

async fn cache_stats_handler(State(builder): State<Arc<LessonBuilder>>) -> Json<CacheStatsResponse> {
    let stats = builder.cache_stats();
    Json(CacheStatsResponse {
        enabled: stats.is_some(),
        stats,
    })
}

/// Health check handler
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "chess-lessons".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Create and configure the HTTP server
pub fn create_router(builder: Arc<LessonBuilder>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/themes", get(themes_handler))
        .route("/lessons", post(lesson_handler))
        .route("/lessons/export", post(export_handler))
        .route("/cache/stats", get(cache_stats_handler))
        .with_state(builder)
}

/// Run the HTTP server
pub async fn run_server(builder: Arc<LessonBuilder>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    info!("Starting chess-lessons server on {}", addr);

    let app = create_router(builder);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{builder_with, corpus};
    use crate::narrative::MockNarrativeGen;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> Router {
        create_router(builder_with(corpus(), MockNarrativeGen::replying(
            "An introduction long enough to pass.",
            "A summary long enough to pass.",
        )))
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_themes_lists_registry() {
        let response = app()
            .oneshot(Request::builder().uri("/themes").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let themes = body_json(response).await;
        let names: Vec<_> = themes
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap().to_string())
            .collect();
        assert!(names.contains(&"fork".to_string()));
        assert!(names.contains(&"tactics".to_string()));
    }

    #[tokio::test]
    async fn test_generate_lesson() {
        let response = app()
            .oneshot(post_json(
                "/lessons",
                serde_json::json!({"theme": "fork", "difficulty": "intermediate", "count": 3}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let lesson = body_json(response).await;
        assert_eq!(lesson["title"], "Mastering Fork Tactics");
        assert_eq!(lesson["examples"].as_array().unwrap().len(), 3);
        assert_eq!(lesson["metadata"]["narrative_source"], "generated");
    }

    #[tokio::test]
    async fn test_error_mapping() {
        let cases = [
            (serde_json::json!({"theme": "nope", "difficulty": "beginner", "count": 3}), StatusCode::BAD_REQUEST),
            (serde_json::json!({"theme": "fork", "difficulty": "expert", "count": 3}), StatusCode::BAD_REQUEST),
            (serde_json::json!({"theme": "fork", "difficulty": "beginner", "count": 0}), StatusCode::BAD_REQUEST),
            (serde_json::json!({"theme": "pin", "difficulty": "intermediate", "count": 5}), StatusCode::UNPROCESSABLE_ENTITY),
        ];
        for (body, expected) in cases {
            let response = app().oneshot(post_json("/lessons", body.clone())).await.unwrap();
            assert_eq!(response.status(), expected, "request {}", body);
        }
    }

    #[tokio::test]
    async fn test_insufficient_reports_counts() {
        let response = app()
            .oneshot(post_json(
                "/lessons",
                serde_json::json!({"theme": "pin", "difficulty": "intermediate", "count": 5}),
            ))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["error"], "insufficient_examples");
        assert_eq!(body["found"], 3);
        assert_eq!(body["requested"], 5);
    }

    #[tokio::test]
    async fn test_export_markdown() {
        let response = app()
            .oneshot(post_json(
                "/lessons/export?format=markdown",
                serde_json::json!({"theme": "fork", "difficulty": "intermediate", "count": 2}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/markdown; charset=utf-8"
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.starts_with("# Mastering Fork Tactics"));
    }

    #[tokio::test]
    async fn test_export_rejects_unknown_format() {
        let response = app()
            .oneshot(post_json(
                "/lessons/export?format=pdf",
                serde_json::json!({"theme": "fork", "difficulty": "intermediate", "count": 2}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_cache_stats() {
        let response = app()
            .oneshot(Request::builder().uri("/cache/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["enabled"], true);
        assert_eq!(body["stats"]["size"], 0);
    }
}
