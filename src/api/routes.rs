use axum::{
    routing::{delete, get, post},
    Router,
    extract::{rejection::JsonRejection, Json, Path, State},
    response::IntoResponse,
};
use serde_json::json;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::TraceLayer;
use chrono::Utc;
use tracing::info;

use crate::error::{Result, AppError};
use crate::api::models::{
    BatchCrawlRequestBody, BatchResponse, CompressRequest, CompressResponse, CrawlRequestBody,
    DeleteResponse, HealthResponse,
};
use crate::fingerprint::CacheFingerprint;
use crate::models::CrawlResult;
use crate::AppState;

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/crawl", post(crawl_handler))
        .route("/crawl/batch", post(batch_crawl_handler))
        .route("/result/:job_id", get(result_handler))
        .route("/cache/:job_id", delete(clear_cache_handler))
        .route("/compress", post(compress_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(app_state)
}

fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::Validation(rejection.body_text()))
}

async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "name": "Crawl Service",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/health",
            "crawl": "/crawl",
            "batch_crawl": "/crawl/batch",
            "get_result": "/result/{job_id}",
            "clear_cache": "/cache/{job_id}",
            "compress": "/compress"
        }
    }))
}

/// Always 200; `degraded` when the cache store does not answer.
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connected = state.crawler.cache().is_connected().await;

    Json(HealthResponse {
        status: if connected { "healthy" } else { "degraded" }.to_string(),
        timestamp: Utc::now().to_rfc3339(),
        redis_connected: connected,
    })
}

async fn crawl_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CrawlRequestBody>, JsonRejection>,
) -> Result<Json<CrawlResult>> {
    let request = json_body(payload)?.into_request()?;
    info!("Crawling URL: {}", request.url());

    let result = state.crawler.crawl(&request).await?;
    Ok(Json(result))
}

async fn batch_crawl_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<BatchCrawlRequestBody>, JsonRejection>,
) -> Result<Json<BatchResponse>> {
    let body = json_body(payload)?;
    let shared = body.shared_options()?;

    let jobs = state.crawler.submit_batch(&body.urls, &shared)?;
    info!("Batch crawl initiated for {} URLs", jobs.len());

    Ok(Json(BatchResponse {
        status: "processing".to_string(),
        total_urls: jobs.len(),
        jobs,
        message: "Batch crawl initiated. Use job_id to retrieve results from cache.".to_string(),
    }))
}

async fn result_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<CrawlResult>> {
    let key = CacheFingerprint::from_job_id(&job_id);

    state
        .crawler
        .cache()
        .get_result(&key)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Result not found or expired".to_string()))
}

async fn clear_cache_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let key = CacheFingerprint::from_job_id(&job_id);
    let deleted = state.crawler.cache().delete(&key).await?;

    Ok(Json(DeleteResponse {
        status: if deleted { "success" } else { "not_found" }.to_string(),
        job_id,
    }))
}

async fn compress_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CompressRequest>, JsonRejection>,
) -> Result<Json<CompressResponse>> {
    let body = json_body(payload)?;
    let result = state.compressor.transform(&body.content, &body.instruction).await?;

    Ok(Json(CompressResponse { result }))
}
