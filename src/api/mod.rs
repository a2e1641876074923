pub mod charges;
pub mod clients;
pub mod jobs;
pub mod notifications;
pub mod profile;
pub mod webhooks;

use axum::{
    http::{header, HeaderName, Method},
    middleware as axum_middleware,
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::middleware::{state_middleware, AppState, WEBHOOK_SECRET_HEADER};
use crate::openapi::ApiDoc;

const MAX_BODY_BYTES: usize = 1024 * 1024;

pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/clients", clients::routes())
        .nest("/charges", charges::routes())
        .nest("/notifications", notifications::routes())
        .nest("/profile", profile::routes())
        .nest("/webhooks", webhooks::routes())
        .nest("/jobs", jobs::routes())
}

/// Full HTTP application: API routes, docs and the shared layers.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(WEBHOOK_SECRET_HEADER),
        ]);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/api/v1", routes())
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            state_middleware,
        ))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "name": "PingPague API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Cobranças automatizadas com lembretes via WhatsApp"
    }))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}
