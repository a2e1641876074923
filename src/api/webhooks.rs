use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use chrono::Utc;

use crate::api::charges::StatusChangeResponse;
use crate::error::AppResult;
use crate::middleware::{AppState, WEBHOOK_SECRET_HEADER};
use crate::services::{AuthService, WebhookEvent};

pub fn routes() -> Router<AppState> {
    Router::new().route("/payment", post(payment_webhook))
}

/// Payment provider callback. The raw body is parsed here so malformed JSON
/// gets the same error shape as every other validation failure.
#[utoipa::path(
    post,
    path = "/api/v1/webhooks/payment",
    tag = "webhooks",
    request_body(content = String, description = "{charge_id, status, paid_at?, transaction_id?}", content_type = "application/json"),
    responses(
        (status = 200, description = "Status aplicado", body = StatusChangeResponse),
        (status = 400, description = "Transição inválida"),
        (status = 401, description = "Segredo do webhook inválido"),
        (status = 404, description = "Cobrança não encontrada"),
        (status = 422, description = "Payload inválido")
    )
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<StatusChangeResponse>> {
    let presented = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|value| value.to_str().ok());
    AuthService::new(&state.config).verify_webhook_secret(presented)?;

    let event = WebhookEvent::parse(&body)?;
    let outcome = state.webhooks().handle(&event, Utc::now()).await?;

    Ok(Json(outcome.into()))
}
