use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::error::AppResult;
use crate::middleware::{AppState, AuthUser};
use crate::models::{
    Charge, ChargeStatus, ChargesQuery, CreateChargeRequest, DeliveryStatus, UpdateChargeRequest,
    UpdateChargeStatusRequest,
};
use crate::services::{SuccessorOutcome, TransitionOutcome};
use crate::store::{ChargeFilter, Page};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_charges).post(create_charge))
        .route(
            "/:id",
            get(get_charge).put(update_charge).delete(cancel_charge),
        )
        .route("/:id/status", patch(update_charge_status))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateChargeResponse {
    pub charge: Charge,
    /// Outcome of the `reception` message, absent when no send was attempted.
    pub notification_status: Option<DeliveryStatus>,
}

/// Result of a status change, shared by the dashboard and the payment webhook.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatusChangeResponse {
    pub success: bool,
    pub charge_id: Uuid,
    pub status: ChargeStatus,
    pub previous_status: ChargeStatus,
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub successor_charge_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub successor_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_status: Option<DeliveryStatus>,
    pub charge: Charge,
}

impl From<TransitionOutcome> for StatusChangeResponse {
    fn from(outcome: TransitionOutcome) -> Self {
        let successor_error = match &outcome.successor {
            SuccessorOutcome::Failed(reason) => Some(reason.clone()),
            _ => None,
        };

        Self {
            success: true,
            charge_id: outcome.charge.id,
            status: outcome.charge.status,
            previous_status: outcome.previous_status,
            changed: outcome.changed,
            successor_charge_id: outcome.successor.charge_id(),
            successor_error,
            notification_status: outcome.notification,
            charge: outcome.charge,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/charges",
    params(ChargesQuery),
    responses((status = 200, description = "Cobranças do usuário", body = Vec<Charge>)),
    security(("bearer_auth" = [])),
    tag = "charges"
)]
pub async fn list_charges(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<ChargesQuery>,
) -> AppResult<Json<Vec<Charge>>> {
    let filter = ChargeFilter {
        status: query.status,
        client_id: query.client_id,
    };

    let charges = state
        .store
        .list_user_charges(auth_user.user_id, filter, Page::new(query.page, query.limit))
        .await?;

    Ok(Json(charges))
}

#[utoipa::path(
    post,
    path = "/api/v1/charges",
    request_body = CreateChargeRequest,
    responses(
        (status = 201, description = "Cobrança criada", body = CreateChargeResponse),
        (status = 404, description = "Cliente não encontrado"),
        (status = 422, description = "Dados inválidos")
    ),
    security(("bearer_auth" = [])),
    tag = "charges"
)]
pub async fn create_charge(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreateChargeRequest>,
) -> AppResult<(StatusCode, Json<CreateChargeResponse>)> {
    payload.validate()?;

    let (charge, notification_status) = state
        .charges()
        .create_charge(auth_user.user_id, &payload, Utc::now())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateChargeResponse {
            charge,
            notification_status,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/charges/{id}",
    params(("id" = Uuid, Path, description = "Charge id")),
    responses(
        (status = 200, description = "Cobrança", body = Charge),
        (status = 404, description = "Cobrança não encontrada")
    ),
    security(("bearer_auth" = [])),
    tag = "charges"
)]
pub async fn get_charge(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Charge>> {
    let charge = state.charges().find_owned(auth_user.user_id, id).await?;
    Ok(Json(charge))
}

#[utoipa::path(
    put,
    path = "/api/v1/charges/{id}",
    params(("id" = Uuid, Path, description = "Charge id")),
    request_body = UpdateChargeRequest,
    responses(
        (status = 200, description = "Cobrança atualizada", body = Charge),
        (status = 400, description = "Cobrança cancelada"),
        (status = 404, description = "Cobrança não encontrada")
    ),
    security(("bearer_auth" = [])),
    tag = "charges"
)]
pub async fn update_charge(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateChargeRequest>,
) -> AppResult<Json<Charge>> {
    payload.validate()?;

    let charge = state
        .charges()
        .update_charge(auth_user.user_id, id, &payload)
        .await?;

    Ok(Json(charge))
}

#[utoipa::path(
    patch,
    path = "/api/v1/charges/{id}/status",
    params(("id" = Uuid, Path, description = "Charge id")),
    request_body = UpdateChargeStatusRequest,
    responses(
        (status = 200, description = "Status aplicado", body = StatusChangeResponse),
        (status = 400, description = "Transição inválida"),
        (status = 404, description = "Cobrança não encontrada")
    ),
    security(("bearer_auth" = [])),
    tag = "charges"
)]
pub async fn update_charge_status(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateChargeStatusRequest>,
) -> AppResult<Json<StatusChangeResponse>> {
    let outcome = state
        .charges()
        .change_status(auth_user.user_id, id, payload.status, Utc::now())
        .await?;

    Ok(Json(outcome.into()))
}

/// Charges are never removed, only canceled.
#[utoipa::path(
    delete,
    path = "/api/v1/charges/{id}",
    params(("id" = Uuid, Path, description = "Charge id")),
    responses(
        (status = 200, description = "Cobrança cancelada", body = StatusChangeResponse),
        (status = 400, description = "Cobrança já cancelada"),
        (status = 404, description = "Cobrança não encontrada")
    ),
    security(("bearer_auth" = [])),
    tag = "charges"
)]
pub async fn cancel_charge(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<StatusChangeResponse>> {
    let outcome = state
        .charges()
        .cancel_charge(auth_user.user_id, id, Utc::now())
        .await?;

    Ok(Json(outcome.into()))
}
