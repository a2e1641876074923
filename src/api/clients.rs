use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use utoipa::IntoParams;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult, FieldError};
use crate::middleware::{AppState, AuthUser};
use crate::models::{Client, ClientDetails, CreateClientRequest, NewClient, UpdateClientRequest};
use crate::store::Page;
use crate::utils::validators::{normalize_phone, sanitize_string, validate_phone};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_clients).post(create_client))
        .route(
            "/:id",
            get(get_client).put(update_client).delete(delete_client),
        )
        .route("/:id/recompute", post(recompute_client))
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ClientsQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Canonical form of client contact data: phone as digits, trimmed name and
/// lower-case e-mail. The name length is checked on the sanitized value.
fn client_details(name: &str, phone: &str, email: Option<&str>) -> AppResult<ClientDetails> {
    let name = sanitize_string(name);
    let phone = normalize_phone(phone);

    let mut errors = Vec::new();
    if !(2..=100).contains(&name.chars().count()) {
        errors.push(FieldError::new(
            "name",
            "Nome deve ter entre 2 e 100 caracteres",
        ));
    }
    if !validate_phone(&phone) {
        errors.push(FieldError::new(
            "phone",
            "Telefone inválido. Use DDD + número, ex: 11987654321",
        ));
    }
    if !errors.is_empty() {
        return Err(AppError::InvalidFields(errors));
    }

    Ok(ClientDetails {
        name,
        phone,
        email: email
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty()),
    })
}

#[utoipa::path(
    get,
    path = "/api/v1/clients",
    tag = "clients",
    params(ClientsQuery),
    responses((status = 200, description = "Clientes do usuário", body = Vec<Client>)),
    security(("bearer_auth" = []))
)]
pub async fn list_clients(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<ClientsQuery>,
) -> AppResult<Json<Vec<Client>>> {
    let clients = state
        .store
        .list_user_clients(auth_user.user_id, Page::new(query.page, query.limit))
        .await?;

    Ok(Json(clients))
}

#[utoipa::path(
    post,
    path = "/api/v1/clients",
    tag = "clients",
    request_body = CreateClientRequest,
    responses(
        (status = 201, description = "Cliente criado", body = Client),
        (status = 422, description = "Dados inválidos")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_client(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreateClientRequest>,
) -> AppResult<(StatusCode, Json<Client>)> {
    payload.validate()?;
    let details = client_details(&payload.name, &payload.phone, payload.email.as_deref())?;

    let client = state
        .store
        .insert_client(&NewClient {
            user_id: auth_user.user_id,
            name: details.name,
            phone: details.phone,
            email: details.email,
        })
        .await?;

    tracing::info!(client_id = %client.id, user_id = %auth_user.user_id, "Client created");

    Ok((StatusCode::CREATED, Json(client)))
}

#[utoipa::path(
    get,
    path = "/api/v1/clients/{id}",
    tag = "clients",
    params(("id" = Uuid, Path, description = "Client id")),
    responses(
        (status = 200, description = "Cliente", body = Client),
        (status = 404, description = "Cliente não encontrado")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_client(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Client>> {
    let client = state
        .store
        .find_user_client(auth_user.user_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Cliente não encontrado".to_string()))?;

    Ok(Json(client))
}

#[utoipa::path(
    put,
    path = "/api/v1/clients/{id}",
    tag = "clients",
    params(("id" = Uuid, Path, description = "Client id")),
    request_body = UpdateClientRequest,
    responses(
        (status = 200, description = "Cliente atualizado", body = Client),
        (status = 404, description = "Cliente não encontrado")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_client(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateClientRequest>,
) -> AppResult<Json<Client>> {
    payload.validate()?;
    let details = client_details(&payload.name, &payload.phone, payload.email.as_deref())?;

    let client = state
        .store
        .update_client(auth_user.user_id, id, &details)
        .await?
        .ok_or_else(|| AppError::NotFound("Cliente não encontrado".to_string()))?;

    Ok(Json(client))
}

#[utoipa::path(
    delete,
    path = "/api/v1/clients/{id}",
    tag = "clients",
    params(("id" = Uuid, Path, description = "Client id")),
    responses(
        (status = 200, description = "Cliente removido"),
        (status = 404, description = "Cliente não encontrado"),
        (status = 409, description = "Cliente possui cobranças")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_client(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let client = state
        .store
        .find_user_client(auth_user.user_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Cliente não encontrado".to_string()))?;

    if state.store.count_client_charges(client.id).await? > 0 {
        return Err(AppError::Conflict(
            "Cliente possui cobranças e não pode ser removido".to_string(),
        ));
    }

    if !state.store.delete_client(auth_user.user_id, client.id).await? {
        return Err(AppError::NotFound("Cliente não encontrado".to_string()));
    }

    Ok(Json(json!({"success": true})))
}

/// Rebuilds the cached totals from the client's charges.
#[utoipa::path(
    post,
    path = "/api/v1/clients/{id}/recompute",
    tag = "clients",
    params(("id" = Uuid, Path, description = "Client id")),
    responses(
        (status = 200, description = "Totais recalculados", body = Client),
        (status = 404, description = "Cliente não encontrado")
    ),
    security(("bearer_auth" = []))
)]
pub async fn recompute_client(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Client>> {
    let not_found = || AppError::NotFound("Cliente não encontrado".to_string());

    let client = state
        .store
        .find_user_client(auth_user.user_id, id)
        .await?
        .ok_or_else(not_found)?;

    let client = state
        .store
        .recompute_client_aggregates(client.id)
        .await?
        .ok_or_else(not_found)?;

    Ok(Json(client))
}
