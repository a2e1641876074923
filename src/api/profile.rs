use axum::{extract::State, routing::get, Json, Router};
use validator::Validate;

use crate::error::{AppError, AppResult, FieldError};
use crate::middleware::{AppState, AuthUser};
use crate::models::{Profile, UpdateProfileRequest};
use crate::utils::validators::{normalize_phone, sanitize_optional, validate_phone};

pub fn routes() -> Router<AppState> {
    Router::new().route("/", get(get_profile).put(update_profile))
}

#[utoipa::path(
    get,
    path = "/api/v1/profile",
    tag = "profile",
    responses(
        (status = 200, description = "Perfil do usuário", body = Profile),
        (status = 404, description = "Perfil não encontrado")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_profile(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<Profile>> {
    let profile = state
        .store
        .find_profile(auth_user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Perfil não encontrado".to_string()))?;

    Ok(Json(profile))
}

/// Creates the profile on first save; absent fields keep their value.
#[utoipa::path(
    put,
    path = "/api/v1/profile",
    tag = "profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Perfil atualizado", body = Profile),
        (status = 422, description = "Dados inválidos")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_profile(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> AppResult<Json<Profile>> {
    payload.validate()?;

    let phone = match payload.phone.as_deref().map(normalize_phone) {
        Some(phone) if !validate_phone(&phone) => {
            return Err(AppError::InvalidFields(vec![FieldError::new(
                "phone",
                "Telefone inválido. Use DDD + número, ex: 11987654321",
            )]))
        }
        phone => phone,
    };

    let update = UpdateProfileRequest {
        full_name: sanitize_optional(payload.full_name.as_deref()),
        phone,
        pix_key: sanitize_optional(payload.pix_key.as_deref()),
        bank_name: sanitize_optional(payload.bank_name.as_deref()),
        bank_agency: sanitize_optional(payload.bank_agency.as_deref()),
        bank_account: sanitize_optional(payload.bank_account.as_deref()),
        bank_account_type: sanitize_optional(payload.bank_account_type.as_deref()),
    };

    let profile = state.store.upsert_profile(auth_user.user_id, &update).await?;

    Ok(Json(profile))
}
