use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use crate::error::{AppError, AppResult};
use crate::middleware::{AppState, AuthUser};
use crate::models::{
    Notification, NotificationType, NotificationsQuery, SendNotificationRequest,
    SendNotificationResponse,
};
use crate::store::{NotificationFilter, Page};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/send", post(send_notification))
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications",
    tag = "notifications",
    params(NotificationsQuery),
    responses((status = 200, description = "Histórico de notificações", body = Vec<Notification>)),
    security(("bearer_auth" = []))
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<NotificationsQuery>,
) -> AppResult<Json<Vec<Notification>>> {
    let filter = NotificationFilter {
        charge_id: query.charge_id,
        client_id: query.client_id,
    };

    let notifications = state
        .store
        .list_user_notifications(auth_user.user_id, filter, Page::new(query.page, query.limit))
        .await?;

    Ok(Json(notifications))
}

/// Manual send from the dashboard. Only `reception` and `overdue` can be
/// triggered by hand; the others belong to the sweep and the payment flow.
#[utoipa::path(
    post,
    path = "/api/v1/notifications/send",
    tag = "notifications",
    request_body = SendNotificationRequest,
    responses(
        (status = 200, description = "Tentativa registrada", body = SendNotificationResponse),
        (status = 404, description = "Cobrança não encontrada"),
        (status = 422, description = "Tipo de notificação não permitido")
    ),
    security(("bearer_auth" = []))
)]
pub async fn send_notification(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<SendNotificationRequest>,
) -> AppResult<Json<SendNotificationResponse>> {
    if !matches!(
        payload.notification_type,
        NotificationType::Reception | NotificationType::Overdue
    ) {
        return Err(AppError::Validation(format!(
            "tipo de notificação não pode ser enviado manualmente: {}",
            payload.notification_type
        )));
    }

    let charges = state.charges();
    let charge = charges
        .find_owned(auth_user.user_id, payload.charge_id)
        .await?;
    if charge.status.is_terminal() {
        return Err(AppError::BadRequest(
            "Cobrança cancelada não recebe notificações".to_string(),
        ));
    }

    let outcome = charges
        .dispatcher()
        .notify_charge(payload.notification_type, &charge, Utc::now())
        .await?;

    // The attempt was recorded; `status` tells whether the message went out.
    Ok(Json(SendNotificationResponse {
        success: true,
        status: outcome.status,
        notification_id: outcome.notification.map(|n| n.id),
    }))
}
