use axum::{extract::State, routing::post, Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::AppResult;
use crate::middleware::{AppState, ServiceCaller};
use crate::services::SweepReport;

pub fn routes() -> Router<AppState> {
    Router::new().route("/check-overdue-charges", post(check_overdue_charges))
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SweepResponse {
    pub success: bool,
    pub overdue_updated: u32,
    pub reminders_sent: u32,
    pub overdue_alerts: u32,
    pub notifications_failed: u32,
    pub promotion_errors: u32,
}

impl From<SweepReport> for SweepResponse {
    fn from(report: SweepReport) -> Self {
        Self {
            success: true,
            overdue_updated: report.overdue_updated,
            reminders_sent: report.reminders_sent,
            overdue_alerts: report.overdue_alerts,
            notifications_failed: report.notifications_failed,
            promotion_errors: report.promotion_errors,
        }
    }
}

/// Entry point for the external scheduler.
#[utoipa::path(
    post,
    path = "/api/v1/jobs/check-overdue-charges",
    tag = "jobs",
    responses(
        (status = 200, description = "Varredura concluída", body = SweepResponse),
        (status = 401, description = "Chave de serviço inválida")
    ),
    security(("service_key" = []))
)]
pub async fn check_overdue_charges(
    State(state): State<AppState>,
    _caller: ServiceCaller,
) -> AppResult<Json<SweepResponse>> {
    let report = state.sweep().run(Utc::now()).await?;
    Ok(Json(report.into()))
}
