use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, request::Parts, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppError;
use crate::services::{
    AuthService, ChargeService, MessagingTransport, SweepService, WebhookService,
};
use crate::store::BillingStore;

pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BillingStore>,
    pub transport: Arc<dyn MessagingTransport>,
    pub config: Config,
}

impl AppState {
    pub fn new(
        store: Arc<dyn BillingStore>,
        transport: Arc<dyn MessagingTransport>,
        config: Config,
    ) -> Self {
        Self {
            store,
            transport,
            config,
        }
    }

    pub fn charges(&self) -> ChargeService {
        ChargeService::new(self.store.clone(), self.transport.clone())
    }

    pub fn sweep(&self) -> SweepService {
        SweepService::new(self.store.clone(), self.transport.clone())
    }

    pub fn webhooks(&self) -> WebhookService {
        WebhookService::new(self.store.clone(), self.transport.clone())
    }
}

/// Dashboard user behind a valid bearer token.
#[derive(Clone, Copy, Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
}

/// Privileged caller (the scheduler) presenting the service key.
#[derive(Clone, Copy, Debug)]
pub struct ServiceCaller;

// Puts AppState into request extensions for the extractors below
pub async fn state_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    request.extensions_mut().insert(state);
    next.run(request).await
}

fn app_state(parts: &Parts) -> Result<AppState, AppError> {
    parts
        .extensions
        .get::<AppState>()
        .cloned()
        .ok_or_else(|| AppError::Internal("AppState missing from request extensions".to_string()))
}

fn bearer_token(parts: &Parts) -> Result<&str, AppError> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AppError::Unauthorized)
}

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let state = app_state(parts)?;
        let token = bearer_token(parts)?;

        let user_id = AuthService::new(&state.config)
            .authenticate(token)
            .map_err(|e| {
                tracing::debug!(error = %e, "Rejected bearer token");
                AppError::Unauthorized
            })?;

        Ok(AuthUser { user_id })
    }
}

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for ServiceCaller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let state = app_state(parts)?;
        let token = bearer_token(parts)?;

        if !AuthService::new(&state.config).is_service_key(token) {
            tracing::warn!("Service endpoint called without a valid service key");
            return Err(AppError::Unauthorized);
        }

        Ok(ServiceCaller)
    }
}
