pub mod auth;

pub use auth::{state_middleware, AppState, AuthUser, ServiceCaller, WEBHOOK_SECRET_HEADER};
