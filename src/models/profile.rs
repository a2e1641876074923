use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Service provider's own data: display name and where clients should pay.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Profile {
    pub id: Uuid,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub pix_key: Option<String>,
    pub bank_name: Option<String>,
    pub bank_agency: Option<String>,
    pub bank_account: Option<String>,
    pub bank_account_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn pix_key(&self) -> Option<&str> {
        self.pix_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 2, max = 100, message = "Nome deve ter entre 2 e 100 caracteres"))]
    pub full_name: Option<String>,
    pub phone: Option<String>,
    #[validate(length(max = 140, message = "Chave PIX muito longa"))]
    pub pix_key: Option<String>,
    #[validate(length(max = 100))]
    pub bank_name: Option<String>,
    #[validate(length(max = 20))]
    pub bank_agency: Option<String>,
    #[validate(length(max = 30))]
    pub bank_account: Option<String>,
    #[validate(length(max = 20))]
    pub bank_account_type: Option<String>,
}
