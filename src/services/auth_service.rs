use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};

/// Bearer token claims. Tokens come from the identity provider that fronts
/// the dashboard; `sub` is the provider's user id.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub role: Option<String>,
}

pub struct AuthService<'a> {
    config: &'a Config,
}

impl<'a> AuthService<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Signs an HS256 access token for `user_id`.
    pub fn issue_token(&self, user_id: Uuid, ttl: Duration) -> AppResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            exp: (now + ttl).timestamp(),
            iat: Some(now.timestamp()),
            role: Some("authenticated".to_string()),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(AppError::from)
    }

    pub fn verify_token(&self, token: &str) -> AppResult<Claims> {
        let mut validation = Validation::default();
        // Provider tokens carry an audience we do not pin.
        validation.validate_aud = false;

        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )?;

        Ok(token_data.claims)
    }

    /// User id carried by a valid token.
    pub fn authenticate(&self, token: &str) -> AppResult<Uuid> {
        let claims = self.verify_token(token)?;
        Uuid::parse_str(&claims.sub).map_err(|_| AppError::Unauthorized)
    }

    /// The scheduler's key. Fails closed when no key is configured.
    pub fn is_service_key(&self, token: &str) -> bool {
        matches!(self.config.service_role_key.as_deref(), Some(key) if key == token)
    }

    /// Checks `x-webhook-secret` when a secret is configured.
    pub fn verify_webhook_secret(&self, presented: Option<&str>) -> AppResult<()> {
        match self.config.webhook_secret.as_deref() {
            None => Ok(()),
            Some(secret) if presented == Some(secret) => Ok(()),
            Some(_) => Err(AppError::Unauthorized),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            database_url: "postgres://localhost/pingpague".to_string(),
            database_max_connections: 5,
            jwt_secret: "test-secret".to_string(),
            service_role_key: Some("service-key".to_string()),
            webhook_secret: Some("hook".to_string()),
            evolution_api_url: None,
            evolution_api_key: None,
            evolution_instance_id: None,
            whatsapp_country_code: "55".to_string(),
            sweep_cron: None,
        }
    }

    #[test]
    fn test_token_roundtrip_yields_user_id() {
        let config = config();
        let auth = AuthService::new(&config);
        let user_id = Uuid::new_v4();

        let token = auth.issue_token(user_id, Duration::minutes(5)).unwrap();
        assert_eq!(auth.authenticate(&token).unwrap(), user_id);
    }

    #[test]
    fn test_expired_or_foreign_tokens_are_rejected() {
        let config = config();
        let auth = AuthService::new(&config);

        let expired = auth
            .issue_token(Uuid::new_v4(), Duration::minutes(-10))
            .unwrap();
        assert!(matches!(auth.authenticate(&expired), Err(AppError::Jwt(_))));

        let mut other = config.clone();
        other.jwt_secret = "other-secret".to_string();
        let foreign = AuthService::new(&other)
            .issue_token(Uuid::new_v4(), Duration::minutes(5))
            .unwrap();
        assert!(auth.authenticate(&foreign).is_err());
    }

    #[test]
    fn test_service_key_and_webhook_secret() {
        let mut config = config();
        {
            let auth = AuthService::new(&config);
            assert!(auth.is_service_key("service-key"));
            assert!(!auth.is_service_key("nope"));
            assert!(auth.verify_webhook_secret(Some("hook")).is_ok());
            assert!(matches!(
                auth.verify_webhook_secret(None),
                Err(AppError::Unauthorized)
            ));
        }

        config.service_role_key = None;
        config.webhook_secret = None;
        let auth = AuthService::new(&config);
        assert!(!auth.is_service_key(""));
        assert!(auth.verify_webhook_secret(None).is_ok());
    }
}
