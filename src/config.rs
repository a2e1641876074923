use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    /// Key presented by the external scheduler when triggering the sweep.
    pub service_role_key: Option<String>,
    /// Shared secret expected in `x-webhook-secret` on payment callbacks.
    pub webhook_secret: Option<String>,
    pub evolution_api_url: Option<String>,
    pub evolution_api_key: Option<String>,
    pub evolution_instance_id: Option<String>,
    pub whatsapp_country_code: String,
    /// Six-field cron expression for the in-process sweep; disabled when unset.
    pub sweep_cron: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            database_url: env::var("DATABASE_URL")?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            jwt_secret: env::var("JWT_SECRET")?,
            service_role_key: non_empty_var("SERVICE_ROLE_KEY"),
            webhook_secret: non_empty_var("WEBHOOK_SECRET"),
            evolution_api_url: non_empty_var("EVOLUTION_API_URL"),
            evolution_api_key: non_empty_var("EVOLUTION_API_KEY"),
            evolution_instance_id: non_empty_var("EVOLUTION_INSTANCE_ID"),
            whatsapp_country_code: env::var("WHATSAPP_COUNTRY_CODE")
                .unwrap_or_else(|_| "55".to_string()),
            sweep_cron: non_empty_var("SWEEP_CRON"),
        })
    }

    /// Credentials for the WhatsApp provider, present only when all three are set.
    pub fn evolution_credentials(&self) -> Option<(&str, &str, &str)> {
        match (
            self.evolution_api_url.as_deref(),
            self.evolution_api_key.as_deref(),
            self.evolution_instance_id.as_deref(),
        ) {
            (Some(url), Some(key), Some(instance)) => Some((url, key, instance)),
            _ => None,
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
