use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub sendgrid_api_key: String,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Postgres connection string; the in-memory store is used when unset.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub host: String,
    pub port: u16,
    pub jwt: JwtConfig,
    pub mail: MailConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> anyhow::Result<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("{key} must be set"))
        };
        let or_default =
            |key: &str, default: &str| -> String { lookup(key).unwrap_or_else(|| default.to_string()) };

        let jwt = JwtConfig {
            secret: required("JWT_SECRET")?,
            issuer: or_default("JWT_ISSUER", "taskmanagr"),
            audience: or_default("JWT_AUDIENCE", "taskmanagr-users"),
            ttl_minutes: or_default("JWT_TTL_MINUTES", "10080")
                .parse::<i64>()
                .context("JWT_TTL_MINUTES must be an integer")?,
        };
        let mail = MailConfig {
            sendgrid_api_key: required("SENDGRID_API_KEY")?,
            from: or_default("MAIL_FROM", "no-reply@taskmanagr.app"),
        };

        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|v| !v.is_empty()),
            max_connections: or_default("DATABASE_MAX_CONNECTIONS", "10")
                .parse::<u32>()
                .context("DATABASE_MAX_CONNECTIONS must be an integer")?,
            host: or_default("APP_HOST", "0.0.0.0"),
            port: or_default("APP_PORT", "8080")
                .parse::<u16>()
                .context("APP_PORT must be a port number")?,
            jwt,
            mail,
        })
    }
}
