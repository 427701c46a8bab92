// Board server configuration.
//
// Centralizes environment variable parsing with defaults for local
// development. Individual modules (DB pool, embeddings, etc.) may still
// read their own env vars — this module covers the core server settings.

use std::net::SocketAddr;

const DEV_ACCESS_SECRET: &str = "corkboard_local_development_access_secret_32_chars";
const DEV_REFRESH_SECRET: &str = "corkboard_local_development_refresh_secret_32_chars";
const DEV_PASSWORD_PEPPER: &str = "corkboard_local_development_pepper";

/// Core board server configuration.
///
/// Constructed via [`ServerConfig::from_env`] which reads environment
/// variables and falls back to sensible development defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address (host:port).
    pub listen_addr: SocketAddr,
    /// JWT signing secret for short-lived access tokens.
    pub access_token_secret: String,
    /// JWT signing secret for refresh tokens (must differ from access).
    pub refresh_token_secret: String,
    /// Server-side pepper appended to passwords before hashing.
    pub password_pepper: String,
    /// Access token lifetime in minutes.
    pub access_ttl_minutes: i64,
    /// Refresh token lifetime in days.
    pub refresh_ttl_days: i64,
    /// PostgreSQL connection string.
    pub database_url: Option<String>,
    /// Cohere API key for note embeddings (semantic search).
    pub cohere_api_key: Option<String>,
    /// Comma-separated CORS origins (or `"*"` for any).
    pub cors_origins: Option<String>,
    /// Log filter directive (e.g. `info`, `corkboard_server=debug`).
    pub log_filter: String,
}

impl ServerConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `CORKBOARD_HOST` | `0.0.0.0` |
    /// | `CORKBOARD_PORT` | `8080` |
    /// | `CORKBOARD_ACCESS_TOKEN_SECRET` | dev-only placeholder |
    /// | `CORKBOARD_REFRESH_TOKEN_SECRET` | dev-only placeholder |
    /// | `CORKBOARD_PASSWORD_PEPPER` | dev-only placeholder |
    /// | `CORKBOARD_ACCESS_TTL_MINUTES` | `60` |
    /// | `CORKBOARD_REFRESH_TTL_DAYS` | `7` |
    /// | `CORKBOARD_DATABASE_URL` | *(none — in-memory store)* |
    /// | `CORKBOARD_COHERE_API_KEY` | *(none — search disabled)* |
    /// | `CORKBOARD_CORS_ORIGINS` | *(none — dev defaults)* |
    /// | `CORKBOARD_LOG_FILTER` | `info` |
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Testable constructor that accepts an environment lookup function.
    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let host = env("CORKBOARD_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env("CORKBOARD_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));

        let access_token_secret =
            env("CORKBOARD_ACCESS_TOKEN_SECRET").unwrap_or_else(|_| DEV_ACCESS_SECRET.into());
        let refresh_token_secret =
            env("CORKBOARD_REFRESH_TOKEN_SECRET").unwrap_or_else(|_| DEV_REFRESH_SECRET.into());
        let password_pepper =
            env("CORKBOARD_PASSWORD_PEPPER").unwrap_or_else(|_| DEV_PASSWORD_PEPPER.into());

        let access_ttl_minutes = env("CORKBOARD_ACCESS_TTL_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);
        let refresh_ttl_days = env("CORKBOARD_REFRESH_TTL_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(7);

        let database_url = env("CORKBOARD_DATABASE_URL").ok();
        let cohere_api_key = env("CORKBOARD_COHERE_API_KEY").ok();
        let cors_origins = env("CORKBOARD_CORS_ORIGINS").ok();

        let log_filter = env("CORKBOARD_LOG_FILTER").unwrap_or_else(|_| "info".into());

        Self {
            listen_addr,
            access_token_secret,
            refresh_token_secret,
            password_pepper,
            access_ttl_minutes,
            refresh_ttl_days,
            database_url,
            cohere_api_key,
            cors_origins,
            log_filter,
        }
    }

    /// Returns true when any of the development-only secrets is in use.
    pub fn has_dev_secrets(&self) -> bool {
        self.access_token_secret == DEV_ACCESS_SECRET
            || self.refresh_token_secret == DEV_REFRESH_SECRET
            || self.password_pepper == DEV_PASSWORD_PEPPER
    }
}
