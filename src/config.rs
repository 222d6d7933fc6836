use dotenvy::dotenv;
use std::env;
use std::time::Duration;

/// Browser push relay settings. The relay is optional; when no URL is
/// configured the browser-push channel is skipped silently.
#[derive(Debug, Clone)]
pub struct PushRelayConfig {
    pub url: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_leeway_seconds: u64,
    /// Optional; when unset the service runs with the in-memory
    /// notification store (no durability across restarts).
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub heartbeat_interval_seconds: u64,
    pub client_timeout_seconds: u64,
    pub credential_recheck_seconds: u64,
    pub push_relay: PushRelayConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, crate::error::AppError> {
        dotenv().ok();
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8080);
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| crate::error::AppError::Config("JWT_SECRET missing".into()))?;
        let jwt_leeway_seconds = env::var("JWT_LEEWAY_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);
        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());
        let db_max_connections = env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(20);
        let heartbeat_interval_seconds = env::var("WS_HEARTBEAT_INTERVAL_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);
        let client_timeout_seconds = env::var("WS_CLIENT_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);
        let credential_recheck_seconds = env::var("CREDENTIAL_RECHECK_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);

        let push_relay = PushRelayConfig {
            url: env::var("PUSH_RELAY_URL").ok().filter(|s| !s.is_empty()),
            token: env::var("PUSH_RELAY_TOKEN").ok(),
        };

        Ok(Self {
            port,
            jwt_secret,
            jwt_leeway_seconds,
            database_url,
            db_max_connections,
            heartbeat_interval_seconds,
            client_timeout_seconds,
            credential_recheck_seconds,
            push_relay,
        })
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_seconds)
    }

    pub fn credential_recheck_interval(&self) -> Duration {
        Duration::from_secs(self.credential_recheck_seconds)
    }
}
