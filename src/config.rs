//! Runtime configuration, read from the environment at startup.

/// Configuration for one broker process. All fields have sane defaults so the
/// binary runs out of the box; production deployments override via env vars.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// `SenderCompID` this broker identifies itself as on the FIX session (§6).
    pub broker_id: String,
    /// Address the FIX acceptor binds and listens on.
    pub fix_bind_addr: String,
    /// Address the administrative HTTP/JSON API binds and listens on.
    pub admin_bind_addr: String,
    /// `sqlx` connection string for the order store / symbol registry.
    pub database_url: String,
    /// `HeartBtInt` offered at Logon, in seconds.
    pub heartbeat_interval_secs: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            broker_id: "BROKER".to_string(),
            fix_bind_addr: "0.0.0.0:5001".to_string(),
            admin_bind_addr: "0.0.0.0:8080".to_string(),
            database_url: "sqlite://broker.db?mode=rwc".to_string(),
            heartbeat_interval_secs: 30,
        }
    }
}

impl AppConfig {
    /// Loads configuration from the environment, falling back to defaults for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            broker_id: std::env::var("BROKER_ID").unwrap_or(defaults.broker_id),
            fix_bind_addr: std::env::var("FIX_BIND_ADDR").unwrap_or(defaults.fix_bind_addr),
            admin_bind_addr: std::env::var("ADMIN_BIND_ADDR").unwrap_or(defaults.admin_bind_addr),
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            heartbeat_interval_secs: std::env::var("HEARTBEAT_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.heartbeat_interval_secs),
        }
    }
}
