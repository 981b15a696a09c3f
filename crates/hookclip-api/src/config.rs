//! API configuration.

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Max request body size
    pub max_body_size: usize,
    /// Default `timeout_minutes` for the stuck-job sweep
    pub stuck_timeout_minutes: i64,
    /// Run the job executor and sweeper in this process
    pub embedded_worker: bool,
    /// Environment (development/production)
    pub environment: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            cors_origins: vec!["*".to_string()],
            max_body_size: 1024 * 1024, // 1MB
            stuck_timeout_minutes: 30,
            embedded_worker: true,
            environment: "development".to_string(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            max_body_size: std::env::var("MAX_BODY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_body_size),
            stuck_timeout_minutes: std::env::var("STUCK_JOB_TIMEOUT_MINUTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.stuck_timeout_minutes),
            embedded_worker: std::env::var("EMBEDDED_WORKER")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(defaults.embedded_worker),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}
