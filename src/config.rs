//! Application configuration loaded from environment variables.
//!
//! Secrets are read once at startup and cached in memory. In production
//! they are injected as environment variables by the deployment.

use std::env;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Jobber OAuth client ID (public)
    pub jobber_client_id: String,
    /// Frontend URL for the dashboard (CORS allow-list)
    pub frontend_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    /// From-address used for lookup emails
    pub mailer_address: String,

    // --- Secrets ---
    /// Jobber OAuth client secret
    pub jobber_client_secret: String,
    /// Resend API key for outbound email
    pub resend_api_key: String,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// For local development, secrets can be set via a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            jobber_client_id: env::var("JOBBER_CLIENT_ID")
                .map_err(|_| ConfigError::Missing("JOBBER_CLIENT_ID"))?,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            mailer_address: env::var("MAILER_ADDRESS")
                .map_err(|_| ConfigError::Missing("MAILER_ADDRESS"))?,

            jobber_client_secret: env::var("JOBBER_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("JOBBER_CLIENT_SECRET"))?,
            resend_api_key: env::var("RESEND_API_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("RESEND_API_KEY"))?,
            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
        })
    }

    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            jobber_client_id: "test_client_id".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            mailer_address: "mailer@example.com".to_string(),
            jobber_client_secret: "test_secret".to_string(),
            resend_api_key: "re_test_key".to_string(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
