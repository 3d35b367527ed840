use anyhow::{Context, Result};
use std::env;
use uuid::Uuid;

/// Process-wide configuration, built once in `main` and injected into
/// `AppState`. Business logic never reads the environment directly.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub brevo: BrevoConfig,
    pub auth: AuthConfig,
    pub crm: CrmConfig,
    pub unsubscribe: UnsubscribeConfig,
    pub forms: FormsConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct BrevoConfig {
    /// Missing key degrades sends to a typed configuration error.
    pub api_key: Option<String>,
    pub sender_name: String,
    pub sender_email: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub base_url: Option<String>,
    pub service_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CrmConfig {
    /// Single-tenant owner for lead ingestion. Absent means the pipeline
    /// runs in archive-only mode.
    pub owner_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct UnsubscribeConfig {
    /// HMAC signing secret. Absent means outbound mails carry no
    /// unsubscribe link.
    pub secret: Option<String>,
    pub site_url: String,
}

#[derive(Debug, Clone)]
pub struct FormsConfig {
    pub allowed_origins: Vec<String>,
    /// Operational mailbox relay for raw submissions; best-effort.
    pub relay_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database = DatabaseConfig {
            url: env::var("DATABASE_URL").context("DATABASE_URL not set")?,
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
        };

        let server = ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("SERVER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
        };

        let brevo = BrevoConfig {
            api_key: env::var("BREVO_API_KEY").ok().filter(|v| !v.is_empty()),
            sender_name: env::var("BREVO_SENDER_NAME")
                .unwrap_or_else(|_| "Eugen Beck - Beck360".to_string()),
            sender_email: env::var("BREVO_SENDER_EMAIL")
                .unwrap_or_else(|_| "rundgang@beck360.de".to_string()),
            base_url: env::var("BREVO_BASE_URL")
                .unwrap_or_else(|_| "https://api.brevo.com/v3".to_string()),
        };

        let auth = AuthConfig {
            base_url: env::var("AUTH_BASE_URL").ok().filter(|v| !v.is_empty()),
            service_key: env::var("AUTH_SERVICE_KEY").ok().filter(|v| !v.is_empty()),
        };

        let crm = CrmConfig {
            owner_id: env::var("CRM_OWNER_ID")
                .ok()
                .and_then(|v| Uuid::parse_str(&v).ok()),
        };

        let unsubscribe = UnsubscribeConfig {
            secret: env::var("UNSUBSCRIBE_SECRET").ok().filter(|v| !v.is_empty()),
            site_url: env::var("SITE_URL")
                .unwrap_or_else(|_| "https://360-rundgang-karlsruhe.de".to_string()),
        };

        let forms = FormsConfig {
            allowed_origins: env::var("FORM_ALLOWED_ORIGINS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            relay_url: env::var("FORM_RELAY_URL").ok().filter(|v| !v.is_empty()),
        };

        Ok(AppConfig {
            server,
            database,
            brevo,
            auth,
            crm,
            unsubscribe,
            forms,
        })
    }
}
