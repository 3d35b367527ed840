use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::config::BrevoConfig;

/// One outbound transactional message.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub to_email: String,
    pub to_name: String,
    pub subject: String,
    pub html_content: String,
    pub tags: Vec<String>,
}

/// Transport failures. Configuration errors and provider failures are
/// distinct because the caller's retry/record policy differs for each.
#[derive(Debug, thiserror::Error)]
pub enum BrevoError {
    #[error("BREVO_API_KEY not configured")]
    NotConfigured,
    #[error("Brevo API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Brevo request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(rename = "messageId")]
    message_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: Option<String>,
}

/// Thin wrapper over the Brevo transactional email API.
#[derive(Clone)]
pub struct BrevoClient {
    http: reqwest::Client,
    config: BrevoConfig,
}

impl BrevoClient {
    pub fn new(config: BrevoConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Send one message to one recipient; returns the provider's message id
    /// used later to correlate delivery webhook events.
    pub async fn send_email(&self, email: &OutboundEmail) -> Result<String, BrevoError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(BrevoError::NotConfigured)?;

        let body = serde_json::json!({
            "sender": {
                "name": self.config.sender_name,
                "email": self.config.sender_email,
            },
            "to": [{
                "email": email.to_email,
                "name": if email.to_name.is_empty() { &email.to_email } else { &email.to_name },
            }],
            "subject": email.subject,
            "htmlContent": email.html_content,
            "tags": email.tags,
        });

        let response = self
            .http
            .post(format!("{}/smtp/email", self.config.base_url))
            .header("api-key", api_key)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorResponse>()
                .await
                .ok()
                .and_then(|e| e.message)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());
            return Err(BrevoError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: SendResponse = response.json().await?;
        Ok(parsed.message_id.unwrap_or_default())
    }
}

static VORNAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\{\{vorname\}\}").expect("regex"));
static NACHNAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\{\{nachname\}\}").expect("regex"));
static FIRMA: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\{\{firma\}\}").expect("regex"));
static EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\{\{email\}\}").expect("regex"));

/// Recipient values substituted into a campaign template.
#[derive(Debug, Clone, Default)]
pub struct PersonalizeValues {
    pub first_name: String,
    pub last_name: String,
    pub company_name: String,
    pub email: String,
}

/// Substitute `{{vorname}}`, `{{nachname}}`, `{{firma}}` and `{{email}}`
/// placeholders (case-insensitive); unknown values become empty strings
/// rather than literal placeholders.
pub fn personalize(html: &str, values: &PersonalizeValues) -> String {
    let html = VORNAME.replace_all(html, values.first_name.as_str());
    let html = NACHNAME.replace_all(&html, values.last_name.as_str());
    let html = FIRMA.replace_all(&html, values.company_name.as_str());
    EMAIL.replace_all(&html, values.email.as_str()).into_owned()
}
