use serde::Deserialize;
use uuid::Uuid;

use crate::config::AuthConfig;

/// The authenticated caller, as reported by the hosted auth provider.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("auth provider not configured (AUTH_BASE_URL / AUTH_SERVICE_KEY)")]
    NotConfigured,
    #[error("invalid or expired session token")]
    Invalid,
    #[error("auth provider request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Validates Bearer session tokens against the auth provider's user
/// endpoint. Configuration problems are a distinct error so internal
/// callers get an actionable message instead of a generic 500.
#[derive(Clone)]
pub struct AuthClient {
    http: reqwest::Client,
    config: AuthConfig,
}

impl AuthClient {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub async fn get_user(&self, token: &str) -> Result<AuthUser, AuthError> {
        let (base_url, service_key) = match (&self.config.base_url, &self.config.service_key) {
            (Some(url), Some(key)) => (url, key),
            _ => return Err(AuthError::NotConfigured),
        };

        let response = self
            .http
            .get(format!("{base_url}/auth/v1/user"))
            .header("apikey", service_key)
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::Invalid);
        }

        response.json::<AuthUser>().await.map_err(|_| AuthError::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: Option<String>) -> AuthConfig {
        AuthConfig {
            base_url,
            service_key: Some("service-key".to_string()),
        }
    }

    #[tokio::test]
    async fn valid_token_yields_user_id() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/auth/v1/user")
            .match_header("authorization", "Bearer session-token")
            .match_header("apikey", "service-key")
            .with_status(200)
            .with_body(r#"{"id":"0a043b3f-0000-0000-0000-0000000000aa","email":"x@y.de"}"#)
            .create_async()
            .await;

        let client = AuthClient::new(config(Some(server.url())));
        let user = client.get_user("session-token").await.unwrap();
        assert_eq!(
            user.id,
            Uuid::parse_str("0a043b3f-0000-0000-0000-0000000000aa").unwrap()
        );
    }

    #[tokio::test]
    async fn rejected_token_is_invalid() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/auth/v1/user")
            .with_status(401)
            .with_body(r#"{"message":"JWT expired"}"#)
            .create_async()
            .await;

        let client = AuthClient::new(config(Some(server.url())));
        assert!(matches!(
            client.get_user("stale").await.unwrap_err(),
            AuthError::Invalid
        ));
    }

    #[tokio::test]
    async fn missing_configuration_is_distinct() {
        let client = AuthClient::new(config(None));
        assert!(matches!(
            client.get_user("whatever").await.unwrap_err(),
            AuthError::NotConfigured
        ));
    }
}
