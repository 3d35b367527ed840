use log::{error, info};
use std::collections::HashMap;

/// Forwards raw submissions to the operational mailbox relay. Strictly
/// best-effort: a failure is logged and never surfaced to the submitter or
/// allowed to block CRM processing.
pub struct FormRelay {
    http: reqwest::Client,
    relay_url: Option<String>,
}

impl FormRelay {
    pub fn new(relay_url: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            relay_url,
        }
    }

    pub async fn forward(&self, data: &HashMap<String, String>) {
        let Some(url) = &self.relay_url else {
            info!("FORM_RELAY_URL not configured, skipping notification forward");
            return;
        };

        let payload = relay_payload(data);
        match self.http.post(url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!("Forwarded submission notification to relay");
            }
            Ok(resp) => {
                error!("Relay forward returned HTTP {}", resp.status());
            }
            Err(e) => {
                error!("Relay forward error: {e}");
            }
        }
    }
}

/// Anti-spam metadata fields (underscore-prefixed) stay internal; the
/// subject is the one meta field the mailbox should see.
pub fn relay_payload(data: &HashMap<String, String>) -> HashMap<String, String> {
    data.iter()
        .filter(|(k, _)| !k.starts_with('_') || k.as_str() == "_subject")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_fields_are_stripped_except_subject() {
        let data: HashMap<String, String> = [
            ("name", "Max"),
            ("_honey", ""),
            ("_timestamp", "123"),
            ("_subject", "Anfrage"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let payload = relay_payload(&data);
        assert_eq!(payload.len(), 2);
        assert_eq!(payload.get("name").map(String::as_str), Some("Max"));
        assert_eq!(payload.get("_subject").map(String::as_str), Some("Anfrage"));
        assert!(!payload.contains_key("_honey"));
        assert!(!payload.contains_key("_timestamp"));
    }
}
