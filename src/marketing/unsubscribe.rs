use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Html,
};
use chrono::Utc;
use diesel::prelude::*;
use log::{error, info};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::marketing::token::{UnsubscribeTokenCodec, TEST_SUBJECT};
use crate::shared::schema::contacts;
use crate::shared::state::AppState;

const HTML_SUCCESS: &str = r#"<!DOCTYPE html>
<html lang="de">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>Abgemeldet – Beck360</title>
  <style>
    * { margin: 0; padding: 0; box-sizing: border-box; }
    body { font-family: Inter, system-ui, sans-serif; background: #f8fafc; color: #334155; display: flex; align-items: center; justify-content: center; min-height: 100vh; padding: 1rem; }
    .card { background: #fff; border-radius: 12px; box-shadow: 0 1px 3px rgba(0,0,0,0.1); padding: 2.5rem; max-width: 480px; text-align: center; }
    h1 { font-size: 1.25rem; margin-bottom: 0.75rem; }
    p { color: #64748b; line-height: 1.6; }
    .icon { font-size: 2.5rem; margin-bottom: 1rem; }
  </style>
</head>
<body>
  <div class="card">
    <div class="icon">✅</div>
    <h1>Erfolgreich abgemeldet</h1>
    <p>Sie erhalten keine weiteren E-Mails von Beck360. Falls dies ein Versehen war, kontaktieren Sie uns unter <a href="mailto:rundgang@beck360.de">rundgang@beck360.de</a>.</p>
  </div>
</body>
</html>"#;

const HTML_ERROR: &str = r#"<!DOCTYPE html>
<html lang="de">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>Fehler – Beck360</title>
  <style>
    * { margin: 0; padding: 0; box-sizing: border-box; }
    body { font-family: Inter, system-ui, sans-serif; background: #f8fafc; color: #334155; display: flex; align-items: center; justify-content: center; min-height: 100vh; padding: 1rem; }
    .card { background: #fff; border-radius: 12px; box-shadow: 0 1px 3px rgba(0,0,0,0.1); padding: 2.5rem; max-width: 480px; text-align: center; }
    h1 { font-size: 1.25rem; margin-bottom: 0.75rem; }
    p { color: #64748b; line-height: 1.6; }
    .icon { font-size: 2.5rem; margin-bottom: 1rem; }
  </style>
</head>
<body>
  <div class="card">
    <div class="icon">⚠️</div>
    <h1>Ungueltiger Link</h1>
    <p>Der Abmelde-Link ist ungueltig oder abgelaufen. Kontaktieren Sie uns unter <a href="mailto:rundgang@beck360.de">rundgang@beck360.de</a> um sich abzumelden.</p>
  </div>
</body>
</html>"#;

#[derive(Debug, Deserialize)]
pub struct UnsubscribeQuery {
    pub token: Option<String>,
}

/// `GET /unsubscribe?token=...`: one-click opt-out landing page. The
/// response is a small self-contained German HTML page since this URL is
/// opened directly from a mail client.
pub async fn unsubscribe(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UnsubscribeQuery>,
) -> (StatusCode, Html<&'static str>) {
    let codec = UnsubscribeTokenCodec::new(state.config.unsubscribe.secret.clone());
    let claims = match query.token.as_deref().map(|t| codec.verify(t)) {
        Some(Ok(claims)) => claims,
        _ => return (StatusCode::BAD_REQUEST, Html(HTML_ERROR)),
    };

    // Test sends mint a sentinel subject; show the page without touching
    // any real contact.
    if claims.sub == TEST_SUBJECT {
        return (StatusCode::OK, Html(HTML_SUCCESS));
    }

    let Ok(contact_id) = Uuid::parse_str(&claims.sub) else {
        return (StatusCode::BAD_REQUEST, Html(HTML_ERROR));
    };

    match revoke_consent(&state, contact_id) {
        Ok(()) => {
            info!("Contact {contact_id} unsubscribed");
            (StatusCode::OK, Html(HTML_SUCCESS))
        }
        Err(e) => {
            error!("Unsubscribe failed for contact {contact_id}: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, Html(HTML_ERROR))
        }
    }
}

fn revoke_consent(state: &AppState, contact_id: Uuid) -> Result<(), String> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| format!("DB connection error: {e}"))?;

    let now = Utc::now();
    diesel::update(contacts::table.filter(contacts::id.eq(contact_id)))
        .set((
            contacts::gdpr_consent.eq(false),
            contacts::gdpr_consent_date.eq(Some(now)),
            contacts::updated_at.eq(now),
        ))
        .execute(&mut conn)
        .map_err(|e| format!("Consent update failed: {e}"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_are_german_and_self_contained() {
        assert!(HTML_SUCCESS.contains("Erfolgreich abgemeldet"));
        assert!(HTML_ERROR.contains("Ungueltiger Link"));
        assert!(HTML_SUCCESS.contains("rundgang@beck360.de"));
    }
}
