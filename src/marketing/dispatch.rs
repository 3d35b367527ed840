use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use diesel::prelude::*;
use log::{error, info, warn};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::marketing::auth::AuthError;
use crate::marketing::brevo::{personalize, BrevoError, OutboundEmail, PersonalizeValues};
use crate::marketing::token::{UnsubscribeTokenCodec, TEST_SUBJECT};
use crate::shared::models::{
    activity_type, Activity, Campaign, CampaignRecipient, CampaignStatus, Company, Contact,
    RecipientStatus,
};
use crate::shared::schema::{activities, campaign_recipients, campaigns, companies, contacts};
use crate::shared::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CampaignSendRequest {
    pub campaign_id: Uuid,
    pub test_email: Option<String>,
}

pub enum DispatchError {
    Unauthorized(String),
    NotFound,
    AlreadySent,
    Config(String),
    Internal(String),
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            DispatchError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            DispatchError::NotFound => (StatusCode::NOT_FOUND, "Campaign not found".to_string()),
            DispatchError::AlreadySent => {
                (StatusCode::BAD_REQUEST, "Campaign already sent".to_string())
            }
            DispatchError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            DispatchError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Real sends are draft-only; the test-send path has no status precondition.
fn is_dispatchable(status: &str) -> bool {
    status == CampaignStatus::Draft.as_str()
}

/// Consent re-check at send time. The recipient list was consent-filtered
/// when the campaign was built, but consent can change before dispatch runs.
fn is_sendable(contact: &Contact) -> bool {
    contact.gdpr_consent && contact.deleted_at.is_none()
}

/// Terminal status for one send attempt. A failure maps to `bounced` so a
/// single bad address never aborts the batch.
fn delivery_status<E>(result: &Result<String, E>) -> RecipientStatus {
    if result.is_ok() {
        RecipientStatus::Sent
    } else {
        RecipientStatus::Bounced
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// `POST /campaign-send`: authenticated trigger for a test send or a real,
/// draft-only campaign dispatch.
pub async fn send_campaign(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CampaignSendRequest>,
) -> Result<Json<serde_json::Value>, DispatchError> {
    let token = bearer_token(&headers)
        .ok_or_else(|| DispatchError::Unauthorized("Unauthorized".to_string()))?;

    let user = state.auth.get_user(&token).await.map_err(|e| match e {
        AuthError::NotConfigured => DispatchError::Config(e.to_string()),
        _ => DispatchError::Unauthorized(format!("Auth failed: {e}")),
    })?;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| DispatchError::Config(format!("Database unavailable: {e}")))?;

    let campaign: Campaign = campaigns::table
        .filter(campaigns::id.eq(request.campaign_id))
        .filter(campaigns::owner_id.eq(user.id))
        .first(&mut conn)
        .optional()
        .map_err(|e| DispatchError::Internal(format!("Campaign lookup failed: {e}")))?
        .ok_or(DispatchError::NotFound)?;

    let codec = UnsubscribeTokenCodec::new(state.config.unsubscribe.secret.clone());

    if let Some(test_email) = request.test_email {
        send_test(&state, &codec, &campaign, &test_email).await?;
        return Ok(Json(
            serde_json::json!({ "success": true, "message": "Test-Mail gesendet" }),
        ));
    }

    let total_sent = send_real(&state, &mut conn, &codec, &campaign, user.id).await?;
    Ok(Json(
        serde_json::json!({ "success": true, "total_sent": total_sent }),
    ))
}

/// Test mode: synthetic placeholder values, the `test` sentinel token and a
/// `[TEST]` subject prefix. No campaign or recipient state is touched.
async fn send_test(
    state: &AppState,
    codec: &UnsubscribeTokenCodec,
    campaign: &Campaign,
    test_email: &str,
) -> Result<(), DispatchError> {
    let html = personalize(
        &campaign.body_html,
        &PersonalizeValues {
            first_name: "Test".to_string(),
            last_name: "Empfaenger".to_string(),
            company_name: "Testfirma".to_string(),
            email: test_email.to_string(),
        },
    );
    let html = append_unsubscribe_link(
        &html,
        codec.encode(TEST_SUBJECT).as_deref(),
        &state.config.unsubscribe.site_url,
    );

    state
        .brevo
        .send_email(&OutboundEmail {
            to_email: test_email.to_string(),
            to_name: "Test".to_string(),
            subject: format!("[TEST] {}", campaign.subject),
            html_content: html,
            tags: vec!["campaign-test".to_string()],
        })
        .await
        .map_err(|e| match e {
            BrevoError::NotConfigured => DispatchError::Config(e.to_string()),
            other => DispatchError::Internal(other.to_string()),
        })?;

    Ok(())
}

/// Real send. The campaign goes to `sending` before the loop as a visible
/// in-progress signal; a process crash mid-loop leaves it there, which is a
/// known operational gap of this design (no automatic resumption).
async fn send_real(
    state: &AppState,
    conn: &mut PgConnection,
    codec: &UnsubscribeTokenCodec,
    campaign: &Campaign,
    owner_id: Uuid,
) -> Result<i32, DispatchError> {
    if !is_dispatchable(&campaign.status) {
        return Err(DispatchError::AlreadySent);
    }

    diesel::update(campaigns::table.filter(campaigns::id.eq(campaign.id)))
        .set((
            campaigns::status.eq(CampaignStatus::Sending.as_str()),
            campaigns::updated_at.eq(Utc::now()),
        ))
        .execute(conn)
        .map_err(|e| DispatchError::Internal(format!("Status update failed: {e}")))?;

    let rows: Vec<(CampaignRecipient, Option<Contact>, Option<Company>)> =
        campaign_recipients::table
            .left_join(contacts::table.left_join(companies::table))
            .filter(campaign_recipients::campaign_id.eq(campaign.id))
            .filter(campaign_recipients::status.eq(RecipientStatus::Pending.as_str()))
            .select((
                campaign_recipients::all_columns,
                contacts::all_columns.nullable(),
                companies::all_columns.nullable(),
            ))
            .load(conn)
            .map_err(|e| DispatchError::Internal(format!("Recipient query failed: {e}")))?;

    info!(
        "Dispatching campaign {} to {} pending recipients",
        campaign.id,
        rows.len()
    );

    let mut sent_count = 0;
    for (recipient, contact, company) in rows {
        let Some(contact) = contact.filter(is_sendable) else {
            mark_recipient(conn, recipient.id, RecipientStatus::Unsubscribed);
            continue;
        };

        let html = personalize(
            &campaign.body_html,
            &PersonalizeValues {
                first_name: contact.first_name.clone().unwrap_or_default(),
                last_name: contact.last_name.clone().unwrap_or_default(),
                company_name: company.map(|c| c.name).unwrap_or_default(),
                email: contact.email.clone().unwrap_or_default(),
            },
        );
        let token = recipient
            .contact_id
            .and_then(|id| codec.encode(&id.to_string()));
        let html =
            append_unsubscribe_link(&html, token.as_deref(), &state.config.unsubscribe.site_url);

        let to_name = format!(
            "{} {}",
            contact.first_name.as_deref().unwrap_or(""),
            contact.last_name.as_deref().unwrap_or("")
        )
        .trim()
        .to_string();

        let result = state
            .brevo
            .send_email(&OutboundEmail {
                to_email: recipient.email.clone(),
                to_name,
                subject: campaign.subject.clone(),
                html_content: html,
                tags: vec![format!("campaign-{}", campaign.id)],
            })
            .await;

        let status = delivery_status(&result);
        match result {
            Ok(message_id) => {
                let now = Utc::now();
                if let Err(e) = diesel::update(
                    campaign_recipients::table.filter(campaign_recipients::id.eq(recipient.id)),
                )
                .set((
                    campaign_recipients::status.eq(status.as_str()),
                    campaign_recipients::brevo_message_id.eq(some_if_nonempty(&message_id)),
                    campaign_recipients::sent_at.eq(Some(now)),
                ))
                .execute(conn)
                {
                    error!("Recipient {} status update failed: {e}", recipient.id);
                }
                sent_count += 1;

                let activity = Activity {
                    id: Uuid::new_v4(),
                    owner_id,
                    contact_id: recipient.contact_id,
                    deal_id: None,
                    activity_type: activity_type::EMAIL.to_string(),
                    description: format!("Kampagne \"{}\" gesendet", campaign.name),
                    metadata: serde_json::json!({
                        "campaign_id": campaign.id,
                        "subject": campaign.subject,
                    }),
                    created_at: now,
                };
                if let Err(e) = diesel::insert_into(activities::table)
                    .values(&activity)
                    .execute(conn)
                {
                    error!("Activity logging failed for {}: {e}", recipient.email);
                }
            }
            Err(e) => {
                // One recipient failing must never abort the batch.
                warn!("Send to {} failed: {e}", recipient.email);
                mark_recipient(conn, recipient.id, status);
            }
        }
    }

    diesel::update(campaigns::table.filter(campaigns::id.eq(campaign.id)))
        .set((
            campaigns::status.eq(CampaignStatus::Sent.as_str()),
            campaigns::total_sent.eq(sent_count),
            campaigns::sent_at.eq(Some(Utc::now())),
            campaigns::updated_at.eq(Utc::now()),
        ))
        .execute(conn)
        .map_err(|e| DispatchError::Internal(format!("Campaign finalize failed: {e}")))?;

    Ok(sent_count)
}

fn mark_recipient(conn: &mut PgConnection, recipient_id: Uuid, status: RecipientStatus) {
    if let Err(e) = diesel::update(
        campaign_recipients::table.filter(campaign_recipients::id.eq(recipient_id)),
    )
    .set(campaign_recipients::status.eq(status.as_str()))
    .execute(conn)
    {
        error!("Recipient {recipient_id} status update failed: {e}");
    }
}

fn some_if_nonempty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Append a footer unsubscribe link, inside `</body>` when present. Without
/// a token (unconfigured secret) the mail goes out linkless.
pub fn append_unsubscribe_link(html: &str, token: Option<&str>, site_url: &str) -> String {
    let Some(token) = token else {
        return html.to_string();
    };
    let url = format!("{site_url}/unsubscribe?token={token}");
    let link = format!(
        "<p style=\"text-align:center;font-size:12px;color:#888;margin-top:32px;\">\
         <a href=\"{url}\" style=\"color:#888;\">Abmelden</a></p>"
    );

    if html.contains("</body>") {
        html.replace("</body>", &format!("{link}</body>"))
    } else {
        format!("{html}{link}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_is_inserted_before_body_close() {
        let html = "<html><body><p>Hi</p></body></html>";
        let out = append_unsubscribe_link(html, Some("tok.sig"), "https://example.de");
        assert!(out.contains("https://example.de/unsubscribe?token=tok.sig"));
        let link_pos = out.find("Abmelden").unwrap();
        let body_pos = out.find("</body>").unwrap();
        assert!(link_pos < body_pos);
    }

    #[test]
    fn link_is_appended_without_body_tag() {
        let out = append_unsubscribe_link("<p>Hi</p>", Some("tok.sig"), "https://example.de");
        assert!(!out.ends_with("</p>"));
        assert!(out.starts_with("<p>Hi</p>"));
        assert!(out.contains("Abmelden"));
    }

    #[test]
    fn no_token_means_no_link() {
        let html = "<body><p>Hi</p></body>";
        assert_eq!(append_unsubscribe_link(html, None, "https://example.de"), html);
    }

    fn contact_row(gdpr_consent: bool, deleted_at: Option<chrono::DateTime<Utc>>) -> Contact {
        let now = Utc::now();
        Contact {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            first_name: Some("Max".to_string()),
            last_name: Some("Muster".to_string()),
            email: Some("max@example.de".to_string()),
            phone: None,
            company_id: None,
            source: None,
            source_detail: None,
            gdpr_consent,
            gdpr_consent_date: None,
            deleted_at,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn only_draft_campaigns_are_dispatchable() {
        assert!(is_dispatchable(CampaignStatus::Draft.as_str()));
        assert!(!is_dispatchable(CampaignStatus::Sending.as_str()));
        assert!(!is_dispatchable(CampaignStatus::Sent.as_str()));
    }

    #[test]
    fn consent_is_reverified_at_send_time() {
        assert!(is_sendable(&contact_row(true, None)));
        assert!(!is_sendable(&contact_row(false, None)));
        assert!(!is_sendable(&contact_row(true, Some(Utc::now()))));
        // A recipient with no linked contact at all is also skipped.
        assert!(None::<Contact>.filter(is_sendable).is_none());
    }

    #[test]
    fn one_failed_send_does_not_poison_the_batch() {
        let results: Vec<Result<String, BrevoError>> = vec![
            Ok("id-1".to_string()),
            Ok("id-2".to_string()),
            Err(BrevoError::Api {
                status: 400,
                message: "Invalid recipient".to_string(),
            }),
            Ok("id-4".to_string()),
            Ok("id-5".to_string()),
        ];

        let statuses: Vec<RecipientStatus> = results.iter().map(delivery_status).collect();
        assert_eq!(
            statuses,
            [
                RecipientStatus::Sent,
                RecipientStatus::Sent,
                RecipientStatus::Bounced,
                RecipientStatus::Sent,
                RecipientStatus::Sent,
            ]
        );

        let total_sent = statuses
            .iter()
            .filter(|s| **s == RecipientStatus::Sent)
            .count();
        assert_eq!(total_sent, 4);
    }

    #[test]
    fn bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer abc123".parse().unwrap());
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc123"));

        let mut empty = HeaderMap::new();
        empty.insert("authorization", "Bearer ".parse().unwrap());
        assert_eq!(bearer_token(&empty), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }
}
