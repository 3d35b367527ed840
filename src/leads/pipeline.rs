use axum::{
    extract::{FromRequest, Multipart, Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use diesel::prelude::*;
use log::{error, info, warn};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::leads::normalize::{
    detect_source, detect_source_page, normalize_form_data, NormalizedContact, SourceSite,
};
use crate::leads::spam::check_spam;
use crate::shared::models::{activity_type, Activity, Company, Contact, Deal, DealStage, FormSubmission};
use crate::shared::schema::{activities, companies, contacts, deals, form_submissions};
use crate::shared::state::AppState;

const MAX_BODY_BYTES: usize = 256 * 1024;

/// Public endpoint contract: any well-formed, non-spam submission gets a
/// success response, no matter what happens downstream. Internal failures
/// must never leak to the open internet.
fn success_response() -> Response {
    (StatusCode::OK, Json(serde_json::json!({ "success": true }))).into_response()
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

pub async fn submit_form(State(state): State<Arc<AppState>>, req: Request) -> Response {
    let headers = req.headers().clone();
    let raw = match parse_body(req, &headers).await {
        Ok(raw) => raw,
        Err(()) => return bad_request("Invalid request body"),
    };

    if let Some(reason) = check_spam(&raw) {
        // Respond success so automated senders cannot tell they were caught.
        info!("Dropped spam submission ({})", reason.as_str());
        return success_response();
    }

    let ip_hash = client_ip(&headers).map(|ip| fingerprint_ip(&ip));

    // Notification relay and CRM processing are independent side effects;
    // neither failing suppresses the other or the success response.
    state.relay.forward(&raw).await;
    ingest(&state, &raw, ip_hash);

    success_response()
}

async fn parse_body(req: Request, headers: &HeaderMap) -> Result<HashMap<String, String>, ()> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if content_type.contains("multipart/form-data") {
        let mut multipart = Multipart::from_request(req, &()).await.map_err(|_| ())?;
        let mut data = HashMap::new();
        while let Some(field) = multipart.next_field().await.map_err(|_| ())? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            let value = field.text().await.map_err(|_| ())?;
            data.insert(name, value);
        }
        return Ok(data);
    }

    let body = axum::body::to_bytes(req.into_body(), MAX_BODY_BYTES)
        .await
        .map_err(|_| ())?;

    if content_type.contains("application/x-www-form-urlencoded") {
        parse_urlencoded(&body)
    } else {
        parse_json(&body)
    }
}

fn parse_urlencoded(body: &[u8]) -> Result<HashMap<String, String>, ()> {
    let text = std::str::from_utf8(body).map_err(|_| ())?;
    let mut data = HashMap::new();
    for pair in text.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = key.replace('+', " ");
        let key = urlencoding::decode(&key).map_err(|_| ())?;
        let value = value.replace('+', " ");
        let value = urlencoding::decode(&value).map_err(|_| ())?;
        data.insert(key.into_owned(), value.into_owned());
    }
    Ok(data)
}

fn parse_json(body: &[u8]) -> Result<HashMap<String, String>, ()> {
    let value: serde_json::Value = serde_json::from_slice(body).map_err(|_| ())?;
    let serde_json::Value::Object(map) = value else {
        return Err(());
    };
    Ok(map
        .into_iter()
        .map(|(k, v)| {
            let v = match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (k, v)
        })
        .collect())
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        })
}

/// One-way, truncated fingerprint of the submitter's network origin.
/// Audit-only: never used for deduplication or blocking.
pub fn fingerprint_ip(ip: &str) -> String {
    let digest = Sha256::digest(ip.as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// Convert one submission into CRM state. Every step is attempt-and-log;
/// the archival write at the end runs regardless of earlier failures so no
/// inbound lead is ever lost.
fn ingest(state: &AppState, raw: &HashMap<String, String>, ip_hash: Option<String>) {
    let normalized = normalize_form_data(raw);
    let source = detect_source(raw);
    let source_page = detect_source_page(raw);

    let mut conn = match state.conn.get() {
        Ok(conn) => conn,
        Err(e) => {
            error!("Cannot process submission, no database connection: {e}");
            return;
        }
    };

    let Some(owner_id) = state.config.crm.owner_id else {
        warn!("CRM_OWNER_ID not configured, archiving submission only");
        archive(&mut conn, raw, source, &source_page, ip_hash, false, None, None);
        return;
    };

    let now = Utc::now();
    let mut contact_id: Option<Uuid> = None;
    let mut deal_id: Option<Uuid> = None;

    let existing = match dedup_email(&normalized.email) {
        None => None,
        Some(email) => match contacts::table
            .filter(contacts::owner_id.eq(owner_id))
            .filter(contacts::email.eq(email))
            .filter(contacts::deleted_at.is_null())
            .first::<Contact>(&mut conn)
            .optional()
        {
            Ok(existing) => existing,
            Err(e) => {
                error!("Contact lookup failed: {e}");
                None
            }
        },
    };

    let decision = decide_lead(existing.as_ref());
    let is_duplicate = !decision.creates_entities();

    if let LeadDecision::Duplicate { contact_id: known } = decision {
        info!("Duplicate submission for contact {known}");
        contact_id = Some(known);
    } else {
        let company_id = if normalized.company.is_empty() {
            None
        } else {
            let company = Company {
                id: Uuid::new_v4(),
                owner_id,
                name: normalized.company.clone(),
                city: None,
                created_at: now,
                updated_at: now,
            };
            match diesel::insert_into(companies::table)
                .values(&company)
                .execute(&mut conn)
            {
                Ok(_) => Some(company.id),
                Err(e) => {
                    error!("Company creation failed: {e}");
                    None
                }
            }
        };

        let contact = Contact {
            id: Uuid::new_v4(),
            owner_id,
            first_name: some_if_nonempty(&normalized.first_name),
            last_name: some_if_nonempty(&normalized.last_name),
            email: some_if_nonempty(&normalized.email),
            phone: some_if_nonempty(&normalized.phone),
            company_id,
            source: Some(source.as_str().to_string()),
            source_detail: source_page.clone(),
            gdpr_consent: true,
            gdpr_consent_date: Some(now),
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        match diesel::insert_into(contacts::table)
            .values(&contact)
            .execute(&mut conn)
        {
            Ok(_) => {
                contact_id = Some(contact.id);

                let deal = Deal {
                    id: Uuid::new_v4(),
                    owner_id,
                    contact_id: Some(contact.id),
                    company_id,
                    title: deal_title(&normalized),
                    stage: DealStage::New.as_str().to_string(),
                    created_at: now,
                    updated_at: now,
                };
                match diesel::insert_into(deals::table)
                    .values(&deal)
                    .execute(&mut conn)
                {
                    Ok(_) => deal_id = Some(deal.id),
                    Err(e) => error!("Deal creation failed: {e}"),
                }

                log_activity(
                    &mut conn,
                    Activity {
                        id: Uuid::new_v4(),
                        owner_id,
                        contact_id: Some(contact.id),
                        deal_id,
                        activity_type: activity_type::CREATED.to_string(),
                        description: "Kontakt über Webformular erstellt".to_string(),
                        metadata: serde_json::json!({ "source": source.as_str() }),
                        created_at: now,
                    },
                );
            }
            Err(e) => error!("Contact creation failed: {e}"),
        }
    }

    if let Some(contact_id) = contact_id {
        let message = if normalized.message.is_empty() {
            "(keine Nachricht)".to_string()
        } else {
            normalized.message.clone()
        };
        log_activity(
            &mut conn,
            Activity {
                id: Uuid::new_v4(),
                owner_id,
                contact_id: Some(contact_id),
                deal_id,
                activity_type: activity_type::FORM_SUBMISSION.to_string(),
                description: message,
                metadata: serde_json::json!({
                    "source_site": source.as_str(),
                    "source_page": source_page,
                }),
                created_at: now,
            },
        );
    }

    archive(
        &mut conn,
        raw,
        source,
        &source_page,
        ip_hash,
        is_duplicate,
        contact_id,
        deal_id,
    );
}

#[allow(clippy::too_many_arguments)]
fn archive(
    conn: &mut PgConnection,
    raw: &HashMap<String, String>,
    source: SourceSite,
    source_page: &Option<String>,
    ip_hash: Option<String>,
    is_duplicate: bool,
    contact_id: Option<Uuid>,
    deal_id: Option<Uuid>,
) {
    let submission = FormSubmission {
        id: Uuid::new_v4(),
        source_site: source.as_str().to_string(),
        source_page: source_page.clone(),
        payload: serde_json::to_value(raw).unwrap_or_else(|_| serde_json::json!({})),
        ip_hash,
        is_duplicate,
        contact_id,
        deal_id,
        created_at: Utc::now(),
    };
    if let Err(e) = diesel::insert_into(form_submissions::table)
        .values(&submission)
        .execute(conn)
    {
        error!("Submission archival failed: {e}");
    }
}

fn log_activity(conn: &mut PgConnection, activity: Activity) {
    if let Err(e) = diesel::insert_into(activities::table)
        .values(&activity)
        .execute(conn)
    {
        error!("Activity logging failed: {e}");
    }
}

/// Dedup key for the owner-scoped contact lookup. An empty email never
/// matches anything, so the lookup is skipped entirely.
fn dedup_email(email: &str) -> Option<&str> {
    if email.is_empty() {
        None
    } else {
        Some(email)
    }
}

/// What to do with a lead after the dedup lookup. Duplicates attach their
/// activity to the known contact and never get a second contact or deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeadDecision {
    Duplicate { contact_id: Uuid },
    NewContact,
}

impl LeadDecision {
    fn creates_entities(&self) -> bool {
        matches!(self, LeadDecision::NewContact)
    }
}

fn decide_lead(existing: Option<&Contact>) -> LeadDecision {
    match existing {
        Some(contact) => LeadDecision::Duplicate {
            contact_id: contact.id,
        },
        None => LeadDecision::NewContact,
    }
}

fn some_if_nonempty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Deal title from the submitter's name, falling back to the email address.
pub fn deal_title(contact: &NormalizedContact) -> String {
    let name = format!("{} {}", contact.first_name, contact.last_name)
        .trim()
        .to_string();
    if !name.is_empty() {
        format!("Anfrage von {name}")
    } else if !contact.email.is_empty() {
        format!("Anfrage von {}", contact.email)
    } else {
        "Anfrage über Webformular".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_and_truncated() {
        let a = fingerprint_ip("203.0.113.7");
        let b = fingerprint_ip("203.0.113.7");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert_ne!(a, fingerprint_ip("203.0.113.8"));
    }

    #[test]
    fn deal_title_prefers_name_over_email() {
        let contact = NormalizedContact {
            first_name: "Max".to_string(),
            last_name: "Muster".to_string(),
            email: "max@example.de".to_string(),
            ..Default::default()
        };
        assert_eq!(deal_title(&contact), "Anfrage von Max Muster");
    }

    #[test]
    fn deal_title_falls_back_to_email_then_placeholder() {
        let contact = NormalizedContact {
            email: "max@example.de".to_string(),
            ..Default::default()
        };
        assert_eq!(deal_title(&contact), "Anfrage von max@example.de");
        assert_eq!(deal_title(&NormalizedContact::default()), "Anfrage über Webformular");
    }

    #[test]
    fn duplicate_lead_reuses_the_contact_and_skips_entity_creation() {
        let now = Utc::now();
        let existing = Contact {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            first_name: Some("Max".to_string()),
            last_name: Some("Muster".to_string()),
            email: Some("max@example.de".to_string()),
            phone: None,
            company_id: None,
            source: None,
            source_detail: None,
            gdpr_consent: true,
            gdpr_consent_date: Some(now),
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };

        let decision = decide_lead(Some(&existing));
        assert_eq!(
            decision,
            LeadDecision::Duplicate {
                contact_id: existing.id
            }
        );
        assert!(!decision.creates_entities());
    }

    #[test]
    fn unknown_email_creates_contact_and_deal() {
        let decision = decide_lead(None);
        assert_eq!(decision, LeadDecision::NewContact);
        assert!(decision.creates_entities());
    }

    #[test]
    fn empty_email_skips_the_dedup_lookup() {
        assert_eq!(dedup_email(""), None);
        assert_eq!(dedup_email("max@example.de"), Some("max@example.de"));
    }

    #[test]
    fn urlencoded_body_is_decoded() {
        let data = parse_urlencoded(b"name=Max+Muster&email=max%40example.de&_honey=").unwrap();
        assert_eq!(data.get("name").map(String::as_str), Some("Max Muster"));
        assert_eq!(data.get("email").map(String::as_str), Some("max@example.de"));
        assert_eq!(data.get("_honey").map(String::as_str), Some(""));
    }

    #[test]
    fn json_body_accepts_non_string_values() {
        let data = parse_json(br#"{"name":"Max","_timestamp":1700000000000}"#).unwrap();
        assert_eq!(data.get("_timestamp").map(String::as_str), Some("1700000000000"));
    }

    #[test]
    fn json_body_must_be_an_object() {
        assert!(parse_json(b"[1,2,3]").is_err());
        assert!(parse_json(b"not json").is_err());
    }
}
