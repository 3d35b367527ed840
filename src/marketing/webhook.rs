use axum::{
    body::Bytes,
    extract::State,
    http::{Method, StatusCode},
};
use chrono::Utc;
use diesel::prelude::*;
use log::{debug, error, info};
use std::sync::Arc;

use crate::shared::models::{CampaignRecipient, RecipientStatus};
use crate::shared::schema::{campaign_recipients, campaigns, contacts};
use crate::shared::state::AppState;

/// Map a provider event type onto a recipient status. Soft bounces are
/// transient (the provider retries delivery) and unknown events are from
/// channels this system does not track; both map to None.
pub fn map_event(event_type: &str) -> Option<RecipientStatus> {
    match event_type {
        "delivered" => Some(RecipientStatus::Sent),
        "opened" => Some(RecipientStatus::Opened),
        "click" => Some(RecipientStatus::Clicked),
        "hard_bounce" => Some(RecipientStatus::Bounced),
        "unsubscribe" => Some(RecipientStatus::Unsubscribed),
        _ => None,
    }
}

/// Monotonic upgrade rule: the main progression only moves forward, so a
/// late-arriving `delivered` cannot downgrade an `opened` recipient. The
/// absorbing side-states apply from anywhere and nothing leaves them.
pub fn should_apply(current: RecipientStatus, incoming: RecipientStatus) -> bool {
    if incoming.is_terminal_side_state() {
        return true;
    }
    match (current.rank(), incoming.rank()) {
        (Some(current), Some(incoming)) => incoming > current,
        _ => false,
    }
}

/// Recount predicate for `total_opened`: a clicked recipient has
/// necessarily opened, so it still counts.
pub fn counts_as_opened(status: RecipientStatus) -> bool {
    matches!(status, RecipientStatus::Opened | RecipientStatus::Clicked)
}

/// Recount predicate for `total_clicked`.
pub fn counts_as_clicked(status: RecipientStatus) -> bool {
    status == RecipientStatus::Clicked
}

/// `POST /campaign-webhook`: delivery-event callback from the mail
/// provider. Always acknowledges with 200 so the provider never retries
/// forever; internal failures are logged only.
pub async fn campaign_webhook(
    State(state): State<Arc<AppState>>,
    method: Method,
    body: Bytes,
) -> (StatusCode, &'static str) {
    if method != Method::POST {
        return (StatusCode::OK, "OK");
    }

    let parsed: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            error!("Unparseable webhook body: {e}");
            return (StatusCode::OK, "OK");
        }
    };

    // The provider posts either one event object or an array of them.
    let events = match parsed {
        serde_json::Value::Array(events) => events,
        single => vec![single],
    };

    for event in &events {
        if let Err(e) = process_event(&state, event) {
            error!("Webhook event processing failed: {e}");
        }
    }

    (StatusCode::OK, "OK")
}

fn process_event(state: &AppState, event: &serde_json::Value) -> Result<(), String> {
    let Some(event_type) = event.get("event").and_then(|v| v.as_str()) else {
        return Ok(());
    };
    let Some(message_id) = event
        .get("message-id")
        .or_else(|| event.get("messageId"))
        .and_then(|v| v.as_str())
    else {
        return Ok(());
    };

    let Some(new_status) = map_event(event_type) else {
        debug!("Ignoring webhook event type {event_type}");
        return Ok(());
    };

    let mut conn = state
        .conn
        .get()
        .map_err(|e| format!("DB connection error: {e}"))?;

    // Correlate back to the recipient this message id was recorded for.
    let Some(recipient) = campaign_recipients::table
        .filter(campaign_recipients::brevo_message_id.eq(message_id))
        .first::<CampaignRecipient>(&mut conn)
        .optional()
        .map_err(|e| format!("Recipient lookup failed: {e}"))?
    else {
        debug!("No recipient for message id {message_id}, ignoring");
        return Ok(());
    };

    let current = RecipientStatus::parse(&recipient.status)
        .ok_or_else(|| format!("Recipient {} has unknown status {}", recipient.id, recipient.status))?;

    if !should_apply(current, new_status) {
        debug!(
            "Keeping recipient {} at {} (incoming {})",
            recipient.id,
            current.as_str(),
            new_status.as_str()
        );
        return Ok(());
    }

    let now = Utc::now();
    diesel::update(campaign_recipients::table.filter(campaign_recipients::id.eq(recipient.id)))
        .set(campaign_recipients::status.eq(new_status.as_str()))
        .execute(&mut conn)
        .map_err(|e| format!("Status update failed: {e}"))?;

    // First occurrence only; replayed events must not move the timestamps.
    if new_status == RecipientStatus::Opened && recipient.opened_at.is_none() {
        diesel::update(campaign_recipients::table.filter(campaign_recipients::id.eq(recipient.id)))
            .set(campaign_recipients::opened_at.eq(Some(now)))
            .execute(&mut conn)
            .map_err(|e| format!("opened_at update failed: {e}"))?;
    }
    if new_status == RecipientStatus::Clicked && recipient.clicked_at.is_none() {
        diesel::update(campaign_recipients::table.filter(campaign_recipients::id.eq(recipient.id)))
            .set(campaign_recipients::clicked_at.eq(Some(now)))
            .execute(&mut conn)
            .map_err(|e| format!("clicked_at update failed: {e}"))?;
    }

    info!(
        "Recipient {} advanced {} -> {}",
        recipient.id,
        current.as_str(),
        new_status.as_str()
    );

    // Aggregates are recomputed by recount, never incremented, so replayed
    // or out-of-order webhook deliveries cannot double-count.
    match new_status {
        RecipientStatus::Opened => {
            let opened = recount(&mut conn, recipient.campaign_id, counts_as_opened)
                .map_err(|e| format!("Opened recount failed: {e}"))?;
            diesel::update(campaigns::table.filter(campaigns::id.eq(recipient.campaign_id)))
                .set(campaigns::total_opened.eq(opened))
                .execute(&mut conn)
                .map_err(|e| format!("total_opened update failed: {e}"))?;
        }
        RecipientStatus::Clicked => {
            let clicked = recount(&mut conn, recipient.campaign_id, counts_as_clicked)
                .map_err(|e| format!("Clicked recount failed: {e}"))?;
            diesel::update(campaigns::table.filter(campaigns::id.eq(recipient.campaign_id)))
                .set(campaigns::total_clicked.eq(clicked))
                .execute(&mut conn)
                .map_err(|e| format!("total_clicked update failed: {e}"))?;
        }
        RecipientStatus::Unsubscribed => {
            if let Some(contact_id) = recipient.contact_id {
                diesel::update(contacts::table.filter(contacts::id.eq(contact_id)))
                    .set((
                        contacts::gdpr_consent.eq(false),
                        contacts::gdpr_consent_date.eq(Some(now)),
                        contacts::updated_at.eq(now),
                    ))
                    .execute(&mut conn)
                    .map_err(|e| format!("Consent revocation failed: {e}"))?;
            }
        }
        _ => {}
    }

    Ok(())
}

const ALL_STATUSES: [RecipientStatus; 6] = [
    RecipientStatus::Pending,
    RecipientStatus::Sent,
    RecipientStatus::Opened,
    RecipientStatus::Clicked,
    RecipientStatus::Bounced,
    RecipientStatus::Unsubscribed,
];

fn recount(
    conn: &mut PgConnection,
    campaign_id: uuid::Uuid,
    predicate: fn(RecipientStatus) -> bool,
) -> QueryResult<i32> {
    let matching: Vec<&str> = ALL_STATUSES
        .iter()
        .filter(|s| predicate(**s))
        .map(|s| s.as_str())
        .collect();

    campaign_recipients::table
        .filter(campaign_recipients::campaign_id.eq(campaign_id))
        .filter(campaign_recipients::status.eq_any(matching))
        .count()
        .get_result::<i64>(conn)
        .map(|n| n as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use RecipientStatus::*;

    #[test]
    fn event_mapping_matches_provider_vocabulary() {
        assert_eq!(map_event("delivered"), Some(Sent));
        assert_eq!(map_event("opened"), Some(Opened));
        assert_eq!(map_event("click"), Some(Clicked));
        assert_eq!(map_event("hard_bounce"), Some(Bounced));
        assert_eq!(map_event("unsubscribe"), Some(Unsubscribed));
        assert_eq!(map_event("soft_bounce"), None);
        assert_eq!(map_event("request"), None);
    }

    #[test]
    fn late_delivered_does_not_downgrade_opened() {
        assert!(!should_apply(Opened, Sent));
    }

    #[test]
    fn clicked_advances_from_opened() {
        assert!(should_apply(Opened, Clicked));
    }

    #[test]
    fn bounce_applies_from_any_state() {
        for current in [Pending, Sent, Opened, Clicked, Unsubscribed] {
            assert!(should_apply(current, Bounced), "{current:?}");
        }
    }

    #[test]
    fn unsubscribe_applies_from_any_state() {
        for current in [Pending, Sent, Opened, Clicked, Bounced] {
            assert!(should_apply(current, Unsubscribed), "{current:?}");
        }
    }

    #[test]
    fn terminal_side_states_absorb_main_progression_events() {
        assert!(!should_apply(Bounced, Sent));
        assert!(!should_apply(Bounced, Clicked));
        assert!(!should_apply(Unsubscribed, Opened));
    }

    #[test]
    fn same_status_is_not_reapplied() {
        assert!(!should_apply(Opened, Opened));
        assert!(!should_apply(Sent, Sent));
    }

    #[test]
    fn clicked_recipients_still_count_as_opened() {
        assert!(counts_as_opened(Opened));
        assert!(counts_as_opened(Clicked));
        assert!(!counts_as_opened(Sent));
        assert!(!counts_as_opened(Bounced));

        assert!(counts_as_clicked(Clicked));
        assert!(!counts_as_clicked(Opened));
    }

    #[test]
    fn replayed_open_event_does_not_double_count() {
        let mut statuses = [Sent, Sent, Sent];

        // First opened event for recipient 0 applies and the recount sees it.
        assert!(should_apply(statuses[0], Opened));
        statuses[0] = Opened;
        let opened = statuses.iter().filter(|s| counts_as_opened(**s)).count();
        assert_eq!(opened, 1);

        // A replay of the same event is rejected, so the recount is stable.
        assert!(!should_apply(statuses[0], Opened));
        let opened = statuses.iter().filter(|s| counts_as_opened(**s)).count();
        assert_eq!(opened, 1);

        // A later click keeps the recipient in the opened recount.
        assert!(should_apply(statuses[0], Clicked));
        statuses[0] = Clicked;
        let opened = statuses.iter().filter(|s| counts_as_opened(**s)).count();
        assert_eq!(opened, 1);
    }
}
