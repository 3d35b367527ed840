use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::schema::{
    activities, campaign_recipients, campaigns, companies, contacts, deals, form_submissions,
};

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = contacts)]
pub struct Contact {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company_id: Option<Uuid>,
    pub source: Option<String>,
    pub source_detail: Option<String>,
    pub gdpr_consent: bool,
    pub gdpr_consent_date: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = companies)]
pub struct Company {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub city: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = deals)]
pub struct Deal {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub contact_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
    pub title: String,
    pub stage: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = activities)]
pub struct Activity {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub contact_id: Option<Uuid>,
    pub deal_id: Option<Uuid>,
    pub activity_type: String,
    pub description: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = form_submissions)]
pub struct FormSubmission {
    pub id: Uuid,
    pub source_site: String,
    pub source_page: Option<String>,
    pub payload: serde_json::Value,
    pub ip_hash: Option<String>,
    pub is_duplicate: bool,
    pub contact_id: Option<Uuid>,
    pub deal_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = campaigns)]
pub struct Campaign {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub subject: String,
    pub body_html: String,
    pub status: String,
    pub total_sent: i32,
    pub total_opened: i32,
    pub total_clicked: i32,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = campaign_recipients)]
pub struct CampaignRecipient {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub contact_id: Option<Uuid>,
    pub email: String,
    pub status: String,
    pub brevo_message_id: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Deal stages. Deals created by the ingestion pipeline always start at `New`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DealStage {
    New,
    Contacted,
    Qualified,
    Proposal,
    Won,
    Lost,
}

impl DealStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            DealStage::New => "new",
            DealStage::Contacted => "contacted",
            DealStage::Qualified => "qualified",
            DealStage::Proposal => "proposal",
            DealStage::Won => "won",
            DealStage::Lost => "lost",
        }
    }
}

/// Campaign lifecycle: draft -> sending -> sent. Only draft campaigns
/// may be dispatched for a real send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignStatus {
    Draft,
    Sending,
    Sent,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::Sending => "sending",
            CampaignStatus::Sent => "sent",
        }
    }
}

/// Per-recipient delivery status. The main progression is
/// pending -> sent -> opened -> clicked; bounced and unsubscribed are
/// absorbing side-states reachable from anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientStatus {
    Pending,
    Sent,
    Opened,
    Clicked,
    Bounced,
    Unsubscribed,
}

impl RecipientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipientStatus::Pending => "pending",
            RecipientStatus::Sent => "sent",
            RecipientStatus::Opened => "opened",
            RecipientStatus::Clicked => "clicked",
            RecipientStatus::Bounced => "bounced",
            RecipientStatus::Unsubscribed => "unsubscribed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RecipientStatus::Pending),
            "sent" => Some(RecipientStatus::Sent),
            "opened" => Some(RecipientStatus::Opened),
            "clicked" => Some(RecipientStatus::Clicked),
            "bounced" => Some(RecipientStatus::Bounced),
            "unsubscribed" => Some(RecipientStatus::Unsubscribed),
            _ => None,
        }
    }

    /// Position on the main progression; None for the absorbing side-states.
    pub fn rank(&self) -> Option<u8> {
        match self {
            RecipientStatus::Pending => Some(0),
            RecipientStatus::Sent => Some(1),
            RecipientStatus::Opened => Some(2),
            RecipientStatus::Clicked => Some(3),
            RecipientStatus::Bounced | RecipientStatus::Unsubscribed => None,
        }
    }

    pub fn is_terminal_side_state(&self) -> bool {
        matches!(self, RecipientStatus::Bounced | RecipientStatus::Unsubscribed)
    }
}

/// Activity types written by the pipelines.
pub mod activity_type {
    pub const CREATED: &str = "created";
    pub const FORM_SUBMISSION: &str = "form_submission";
    pub const EMAIL: &str = "email";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipient_status_round_trips() {
        for s in ["pending", "sent", "opened", "clicked", "bounced", "unsubscribed"] {
            assert_eq!(RecipientStatus::parse(s).unwrap().as_str(), s);
        }
        assert!(RecipientStatus::parse("delivered").is_none());
    }

    #[test]
    fn rank_orders_main_progression() {
        assert!(RecipientStatus::Pending.rank() < RecipientStatus::Sent.rank());
        assert!(RecipientStatus::Sent.rank() < RecipientStatus::Opened.rank());
        assert!(RecipientStatus::Opened.rank() < RecipientStatus::Clicked.rank());
        assert!(RecipientStatus::Bounced.rank().is_none());
        assert!(RecipientStatus::Unsubscribed.rank().is_none());
    }
}
