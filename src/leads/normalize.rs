use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Canonical contact shape produced from heterogeneous form payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedContact {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub company: String,
    pub message: String,
    pub subject: String,
}

/// Which public site a submission originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceSite {
    Firmenrundgang,
    Rundgang360,
}

impl SourceSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceSite::Firmenrundgang => "firmenrundgang",
            SourceSite::Rundgang360 => "360-rundgang",
        }
    }
}

// Source forms mix German and English field names; ordered by preference.
const EMAIL_ALIASES: &[&str] = &["email", "Email", "e-mail"];
const PHONE_ALIASES: &[&str] = &["phone", "telefon", "Telefon", "tel"];
const COMPANY_ALIASES: &[&str] = &["company", "unternehmen", "Unternehmen", "firma"];
const MESSAGE_ALIASES: &[&str] = &["message", "nachricht", "Nachricht"];
const NAME_ALIASES: &[&str] = &["name", "Name"];

// Subject lines look like "Anfrage Ettlingen - Firmenrundgang".
static SUBJECT_PAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Anfrage\s+(.+?)\s*[-\u{2013}]").expect("subject regex"));

fn pick<'a>(data: &'a HashMap<String, String>, aliases: &[&str]) -> &'a str {
    aliases
        .iter()
        .find_map(|k| data.get(*k))
        .map(String::as_str)
        .unwrap_or("")
}

/// Map a raw field map into the canonical contact shape. Pure text
/// processing: first matching alias wins, the combined name field is split
/// at the first whitespace run, the email is trimmed and lower-cased.
pub fn normalize_form_data(data: &HashMap<String, String>) -> NormalizedContact {
    let name = pick(data, NAME_ALIASES).trim();
    let mut parts = name.split_whitespace();
    let first_name = parts.next().unwrap_or("").to_string();
    let last_name = parts.collect::<Vec<_>>().join(" ");

    NormalizedContact {
        first_name,
        last_name,
        email: pick(data, EMAIL_ALIASES).trim().to_lowercase(),
        phone: pick(data, PHONE_ALIASES).trim().to_string(),
        company: pick(data, COMPANY_ALIASES).trim().to_string(),
        message: pick(data, MESSAGE_ALIASES).trim().to_string(),
        subject: data
            .get("_subject")
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

fn referer<'a>(data: &'a HashMap<String, String>) -> &'a str {
    data.get("_referer")
        .or_else(|| data.get("referer"))
        .map(String::as_str)
        .unwrap_or("")
}

/// Infer the originating site from subject keywords or the referring page.
pub fn detect_source(data: &HashMap<String, String>) -> SourceSite {
    let subject = data.get("_subject").map(String::as_str).unwrap_or("");
    if subject.to_lowercase().contains("firmenrundgang")
        || referer(data).contains("firmenrundgang")
    {
        SourceSite::Firmenrundgang
    } else {
        SourceSite::Rundgang360
    }
}

/// Extract a sub-page hint from the subject line ("Anfrage <place> - ...")
/// or, failing that, the path of the referring URL.
pub fn detect_source_page(data: &HashMap<String, String>) -> Option<String> {
    let subject = data.get("_subject").map(String::as_str).unwrap_or("");
    if let Some(caps) = SUBJECT_PAGE.captures(subject) {
        return Some(caps[1].to_string());
    }

    let referer = referer(data);
    if !referer.is_empty() {
        if let Ok(url) = reqwest::Url::parse(referer) {
            let path = url.path();
            if path != "/" {
                return Some(path.to_string());
            }
        }
    }

    None
}
