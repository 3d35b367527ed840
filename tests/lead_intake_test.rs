//! End-to-end checks of the lead intake decision path: spam gate first,
//! then normalization and source detection of whatever survives it.

use std::collections::HashMap;

use crmserver::leads::normalize::{
    detect_source, detect_source_page, normalize_form_data, SourceSite,
};
use crmserver::leads::spam::{check_spam_at, SpamReason};

fn submission(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn realistic_submission_passes_the_gate_and_normalizes() {
    let start = 1_700_000_000_000i64;
    let data = submission(&[
        ("name", "Max Mustermann"),
        ("email", "Max@Muster-GmbH.de"),
        ("Telefon", "+49 721 123456"),
        ("unternehmen", "Muster GmbH"),
        ("nachricht", "Bitte um ein Angebot."),
        ("_subject", "Anfrage Gastronomie - Firmenrundgang"),
        ("_referer", "https://firmenrundgang-karlsruhe.de/gastronomie"),
        ("_timestamp", &start.to_string()),
        ("_honey", ""),
    ]);

    assert_eq!(check_spam_at(&data, start + 45_000), None);

    let contact = normalize_form_data(&data);
    assert_eq!(contact.first_name, "Max");
    assert_eq!(contact.last_name, "Mustermann");
    assert_eq!(contact.email, "max@muster-gmbh.de");
    assert_eq!(contact.phone, "+49 721 123456");
    assert_eq!(contact.company, "Muster GmbH");
    assert_eq!(contact.message, "Bitte um ein Angebot.");

    assert_eq!(detect_source(&data), SourceSite::Firmenrundgang);
    assert_eq!(detect_source_page(&data).as_deref(), Some("Gastronomie"));
}

#[test]
fn honeypot_is_rejected_before_anything_else() {
    let data = submission(&[
        ("email", "definitely-not-an-email"),
        ("_honey", "I am definitely human"),
    ]);
    assert_eq!(check_spam_at(&data, 0), Some(SpamReason::Honeypot));
}

#[test]
fn instant_submission_is_rejected_as_too_fast() {
    let start = 1_700_000_000_000i64;
    let data = submission(&[
        ("email", "max@muster-gmbh.de"),
        ("_timestamp", &start.to_string()),
    ]);
    assert_eq!(
        check_spam_at(&data, start + 1200),
        Some(SpamReason::TooFast)
    );
    assert_eq!(check_spam_at(&data, start + 4000), None);
}

#[test]
fn shapeless_email_is_rejected() {
    let data = submission(&[("email", "not-an-address")]);
    assert_eq!(check_spam_at(&data, 0), Some(SpamReason::InvalidEmail));
}
