//! Synthetic envelope generation for exercising the ingestion endpoint.
//!
//! This is a standalone test-data utility: it produces realistic sessions of
//! telemetry envelopes but is never part of the pipeline runtime.

use std::collections::BTreeMap;

use rand::Rng;
use telemetry_core::envelope::{
    DisplayEvent, Envelope, EventContext, FormValue, InteractionEvent, InteractionKind, LeadEvent,
    Location, PageViewEvent,
};

pub const PAGES: &[&str] = &[
    "/",
    "/about",
    "/contact",
    "/pricing",
    "/blog",
    "/blog?page=1",
    "/blog?tag=rust",
    "/blog/1",
    "/blog/2",
    "/blog/2?utm_source=google&utm_medium=cpc&utm_campaign=blog",
];

const DEVICES: &[&str] = &["desktop", "mobile", "tablet"];
const RESOLUTIONS: &[&str] = &["sm", "md", "lg", "xl"];
const OSES: &[&str] = &["windows", "macos", "linux", "ios", "android"];
const BROWSERS: &[&str] = &["chrome", "firefox", "safari"];
const LANGUAGES: &[&str] = &["de", "en", "fr", "es", "pl"];
const CITIES: &[(&str, &str, &str, &str)] = &[
    ("Berlin", "Germany", "Berlin", "Europe/Berlin"),
    ("Hamburg", "Germany", "Hamburg", "Europe/Berlin"),
    ("Vienna", "Austria", "Vienna", "Europe/Vienna"),
    ("Zurich", "Switzerland", "Zurich", "Europe/Zurich"),
    ("Warsaw", "Poland", "Masovia", "Europe/Warsaw"),
];
const FIRST_NAMES: &[&str] = &["Ada", "Grace", "Linus", "Margaret", "Alan"];
const LAST_NAMES: &[&str] = &["Lovelace", "Hopper", "Kernighan", "Hamilton", "Kay"];
const MAIL_DOMAINS: &[&str] = &["example.com", "mail.example.org", "inbox.example.net"];

fn pick<'a>(rng: &mut impl Rng, pool: &'a [&'a str]) -> &'a str {
    pool[rng.gen_range(0..pool.len())]
}

fn pick_campaign(rng: &mut impl Rng, campaigns: &[i64]) -> i64 {
    campaigns[rng.gen_range(0..campaigns.len())]
}

pub fn sample_session_id(rng: &mut impl Rng) -> String {
    format!("{:032x}", rng.gen::<u128>())
}

fn sample_context(rng: &mut impl Rng, session_id: &str, account_id: i64) -> EventContext {
    let (city, country, region, timezone) = CITIES[rng.gen_range(0..CITIES.len())];
    let page = pick(rng, PAGES);
    EventContext {
        session_id: session_id.to_string(),
        account_id,
        location: Location {
            ip: format!(
                "203.0.113.{}",
                rng.gen_range(1..255)
            ),
            country: country.to_string(),
            region: region.to_string(),
            city: city.to_string(),
            latitude: format!("{:.4}", rng.gen_range(-90.0..90.0)),
            longitude: format!("{:.4}", rng.gen_range(-180.0..180.0)),
            timezone: timezone.to_string(),
        },
        url: format!("https://shop.example.com{page}"),
        page: page.to_string(),
        user_agent: "Mozilla/5.0 (X11; Linux x86_64) generator/0.1".to_string(),
        device: pick(rng, DEVICES).to_string(),
        resolution: pick(rng, RESOLUTIONS).to_string(),
        os: pick(rng, OSES).to_string(),
        browser: pick(rng, BROWSERS).to_string(),
        language: pick(rng, LANGUAGES).to_string(),
        referer: None,
        created_at: None,
    }
}

fn sample_form_data(rng: &mut impl Rng) -> BTreeMap<String, FormValue> {
    let first = pick(rng, FIRST_NAMES);
    let last = pick(rng, LAST_NAMES);
    let domain = pick(rng, MAIL_DOMAINS);
    BTreeMap::from([
        ("name".to_string(), FormValue::Text(first.to_string())),
        ("lastName".to_string(), FormValue::Text(last.to_string())),
        (
            "email".to_string(),
            FormValue::Text(format!(
                "{}.{}@{domain}",
                first.to_lowercase(),
                last.to_lowercase()
            )),
        ),
    ])
}

/// One simulated browser session: a burst of page views, ad displays,
/// interactions, and lead submissions sharing a session id.
pub fn sample_session_events(
    rng: &mut impl Rng,
    account_id: i64,
    campaigns: &[i64],
) -> Vec<Envelope> {
    let session_id = sample_session_id(rng);
    let mut events = Vec::new();

    for _ in 0..rng.gen_range(10..=100) {
        events.push(Envelope::PageView(PageViewEvent {
            context: sample_context(rng, &session_id, account_id),
            campaigns: campaigns.to_vec(),
        }));
    }

    for _ in 0..rng.gen_range(1..=50) {
        events.push(Envelope::Display(DisplayEvent {
            context: sample_context(rng, &session_id, account_id),
            campaign_id: pick_campaign(rng, campaigns),
        }));
    }

    for _ in 0..rng.gen_range(1..=10) {
        let kind = match rng.gen_range(0..3) {
            0 => InteractionKind::Url,
            1 => InteractionKind::Page,
            _ => InteractionKind::Close,
        };
        events.push(Envelope::Interaction(InteractionEvent {
            context: sample_context(rng, &session_id, account_id),
            campaign_id: pick_campaign(rng, campaigns),
            interaction_type: kind,
            interaction_value: format!("https://shop.example.com{}", pick(rng, PAGES)),
        }));
    }

    for _ in 0..rng.gen_range(1..=10) {
        events.push(Envelope::Lead(LeadEvent {
            context: sample_context(rng, &session_id, account_id),
            campaign_id: pick_campaign(rng, campaigns),
            form_data: sample_form_data(rng),
        }));
    }

    events
}
