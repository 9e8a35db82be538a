use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Caller-side geo context, all fields as reported by the instrumentation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Location {
    pub ip: String,
    pub country: String,
    pub region: String,
    pub city: String,
    pub latitude: String,
    pub longitude: String,
    pub timezone: String,
}

/// Fields common to every envelope variant. `createdAt` is absent on the
/// wire and stamped by the gateway at ingestion; everything else is
/// client-supplied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventContext {
    pub session_id: String,
    pub account_id: i64,
    pub location: Location,
    pub url: String,
    pub page: String,
    pub user_agent: String,
    pub device: String,
    pub resolution: String,
    pub os: String,
    pub browser: String,
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum InteractionKind {
    #[serde(rename = "url")]
    Url,
    #[serde(rename = "page")]
    Page,
    #[serde(rename = "close")]
    Close,
    #[serde(rename = "play-gamify")]
    PlayGamify,
}

/// Scalar or string-list value inside a lead form submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FormValue {
    Text(String),
    Number(f64),
    Flag(bool),
    List(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageViewEvent {
    #[serde(flatten)]
    pub context: EventContext,
    #[serde(default)]
    pub campaigns: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DisplayEvent {
    #[serde(flatten)]
    pub context: EventContext,
    pub campaign_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InteractionEvent {
    #[serde(flatten)]
    pub context: EventContext,
    pub campaign_id: i64,
    pub interaction_type: InteractionKind,
    pub interaction_value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeadEvent {
    #[serde(flatten)]
    pub context: EventContext,
    pub campaign_id: i64,
    pub form_data: BTreeMap<String, FormValue>,
}

/// Tagged event envelope submitted by callers. Campaign events (`display`,
/// `interaction`, `lead`) carry a `campaignId` by construction; `pageView`
/// carries a campaign list instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Envelope {
    #[serde(rename = "pageView")]
    PageView(PageViewEvent),
    #[serde(rename = "display")]
    Display(DisplayEvent),
    #[serde(rename = "interaction")]
    Interaction(InteractionEvent),
    #[serde(rename = "lead")]
    Lead(LeadEvent),
}

impl Envelope {
    pub fn context(&self) -> &EventContext {
        match self {
            Self::PageView(event) => &event.context,
            Self::Display(event) => &event.context,
            Self::Interaction(event) => &event.context,
            Self::Lead(event) => &event.context,
        }
    }

    fn context_mut(&mut self) -> &mut EventContext {
        match self {
            Self::PageView(event) => &mut event.context,
            Self::Display(event) => &mut event.context,
            Self::Interaction(event) => &mut event.context,
            Self::Lead(event) => &mut event.context,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PageView(_) => "pageView",
            Self::Display(_) => "display",
            Self::Interaction(_) => "interaction",
            Self::Lead(_) => "lead",
        }
    }

    pub fn session_id(&self) -> &str {
        &self.context().session_id
    }

    pub fn account_id(&self) -> i64 {
        self.context().account_id
    }

    pub fn campaign_id(&self) -> Option<i64> {
        match self {
            Self::PageView(_) => None,
            Self::Display(event) => Some(event.campaign_id),
            Self::Interaction(event) => Some(event.campaign_id),
            Self::Lead(event) => Some(event.campaign_id),
        }
    }

    pub fn is_lead(&self) -> bool {
        matches!(self, Self::Lead(_))
    }

    /// The only post-construction mutation: the gateway stamps the server's
    /// receive time before dispatch.
    pub fn stamp_created_at(&mut self, now: DateTime<Utc>) {
        self.context_mut().created_at = Some(now);
    }

    /// Logical identity of a campaign event, `<sessionId>_<campaignId>`.
    /// Page views have no single campaign and therefore no identity.
    pub fn dedup_identity(&self) -> Option<String> {
        self.campaign_id()
            .map(|campaign_id| format!("{}_{campaign_id}", self.session_id()))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.session_id().trim().is_empty() {
            return Err(ValidationError::new("sessionId cannot be empty"));
        }
        if self.account_id() <= 0 {
            return Err(ValidationError::new("accountId must be a positive integer"));
        }
        Ok(())
    }

    /// Warehouse view of the envelope: lead-only fields (`formData`,
    /// `interactionType`, `interactionValue`) are dropped, campaign
    /// references are kept.
    pub fn analytics_record(&self) -> AnalyticsRecord {
        AnalyticsRecord {
            event_type: self.event_type().to_string(),
            context: self.context().clone(),
            campaign_id: self.campaign_id(),
            campaigns: match self {
                Self::PageView(event) => Some(event.campaigns.clone()),
                _ => None,
            },
        }
    }
}

/// Record shape persisted by the analytics stream sink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsRecord {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(flatten)]
    pub context: EventContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaigns: Option<Vec<i64>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Content fingerprint used by the lead queue's content-based deduplication.
pub fn content_fingerprint(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    fn sample_context_json(session_id: &str, account_id: i64) -> Value {
        json!({
            "sessionId": session_id,
            "accountId": account_id,
            "location": {
                "ip": "203.0.113.9",
                "country": "Germany",
                "region": "Berlin",
                "city": "Berlin",
                "latitude": "52.5200",
                "longitude": "13.4050",
                "timezone": "Europe/Berlin"
            },
            "url": "https://shop.example.com/blog/2",
            "page": "/blog/2",
            "userAgent": "Mozilla/5.0",
            "device": "desktop",
            "resolution": "xl",
            "os": "linux",
            "browser": "firefox",
            "language": "de"
        })
    }

    fn with_fields(mut base: Value, extra: Value) -> Value {
        let Some(extra_map) = extra.as_object() else {
            panic!("extra fields should be an object");
        };
        for (key, value) in extra_map {
            base[key] = value.clone();
        }
        base
    }

    #[test]
    fn parses_page_view_with_campaign_list() {
        let payload = with_fields(
            sample_context_json("s1", 7),
            json!({"type": "pageView", "campaigns": [1, 2]}),
        );

        let envelope: Envelope =
            serde_json::from_value(payload).expect("pageView envelope should parse");
        assert_eq!(envelope.event_type(), "pageView");
        assert_eq!(envelope.account_id(), 7);
        assert_eq!(envelope.campaign_id(), None);
        assert_eq!(envelope.dedup_identity(), None);

        let Envelope::PageView(event) = &envelope else {
            panic!("expected pageView variant");
        };
        assert_eq!(event.campaigns, vec![1, 2]);
        assert!(event.context.created_at.is_none());
    }

    #[test]
    fn parses_interaction_with_hyphenated_kind() {
        let payload = with_fields(
            sample_context_json("s1", 7),
            json!({
                "type": "interaction",
                "campaignId": 5,
                "interactionType": "play-gamify",
                "interactionValue": "https://game.example.com"
            }),
        );

        let envelope: Envelope =
            serde_json::from_value(payload).expect("interaction envelope should parse");
        let Envelope::Interaction(event) = &envelope else {
            panic!("expected interaction variant");
        };
        assert_eq!(event.interaction_type, InteractionKind::PlayGamify);
        assert_eq!(envelope.dedup_identity(), Some("s1_5".to_string()));
    }

    #[test]
    fn parses_lead_with_mixed_form_values() {
        let payload = with_fields(
            sample_context_json("s1", 7),
            json!({
                "type": "lead",
                "campaignId": 5,
                "formData": {
                    "email": "a@b.com",
                    "age": 33,
                    "optIn": true,
                    "interests": ["bikes", "books"]
                }
            }),
        );

        let envelope: Envelope =
            serde_json::from_value(payload).expect("lead envelope should parse");
        let Envelope::Lead(event) = &envelope else {
            panic!("expected lead variant");
        };
        assert_eq!(
            event.form_data.get("email"),
            Some(&FormValue::Text("a@b.com".to_string()))
        );
        assert_eq!(event.form_data.get("age"), Some(&FormValue::Number(33.0)));
        assert_eq!(event.form_data.get("optIn"), Some(&FormValue::Flag(true)));
        assert_eq!(
            event.form_data.get("interests"),
            Some(&FormValue::List(vec![
                "bikes".to_string(),
                "books".to_string()
            ]))
        );
    }

    #[test]
    fn rejects_campaign_event_without_campaign_id() {
        let payload = with_fields(sample_context_json("s1", 7), json!({"type": "display"}));
        let error =
            serde_json::from_value::<Envelope>(payload).expect_err("display without campaignId");
        assert!(error.to_string().contains("campaignId"));
    }

    #[test]
    fn validate_rejects_blank_session_id() {
        let payload = with_fields(
            sample_context_json("  ", 7),
            json!({"type": "display", "campaignId": 5}),
        );
        let envelope: Envelope = serde_json::from_value(payload).expect("envelope should parse");
        let error = envelope.validate().expect_err("blank sessionId should fail");
        assert_eq!(error.message(), "sessionId cannot be empty");
    }

    #[test]
    fn validate_rejects_non_positive_account_id() {
        let payload = with_fields(
            sample_context_json("s1", 0),
            json!({"type": "lead", "campaignId": 5, "formData": {}}),
        );
        let envelope: Envelope = serde_json::from_value(payload).expect("envelope should parse");
        let error = envelope.validate().expect_err("zero accountId should fail");
        assert_eq!(error.message(), "accountId must be a positive integer");
    }

    #[test]
    fn stamping_adds_created_at_to_serialized_form() {
        let payload = with_fields(
            sample_context_json("s1", 7),
            json!({"type": "pageView", "campaigns": []}),
        );
        let mut envelope: Envelope =
            serde_json::from_value(payload).expect("envelope should parse");
        let now = Utc::now();
        envelope.stamp_created_at(now);

        let serialized = serde_json::to_value(&envelope).expect("envelope should serialize");
        assert!(serialized
            .get("createdAt")
            .and_then(Value::as_str)
            .is_some());
        assert_eq!(serialized.get("type").and_then(Value::as_str), Some("pageView"));
    }

    #[test]
    fn analytics_record_strips_lead_only_fields() {
        let payload = with_fields(
            sample_context_json("s1", 7),
            json!({
                "type": "lead",
                "campaignId": 5,
                "formData": {"email": "a@b.com"}
            }),
        );
        let envelope: Envelope = serde_json::from_value(payload).expect("envelope should parse");

        let record = envelope.analytics_record();
        let serialized = serde_json::to_value(&record).expect("record should serialize");
        assert!(serialized.get("formData").is_none());
        assert_eq!(serialized.get("campaignId").and_then(Value::as_i64), Some(5));
        assert_eq!(serialized.get("type").and_then(Value::as_str), Some("lead"));
    }

    #[test]
    fn analytics_record_strips_interaction_fields_but_keeps_campaigns() {
        let interaction = with_fields(
            sample_context_json("s1", 7),
            json!({
                "type": "interaction",
                "campaignId": 3,
                "interactionType": "close",
                "interactionValue": "modal"
            }),
        );
        let envelope: Envelope =
            serde_json::from_value(interaction).expect("envelope should parse");
        let serialized =
            serde_json::to_value(envelope.analytics_record()).expect("record should serialize");
        assert!(serialized.get("interactionType").is_none());
        assert!(serialized.get("interactionValue").is_none());

        let page_view = with_fields(
            sample_context_json("s1", 7),
            json!({"type": "pageView", "campaigns": [1, 2]}),
        );
        let envelope: Envelope =
            serde_json::from_value(page_view).expect("envelope should parse");
        let serialized =
            serde_json::to_value(envelope.analytics_record()).expect("record should serialize");
        assert_eq!(serialized.get("campaigns"), Some(&json!([1, 2])));
    }

    #[test]
    fn analytics_record_round_trips_through_json() {
        let payload = with_fields(
            sample_context_json("s1", 7),
            json!({"type": "display", "campaignId": 9}),
        );
        let mut envelope: Envelope =
            serde_json::from_value(payload).expect("envelope should parse");
        envelope.stamp_created_at(Utc::now());

        let record = envelope.analytics_record();
        let text = serde_json::to_string(&record).expect("record should serialize");
        let reparsed: AnalyticsRecord =
            serde_json::from_str(&text).expect("record should parse back");
        assert_eq!(reparsed, record);
    }

    #[test]
    fn content_fingerprint_is_stable_and_content_addressed() {
        let body = r#"{"type":"lead","sessionId":"s1"}"#;
        assert_eq!(content_fingerprint(body), content_fingerprint(body));
        assert_ne!(
            content_fingerprint(body),
            content_fingerprint(r#"{"type":"lead","sessionId":"s2"}"#)
        );
    }
}
