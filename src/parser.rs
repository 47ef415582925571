//! Signed webhook parsing.
//!
//! LINE signs every callback with `base64(HMAC-SHA256(channel_secret, body))`
//! and sends the result in `X-Line-Signature`. The body is only trusted
//! after that check passes.
//!
//! The typed model below covers the standard event types. Anything else
//! (notably `things` events from LINE Things devices) deserializes to
//! [`Event::Unknown`] and is picked up by the raw pass in `things.rs`.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::CallbackError;

type HmacSha256 = Hmac<Sha256>;

/// Top-level webhook body.
#[derive(Deserialize, Debug)]
pub struct WebhookPayload {
    /// Bot user ID the events are addressed to.
    pub destination: Option<String>,
    #[serde(default)]
    pub events: Vec<Event>,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Event {
    Message(MessageEvent),
    Follow,
    Unfollow,
    Join,
    Leave,
    Postback,
    Beacon,
    #[serde(other)]
    Unknown,
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Message(_) => "message",
            Event::Follow => "follow",
            Event::Unfollow => "unfollow",
            Event::Join => "join",
            Event::Leave => "leave",
            Event::Postback => "postback",
            Event::Beacon => "beacon",
            Event::Unknown => "unknown",
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    /// Absent on events delivered while the channel is in standby mode.
    pub reply_token: Option<String>,
    pub source: Option<Source>,
    /// Milliseconds since the epoch.
    pub timestamp: Option<i64>,
    pub message: MessageContent,
}

impl MessageEvent {
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp.and_then(DateTime::from_timestamp_millis)
    }
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MessageContent {
    Text { id: Option<String>, text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Source {
    #[serde(rename_all = "camelCase")]
    User { user_id: String },
    #[serde(rename_all = "camelCase")]
    Group {
        group_id: String,
        user_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Room {
        room_id: String,
        user_id: Option<String>,
    },
}

impl Source {
    /// ID of the chat the event came from.
    pub fn id(&self) -> &str {
        match self {
            Source::User { user_id } => user_id.as_str(),
            Source::Group { group_id, .. } => group_id.as_str(),
            Source::Room { room_id, .. } => room_id.as_str(),
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Source::User { user_id } => Some(user_id.as_str()),
            Source::Group { user_id, .. } | Source::Room { user_id, .. } => user_id.as_deref(),
        }
    }
}

/// Verifies callback signatures and parses signed bodies.
#[derive(Clone)]
pub struct WebhookParser {
    mac: HmacSha256,
}

impl WebhookParser {
    pub fn new(channel_secret: &str) -> Result<Self> {
        let mac = HmacSha256::new_from_slice(channel_secret.as_bytes())
            .context("Failed to key HMAC with channel secret")?;
        Ok(Self { mac })
    }

    /// Signature LINE would send for `body`.
    pub fn signature(&self, body: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(body.as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }

    pub fn verify(&self, body: &str, signature: &str) -> bool {
        let expected = self.signature(body);
        expected.as_bytes().ct_eq(signature.trim().as_bytes()).into()
    }

    /// Verify `signature` and, if it matches, parse the body into typed events.
    pub fn parse(&self, body: &str, signature: &str) -> Result<WebhookPayload, CallbackError> {
        if !self.verify(body, signature) {
            return Err(CallbackError::InvalidSignature);
        }
        Ok(serde_json::from_str(body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "testsecret";

    #[test]
    fn signature_matches_known_value() {
        // echo -n '{"events":[]}' | openssl dgst -sha256 -hmac testsecret -binary | base64
        let parser = WebhookParser::new(SECRET).unwrap();
        let body = r#"{"events":[]}"#;
        let sig = parser.signature(body);
        assert_eq!(sig, "7/zjpxmsANrs8ptIk/KkFoHlDrLSXUZV+eHj+1N7Rdg=");
        assert!(parser.verify(body, &sig));
    }

    #[test]
    fn tampered_body_fails_verification() {
        let parser = WebhookParser::new(SECRET).unwrap();
        let sig = parser.signature(r#"{"events":[]}"#);
        assert!(!parser.verify(r#"{"events":[{}]}"#, &sig));
        assert!(!parser.verify(r#"{"events":[]}"#, ""));
    }

    #[test]
    fn other_secret_fails_verification() {
        let body = r#"{"events":[]}"#;
        let sig = WebhookParser::new("other").unwrap().signature(body);
        let parser = WebhookParser::new(SECRET).unwrap();
        assert!(matches!(
            parser.parse(body, &sig),
            Err(CallbackError::InvalidSignature)
        ));
    }

    #[test]
    fn parses_text_message_event() {
        let parser = WebhookParser::new(SECRET).unwrap();
        let body = r#"{
            "destination": "Uxxxxxxxx",
            "events": [{
                "type": "message",
                "replyToken": "nHuyWiB7yP5Zw52FIkcQobQuGDXCTA",
                "source": { "type": "user", "userId": "U4af4980629" },
                "timestamp": 1462629479859,
                "mode": "active",
                "message": { "id": "325708", "type": "text", "text": "Hello, world" }
            }]
        }"#;

        let payload = parser.parse(body, &parser.signature(body)).unwrap();
        assert_eq!(payload.destination.as_deref(), Some("Uxxxxxxxx"));
        assert_eq!(payload.events.len(), 1);

        let Event::Message(ev) = &payload.events[0] else {
            panic!("expected message event, got {:?}", payload.events[0]);
        };
        assert_eq!(ev.reply_token.as_deref(), Some("nHuyWiB7yP5Zw52FIkcQobQuGDXCTA"));
        assert_eq!(ev.source.as_ref().and_then(Source::user_id), Some("U4af4980629"));
        assert_eq!(ev.sent_at().unwrap().timestamp(), 1462629479);
        assert!(matches!(&ev.message, MessageContent::Text { text, .. } if text == "Hello, world"));
    }

    #[test]
    fn non_text_messages_and_unknown_types_are_tolerated() {
        let parser = WebhookParser::new(SECRET).unwrap();
        let body = r#"{"events": [
            { "type": "message", "replyToken": "a",
              "message": { "id": "1", "type": "sticker", "packageId": "1", "stickerId": "2" } },
            { "type": "follow", "replyToken": "b" },
            { "type": "things", "replyToken": "c",
              "things": { "deviceId": "t1", "type": "scenarioResult" } },
            { "type": "accountLink", "replyToken": "d" }
        ]}"#;

        let payload = parser.parse(body, &parser.signature(body)).unwrap();
        let kinds: Vec<_> = payload.events.iter().map(Event::kind).collect();
        assert_eq!(kinds, ["message", "follow", "unknown", "unknown"]);
        assert!(matches!(
            &payload.events[0],
            Event::Message(MessageEvent { message: MessageContent::Other, .. })
        ));
    }

    #[test]
    fn standby_events_without_reply_token_parse() {
        let parser = WebhookParser::new(SECRET).unwrap();
        let body = r#"{"events": [
            { "type": "message", "mode": "standby",
              "message": { "type": "sticker", "id": "9", "packageId": "1", "stickerId": "2" } },
            { "type": "message", "mode": "standby",
              "message": { "type": "text", "text": "hi" } }
        ]}"#;

        let payload = parser.parse(body, &parser.signature(body)).unwrap();
        assert_eq!(payload.events.len(), 2);
        let Event::Message(ev) = &payload.events[1] else {
            panic!("expected message event, got {:?}", payload.events[1]);
        };
        assert!(ev.reply_token.is_none());
        assert!(matches!(&ev.message, MessageContent::Text { id: None, text } if text == "hi"));
    }

    #[test]
    fn missing_events_key_is_empty() {
        let parser = WebhookParser::new(SECRET).unwrap();
        let body = "{}";
        let payload = parser.parse(body, &parser.signature(body)).unwrap();
        assert!(payload.events.is_empty());
    }

    #[test]
    fn signed_garbage_is_malformed() {
        let parser = WebhookParser::new(SECRET).unwrap();
        let body = "not json";
        assert!(matches!(
            parser.parse(body, &parser.signature(body)),
            Err(CallbackError::MalformedBody(_))
        ));
    }
}
