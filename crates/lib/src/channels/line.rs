//! LINE channel: webhook payload types, `x-line-signature` verification, and replies
//! via the Messaging API reply endpoint.

use crate::channels::handle::ReplyChannel;
use crate::channels::inbound::InboundMessage;
use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the base64 HMAC-SHA256 of the raw request body.
pub const SIGNATURE_HEADER: &str = "x-line-signature";

const REPLY_PATH: &str = "/v2/bot/message/reply";

#[derive(Debug, thiserror::Error)]
pub enum LineError {
    #[error("line request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("line api error: {0}")]
    Api(String),
    #[error("line channel access token not configured")]
    NotConfigured,
}

/// Webhook POST body. Only the JSON syntax is checked up front; each element of `events`
/// is typed on its own so one odd event does not sink the batch.
#[derive(Debug)]
pub struct WebhookPayload {
    events: Vec<Value>,
}

impl WebhookPayload {
    /// Parse the raw body. `events` that is absent, null, or not an array reads as empty,
    /// as does a body that is valid JSON but not an object.
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_slice(body)?;
        let events = match value {
            Value::Object(mut map) => match map.remove("events") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };
        Ok(Self { events })
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events in order; an element that does not fit [`WebhookEvent`] yields its error.
    pub fn events(&self) -> impl Iterator<Item = Result<WebhookEvent, serde_json::Error>> + '_ {
        self.events.iter().map(WebhookEvent::deserialize)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(rename = "type", default)]
    pub typ: String,
    #[serde(default)]
    pub reply_token: Option<String>,
    #[serde(default)]
    pub message: Option<EventMessage>,
}

#[derive(Debug, Deserialize)]
pub struct EventMessage {
    #[serde(rename = "type", default)]
    pub typ: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl WebhookEvent {
    /// The text and reply token when this is a text message event; None for everything else
    /// (follow, postback, stickers, images, or a message without a reply token).
    pub fn text_message(&self) -> Option<InboundMessage> {
        if self.typ != "message" {
            return None;
        }
        let message = self.message.as_ref()?;
        if message.typ != "text" {
            return None;
        }
        Some(InboundMessage {
            reply_token: self.reply_token.clone()?,
            text: message.text.clone()?,
        })
    }
}

/// Base64 HMAC-SHA256 of `body` keyed by the channel secret.
pub fn sign_body(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

/// True when `signature` is the base64 HMAC-SHA256 of `body`. The MAC comparison is constant time.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(provided) = base64::engine::general_purpose::STANDARD.decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&provided).is_ok()
}

/// LINE reply connector: POSTs text replies with the channel access token.
pub struct LineChannel {
    id: String,
    access_token: Option<String>,
    api_base: String,
    client: reqwest::Client,
}

impl LineChannel {
    pub fn new(access_token: Option<String>, api_base: &str, timeout: Duration) -> Self {
        Self {
            id: "line".to_string(),
            access_token,
            api_base: api_base.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    /// POST /v2/bot/message/reply with a single text message.
    pub async fn reply_text(&self, reply_token: &str, text: &str) -> Result<(), LineError> {
        let token = self.access_token.as_ref().ok_or(LineError::NotConfigured)?;
        let url = format!("{}{}", self.api_base, REPLY_PATH);
        let body = serde_json::json!({
            "replyToken": reply_token,
            "messages": [{ "type": "text", "text": text }],
        });
        let res = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(LineError::Api(format!("{} {}", status, body)));
        }
        Ok(())
    }
}

#[async_trait]
impl ReplyChannel for LineChannel {
    fn id(&self) -> &str {
        &self.id
    }

    async fn reply(&self, reply_token: &str, text: &str) -> Result<(), LineError> {
        self.reply_text(reply_token, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "channel-secret";

    #[test]
    fn sign_and_verify() {
        let body = br#"{"events":[]}"#;
        let sig = sign_body(SECRET, body);
        assert!(verify_signature(SECRET, body, &sig));
        assert!(!verify_signature("other-secret", body, &sig));
        assert!(!verify_signature(SECRET, br#"{"events":[ ]}"#, &sig));
    }

    #[test]
    fn known_vector() {
        // HMAC-SHA256("key", "The quick brown fox jumps over the lazy dog")
        let sig = sign_body("key", b"The quick brown fox jumps over the lazy dog");
        assert_eq!(sig, "97yD9DBThCSxMpjmqm+xQ+9NWaFJRhdZl0edvC0aPNg=");
    }

    #[test]
    fn any_bit_flip_is_rejected() {
        let body = r#"{"events":[{"type":"message","message":{"type":"text","text":"สวัสดี"}}]}"#
            .as_bytes()
            .to_vec();
        let sig = sign_body(SECRET, &body);
        for i in 0..body.len() {
            for bit in 0..8 {
                let mut mutated = body.clone();
                mutated[i] ^= 1 << bit;
                assert!(
                    !verify_signature(SECRET, &mutated, &sig),
                    "flip at byte {} bit {} accepted",
                    i,
                    bit
                );
            }
        }
    }

    #[test]
    fn malformed_or_empty_signature_is_rejected() {
        let body = b"{}";
        assert!(!verify_signature(SECRET, body, ""));
        assert!(!verify_signature(SECRET, body, "not base64 !!"));
        let sig = sign_body(SECRET, body);
        assert!(!verify_signature(SECRET, body, &sig[..sig.len() - 4]));
        assert!(!verify_signature(SECRET, body, &format!("  {}\t", sig)));
        assert!(!verify_signature(SECRET, body, &format!("{}\n", sig)));
        assert!(verify_signature(SECRET, body, &sig));
    }

    #[test]
    fn text_message_extraction() {
        let payload = WebhookPayload::parse(
            br#"{"destination":"U1","events":[
                {"type":"message","replyToken":"abc","message":{"type":"text","id":"1","text":"hi"}},
                {"type":"message","replyToken":"def","message":{"type":"sticker","id":"2"}},
                {"type":"follow","replyToken":"ghi"},
                {"type":"message","message":{"type":"text","text":"no token"}}
            ]}"#,
        )
        .expect("parse");
        let texts: Vec<InboundMessage> = payload
            .events()
            .filter_map(|e| e.ok())
            .filter_map(|e| e.text_message())
            .collect();
        assert_eq!(
            texts,
            vec![InboundMessage {
                reply_token: "abc".to_string(),
                text: "hi".to_string(),
            }]
        );
    }

    #[test]
    fn missing_or_odd_events_is_empty() {
        for body in [
            &b"{}"[..],
            br#"{"events":null}"#,
            br#"{"events":"x"}"#,
            b"null",
            b"[1,2]",
        ] {
            let payload = WebhookPayload::parse(body).expect("parse");
            assert!(payload.is_empty());
        }
    }

    #[test]
    fn syntax_error_fails_parse() {
        assert!(WebhookPayload::parse(b"{not json").is_err());
        assert!(WebhookPayload::parse(b"").is_err());
    }

    #[test]
    fn ill_typed_event_is_isolated() {
        let payload = WebhookPayload::parse(
            br#"{"events":[
                {"type":"message","replyToken":"r","message":{"type":"text","text":"hi"}},
                {"type":"things","message":"str"},
                {"type":7}
            ]}"#,
        )
        .expect("parse");
        assert_eq!(payload.len(), 3);
        let parsed: Vec<_> = payload.events().collect();
        assert!(parsed[0].is_ok());
        assert!(parsed[1].is_err());
        assert!(parsed[2].is_err());
    }

    #[tokio::test]
    async fn reply_without_token_is_not_configured() {
        let channel = LineChannel::new(None, "http://127.0.0.1:9", Duration::from_secs(1));
        let err = channel.reply("abc", "hi").await.unwrap_err();
        assert!(matches!(err, LineError::NotConfigured));
    }
}
