//! Recorded request/response transcripts.
//!
//! A transcript captures one sanitized HTTP exchange: the canonical
//! request, the response metadata, and the body as an ordered list of
//! `[type, payload]` events (`status`, `headers`, `data`, `done`).
//! Streaming exchanges carry one `data` event per received body chunk;
//! non-streaming exchanges carry a single `data` event.

use crate::redact;
use chrono::{DateTime, Utc};
use mp_domain::error::{Error, Result};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    /// The JSON body exactly as encoded (canonical form).
    pub canonical_json: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// One replayable wire event.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptEvent {
    Status(u16),
    Headers(BTreeMap<String, String>),
    Data(String),
    Done,
}

impl Serialize for TranscriptEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let (kind, payload) = match self {
            TranscriptEvent::Status(status) => ("status", Value::from(*status)),
            TranscriptEvent::Headers(headers) => (
                "headers",
                serde_json::to_value(headers).map_err(serde::ser::Error::custom)?,
            ),
            TranscriptEvent::Data(data) => ("data", Value::String(data.clone())),
            TranscriptEvent::Done => ("done", Value::Null),
        };
        (kind, payload).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TranscriptEvent {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let (kind, payload): (String, Value) = Deserialize::deserialize(deserializer)?;
        match kind.as_str() {
            "status" => {
                let status = payload
                    .as_u64()
                    .ok_or_else(|| D::Error::custom("status payload must be a number"))?;
                Ok(TranscriptEvent::Status(status as u16))
            }
            "headers" => {
                let headers =
                    serde_json::from_value(payload).map_err(D::Error::custom)?;
                Ok(TranscriptEvent::Headers(headers))
            }
            "data" => {
                let data = payload
                    .as_str()
                    .ok_or_else(|| D::Error::custom("data payload must be a string"))?;
                Ok(TranscriptEvent::Data(data.to_string()))
            }
            "done" => Ok(TranscriptEvent::Done),
            other => Err(D::Error::custom(format!("unknown event type {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub provider: String,
    pub model_spec: String,
    pub captured_at: DateTime<Utc>,
    pub request: TranscriptRequest,
    pub response_meta: ResponseMeta,
    pub events: Vec<TranscriptEvent>,
}

impl Transcript {
    /// Record an exchange. Sensitive header values and URL query
    /// parameters are redacted here, before anything can reach disk.
    pub fn record(
        provider: impl Into<String>,
        model_spec: impl Into<String>,
        mut request: TranscriptRequest,
        mut response_meta: ResponseMeta,
        events: Vec<TranscriptEvent>,
    ) -> Result<Self> {
        redact::sanitize_headers(&mut request.headers);
        request.url = redact::redact_url(&request.url)?;
        redact::sanitize_headers(&mut response_meta.headers);
        Ok(Self {
            provider: provider.into(),
            model_spec: model_spec.into(),
            captured_at: Utc::now(),
            request,
            response_meta,
            events,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| Error::Validation(format!("malformed transcript: {e}")))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    /// The recorded body chunks, in wire order.
    pub fn data_chunks(&self) -> Vec<Vec<u8>> {
        self.events
            .iter()
            .filter_map(|e| match e {
                TranscriptEvent::Data(data) => Some(data.clone().into_bytes()),
                _ => None,
            })
            .collect()
    }

    /// The full response body (all data events concatenated).
    pub fn body(&self) -> String {
        self.events
            .iter()
            .filter_map(|e| match e {
                TranscriptEvent::Data(data) => Some(data.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Streaming transcripts carry more than one data event.
    pub fn is_streaming(&self) -> bool {
        self.events
            .iter()
            .filter(|e| matches!(e, TranscriptEvent::Data(_)))
            .count()
            > 1
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_request() -> TranscriptRequest {
        TranscriptRequest {
            method: "POST".into(),
            url: "https://api.openai.com/v1/chat/completions".into(),
            headers: BTreeMap::from([
                ("authorization".to_string(), "Bearer sk-abc".to_string()),
                ("content-type".to_string(), "application/json".to_string()),
            ]),
            canonical_json: json!({"model": "gpt-4o-mini", "messages": []}),
        }
    }

    #[test]
    fn record_redacts_headers_and_url() {
        let mut request = sample_request();
        request.url = "https://g.test/v1:generateContent?key=XYZ".into();
        let transcript = Transcript::record(
            "google",
            "google:gemini-2.0-flash",
            request,
            ResponseMeta {
                status: 200,
                headers: BTreeMap::new(),
            },
            vec![TranscriptEvent::Data("{}".into()), TranscriptEvent::Done],
        )
        .unwrap();

        assert_eq!(
            transcript.request.headers["authorization"],
            "[REDACTED:authorization]"
        );
        assert!(transcript.request.url.contains("key=%5BREDACTED%3Akey%5D"));

        // The on-disk form contains no original secret either.
        let raw = serde_json::to_string(&transcript).unwrap();
        assert!(!raw.contains("sk-abc"));
        assert!(!raw.contains("key=XYZ"));
    }

    #[test]
    fn event_tuples_roundtrip() {
        let events = vec![
            TranscriptEvent::Status(200),
            TranscriptEvent::Headers(BTreeMap::from([(
                "content-type".to_string(),
                "text/event-stream".to_string(),
            )])),
            TranscriptEvent::Data("data: {}\n\n".into()),
            TranscriptEvent::Done,
        ];
        let raw = serde_json::to_string(&events).unwrap();
        let parsed: Vec<TranscriptEvent> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, events);

        // Wire form is [type, payload] pairs.
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value[0], json!(["status", 200]));
        assert_eq!(value[3], json!(["done", null]));
    }

    #[test]
    fn transcript_roundtrips_through_disk() {
        let transcript = Transcript::record(
            "openai",
            "openai:gpt-4o-mini",
            sample_request(),
            ResponseMeta {
                status: 200,
                headers: BTreeMap::new(),
            },
            vec![
                TranscriptEvent::Status(200),
                TranscriptEvent::Data("{\"ok\":true}".into()),
                TranscriptEvent::Done,
            ],
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.json");
        transcript.save(&path).unwrap();
        let loaded = Transcript::load(&path).unwrap();
        assert_eq!(loaded, transcript);
    }

    #[test]
    fn streaming_detection() {
        let single = vec![TranscriptEvent::Data("{}".into())];
        let multi = vec![
            TranscriptEvent::Data("data: a\n\n".into()),
            TranscriptEvent::Data("data: b\n\n".into()),
        ];
        let make = |events| {
            Transcript::record(
                "openai",
                "openai:gpt-4o-mini",
                sample_request(),
                ResponseMeta {
                    status: 200,
                    headers: BTreeMap::new(),
                },
                events,
            )
            .unwrap()
        };
        assert!(!make(single).is_streaming());
        assert!(make(multi).is_streaming());
    }

    #[test]
    fn unknown_event_type_rejected() {
        let raw = r#"[["bogus", 1]]"#;
        assert!(serde_json::from_str::<Vec<TranscriptEvent>>(raw).is_err());
    }
}
