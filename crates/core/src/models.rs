use std::fmt;

use serde::{Deserialize, Deserializer};

/// One raw EVM log as delivered by the chain-event provider.
///
/// `topics` and `data` are left optional so that a log missing either can still
/// be represented and rejected by the decoder rather than failing the record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawLog {
    pub address: String,
    #[serde(default)]
    pub topics: Option<Vec<String>>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub hash: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub block_num: Option<String>,
    pub log: RawLog,
}

impl fmt::Display for ActivityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tx {} (block {})",
            self.hash.as_deref().unwrap_or("[unknown]"),
            self.block_num.as_deref().unwrap_or("[unknown]")
        )
    }
}

/// Accept any JSON scalar for fields that are only ever logged.
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// An activity entry that failed to deserialize. The rest of the batch is unaffected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRecord {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityEntry {
    Record(ActivityRecord),
    Malformed(MalformedRecord),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEnvelope {
    pub webhook_id: Option<String>,
    pub kind: Option<String>,
    pub activity: Vec<ActivityEntry>,
}

/// Result of validating an inbound delivery body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    Valid(WebhookEnvelope),
    Malformed(String),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEnvelope {
    #[serde(default)]
    webhook_id: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    event: WireEvent,
}

#[derive(Deserialize)]
struct WireEvent {
    activity: Vec<serde_json::Value>,
}

impl Envelope {
    /// Validate the envelope shape, then each activity entry independently.
    pub fn parse(body: &[u8]) -> Self {
        let wire: WireEnvelope = match serde_json::from_slice(body) {
            Ok(wire) => wire,
            Err(e) => return Self::Malformed(e.to_string()),
        };
        let activity = wire
            .event
            .activity
            .into_iter()
            .enumerate()
            .map(|(index, value)| match serde_json::from_value::<ActivityRecord>(value) {
                Ok(record) => ActivityEntry::Record(record),
                Err(e) => {
                    ActivityEntry::Malformed(MalformedRecord { index, reason: e.to_string() })
                }
            })
            .collect();
        Self::Valid(WebhookEnvelope { webhook_id: wire.webhook_id, kind: wire.kind, activity })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_envelope() {
        let body = br#"{
            "webhookId": "wh_123",
            "id": "whevt_1",
            "type": "GRAPHQL",
            "event": {
                "activity": [{
                    "hash": "0xabc",
                    "blockNum": "0x10",
                    "log": {
                        "address": "0x00000000000000000000000000000000000000aa",
                        "topics": ["0x01", "0x02"],
                        "data": "0x"
                    }
                }]
            }
        }"#;
        let Envelope::Valid(envelope) = Envelope::parse(body) else {
            panic!("expected valid envelope");
        };
        assert_eq!(envelope.webhook_id.as_deref(), Some("wh_123"));
        assert_eq!(envelope.kind.as_deref(), Some("GRAPHQL"));
        assert_eq!(envelope.activity.len(), 1);
        let ActivityEntry::Record(record) = &envelope.activity[0] else {
            panic!("expected record");
        };
        assert_eq!(record.hash.as_deref(), Some("0xabc"));
        assert_eq!(record.block_num.as_deref(), Some("0x10"));
        assert_eq!(record.log.topics.as_ref().map(Vec::len), Some(2));
        assert_eq!(record.log.data.as_deref(), Some("0x"));
    }

    #[test]
    fn test_parse_malformed_envelopes() {
        let cases: &[&[u8]] = &[
            b"",
            b"not json",
            b"[]",
            br#"{"webhookId":"wh"}"#,
            br#"{"event":{}}"#,
            br#"{"event":{"activity":{}}}"#,
            br#"{"event":{"activity":"nope"}}"#,
        ];
        for &body in cases {
            assert!(
                matches!(Envelope::parse(body), Envelope::Malformed(_)),
                "{:?}",
                String::from_utf8_lossy(body)
            );
        }
    }

    #[test]
    fn test_empty_activity_is_valid() {
        let Envelope::Valid(envelope) = Envelope::parse(br#"{"event":{"activity":[]}}"#) else {
            panic!("expected valid envelope");
        };
        assert!(envelope.activity.is_empty());
    }

    #[test]
    fn test_malformed_record_does_not_poison_batch() {
        let body = br#"{"event":{"activity":[
            {"hash": "0x1"},
            {"log": {"address": "0xaa", "topics": "oops"}},
            {"hash": "0x3", "log": {"address": "0xaa"}}
        ]}}"#;
        let Envelope::Valid(envelope) = Envelope::parse(body) else {
            panic!("expected valid envelope");
        };
        assert_eq!(envelope.activity.len(), 3);
        assert!(matches!(&envelope.activity[0], ActivityEntry::Malformed(m) if m.index == 0));
        assert!(matches!(&envelope.activity[1], ActivityEntry::Malformed(m) if m.index == 1));
        let ActivityEntry::Record(record) = &envelope.activity[2] else {
            panic!("expected record");
        };
        assert_eq!(record.log.topics, None);
        assert_eq!(record.log.data, None);
    }

    #[test]
    fn test_numeric_block_number_is_accepted() {
        let body = br#"{"event":{"activity":[
            {"hash": "0x1", "blockNum": 16, "log": {"address": "0xaa", "topics": [], "data": "0x"}},
            {"hash": null, "blockNum": "0x10", "log": {"address": "0xaa"}}
        ]}}"#;
        let Envelope::Valid(envelope) = Envelope::parse(body) else {
            panic!("expected valid envelope");
        };
        let ActivityEntry::Record(first) = &envelope.activity[0] else {
            panic!("expected record");
        };
        assert_eq!(first.block_num.as_deref(), Some("16"));
        assert_eq!(first.to_string(), "tx 0x1 (block 16)");
        let ActivityEntry::Record(second) = &envelope.activity[1] else {
            panic!("expected record");
        };
        assert_eq!(second.hash, None);
        assert_eq!(second.to_string(), "tx [unknown] (block 0x10)");
    }
}
