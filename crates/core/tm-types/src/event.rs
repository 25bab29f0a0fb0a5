//! CloudTrail event projections.
//!
//! Records are carried through the pipeline as raw JSON so the bytes written
//! to the JSONL output are identical to the bytes CloudTrail delivered. Only
//! the handful of fields needed for routing and deduplication are parsed.

use serde::Deserialize;
use serde_json::value::RawValue;

/// The decoded payload of one CloudTrail log object.
#[derive(Debug, Default, Deserialize)]
pub struct LogFile {
    /// Raw event records, preserved verbatim.
    #[serde(rename = "Records", default)]
    pub records: Vec<Box<RawValue>>,
}

/// The `userIdentity` sub-object, reduced to the account fallback field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserIdentity {
    #[serde(rename = "accountId", default)]
    pub account_id: String,
}

/// Only the fields needed for deduplication and routing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MinimalEvent {
    #[serde(rename = "eventID", default)]
    pub event_id: String,

    #[serde(rename = "eventTime", default)]
    pub event_time: String,

    #[serde(rename = "awsRegion", default)]
    pub aws_region: String,

    #[serde(rename = "userIdentity", default)]
    pub user_identity: UserIdentity,

    #[serde(rename = "recipientAccountId", default)]
    pub recipient_account_id: String,
}

impl MinimalEvent {
    /// Resolve the account used for output routing.
    ///
    /// `recipientAccountId` wins; `userIdentity.accountId` is the fallback.
    /// Returns `None` when both are absent, in which case the record is
    /// skipped.
    pub fn resolved_account_id(&self) -> Option<&str> {
        if !self.recipient_account_id.is_empty() {
            Some(&self.recipient_account_id)
        } else if !self.user_identity.account_id.is_empty() {
            Some(&self.user_identity.account_id)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_event_parse() {
        let json = r#"{
            "eventID": "abc-123",
            "eventTime": "2024-03-15T12:34:56Z",
            "awsRegion": "us-east-1",
            "recipientAccountId": "123456789012",
            "userIdentity": {"accountId": "999999999999", "type": "IAMUser"},
            "eventName": "GetObject"
        }"#;

        let event: MinimalEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_id, "abc-123");
        assert_eq!(event.event_time, "2024-03-15T12:34:56Z");
        assert_eq!(event.aws_region, "us-east-1");
        assert_eq!(event.resolved_account_id(), Some("123456789012"));
    }

    #[test]
    fn test_account_fallback_to_user_identity() {
        let json = r#"{
            "eventID": "abc-123",
            "userIdentity": {"accountId": "999999999999"}
        }"#;

        let event: MinimalEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.resolved_account_id(), Some("999999999999"));
    }

    #[test]
    fn test_account_missing_everywhere() {
        let event: MinimalEvent = serde_json::from_str("{}").unwrap();
        assert_eq!(event.resolved_account_id(), None);
        assert!(event.event_id.is_empty());
    }

    #[test]
    fn test_log_file_preserves_record_bytes() {
        let json = r#"{"Records": [{"eventID":"a","nested":{"x":[1,2,3]}}, {"eventID":"b"}]}"#;

        let log: LogFile = serde_json::from_str(json).unwrap();
        assert_eq!(log.records.len(), 2);
        assert_eq!(log.records[0].get(), r#"{"eventID":"a","nested":{"x":[1,2,3]}}"#);
        assert_eq!(log.records[1].get(), r#"{"eventID":"b"}"#);
    }

    #[test]
    fn test_log_file_without_records() {
        let log: LogFile = serde_json::from_str("{}").unwrap();
        assert!(log.records.is_empty());
    }
}
