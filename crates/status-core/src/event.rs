//! AMI event model
//!
//! The transport hands the engine [`RawEvent`]s: a discriminator plus an
//! untyped header map. [`AmiEvent`] is the closed set of event kinds the engine
//! reacts to, with [`AmiEvent::Unrecognized`] covering everything else, so the
//! state machine dispatches on an exhaustive match instead of string compares.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::channel::display_name;
use crate::error::{EngineError, Result};

/// Header names consumed from AMI events.
pub mod fields {
    pub const UNIQUE_ID: &str = "Uniqueid";
    pub const LINKED_ID: &str = "Linkedid";
    pub const CALLER_ID_NUM: &str = "CallerIDNum";
    pub const CALLER_ID_NAME: &str = "CallerIDName";
    pub const EXTEN: &str = "Exten";
    pub const CHANNEL: &str = "Channel";
    pub const CHANNEL_STATE_DESC: &str = "ChannelStateDesc";
    pub const CONTEXT: &str = "Context";
    pub const FAMILY: &str = "Family";
    pub const KEY: &str = "Key";
    pub const VAL: &str = "Val";
}

/// Caller name reported by the PBX when it has none.
pub const UNKNOWN_CALLER_NAME: &str = "<unknown>";

/// An event exactly as delivered by the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    name: String,
    fields: HashMap<String, String>,
}

impl RawEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: HashMap::new(),
        }
    }

    /// Builder-style field insertion, mostly useful in tests and fake feeds
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_field(key, value);
        self
    }

    pub fn set_field(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    /// The event discriminator (the AMI `Event` header)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a header value.
    ///
    /// Header casing drifts between Asterisk releases (`Uniqueid` vs
    /// `UniqueID`), so an exact miss falls back to a case-insensitive scan.
    pub fn field(&self, key: &str) -> Option<&str> {
        if let Some(value) = self.fields.get(key) {
            return Some(value.as_str());
        }
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn required(&self, key: &str) -> Result<&str> {
        match self.field(key) {
            Some(value) if !value.is_empty() => Ok(value),
            Some(_) => Err(EngineError::malformed(&self.name, format!("empty {} header", key))),
            None => Err(EngineError::malformed(&self.name, format!("missing {} header", key))),
        }
    }

    fn optional(&self, key: &str) -> String {
        self.field(key).unwrap_or_default().to_string()
    }
}

/// Events that may change the call topology and therefore trigger a fresh
/// status collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallStateChange {
    Newstate,
    HangupRequest,
    DialEnd,
    Hangup,
    SoftHangupRequest,
}

impl CallStateChange {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStateChange::Newstate => "Newstate",
            CallStateChange::HangupRequest => "HangupRequest",
            CallStateChange::DialEnd => "DialEnd",
            CallStateChange::Hangup => "Hangup",
            CallStateChange::SoftHangupRequest => "SoftHangupRequest",
        }
    }
}

impl fmt::Display for CallStateChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recognized event kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmiEvent {
    FullyBooted,
    Shutdown,
    Status(ChannelEvent),
    StatusComplete,
    CallStateChanged(CallStateChange),
    DbGetResponse {
        family: Option<String>,
        key: String,
        value: String,
    },
    Unrecognized(String),
}

impl TryFrom<&RawEvent> for AmiEvent {
    type Error = EngineError;

    fn try_from(raw: &RawEvent) -> Result<Self> {
        let event = match raw.name() {
            "FullyBooted" => AmiEvent::FullyBooted,
            "Shutdown" => AmiEvent::Shutdown,
            "Status" => AmiEvent::Status(ChannelEvent::from_raw(raw)?),
            "StatusComplete" => AmiEvent::StatusComplete,
            "Newstate" => AmiEvent::CallStateChanged(CallStateChange::Newstate),
            "HangupRequest" => AmiEvent::CallStateChanged(CallStateChange::HangupRequest),
            "DialEnd" => AmiEvent::CallStateChanged(CallStateChange::DialEnd),
            "Hangup" => AmiEvent::CallStateChanged(CallStateChange::Hangup),
            "SoftHangupRequest" => AmiEvent::CallStateChanged(CallStateChange::SoftHangupRequest),
            "DBGetResponse" => AmiEvent::DbGetResponse {
                family: raw.field(fields::FAMILY).map(str::to_string),
                key: raw.required(fields::KEY)?.to_string(),
                value: raw.optional(fields::VAL),
            },
            other => AmiEvent::Unrecognized(other.to_string()),
        };
        Ok(event)
    }
}

/// One channel as reported by a `Status` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEvent {
    pub unique_id: String,
    /// Call group id; equal to `unique_id` on the primary leg. Never empty.
    pub linked_id: String,
    pub caller_id_number: String,
    pub caller_id_name: String,
    /// Dialed destination
    pub extension: String,
    pub channel_state_description: String,
    pub context: String,
    pub raw_channel_name: String,
    pub display_channel_name: String,
}

impl ChannelEvent {
    /// Normalize a `Status` event. Only the correlation ids are mandatory.
    pub fn from_raw(raw: &RawEvent) -> Result<Self> {
        let unique_id = raw.required(fields::UNIQUE_ID)?.to_string();
        let linked_id = raw.required(fields::LINKED_ID)?.to_string();
        let raw_channel_name = raw.optional(fields::CHANNEL);

        Ok(Self {
            display_channel_name: display_name(&raw_channel_name).to_string(),
            unique_id,
            linked_id,
            caller_id_number: raw.optional(fields::CALLER_ID_NUM),
            caller_id_name: raw.optional(fields::CALLER_ID_NAME),
            extension: raw.optional(fields::EXTEN),
            channel_state_description: raw.optional(fields::CHANNEL_STATE_DESC),
            context: raw.optional(fields::CONTEXT),
            raw_channel_name,
        })
    }

    /// Whether this is the originating leg of its call.
    pub fn is_primary(&self) -> bool {
        self.unique_id == self.linked_id
    }

    /// `"name(state)"` as shown in the status summary.
    pub fn leg_description(&self) -> String {
        format!("{}({})", self.display_channel_name, self.channel_state_description)
    }

    /// The caller name worth caching, if the PBX reported a real one.
    pub fn known_caller_name(&self) -> Option<&str> {
        let name = self.caller_id_name.as_str();
        if name.is_empty() || name == UNKNOWN_CALLER_NAME {
            None
        } else {
            Some(name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_event() -> RawEvent {
        RawEvent::new("Status")
            .with_field("Uniqueid", "1700000000.1")
            .with_field("Linkedid", "1700000000.1")
            .with_field("CallerIDNum", "100")
            .with_field("CallerIDName", "<unknown>")
            .with_field("Exten", "200")
            .with_field("Channel", "SIP/100-0000001a")
            .with_field("ChannelStateDesc", "Up")
            .with_field("Context", "from-internal")
    }

    #[test]
    fn test_status_event_is_normalized() {
        let event = AmiEvent::try_from(&status_event()).unwrap();
        let AmiEvent::Status(channel) = event else {
            panic!("expected a Status event, got {:?}", event);
        };

        assert!(channel.is_primary());
        assert_eq!(channel.display_channel_name, "100");
        assert_eq!(channel.raw_channel_name, "SIP/100-0000001a");
        assert_eq!(channel.leg_description(), "100(Up)");
        assert_eq!(channel.known_caller_name(), None);
    }

    #[test]
    fn test_status_without_linked_id_is_malformed() {
        let raw = RawEvent::new("Status").with_field("Uniqueid", "1.1");
        let err = AmiEvent::try_from(&raw).unwrap_err();
        assert!(matches!(err, EngineError::MalformedEvent { .. }));
        assert!(err.to_string().contains("Linkedid"));
    }

    #[test]
    fn test_field_lookup_ignores_case() {
        let raw = RawEvent::new("Status").with_field("UniqueID", "42");
        assert_eq!(raw.field("Uniqueid"), Some("42"));
        assert_eq!(raw.field("Linkedid"), None);
    }

    #[test]
    fn test_call_state_events_are_recognized() {
        for name in ["Newstate", "HangupRequest", "DialEnd", "Hangup", "SoftHangupRequest"] {
            let event = AmiEvent::try_from(&RawEvent::new(name)).unwrap();
            match event {
                AmiEvent::CallStateChanged(change) => assert_eq!(change.as_str(), name),
                other => panic!("{} parsed as {:?}", name, other),
            }
        }
    }

    #[test]
    fn test_unknown_event_is_unrecognized() {
        let event = AmiEvent::try_from(&RawEvent::new("PeerStatus")).unwrap();
        assert_eq!(event, AmiEvent::Unrecognized("PeerStatus".to_string()));
    }

    #[test]
    fn test_db_get_response() {
        let raw = RawEvent::new("DBGetResponse")
            .with_field("Family", "cidname")
            .with_field("Key", "100")
            .with_field("Val", "Reception");
        assert_eq!(
            AmiEvent::try_from(&raw).unwrap(),
            AmiEvent::DbGetResponse {
                family: Some("cidname".to_string()),
                key: "100".to_string(),
                value: "Reception".to_string(),
            }
        );
    }
}
