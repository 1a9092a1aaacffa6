//! AMI wire format
//!
//! Every message is a block of `Key: Value` lines terminated by CRLF, and
//! blocks are separated by an empty line. Blocks carrying `Event` are
//! unsolicited (or list-style) events, blocks carrying `Response` answer an
//! action and echo its `ActionID`.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use callstatus_core::RawEvent;

use crate::error::{AmiError, Result};

const EVENT_HEADER: &str = "Event";
const RESPONSE_HEADER: &str = "Response";
const ACTION_ID_HEADER: &str = "ActionID";
const MESSAGE_HEADER: &str = "Message";

/// Answer to an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmiResponse {
    /// `Success`, `Error`, `Follows` or `Goodbye`
    pub status: String,
    pub action_id: Option<String>,
    pub message: Option<String>,
    pub headers: Vec<(String, String)>,
}

impl AmiResponse {
    pub fn is_success(&self) -> bool {
        !self.status.eq_ignore_ascii_case("Error")
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmiMessage {
    Event(RawEvent),
    Response(AmiResponse),
}

/// Split one header line. Continuation lines without a colon yield `None`.
fn split_header(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(':')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, value.strip_prefix(' ').unwrap_or(value).trim_end()))
}

/// Decode one message block (without its terminating empty line).
pub fn parse_message(lines: &[String]) -> Result<AmiMessage> {
    let headers: Vec<(String, String)> = lines
        .iter()
        .filter_map(|line| split_header(line))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let find = |name: &str| {
        headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    };

    if let Some(name) = find(EVENT_HEADER) {
        let mut event = RawEvent::new(name);
        for (key, value) in headers.iter().filter(|(k, _)| !k.eq_ignore_ascii_case(EVENT_HEADER)) {
            event.set_field(key.as_str(), value.as_str());
        }
        return Ok(AmiMessage::Event(event));
    }

    if let Some(status) = find(RESPONSE_HEADER) {
        return Ok(AmiMessage::Response(AmiResponse {
            status,
            action_id: find(ACTION_ID_HEADER),
            message: find(MESSAGE_HEADER),
            headers,
        }));
    }

    Err(AmiError::Protocol(format!(
        "message has neither Event nor Response header: {:?}",
        lines.first()
    )))
}

/// Read the next message block. `Ok(None)` on a clean end of stream.
pub async fn read_block<R>(reader: &mut R) -> Result<Option<Vec<String>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = Vec::new();
    let mut buf = String::new();

    loop {
        buf.clear();
        if reader.read_line(&mut buf).await? == 0 {
            if lines.is_empty() {
                return Ok(None);
            }
            return Err(AmiError::Protocol("stream ended inside a message".to_string()));
        }

        let line = buf.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            if lines.is_empty() {
                continue;
            }
            return Ok(Some(lines));
        }
        lines.push(line.to_string());
    }
}

/// An outbound action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmiAction {
    name: String,
    headers: Vec<(String, String)>,
}

impl AmiAction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn login(username: &str, secret: &str) -> Self {
        Self::new("Login")
            .header("Username", username)
            .header("Secret", secret)
            .header("Events", "on")
    }

    pub fn logoff() -> Self {
        Self::new("Logoff")
    }

    pub fn status() -> Self {
        Self::new("Status")
    }

    pub fn db_get(family: &str, key: &str) -> Self {
        Self::new("DBGet").header("Family", family).header("Key", key)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Serialize with the given action id. CR and LF are stripped from
    /// values so a header cannot smuggle extra lines onto the wire.
    pub fn to_wire(&self, action_id: &str) -> String {
        let clean = |s: &str| s.replace(['\r', '\n'], "");

        let mut out = format!("Action: {}\r\nActionID: {}\r\n", clean(&self.name), clean(action_id));
        for (key, value) in &self.headers {
            out.push_str(&clean(key));
            out.push_str(": ");
            out.push_str(&clean(value));
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lines(raw: &str) -> Vec<String> {
        raw.lines().map(str::to_string).collect()
    }

    #[test]
    fn test_parse_event() {
        let msg = parse_message(&lines(
            "Event: Status\nPrivilege: Call\nChannel: SIP/100-00000001\nUniqueid: 1700.1\nLinkedid: 1700.1\nCallerIDName: <unknown>",
        ))
        .unwrap();

        let AmiMessage::Event(event) = msg else {
            panic!("expected an event");
        };
        assert_eq!(event.name(), "Status");
        assert_eq!(event.field("Channel"), Some("SIP/100-00000001"));
        assert_eq!(event.field("CallerIDName"), Some("<unknown>"));
        assert_eq!(event.field("Event"), None);
    }

    #[test]
    fn test_parse_response() {
        let msg = parse_message(&lines(
            "Response: Error\nActionID: 7\nMessage: Database entry not found",
        ))
        .unwrap();

        let AmiMessage::Response(response) = msg else {
            panic!("expected a response");
        };
        assert!(!response.is_success());
        assert_eq!(response.action_id.as_deref(), Some("7"));
        assert_eq!(response.message.as_deref(), Some("Database entry not found"));
    }

    #[test]
    fn test_values_may_contain_colons() {
        let msg = parse_message(&lines("Event: VarSet\nValue: sip:100@pbx:5060")).unwrap();
        let AmiMessage::Event(event) = msg else {
            panic!("expected an event");
        };
        assert_eq!(event.field("Value"), Some("sip:100@pbx:5060"));
    }

    #[test]
    fn test_block_without_discriminator_is_rejected() {
        assert!(matches!(
            parse_message(&lines("Foo: bar")),
            Err(AmiError::Protocol(_))
        ));
    }

    #[test]
    fn test_action_to_wire() {
        assert_eq!(
            AmiAction::db_get("cidname", "100").to_wire("3"),
            "Action: DBGet\r\nActionID: 3\r\nFamily: cidname\r\nKey: 100\r\n\r\n"
        );
    }

    #[test]
    fn test_action_strips_line_breaks() {
        let wire = AmiAction::db_get("cidname", "100\r\nAction: Originate").to_wire("1");
        assert_eq!(
            wire,
            "Action: DBGet\r\nActionID: 1\r\nFamily: cidname\r\nKey: 100Action: Originate\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn test_read_blocks() {
        let data: &[u8] = b"\r\nEvent: FullyBooted\r\nStatus: Fully Booted\r\n\r\nResponse: Success\r\nActionID: 1\r\n\r\n";
        let mut reader = tokio::io::BufReader::new(data);

        let first = read_block(&mut reader).await.unwrap().unwrap();
        assert_eq!(first, vec!["Event: FullyBooted", "Status: Fully Booted"]);

        let second = read_block(&mut reader).await.unwrap().unwrap();
        assert_eq!(second, vec!["Response: Success", "ActionID: 1"]);

        assert!(read_block(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_truncated_block_is_an_error() {
        let data: &[u8] = b"Event: Status\r\nChannel: SIP/1";
        let mut reader = tokio::io::BufReader::new(data);

        assert!(matches!(read_block(&mut reader).await, Err(AmiError::Protocol(_))));
    }
}
