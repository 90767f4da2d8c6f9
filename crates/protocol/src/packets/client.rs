//! Client -> Server message parsing.

use serde_json::Value;

use super::client_tag;
use crate::{validate_player_id, validate_player_name, ProtocolError};

/// Parsed client message.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Introduce a player, optionally reattaching to an existing identity.
    NewPlayer { name: String, id: Option<String> },
    /// Enter play.
    Join,
    /// Latency probe, echoed back as `pong`.
    Ping(Value),
    /// Direction keypress (0=up, 1=down, 2=left, 3=right).
    Key(i64),
}

impl ClientMessage {
    /// Parse a client message from a text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        let items = match value {
            Value::Array(items) if !items.is_empty() => items,
            _ => return Err(ProtocolError::NotAList),
        };

        match &items[0] {
            Value::Number(n) => n
                .as_i64()
                .map(ClientMessage::Key)
                .ok_or_else(|| ProtocolError::UnknownMessage(n.to_string())),
            Value::String(tag) => match tag.as_str() {
                client_tag::NEW_PLAYER => {
                    let name = match items.get(1) {
                        Some(value) => validate_player_name(&stringify(value))?,
                        None => return Err(ProtocolError::MissingArgument(client_tag::NEW_PLAYER)),
                    };
                    let id = match items.get(2) {
                        None | Some(Value::Null) => None,
                        Some(value) => Some(validate_player_id(&stringify(value))?),
                    };
                    Ok(ClientMessage::NewPlayer { name, id })
                }
                client_tag::JOIN => Ok(ClientMessage::Join),
                client_tag::PING => Ok(ClientMessage::Ping(
                    items.get(1).cloned().unwrap_or(Value::Null),
                )),
                other => Err(ProtocolError::UnknownMessage(other.to_string())),
            },
            other => Err(ProtocolError::UnknownMessage(other.to_string())),
        }
    }
}

/// Names and ids are accepted as any scalar and compared as strings.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keypress() {
        assert_eq!(ClientMessage::parse("[2]").unwrap(), ClientMessage::Key(2));
    }

    #[test]
    fn test_parse_new_player_without_id() {
        let msg = ClientMessage::parse(r#"["new_player", " Ada "]"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::NewPlayer {
                name: "Ada".into(),
                id: None
            }
        );
    }

    #[test]
    fn test_parse_new_player_with_id() {
        let msg = ClientMessage::parse(r#"["new_player", "Ada", "abc-123"]"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::NewPlayer {
                name: "Ada".into(),
                id: Some("abc-123".into())
            }
        );
    }

    #[test]
    fn test_reject_bad_name_and_id() {
        assert!(matches!(
            ClientMessage::parse(r#"["new_player", ""]"#),
            Err(ProtocolError::InvalidPlayerName)
        ));
        let long_id = "x".repeat(40);
        let text = format!(r#"["new_player", "Ada", "{long_id}"]"#);
        assert!(matches!(
            ClientMessage::parse(&text),
            Err(ProtocolError::InvalidPlayerId)
        ));
    }

    #[test]
    fn test_parse_ping_keeps_payload() {
        let msg = ClientMessage::parse(r#"["ping", {"t": 17}]"#).unwrap();
        assert_eq!(msg, ClientMessage::Ping(serde_json::json!({"t": 17})));
    }

    #[test]
    fn test_reject_garbage() {
        assert!(matches!(ClientMessage::parse("{}"), Err(ProtocolError::NotAList)));
        assert!(matches!(ClientMessage::parse("[]"), Err(ProtocolError::NotAList)));
        assert!(matches!(ClientMessage::parse("not json"), Err(ProtocolError::Malformed(_))));
        assert!(matches!(
            ClientMessage::parse(r#"["dance"]"#),
            Err(ProtocolError::UnknownMessage(_))
        ));
    }
}
