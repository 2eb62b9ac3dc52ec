//! Engine.IO-style text framing used by the inout brand.
//!
//! Every frame is a decimal message type optionally followed by a JSON
//! array: `2` (ping), `40` (namespace connect), `421["gameService",{...}]`.
//! Custom frames `42<n>` are acknowledged with `43<n>`, so the digits after
//! the leading `42` double as a request id.

use std::collections::BTreeMap;

use serde_json::{Value, json};

use crate::{Command, ProtocolError};

/// Client keep-alive ping, and the frame the heartbeat pushes.
pub const PING: &str = "2";
/// Reply to [`PING`].
pub const PONG: &str = "3";
/// Namespace connect request.
pub const CONNECT: &str = "40";
/// Message id used for unsolicited server events.
pub const DEFAULT_MSG_ID: &str = "42";

/// Reserved custom actions handled by the adapter rather than a room.
pub const ACTION_GAME_SERVICE: &str = "gameService";
pub const ACTION_LATENCY_TEST: &str = "gameService-latencyTest";
pub const ACTION_BETS_HISTORY: &str = "gameService-get-my-bets-history";
pub const ACTION_CHANGE_AVATAR: &str = "changeGameAvatar";

/// A frame split into its numeric type and optional JSON array body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet<'a> {
    pub msg_type: &'a str,
    pub body: Option<&'a str>,
}

impl<'a> Packet<'a> {
    /// Whether this is a `42<n>` custom event.
    pub fn is_event(&self) -> bool {
        self.msg_type.starts_with(DEFAULT_MSG_ID)
    }

    /// The `43<n>` acknowledgement id for a `4x<n>` frame.
    pub fn response_type(&self) -> Option<String> {
        response_type(self.msg_type)
    }
}

/// Splits `text` into `(digits, [json])`.
///
/// Accepts exactly `^\d+(\[.*\])?$`; anything else is rejected.
pub fn parse(text: &str) -> Result<Packet<'_>, ProtocolError> {
    let digits = text.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return Err(ProtocolError::InvalidMessage(format!(
            "frame has no message type: {text:?}"
        )));
    }
    let (msg_type, rest) = text.split_at(digits);
    let body = match rest {
        "" => None,
        r if r.starts_with('[') && r.ends_with(']') => Some(r),
        _ => {
            return Err(ProtocolError::InvalidMessage(format!(
                "frame body is not an array: {text:?}"
            )));
        }
    };
    Ok(Packet { msg_type, body })
}

/// `4x<n>` becomes `43<n>`. Types shorter than two digits have no reply.
pub fn response_type(msg_type: &str) -> Option<String> {
    if msg_type.len() < 2 || !msg_type.starts_with('4') {
        return None;
    }
    Some(format!("43{}", &msg_type[2..]))
}

/// Decodes a custom event body `["action", data?]`.
pub fn decode_event(body: &str) -> Result<(String, Option<Value>), ProtocolError> {
    let mut items = match serde_json::from_str::<Value>(body)? {
        Value::Array(items) => items.into_iter(),
        _ => {
            return Err(ProtocolError::InvalidMessage(
                "event body is not an array".into(),
            ));
        }
    };
    let action = match items.next() {
        Some(Value::String(action)) => action,
        Some(_) => {
            return Err(ProtocolError::InvalidMessage(
                "event name is not a string".into(),
            ));
        }
        None => {
            return Err(ProtocolError::InvalidMessage(
                "invalid custom message payload".into(),
            ));
        }
    };
    Ok((action, items.next()))
}

/// Builds the room command for a `gameService` event:
/// `{"action": "...", "payload": {...}}` → `Command{action, payload json}`.
pub fn game_service_command(
    response_type: &str,
    data: Option<&Value>,
) -> Result<Command, ProtocolError> {
    let data = data.ok_or_else(|| {
        ProtocolError::InvalidMessage("gameService without data".into())
    })?;
    let action = data
        .get("action")
        .and_then(Value::as_str)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| ProtocolError::InvalidMessage("missing action field".into()))?;
    let payload = match data.get("payload") {
        Some(p) => serde_json::to_vec(p)?,
        None => Vec::new(),
    };
    Ok(Command::action(action, payload).with_reply_to(response_type))
}

// ---------------------------------------------------------------------------
// Outbound frames
// ---------------------------------------------------------------------------

/// Engine.IO open packet sent right after the socket is accepted.
pub fn open_frame(sid: &str) -> String {
    format!(
        r#"0{{"sid":"{sid}","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}}"#
    )
}

/// Namespace connect acknowledgement.
pub fn connect_ack(sid: &str) -> String {
    format!(r#"40{{"sid":"{sid}"}}"#)
}

/// Answer to `gameService-latencyTest`.
pub fn latency_reply(response_type: &str, now_millis: i64) -> String {
    format!(r#"{response_type}[{{"date":{now_millis}}}]"#)
}

/// Generic acknowledgement for events nobody handles.
pub fn null_reply(response_type: &str) -> String {
    format!("{response_type}[null]")
}

pub fn error_frame(msg_id: &str, message: &str) -> String {
    format!("{msg_id}{}", json!([{ "error": { "message": message } }]))
}

/// `42["onBalanceChange",{"currency":"USD","balance":"12.50"}]`
pub fn balance_change(currency: &str, balance: f64) -> String {
    let payload = json!({
        "currency": currency,
        "balance": format!("{balance:.2}"),
    });
    format!(r#"{DEFAULT_MSG_ID}["onBalanceChange",{payload}]"#)
}

/// A room response: `msg_id` + `[action, response]`. An empty `msg_id`
/// means an unsolicited event and uses [`DEFAULT_MSG_ID`].
pub fn game_service_data(msg_id: &str, action: &str, response: &Value) -> String {
    let msg_id = if msg_id.is_empty() { DEFAULT_MSG_ID } else { msg_id };
    format!("{msg_id}{}", json!([action, response]))
}

/// Profile frame sent after login. Nicknames are cut to 15 characters.
pub fn my_data(user_id: &str) -> String {
    let nickname: String = user_id.chars().take(15).collect();
    let payload = json!({
        "userId": user_id,
        "nickname": nickname,
        "gameAvatar": null,
    });
    format!(r#"{DEFAULT_MSG_ID}["myData",{payload}]"#)
}

/// Exchange-rate table pushed after login.
pub fn currencies(rates: &BTreeMap<String, f64>) -> String {
    format!(r#"{DEFAULT_MSG_ID}["currencies",{}]"#, json!(rates))
}

#[cfg(test)]
mod tests {
    use super::*;

    // =====================================================================
    // parse
    // =====================================================================

    #[test]
    fn test_parse_bare_type() {
        let p = parse("2").unwrap();
        assert_eq!(p.msg_type, "2");
        assert_eq!(p.body, None);
        assert!(!p.is_event());
    }

    #[test]
    fn test_parse_event_with_body() {
        let p = parse(r#"421["gameService",{"action":"bet"}]"#).unwrap();
        assert_eq!(p.msg_type, "421");
        assert_eq!(p.body, Some(r#"["gameService",{"action":"bet"}]"#));
        assert!(p.is_event());
        assert_eq!(p.response_type().as_deref(), Some("431"));
    }

    #[test]
    fn test_parse_rejects_missing_type() {
        assert!(parse(r#"["x"]"#).is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn test_parse_rejects_non_array_body() {
        assert!(parse(r#"42{"a":1}"#).is_err());
    }

    #[test]
    fn test_response_type_short_type_has_none() {
        assert_eq!(response_type("2"), None);
        assert_eq!(response_type("31"), None);
        assert_eq!(response_type("42").as_deref(), Some("43"));
        assert_eq!(response_type("4217").as_deref(), Some("4317"));
    }

    // =====================================================================
    // decode_event / game_service_command
    // =====================================================================

    #[test]
    fn test_decode_event_action_and_data() {
        let (action, data) =
            decode_event(r#"["gameService",{"action":"bet","payload":{"amount":1}}]"#)
                .unwrap();
        assert_eq!(action, "gameService");
        let cmd = game_service_command("431", data.as_ref()).unwrap();
        assert_eq!(cmd.action_name(), Some("bet"));
        assert_eq!(cmd.reply_to.as_deref(), Some("431"));
        let payload: Value = serde_json::from_slice(&cmd.payload).unwrap();
        assert_eq!(payload, json!({"amount": 1}));
    }

    #[test]
    fn test_decode_event_empty_array_errors() {
        assert!(decode_event("[]").is_err());
        assert!(decode_event("[1]").is_err());
    }

    #[test]
    fn test_game_service_command_missing_action_errors() {
        let data = json!({"payload": {}});
        assert!(game_service_command("43", Some(&data)).is_err());
        assert!(game_service_command("43", None).is_err());
    }

    #[test]
    fn test_game_service_command_without_payload_is_empty() {
        let data = json!({"action": "get-game-state"});
        let cmd = game_service_command("432", Some(&data)).unwrap();
        assert!(cmd.payload.is_empty());
    }

    // =====================================================================
    // Outbound frames
    // =====================================================================

    #[test]
    fn test_open_frame_shape() {
        let frame = open_frame("abc");
        assert!(frame.starts_with('0'));
        let v: Value = serde_json::from_str(&frame[1..]).unwrap();
        assert_eq!(v["sid"], "abc");
        assert_eq!(v["pingInterval"], 25000);
        assert_eq!(v["pingTimeout"], 20000);
        assert_eq!(v["maxPayload"], 1000000);
    }

    #[test]
    fn test_balance_change_formats_two_decimals() {
        let frame = balance_change("USD", 12.5);
        assert!(frame.starts_with(r#"42["onBalanceChange","#));
        let v: Value = serde_json::from_str(&frame[2..]).unwrap();
        assert_eq!(v[1]["currency"], "USD");
        assert_eq!(v[1]["balance"], "12.50");

        let v: Value = serde_json::from_str(&balance_change("EUR", 3.0)[2..]).unwrap();
        assert_eq!(v[1]["balance"], "3.00");
    }

    #[test]
    fn test_error_frame_escapes_message() {
        let frame = error_frame("431", r#"bad "thing""#);
        let v: Value = serde_json::from_str(&frame[3..]).unwrap();
        assert_eq!(v[0]["error"]["message"], r#"bad "thing""#);
    }

    #[test]
    fn test_game_service_data_defaults_msg_id() {
        let frame = game_service_data("", "onRound", &json!({"x": 1}));
        assert_eq!(frame, r#"42["onRound",{"x":1}]"#);
        let frame = game_service_data("435", "bet", &Value::Null);
        assert_eq!(frame, r#"435["bet",null]"#);
    }

    #[test]
    fn test_my_data_truncates_nickname() {
        let frame = my_data("abcdefghijklmnopqrst");
        let v: Value = serde_json::from_str(&frame[2..]).unwrap();
        assert_eq!(v[0], "myData");
        assert_eq!(v[1]["nickname"], "abcdefghijklmno");
        assert_eq!(v[1]["userId"], "abcdefghijklmnopqrst");
        assert!(v[1]["gameAvatar"].is_null());
    }

    #[test]
    fn test_latency_and_null_replies() {
        assert_eq!(latency_reply("431", 5), r#"431[{"date":5}]"#);
        assert_eq!(null_reply("4310"), "4310[null]");
    }
}
