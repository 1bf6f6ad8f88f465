use serde::{Deserialize, Serialize};

use crate::command::Inbound;

/// Subscription filter for every chat's inbound topic.
pub(crate) const INBOUND_FILTER: &str = "chat/+/in";

// ---------------------------------------------------------------------------
// MQTT message types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct InboundMsg {
    #[serde(default)]
    pub(crate) from_name: String,
    pub(crate) text: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct OutboundMsg<'a> {
    pub(crate) text: &'a str,
}

// ---------------------------------------------------------------------------
// Topic / payload helpers
// ---------------------------------------------------------------------------

/// Extract chat_id from "chat/<chat_id>/in".
pub(crate) fn extract_chat_id(topic: &str) -> Option<&str> {
    let parts: Vec<&str> = topic.split('/').collect();
    if parts.len() == 3 && parts[0] == "chat" && parts[2] == "in" && !parts[1].is_empty() {
        Some(parts[1])
    } else {
        None
    }
}

/// "chat/<chat_id>/out"
pub(crate) fn outbound_topic(chat_id: &str) -> String {
    format!("chat/{chat_id}/out")
}

pub(crate) fn encode_outbound(text: &str) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&OutboundMsg { text })
}

/// Decode an inbound publish into a chat message.
pub(crate) fn decode_inbound(topic: &str, payload: &[u8]) -> Result<Inbound, String> {
    let chat_id = extract_chat_id(topic).ok_or_else(|| format!("unhandled topic={topic}"))?;
    let msg: InboundMsg = serde_json::from_slice(payload)
        .map_err(|e| format!("bad chat json: {e} topic={topic}"))?;
    Ok(Inbound {
        chat_id: chat_id.to_string(),
        from_name: msg.from_name,
        text: msg.text,
    })
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // -- extract_chat_id ----------------------------------------------------

    #[test]
    fn extract_chat_id_valid_topic() {
        assert_eq!(extract_chat_id("chat/123456/in"), Some("123456"));
    }

    #[test]
    fn extract_chat_id_wrong_prefix() {
        assert_eq!(extract_chat_id("tele/123456/in"), None);
    }

    #[test]
    fn extract_chat_id_wrong_suffix() {
        assert_eq!(extract_chat_id("chat/123456/out"), None);
    }

    #[test]
    fn extract_chat_id_bad_segments() {
        assert_eq!(extract_chat_id("chat/in"), None);
        assert_eq!(extract_chat_id("chat//in"), None);
        assert_eq!(extract_chat_id("chat/a/b/in"), None);
        assert_eq!(extract_chat_id(""), None);
    }

    // -- outbound -----------------------------------------------------------

    #[test]
    fn outbound_topic_format() {
        assert_eq!(outbound_topic("42"), "chat/42/out");
    }

    #[test]
    fn encode_outbound_is_text_object() {
        let bytes = encode_outbound("hi\nthere").unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json, serde_json::json!({ "text": "hi\nthere" }));
    }

    // -- decode_inbound -----------------------------------------------------

    #[test]
    fn decode_inbound_valid() {
        let msg = decode_inbound("chat/42/in", br#"{"from_name":"Ana","text":"/help"}"#).unwrap();
        assert_eq!(msg.chat_id, "42");
        assert_eq!(msg.from_name, "Ana");
        assert_eq!(msg.text, "/help");
    }

    #[test]
    fn decode_inbound_missing_name_defaults_empty() {
        let msg = decode_inbound("chat/42/in", br#"{"text":"/dutchrun"}"#).unwrap();
        assert_eq!(msg.from_name, "");
    }

    #[test]
    fn decode_inbound_missing_text_fails() {
        let err = decode_inbound("chat/42/in", br#"{"from_name":"Ana"}"#).unwrap_err();
        assert!(err.contains("bad chat json"), "{err}");
    }

    #[test]
    fn decode_inbound_bad_topic_fails() {
        let err = decode_inbound("valve/z1/set", br#"{"text":"/help"}"#).unwrap_err();
        assert!(err.contains("unhandled topic"), "{err}");
    }
}
