//! bits-ipc message model and JSON codec.
//!
//! Every message travels inside an envelope:
//!
//! ```text
//! {"type":"bits-ipc","data":{"type":"event","event":"<name>","params":[{"scope":null}, ...]}}
//! ```
//!
//! `data.type` selects the [`Message`] variant. For events and requests the
//! first element of `params` is the scope object built by [`Scopes`]; the
//! remaining elements are positional arguments.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{ClientError, Result};

/// Envelope `type` used by the message center's IPC bridge.
pub const ENVELOPE_TYPE: &str = "bits-ipc";

/// Top-level wire document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Message,
}

#[derive(Serialize)]
struct OutgoingEnvelope<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    data: &'a Message,
}

/// Payload of an envelope, discriminated by `data.type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Message {
    /// Fire-and-forget event.
    Event {
        event: String,
        #[serde(default)]
        params: Vec<Value>,
    },
    /// Request expecting exactly one response with a matching id.
    Request {
        event: String,
        /// Correlation id. Kept as raw JSON so it is echoed back unchanged.
        #[serde(rename = "requestId")]
        request_id: Value,
        #[serde(default)]
        params: Vec<Value>,
    },
    /// Response to an earlier request.
    Response {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event: Option<String>,
        #[serde(rename = "responseId")]
        response_id: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        err: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<Vec<Value>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },
    /// Ask the message center to route an event to this client.
    AddEventListener {
        event: String,
        #[serde(default)]
        params: Vec<Value>,
    },
    /// Ask the message center to route requests for an event to this client.
    AddRequestListener {
        event: String,
        #[serde(default)]
        params: Vec<Value>,
    },
    /// Any other `data.type`; ignored by the client.
    #[serde(other)]
    Unknown,
}

impl Message {
    /// Build an event with the scope object followed by `args`.
    pub fn event(event: impl Into<String>, scopes: &Scopes, args: Vec<Value>) -> Self {
        Message::Event {
            event: event.into(),
            params: scoped_params(scopes, args),
        }
    }

    /// Build a request with the scope object followed by `args`.
    pub fn request(
        event: impl Into<String>,
        request_id: impl Into<String>,
        scopes: &Scopes,
        args: Vec<Value>,
    ) -> Self {
        Message::Request {
            event: event.into(),
            request_id: Value::String(request_id.into()),
            params: scoped_params(scopes, args),
        }
    }

    /// Build the reply to an inbound request.
    ///
    /// A handler error travels in `err` with a `null` result.
    pub fn response(
        event: Option<String>,
        request_id: Value,
        outcome: std::result::Result<Value, String>,
    ) -> Self {
        let (err, value) = match outcome {
            Ok(value) => (None, value),
            Err(message) => (Some(Value::String(message)), Value::Null),
        };
        Message::Response {
            event,
            response_id: request_id,
            err,
            params: Some(vec![value]),
            result: None,
        }
    }

    /// Build an `addEventListener` registration.
    pub fn add_event_listener(event: impl Into<String>, scopes: &Scopes) -> Self {
        Message::AddEventListener {
            event: event.into(),
            params: vec![scopes.listener_param()],
        }
    }

    /// Build an `addRequestListener` registration.
    pub fn add_request_listener(event: impl Into<String>, scopes: &Scopes) -> Self {
        Message::AddRequestListener {
            event: event.into(),
            params: vec![scopes.listener_param()],
        }
    }

    /// Wire name of the variant (`data.type`).
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Event { .. } => "event",
            Message::Request { .. } => "request",
            Message::Response { .. } => "response",
            Message::AddEventListener { .. } => "addEventListener",
            Message::AddRequestListener { .. } => "addRequestListener",
            Message::Unknown => "unknown",
        }
    }

    /// Event name, when the variant carries one.
    pub fn event_name(&self) -> Option<&str> {
        match self {
            Message::Event { event, .. }
            | Message::Request { event, .. }
            | Message::AddEventListener { event, .. }
            | Message::AddRequestListener { event, .. } => Some(event),
            Message::Response { event, .. } => event.as_deref(),
            Message::Unknown => None,
        }
    }
}

fn scoped_params(scopes: &Scopes, args: Vec<Value>) -> Vec<Value> {
    std::iter::once(scopes.message_param())
        .chain(args)
        .collect()
}

/// Result value carried by a response.
///
/// `params[0]` is preferred; the message center's bridge may instead send
/// `result`, either bare or wrapped in an array.
pub fn response_value(params: Option<Vec<Value>>, result: Option<Value>) -> Value {
    if let Some(params) = params {
        return params.into_iter().next().unwrap_or(Value::Null);
    }
    match result {
        Some(Value::Array(items)) => items.into_iter().next().unwrap_or(Value::Null),
        Some(value) => value,
        None => Value::Null,
    }
}

/// String form of a correlation id used for registry lookups.
pub fn correlation_key(id: &Value) -> Option<String> {
    match id {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Scope qualifiers narrowing which subscribers or handlers see a message.
///
/// No scope means the message center's default scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scopes(Vec<String>);

impl Scopes {
    /// The default scope.
    pub fn none() -> Self {
        Self(Vec::new())
    }

    /// Explicit scope list.
    pub fn new<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(scopes.into_iter().map(Into::into).collect())
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Scope object leading the params of an event or request.
    pub fn message_param(&self) -> Value {
        match self.0.as_slice() {
            [] => json!({ "scope": null }),
            [only] => json!({ "scope": only }),
            many => json!({ "scopes": many }),
        }
    }

    /// Scope object of a listener registration.
    pub fn listener_param(&self) -> Value {
        match self.0.as_slice() {
            [] => json!({ "scopes": null }),
            [only] => json!({ "scopes": only }),
            many => json!({ "scopes": many }),
        }
    }
}

impl From<&str> for Scopes {
    fn from(scope: &str) -> Self {
        Self(vec![scope.to_string()])
    }
}

impl From<String> for Scopes {
    fn from(scope: String) -> Self {
        Self(vec![scope])
    }
}

impl From<Vec<String>> for Scopes {
    fn from(scopes: Vec<String>) -> Self {
        Self(scopes)
    }
}

impl From<&[&str]> for Scopes {
    fn from(scopes: &[&str]) -> Self {
        Self::new(scopes.iter().copied())
    }
}

/// Serialize a message inside a `bits-ipc` envelope.
pub fn encode(message: &Message) -> Result<Vec<u8>> {
    let envelope = OutgoingEnvelope {
        kind: ENVELOPE_TYPE,
        data: message,
    };
    Ok(serde_json::to_vec(&envelope)?)
}

/// Parse one delimited payload into a message.
///
/// Fails with [`ClientError::Json`] on malformed JSON and
/// [`ClientError::Protocol`] when the envelope is not `bits-ipc`.
pub fn decode(payload: &[u8]) -> Result<Message> {
    let envelope: Envelope = serde_json::from_slice(payload)?;
    if envelope.kind != ENVELOPE_TYPE {
        return Err(ClientError::Protocol(format!(
            "unexpected envelope type '{}'",
            envelope.kind
        )));
    }
    Ok(envelope.data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(message: &Message) -> String {
        String::from_utf8(encode(message).unwrap()).unwrap()
    }

    #[test]
    fn client_connected_event_bytes() {
        let msg = Message::event("bits-ipc#Client connected", &Scopes::none(), vec![]);
        assert_eq!(
            encoded(&msg),
            r#"{"type":"bits-ipc","data":{"type":"event","event":"bits-ipc#Client connected","params":[{"scope":null}]}}"#
        );
    }

    #[test]
    fn request_carries_id_and_arguments() {
        let msg = Message::request("base#System bitsId", "42", &Scopes::none(), vec![json!(1), json!("two")]);
        assert_eq!(
            encoded(&msg),
            r#"{"type":"bits-ipc","data":{"type":"request","event":"base#System bitsId","requestId":"42","params":[{"scope":null},1,"two"]}}"#
        );
    }

    #[test]
    fn scope_encodings() {
        assert_eq!(Scopes::none().message_param(), json!({ "scope": null }));
        assert_eq!(Scopes::from("admin").message_param(), json!({ "scope": "admin" }));
        assert_eq!(
            Scopes::new(["a", "b"]).message_param(),
            json!({ "scopes": ["a", "b"] })
        );

        assert_eq!(Scopes::none().listener_param(), json!({ "scopes": null }));
        assert_eq!(Scopes::from("admin").listener_param(), json!({ "scopes": "admin" }));
        assert_eq!(
            Scopes::new(["a", "b"]).listener_param(),
            json!({ "scopes": ["a", "b"] })
        );
    }

    #[test]
    fn listener_registrations() {
        let msg = Message::add_event_listener("bits-ipc#heartbeat", &Scopes::none());
        assert_eq!(
            encoded(&msg),
            r#"{"type":"bits-ipc","data":{"type":"addEventListener","event":"bits-ipc#heartbeat","params":[{"scopes":null}]}}"#
        );

        let msg = Message::add_request_listener("bits-ipc#ping", &Scopes::from("local"));
        assert_eq!(
            encoded(&msg),
            r#"{"type":"bits-ipc","data":{"type":"addRequestListener","event":"bits-ipc#ping","params":[{"scopes":"local"}]}}"#
        );
    }

    #[test]
    fn response_wraps_result() {
        let msg = Message::response(
            Some("bits-ipc#ping".to_string()),
            json!("7"),
            Ok(json!({ "pong": 1 })),
        );
        assert_eq!(
            encoded(&msg),
            r#"{"type":"bits-ipc","data":{"type":"response","event":"bits-ipc#ping","responseId":"7","params":[{"pong":1}]}}"#
        );
    }

    #[test]
    fn response_carries_handler_error() {
        let msg = Message::response(None, json!(9), Err("boom".to_string()));
        assert_eq!(
            encoded(&msg),
            r#"{"type":"bits-ipc","data":{"type":"response","responseId":9,"err":"boom","params":[null]}}"#
        );
    }

    #[test]
    fn decode_response_from_params() {
        let msg = decode(
            br#"{"type":"bits-ipc","data":{"type":"response","responseId":"123","params":["abc123"]}}"#,
        )
        .unwrap();
        match msg {
            Message::Response {
                response_id,
                err,
                params,
                result,
                ..
            } => {
                assert_eq!(correlation_key(&response_id).as_deref(), Some("123"));
                assert!(err.is_none());
                assert_eq!(response_value(params, result), json!("abc123"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn decode_response_from_result_field() {
        let msg = decode(
            br#"{"type":"bits-ipc","data":{"type":"response","event":"x","responseId":5,"err":null,"result":["id-1"]}}"#,
        )
        .unwrap();
        match msg {
            Message::Response {
                response_id,
                err,
                params,
                result,
                ..
            } => {
                assert_eq!(correlation_key(&response_id).as_deref(), Some("5"));
                assert!(err.is_none());
                assert_eq!(response_value(params, result), json!("id-1"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn decode_unknown_type_is_ignored_variant() {
        let msg = decode(br#"{"type":"bits-ipc","data":{"type":"removeEventListener","event":"e"}}"#)
            .unwrap();
        assert_eq!(msg, Message::Unknown);
    }

    #[test]
    fn decode_rejects_foreign_envelope() {
        let err = decode(br#"{"type":"other","data":{"type":"event","event":"e"}}"#).unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[test]
    fn decode_rejects_malformed_json() {
        let err = decode(b"{\"type\":\"bits-ipc\",").unwrap_err();
        assert!(matches!(err, ClientError::Json(_)));

        let err = decode(br#"{"type":"bits-ipc","data":{"type":"event"}}"#).unwrap_err();
        assert!(matches!(err, ClientError::Json(_)));
    }

    #[test]
    fn decode_inverts_encode() {
        let messages = [
            Message::event("e", &Scopes::new(["a", "b"]), vec![json!({ "nested": [1, 2] })]),
            Message::request("r", "99", &Scopes::from("s"), vec![json!(null), json!(1.5)]),
            Message::response(Some("r".to_string()), json!("99"), Ok(json!("form\u{000c}feed"))),
            Message::add_event_listener("e", &Scopes::none()),
            Message::add_request_listener("r", &Scopes::new(["x", "y"])),
        ];

        for message in messages {
            let bytes = encode(&message).unwrap();
            assert!(!bytes.contains(&bitsipc_frame::DELIMITER));
            assert_eq!(decode(&bytes).unwrap(), message);
        }
    }

    #[test]
    fn event_name_per_variant() {
        assert_eq!(
            Message::event("e", &Scopes::none(), vec![]).event_name(),
            Some("e")
        );
        assert_eq!(Message::Unknown.event_name(), None);
        assert_eq!(Message::add_event_listener("e", &Scopes::none()).kind(), "addEventListener");
    }
}
