//! Line codec for the fht IPC protocol
//!
//! Every message is a single line of compact JSON terminated by `\n`.
//!
//! Outgoing:
//! - subscription: the JSON string `"subscribe"` as the whole line
//! - commands: `{"action":{"<action-name>":{<params>}}}`
//!
//! Incoming:
//! - events: `{"event":"<name>","data":{...}}`
//! - command replies: a single JSON value, opaque to this crate

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

use crate::IpcError;

/// A request sent to the compositor
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Start the event stream on this connection. No reply is sent.
    Subscribe,
    /// Run a compositor action, e.g. `focus-workspace`
    Action {
        /// Hyphenated action name
        name: String,
        /// Action parameters, usually an object
        params: Value,
    },
}

impl Request {
    /// Build an action request from a name and its parameters
    pub fn action(name: impl Into<String>, params: Value) -> Self {
        Self::Action {
            name: name.into(),
            params,
        }
    }

    /// `{"action":{"focus-workspace":{"workspace-id":<id>}}}`
    pub fn focus_workspace(workspace_id: u64) -> Self {
        let mut params = Map::new();
        params.insert("workspace-id".to_string(), Value::from(workspace_id));
        Self::action("focus-workspace", Value::Object(params))
    }
}

impl Serialize for Request {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Request::Subscribe => serializer.serialize_str("subscribe"),
            Request::Action { name, params } => {
                struct Action<'a>(&'a str, &'a Value);

                impl Serialize for Action<'_> {
                    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                        let mut map = serializer.serialize_map(Some(1))?;
                        map.serialize_entry(self.0, self.1)?;
                        map.end()
                    }
                }

                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("action", &Action(name, params))?;
                map.end()
            }
        }
    }
}

/// An event as received on the wire: its name and its untyped payload
///
/// This is what subscribers are handed. `data` is always a JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub name: String,
    pub data: Value,
}

/// Encode a request as one line of compact JSON, without the trailing newline
pub fn encode_request(request: &Request) -> Result<String, IpcError> {
    serde_json::to_string(request).map_err(IpcError::SerializeFailed)
}

/// Decode one event line
///
/// # Errors
///
/// Returns `IpcError::MalformedEvent` unless the line is a JSON object with a
/// string `event` and an object `data`.
pub fn decode_event(line: &str) -> Result<RawEvent, IpcError> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| IpcError::malformed(format!("invalid JSON: {e}")))?;

    let Value::Object(mut object) = value else {
        return Err(IpcError::malformed("top-level value is not an object"));
    };

    let name = match object.remove("event") {
        Some(Value::String(name)) => name,
        Some(_) => return Err(IpcError::malformed("`event` is not a string")),
        None => return Err(IpcError::malformed("missing `event` field")),
    };

    let data = match object.remove("data") {
        Some(data @ Value::Object(_)) => data,
        Some(_) => return Err(IpcError::malformed("`data` is not an object")),
        None => return Err(IpcError::malformed("missing `data` field")),
    };

    Ok(RawEvent { name, data })
}

/// Decode a command reply line into a generic JSON value
pub fn decode_response(line: &str) -> Result<Value, IpcError> {
    serde_json::from_str(line).map_err(IpcError::DeserializeFailed)
}
