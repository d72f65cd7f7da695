//! Parse queue message JSON bodies into task parameters.

use serde_json::{Map, Value};

use crate::consumer::QueueMessage;
use crate::error::QueueError;

/// Task parameters carried by a message: the top-level keys of its JSON body.
pub type MessageParams = Map<String, Value>;

/// Parse a message body into its top-level JSON object.
///
/// Only rejects messages that are not valid JSON or not a JSON object.
pub fn parse_body(msg: &QueueMessage) -> Result<MessageParams, QueueError> {
    let json: Value = serde_json::from_str(&msg.body)
        .map_err(|e| QueueError::Parse(format!("Invalid JSON in message {}: {}", msg.id, e)))?;

    match json {
        Value::Object(obj) => Ok(obj),
        _ => Err(QueueError::Parse(format!(
            "Message {} body is not a JSON object",
            msg.id
        ))),
    }
}

/// Render a parameter value for substitution into a command line.
///
/// Strings are used verbatim, `null` becomes empty, everything else is
/// serialized back to JSON text.
pub fn value_as_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
