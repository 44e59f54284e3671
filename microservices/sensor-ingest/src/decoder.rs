//! Payload decoding

use bytes::Bytes;
use serde::de::{Error as _, Unexpected};
use serde_json::Value;

use crate::error::DecodeError;
use crate::reading::SensorPayload;

/// Decode the event body. Unknown keys are ignored and missing
/// measurements default to zero; anything that is not a JSON object with
/// numeric measurements is rejected with the payload echoed back.
pub fn decode_payload(data: &Bytes) -> Result<SensorPayload, DecodeError> {
    parse_object(data).map_err(|cause| DecodeError {
        cause,
        payload: data.clone(),
    })
}

// serde would otherwise accept a positional array for the struct
fn parse_object(data: &[u8]) -> Result<SensorPayload, serde_json::Error> {
    let value: Value = serde_json::from_slice(data)?;
    if !value.is_object() {
        return Err(serde_json::Error::invalid_type(
            unexpected(&value),
            &"a JSON object",
        ));
    }
    serde_json::from_value(value)
}

fn unexpected(value: &Value) -> Unexpected<'_> {
    match value {
        Value::Null => Unexpected::Unit,
        Value::Bool(b) => Unexpected::Bool(*b),
        Value::Number(_) => Unexpected::Other("number"),
        Value::String(s) => Unexpected::Str(s),
        Value::Array(_) => Unexpected::Seq,
        Value::Object(_) => Unexpected::Map,
    }
}
