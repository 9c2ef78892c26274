//! Call and response envelopes exchanged with the worker process.
//!
//! On the wire a call is `{"action": ..., "data": ..., "requestId": n}` and a
//! response is any JSON object carrying the same `requestId`. The response
//! object minus `requestId` is the call's result, unless the worker flagged
//! a failure with `"success": false` or a bare `"error"` string.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DomainError, DomainResult};

/// Wire name of the correlation field.
pub const CALL_ID_FIELD: &str = "requestId";

const FALLBACK_REMOTE_ERROR: &str = "worker reported a failure without a message";

/// Identifier correlating a call with its response.
///
/// Ids are handed out by a monotonic counter and never reused for the
/// lifetime of a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(u64);

impl CallId {
    /// Wraps a raw id.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One outbound call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEnvelope {
    /// Action name understood by the worker.
    pub action: String,
    /// Action payload, opaque at this level.
    #[serde(default)]
    pub data: Value,
    /// Correlation id.
    #[serde(rename = "requestId")]
    pub call_id: CallId,
}

impl CallEnvelope {
    /// Creates a call envelope.
    #[must_use]
    pub fn new(call_id: CallId, action: impl Into<String>, data: Value) -> Self {
        Self {
            action: action.into(),
            data,
            call_id,
        }
    }
}

/// One inbound response, already attributed to a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEnvelope {
    /// Id of the call this answers.
    pub call_id: CallId,
    /// Result payload when the worker succeeded.
    pub result: Option<Value>,
    /// Failure message when the worker reported an error.
    pub error_message: Option<String>,
}

impl ResponseEnvelope {
    /// A successful response.
    #[must_use]
    pub const fn success(call_id: CallId, result: Value) -> Self {
        Self {
            call_id,
            result: Some(result),
            error_message: None,
        }
    }

    /// A worker-reported failure.
    #[must_use]
    pub fn failure(call_id: CallId, message: impl Into<String>) -> Self {
        Self {
            call_id,
            result: None,
            error_message: Some(message.into()),
        }
    }

    /// Interprets a decoded JSON frame.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NotAnObject`] for non-object frames and
    /// [`DomainError::MissingCallId`] when `requestId` is absent or not a
    /// non-negative integer.
    pub fn from_value(value: Value) -> DomainResult<Self> {
        let Value::Object(mut fields) = value else {
            return Err(DomainError::NotAnObject);
        };

        let call_id = fields
            .remove(CALL_ID_FIELD)
            .and_then(|id| id.as_u64())
            .map(CallId::new)
            .ok_or(DomainError::MissingCallId)?;

        let error_text = fields
            .get("error")
            .and_then(Value::as_str)
            .filter(|message| !message.is_empty())
            .map(str::to_owned);

        let error_message = match fields.get("success").and_then(Value::as_bool) {
            Some(false) => Some(error_text.unwrap_or_else(|| FALLBACK_REMOTE_ERROR.to_string())),
            Some(true) => None,
            None => error_text,
        };

        if let Some(message) = error_message {
            return Ok(Self::failure(call_id, message));
        }

        Ok(Self::success(call_id, Value::Object(fields)))
    }

    /// Renders the envelope the way a worker writes it.
    ///
    /// Object results are flattened next to `requestId`; any other result
    /// is nested under `data`.
    ///
    /// [`Self::from_value`] reads the output back unchanged only for object
    /// results without top-level `requestId`, `success` or `error` keys and
    /// for failures with a non-empty message. Those keys carry meaning on
    /// the wire, and a non-object result comes back as `{"data": ...}`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut fields = Map::new();

        if let Some(message) = &self.error_message {
            fields.insert("success".to_string(), Value::Bool(false));
            fields.insert("error".to_string(), Value::String(message.clone()));
        } else {
            match &self.result {
                Some(Value::Object(result)) => fields.extend(result.clone()),
                Some(other) => {
                    fields.insert("data".to_string(), other.clone());
                }
                None => {}
            }
        }

        fields.insert(CALL_ID_FIELD.to_string(), Value::from(self.call_id.get()));
        Value::Object(fields)
    }

    /// Converts into the caller-facing outcome.
    ///
    /// # Errors
    ///
    /// Returns the worker's message when it reported a failure.
    pub fn into_outcome(self) -> Result<Value, String> {
        match self.error_message {
            Some(message) => Err(message),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn call_envelope_uses_wire_names() {
        let envelope = CallEnvelope::new(CallId::new(7), "getServices", json!({"repositoryId": 1}));
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(
            value,
            json!({"action": "getServices", "data": {"repositoryId": 1}, "requestId": 7})
        );
    }

    #[test]
    fn response_result_is_object_without_request_id() {
        let envelope = ResponseEnvelope::from_value(json!({"requestId": 3, "v": 1})).unwrap();

        assert_eq!(envelope.call_id, CallId::new(3));
        assert_eq!(envelope.into_outcome(), Ok(json!({"v": 1})));
    }

    #[test]
    fn success_false_becomes_error_message() {
        let envelope = ResponseEnvelope::from_value(json!({
            "requestId": 4,
            "success": false,
            "error": "unknown action: nope"
        }))
        .unwrap();

        assert_eq!(envelope.into_outcome(), Err("unknown action: nope".to_string()));
    }

    #[test]
    fn success_false_without_message_gets_fallback() {
        let envelope =
            ResponseEnvelope::from_value(json!({"requestId": 4, "success": false})).unwrap();

        assert_eq!(envelope.error_message.as_deref(), Some(FALLBACK_REMOTE_ERROR));
    }

    #[test]
    fn empty_error_string_on_success_is_ignored() {
        let envelope = ResponseEnvelope::from_value(json!({
            "requestId": 5,
            "success": true,
            "data": [],
            "error": ""
        }))
        .unwrap();

        assert!(envelope.error_message.is_none());
    }

    #[test]
    fn missing_or_fractional_request_id_is_rejected() {
        assert_eq!(
            ResponseEnvelope::from_value(json!({"success": false, "error": "invalid JSON"})),
            Err(DomainError::MissingCallId)
        );
        assert_eq!(
            ResponseEnvelope::from_value(json!({"requestId": 1.5})),
            Err(DomainError::MissingCallId)
        );
        assert_eq!(
            ResponseEnvelope::from_value(json!([1, 2])),
            Err(DomainError::NotAnObject)
        );
    }

    #[test]
    fn non_object_result_comes_back_nested() {
        let envelope = ResponseEnvelope::success(CallId::new(11), json!([1, 2]));
        let read_back = ResponseEnvelope::from_value(envelope.to_value()).unwrap();

        assert_eq!(read_back.into_outcome(), Ok(json!({"data": [1, 2]})));
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[ -~\n]{0,40}".prop_map(Value::from),
        ];
        leaf.prop_recursive(3, 32, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::from),
                prop::collection::btree_map("[a-zA-Z]{1,8}", inner, 0..4)
                    .prop_map(|fields| Value::Object(fields.into_iter().collect())),
            ]
        })
    }

    fn arb_result() -> impl Strategy<Value = Value> {
        let key = "[a-zA-Z_]{1,10}"
            .prop_filter("wire key", |key| !matches!(key.as_str(), "requestId" | "success" | "error"));
        prop::collection::btree_map(key, arb_json(), 0..6)
            .prop_map(|fields| Value::Object(fields.into_iter().collect()))
    }

    fn arb_response() -> impl Strategy<Value = ResponseEnvelope> {
        prop_oneof![
            (any::<u64>(), arb_result())
                .prop_map(|(id, result)| ResponseEnvelope::success(CallId::new(id), result)),
            (any::<u64>(), "[ -~]{1,60}")
                .prop_map(|(id, message)| ResponseEnvelope::failure(CallId::new(id), message)),
        ]
    }

    proptest! {
        #[test]
        fn prop_call_envelope_serde_round_trip(
            id in any::<u64>(),
            action in "[a-zA-Z]{1,20}",
            data in arb_json(),
        ) {
            let envelope = CallEnvelope::new(CallId::new(id), action, data);
            let text = serde_json::to_string(&envelope).unwrap();

            prop_assert!(!text.contains('\n'));
            prop_assert_eq!(serde_json::from_str::<CallEnvelope>(&text).unwrap(), envelope);
        }

        #[test]
        fn prop_response_reads_back_from_wire_form(envelope in arb_response()) {
            prop_assert_eq!(ResponseEnvelope::from_value(envelope.to_value()).unwrap(), envelope);
        }
    }

    #[test]
    fn to_value_round_trips_object_results() {
        let success = ResponseEnvelope::success(CallId::new(9), json!({"success": true, "data": {"id": 1}}));
        let failure = ResponseEnvelope::failure(CallId::new(10), "boom");

        assert_eq!(ResponseEnvelope::from_value(success.to_value()).unwrap(), success);
        assert_eq!(ResponseEnvelope::from_value(failure.to_value()).unwrap(), failure);
    }
}
