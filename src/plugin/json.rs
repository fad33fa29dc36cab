use super::{Consumer, Producer};
use crate::error::HttpError;
use serde_json::Value;

/// Consumer for JSON request bodies.
///
/// An empty body parses to `null`; anything else must be well-formed JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonConsumer;

impl Consumer for JsonConsumer {
    fn parse(
        &self,
        body: &[u8],
        _pre_parsed: Option<&Value>,
        _media_type: &str,
        _parameters: &[(String, String)],
    ) -> Result<Value, HttpError> {
        if body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(body)
            .map_err(|_| HttpError::bad_request("Malformed JSON request body"))
    }
}

/// Producer encoding handler results as JSON.
///
/// A `null` result leaves the response body empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonProducer;

impl Producer for JsonProducer {
    fn assemble(&self, data: &Value) -> anyhow::Result<Option<Vec<u8>>> {
        if data.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::to_vec(data)?))
    }
}
