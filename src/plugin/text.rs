use super::Producer;
use serde_json::Value;

/// Producer rendering handler results as plain text.
///
/// Strings are written verbatim; other values fall back to their JSON
/// rendering; `null` leaves the body empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextProducer;

impl Producer for TextProducer {
    fn assemble(&self, data: &Value) -> anyhow::Result<Option<Vec<u8>>> {
        match data {
            Value::Null => Ok(None),
            Value::String(text) => Ok(Some(text.clone().into_bytes())),
            other => Ok(Some(other.to_string().into_bytes())),
        }
    }
}
