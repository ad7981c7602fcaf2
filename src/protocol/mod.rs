//! Wire protocols.
//!
//! A protocol converts between one newline-delimited record (terminator
//! already stripped) and a decoded key/value pair. Phases only ever decode
//! their input records and encode their output records, so intermediate
//! data can flow between steps without any phase knowing the pipeline's
//! overall formats. Which protocol governs which boundary is decided by
//! [`negotiate`].

pub mod negotiate;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::job::hooks::Pair;

/// Which wire format governs one read or write boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolRole {
    /// The job's input format, read by the first script phase in pipeline
    /// order.
    Input,
    /// The shared interior hand-off format.
    Internal,
    /// The job's output format, written by the last script phase.
    Output,
    /// Undecoded pass-through, for combiners running behind a command
    /// mapper.
    Raw,
}

/// Read and write roles resolved for one (step, phase) boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolAssignment {
    pub read: ProtocolRole,
    pub write: ProtocolRole,
}

pub trait Protocol {
    /// Decode one record into a pair.
    fn decode(&self, record: &[u8]) -> Result<Pair>;

    /// Encode a pair as one record, without terminator.
    fn encode(&self, key: &Value, value: &Value) -> Result<Vec<u8>>;
}

/// Passes each record through as a string value with a null key.
///
/// The default input protocol: the first mapper sees each raw input record
/// as its value.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawValueProtocol;

impl Protocol for RawValueProtocol {
    fn decode(&self, record: &[u8]) -> Result<Pair> {
        let value = String::from_utf8_lossy(record).into_owned();
        Ok((Value::Null, Value::String(value)))
    }

    fn encode(&self, _key: &Value, value: &Value) -> Result<Vec<u8>> {
        match value {
            Value::String(s) => Ok(s.clone().into_bytes()),
            other => Ok(serde_json::to_vec(other)?),
        }
    }
}

/// Tab-separated JSON-encoded key and value.
///
/// The default internal and output protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonProtocol;

impl Protocol for JsonProtocol {
    fn decode(&self, record: &[u8]) -> Result<Pair> {
        let tab = record
            .iter()
            .position(|&b| b == b'\t')
            .ok_or_else(|| Error::Protocol("expected tab-separated key and value".into()))?;
        let key = serde_json::from_slice(&record[..tab])?;
        let value = serde_json::from_slice(&record[tab + 1..])?;
        Ok((key, value))
    }

    fn encode(&self, key: &Value, value: &Value) -> Result<Vec<u8>> {
        let mut record = serde_json::to_vec(key)?;
        record.push(b'\t');
        record.extend(serde_json::to_vec(value)?);
        Ok(record)
    }
}

/// JSON-encoded value only. Keys decode as null and are dropped on encode.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonValueProtocol;

impl Protocol for JsonValueProtocol {
    fn decode(&self, record: &[u8]) -> Result<Pair> {
        Ok((Value::Null, serde_json::from_slice(record)?))
    }

    fn encode(&self, _key: &Value, value: &Value) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_value_wraps_record_as_string_value() -> Result<()> {
        let (key, value) = RawValueProtocol.decode(b"some line")?;
        assert_eq!(key, Value::Null);
        assert_eq!(value, json!("some line"));
        Ok(())
    }

    #[test]
    fn raw_value_encodes_string_values_verbatim() -> Result<()> {
        let record = RawValueProtocol.encode(&json!("ignored"), &json!("payload"))?;
        assert_eq!(record, b"payload");
        Ok(())
    }

    #[test]
    fn json_protocol_splits_on_first_tab() -> Result<()> {
        let (key, value) = JsonProtocol.decode(br#""a"	{"b":"c\td"}"#)?;
        assert_eq!(key, json!("a"));
        assert_eq!(value, json!({"b": "c\td"}));
        Ok(())
    }

    #[test]
    fn json_protocol_rejects_untabbed_records() {
        let result = JsonProtocol.decode(b"no tab here");
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[test]
    fn json_protocol_encodes_key_tab_value() -> Result<()> {
        let record = JsonProtocol.encode(&json!(["k", 1]), &json!(2))?;
        assert_eq!(record, br#"["k",1]	2"#);
        Ok(())
    }

    #[test]
    fn json_value_ignores_keys() -> Result<()> {
        let record = JsonValueProtocol.encode(&json!("dropped"), &json!({"n": 5}))?;
        assert_eq!(record, br#"{"n":5}"#);
        let (key, value) = JsonValueProtocol.decode(&record)?;
        assert_eq!(key, Value::Null);
        assert_eq!(value, json!({"n": 5}));
        Ok(())
    }
}
