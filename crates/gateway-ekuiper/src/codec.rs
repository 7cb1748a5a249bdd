// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! JSON encoding of outbound trans-data and decoding of inbound write
//! requests (§4.9).

use gateway_core::message::{TagValue, TransData, WriteOne, WriteTagReq, WriteTagsReq, WriteValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Serialize)]
struct TransDataWire {
    node_name: String,
    group_name: String,
    timestamp: i64,
    values: HashMap<String, Value>,
    errors: HashMap<String, String>,
    metas: HashMap<String, HashMap<String, String>>,
}

/// Partition a trans-data batch's samples into `values`/`errors` and
/// encode as the wire JSON object (§4.9 step 2).
pub fn encode_trans_data(data: &TransData) -> Result<Vec<u8>, CodecError> {
    let mut values = HashMap::new();
    let mut errors = HashMap::new();
    let mut metas = HashMap::new();

    for sample in &data.samples {
        if !sample.metas.is_empty() {
            metas.insert(sample.tag.clone(), sample.metas.clone());
        }
        match (&sample.value, &sample.error) {
            (Some(v), _) => {
                values.insert(sample.tag.clone(), tag_value_to_json(v));
            }
            (None, Some(e)) => {
                errors.insert(sample.tag.clone(), format!("{e:?}"));
            }
            (None, None) => {}
        }
    }

    let wire = TransDataWire {
        node_name: data.driver.clone(),
        group_name: data.group.clone(),
        timestamp: data.timestamp_ms,
        values,
        errors,
        metas,
    };
    Ok(serde_json::to_vec(&wire)?)
}

fn tag_value_to_json(v: &TagValue) -> Value {
    match v {
        TagValue::Int(i) => Value::from(*i),
        TagValue::UInt(u) => Value::from(*u),
        TagValue::Float(f) => Value::from(*f),
        TagValue::Bool(b) => Value::from(*b),
        TagValue::String(s) => Value::from(s.clone()),
        TagValue::IntArray(a) => Value::from(a.clone()),
        TagValue::FloatArray(a) => Value::from(a.clone()),
        TagValue::Null => Value::Null,
    }
}

#[derive(Debug, Deserialize)]
struct SingleWriteWire {
    node_name: String,
    group_name: String,
    tag_name: String,
    value: Value,
    #[serde(default)]
    precision: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct OneTagWire {
    tag_name: String,
    value: Value,
    #[serde(default)]
    precision: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct MultiWriteWire {
    node_name: String,
    group_name: String,
    tags: Vec<OneTagWire>,
}

pub enum WriteRequest {
    Single(WriteTagReq),
    Multi(WriteTagsReq),
}

/// A frame with a `tags` field is a multi-write request; without it,
/// a single write (§4.9 Inbound, §8 boundary behaviour).
pub fn decode_write_request(json: &[u8]) -> Result<WriteRequest, CodecError> {
    let value: Value = serde_json::from_slice(json)?;
    if value.get("tags").is_some() {
        let wire: MultiWriteWire = serde_json::from_value(value)?;
        let tags = wire
            .tags
            .into_iter()
            .map(|t| WriteOne { tag_name: t.tag_name, value: coerce(t.value, t.precision), precision: t.precision })
            .collect();
        Ok(WriteRequest::Multi(WriteTagsReq { node_name: wire.node_name, group_name: wire.group_name, tags }))
    } else {
        let wire: SingleWriteWire = serde_json::from_value(value)?;
        Ok(WriteRequest::Single(WriteTagReq {
            node_name: wire.node_name,
            group_name: wire.group_name,
            tag_name: wire.tag_name,
            value: coerce(wire.value, wire.precision),
            precision: wire.precision,
        }))
    }
}

/// If `precision > 0`, an integer JSON value is treated as a double
/// (§4.9 Inbound numeric coercion).
fn coerce(value: Value, precision: Option<u8>) -> WriteValue {
    match value {
        Value::Bool(b) => WriteValue::Bool(b),
        Value::String(s) => WriteValue::String(s),
        Value::Number(n) => {
            if precision.unwrap_or(0) > 0 {
                WriteValue::Float(n.as_f64().unwrap_or(0.0))
            } else if let Some(i) = n.as_i64() {
                WriteValue::Int(i)
            } else {
                WriteValue::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        _ => WriteValue::Int(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::error::ErrorKind;
    use gateway_core::message::TagSample;

    #[test]
    fn trans_data_splits_values_and_errors() {
        let data = TransData {
            driver: "d1".into(),
            group: "g1".into(),
            timestamp_ms: 1000,
            samples: vec![
                TagSample { tag: "t1".into(), value: Some(TagValue::UInt(42)), error: None, metas: Default::default() },
                TagSample { tag: "t2".into(), value: None, error: Some(ErrorKind::PluginDeviceNotResponse), metas: Default::default() },
            ],
        };
        let json = encode_trans_data(&data).unwrap();
        let parsed: Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(parsed["values"]["t1"], 42);
        assert!(parsed["errors"].get("t2").is_some());
    }

    #[test]
    fn frame_without_tags_is_single_write() {
        let json = br#"{"node_name":"d1","group_name":"g1","tag_name":"t1","value":42}"#;
        assert!(matches!(decode_write_request(json).unwrap(), WriteRequest::Single(_)));
    }

    #[test]
    fn frame_with_tags_is_multi_write() {
        let json = br#"{"node_name":"d1","group_name":"g1","tags":[{"tag_name":"t1","value":1}]}"#;
        assert!(matches!(decode_write_request(json).unwrap(), WriteRequest::Multi(_)));
    }

    #[test]
    fn precision_coerces_integer_to_float() {
        let json = br#"{"node_name":"d1","group_name":"g1","tag_name":"t1","value":42,"precision":2}"#;
        match decode_write_request(json).unwrap() {
            WriteRequest::Single(req) => assert!(matches!(req.value, WriteValue::Float(f) if f == 42.0)),
            _ => panic!("expected single write"),
        }
    }
}
