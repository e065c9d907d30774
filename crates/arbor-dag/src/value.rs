//! Conversion between IPLD values and the JSON document plane.
//!
//! Policy inputs and API responses speak `serde_json::Value`; the DAG speaks
//! `Ipld`. The mapping is lossy only where JSON has no equivalent: bytes
//! become arrays of numbers and links become CID strings.

use ipld_core::ipld::Ipld;
use serde_json::{Map, Number, Value};

/// Convert an IPLD value to JSON.
pub fn ipld_to_json(value: &Ipld) -> Value {
    match value {
        Ipld::Null => Value::Null,
        Ipld::Bool(b) => Value::Bool(*b),
        Ipld::Integer(i) => match i64::try_from(*i) {
            Ok(n) => Value::Number(Number::from(n)),
            Err(_) => Value::String(i.to_string()),
        },
        Ipld::Float(f) => Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Ipld::String(s) => Value::String(s.clone()),
        Ipld::Bytes(b) => Value::Array(b.iter().map(|byte| Value::Number((*byte).into())).collect()),
        Ipld::List(items) => Value::Array(items.iter().map(ipld_to_json).collect()),
        Ipld::Map(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                out.insert(k.clone(), ipld_to_json(v));
            }
            Value::Object(out)
        }
        Ipld::Link(cid) => Value::String(cid.to_string()),
    }
}

/// Convert a JSON value to IPLD.
pub fn json_to_ipld(value: &Value) -> Ipld {
    match value {
        Value::Null => Ipld::Null,
        Value::Bool(b) => Ipld::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ipld::Integer(i.into())
            } else {
                Ipld::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => Ipld::String(s.clone()),
        Value::Array(items) => Ipld::List(items.iter().map(json_to_ipld).collect()),
        Value::Object(map) => Ipld::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_ipld(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_roundtrip() {
        for value in [json!(null), json!(true), json!(7), json!("text")] {
            assert_eq!(ipld_to_json(&json_to_ipld(&value)), value);
        }
    }

    #[test]
    fn nested_structures_roundtrip() {
        let value = json!({
            "a": [1, 2, {"b": "c"}],
            "d": {"e": null}
        });
        assert_eq!(ipld_to_json(&json_to_ipld(&value)), value);
    }

    #[test]
    fn bytes_become_number_arrays() {
        let ipld = Ipld::Bytes(vec![1, 2, 255]);
        assert_eq!(ipld_to_json(&ipld), json!([1, 2, 255]));
    }

    #[test]
    fn links_become_cid_strings() {
        let node = arbor_store::Node::from_ipld(&Ipld::String("x".into())).unwrap();
        let ipld = Ipld::Link(*node.cid());
        assert_eq!(ipld_to_json(&ipld), json!(node.cid().to_string()));
    }
}
