//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! `opaque-object`: a general-purpose binary codec for the root model object
//! and any attribute that doesn't need to be human-readable. Backed by
//! `bincode`, the closest Rust analogue of a native object-graph pickler —
//! the trade made explicitly in the original's design notes: we give up
//! true cross-type polymorphism in exchange for schema-checked, compact
//! binary encoding of a concrete `Serialize`/`Deserialize` type.
//!
//! `bincode` is not a self-describing format: it refuses
//! `Deserializer::deserialize_any`, which is exactly what `serde_json::Value`'s
//! `Deserialize` impl calls. Encoding a `Value` straight through `bincode`
//! therefore serializes fine but always fails to decode. `WireValue` mirrors
//! `Value`'s shape as a concrete, non-self-describing enum so `bincode` only
//! ever sees types it can round-trip, and the codec converts at its edges.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::CodecError;
use crate::registry::Codec;

use super::TAG_OPAQUE_OBJECT;

#[derive(Serialize, Deserialize)]
enum WireValue {
    Null,
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    String(String),
    Array(Vec<WireValue>),
    Object(BTreeMap<String, WireValue>),
}

fn to_wire(value: &Value) -> WireValue {
    match value {
        Value::Null => WireValue::Null,
        Value::Bool(b) => WireValue::Bool(*b),
        Value::Number(n) => {
            if n.is_i64() {
                WireValue::I64(n.as_i64().expect("checked is_i64"))
            } else if n.is_u64() {
                WireValue::U64(n.as_u64().expect("checked is_u64"))
            } else {
                WireValue::F64(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => WireValue::String(s.clone()),
        Value::Array(items) => WireValue::Array(items.iter().map(to_wire).collect()),
        Value::Object(map) => {
            WireValue::Object(map.iter().map(|(k, v)| (k.clone(), to_wire(v))).collect())
        }
    }
}

fn from_wire(value: WireValue) -> Value {
    match value {
        WireValue::Null => Value::Null,
        WireValue::Bool(b) => Value::Bool(b),
        WireValue::I64(i) => Value::Number(Number::from(i)),
        WireValue::U64(u) => Value::Number(Number::from(u)),
        WireValue::F64(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        WireValue::String(s) => Value::String(s),
        WireValue::Array(items) => Value::Array(items.into_iter().map(from_wire).collect()),
        WireValue::Object(map) => {
            Value::Object(map.into_iter().map(|(k, v)| (k, from_wire(v))).collect::<Map<_, _>>())
        }
    }
}

pub struct OpaqueObjectCodec;

impl Codec for OpaqueObjectCodec {
    fn tag(&self) -> &'static str {
        TAG_OPAQUE_OBJECT
    }

    fn encode(&self, value: &Value, writer: &mut dyn Write) -> Result<(), CodecError> {
        bincode::serialize_into(writer, &to_wire(value))
            .map_err(|e| CodecError::EncodeFailed(e.to_string()))
    }

    fn decode(&self, reader: &mut dyn Read) -> Result<Value, CodecError> {
        let wire: WireValue =
            bincode::deserialize_from(reader).map_err(|e| CodecError::DecodeFailed(e.to_string()))?;
        Ok(from_wire(wire))
    }
}
