//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! `disk-backed-binary`: a second opaque-style codec specialized for
//! numerical arrays, backed by `safetensors`. This mirrors the original's
//! use of `joblib` as "a second opaque-object codec backed by a different
//! framework with better array handling" than its primary pickle codec.
//!
//! The JSON currency type this codec expects/produces is an object mapping
//! tensor name to `{"dtype": ..., "shape": [...], "data": "<base64>"}` — the
//! smallest shape that round-trips through `safetensors` without requiring
//! callers to depend on any particular tensor/array crate themselves.

use std::collections::HashMap;
use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use safetensors::tensor::{Dtype, TensorView};
use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::registry::Codec;

use super::TAG_DISK_BACKED_BINARY;

#[derive(Serialize, Deserialize)]
struct ArrayEntry {
    dtype: String,
    shape: Vec<usize>,
    data: String,
}

pub struct DiskBackedBinaryCodec;

fn parse_dtype(name: &str) -> Result<Dtype, CodecError> {
    match name {
        "F32" | "f32" => Ok(Dtype::F32),
        "F64" | "f64" => Ok(Dtype::F64),
        "F16" | "f16" => Ok(Dtype::F16),
        "I64" | "i64" => Ok(Dtype::I64),
        "I32" | "i32" => Ok(Dtype::I32),
        "U8" | "u8" => Ok(Dtype::U8),
        "BOOL" | "bool" => Ok(Dtype::BOOL),
        other => Err(CodecError::DecodeFailed(format!("unsupported dtype {other:?}"))),
    }
}

impl Codec for DiskBackedBinaryCodec {
    fn tag(&self) -> &'static str {
        TAG_DISK_BACKED_BINARY
    }

    fn encode(&self, value: &serde_json::Value, writer: &mut dyn Write) -> Result<(), CodecError> {
        let entries: HashMap<String, ArrayEntry> = serde_json::from_value(value.clone())
            .map_err(|e| CodecError::EncodeFailed(format!("expected a tensor-name map: {e}")))?;

        let mut raw: HashMap<String, Vec<u8>> = HashMap::new();
        let mut views: HashMap<String, (Dtype, Vec<usize>, usize)> = HashMap::new();
        for (name, entry) in &entries {
            let bytes = BASE64
                .decode(&entry.data)
                .map_err(|e| CodecError::EncodeFailed(format!("invalid base64 for {name:?}: {e}")))?;
            let dtype = parse_dtype(&entry.dtype)?;
            let len = bytes.len();
            raw.insert(name.clone(), bytes);
            views.insert(name.clone(), (dtype, entry.shape.clone(), len));
        }

        let mut tensor_views = HashMap::new();
        for (name, (dtype, shape, _len)) in &views {
            let data = raw.get(name).expect("populated above");
            let view = TensorView::new(*dtype, shape.clone(), data)
                .map_err(|e| CodecError::EncodeFailed(format!("malformed tensor {name:?}: {e:?}")))?;
            tensor_views.insert(name.clone(), view);
        }

        let bytes = safetensors::tensor::serialize(&tensor_views, &None)
            .map_err(|e| CodecError::EncodeFailed(format!("safetensors serialize: {e:?}")))?;
        writer.write_all(&bytes).map_err(CodecError::from)
    }

    fn decode(&self, reader: &mut dyn Read) -> Result<serde_json::Value, CodecError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).map_err(CodecError::from)?;

        let tensors = safetensors::SafeTensors::deserialize(&bytes)
            .map_err(|e| CodecError::DecodeFailed(format!("safetensors deserialize: {e:?}")))?;

        let mut entries = HashMap::new();
        for (name, view) in tensors.tensors() {
            let dtype = format!("{:?}", view.dtype());
            let entry = ArrayEntry {
                dtype,
                shape: view.shape().to_vec(),
                data: BASE64.encode(view.data()),
            };
            entries.insert(name, entry);
        }

        serde_json::to_value(entries).map_err(|e| CodecError::DecodeFailed(e.to_string()))
    }
}
