//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! `tensor-model` / `tensor-state`: raw named-tensor collections via `tch`,
//! matching the original's `TorchStateDictIO` (serializing a module's
//! `state_dict` rather than the whole module object graph). Both variants
//! use `tch::Tensor::save_multi`/`load_multi`, which produce one
//! self-contained file; as with [`super::neural_model`], the filesystem
//! path `tch` insists on is a scoped temp file, never a persistent archive
//! member.

use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::CodecError;
use crate::registry::Codec;

use super::{TAG_TENSOR_MODEL, TAG_TENSOR_STATE};

fn save_named_tensors(entries: &[(String, tch::Tensor)]) -> Result<Vec<u8>, CodecError> {
    let tmp = tempfile::NamedTempFile::new().map_err(CodecError::from)?;
    tch::Tensor::save_multi(entries, tmp.path())
        .map_err(|e| CodecError::EncodeFailed(format!("torch save_multi: {e}")))?;
    std::fs::read(tmp.path()).map_err(CodecError::from)
}

fn load_named_tensors(bytes: &[u8]) -> Result<Vec<(String, tch::Tensor)>, CodecError> {
    let mut tmp = tempfile::NamedTempFile::new().map_err(CodecError::from)?;
    tmp.write_all(bytes).map_err(CodecError::from)?;
    tch::Tensor::load_multi(tmp.path())
        .map_err(|e| CodecError::DecodeFailed(format!("torch load_multi: {e}")))
}

fn blob_to_json(bytes: Vec<u8>) -> serde_json::Value {
    serde_json::Value::String(BASE64.encode(bytes))
}

fn json_to_blob(value: &serde_json::Value) -> Result<Vec<u8>, CodecError> {
    let b64 = value
        .as_str()
        .ok_or_else(|| CodecError::EncodeFailed("expected base64 torch tensor blob".into()))?;
    BASE64
        .decode(b64)
        .map_err(|e| CodecError::EncodeFailed(format!("invalid base64: {e}")))
}

/// `tensor-model`: a whole module's flattened named tensors.
pub struct TensorModelCodec;

impl Codec for TensorModelCodec {
    fn tag(&self) -> &'static str {
        TAG_TENSOR_MODEL
    }

    fn encode(&self, value: &serde_json::Value, writer: &mut dyn Write) -> Result<(), CodecError> {
        writer
            .write_all(&json_to_blob(value)?)
            .map_err(CodecError::from)
    }

    fn decode(&self, reader: &mut dyn Read) -> Result<serde_json::Value, CodecError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).map_err(CodecError::from)?;
        // Round-trip through tch to validate the blob is actually loadable.
        let tensors = load_named_tensors(&bytes)?;
        Ok(blob_to_json(save_named_tensors(&tensors)?))
    }
}

/// `tensor-state`: a flat `VarStore`-style state dict, stored the same way
/// as `tensor-model` but kept as a distinct tag since the two are not
/// interchangeable at the model-lifecycle level (see [`crate::model`]).
pub struct TensorStateCodec;

impl Codec for TensorStateCodec {
    fn tag(&self) -> &'static str {
        TAG_TENSOR_STATE
    }

    fn encode(&self, value: &serde_json::Value, writer: &mut dyn Write) -> Result<(), CodecError> {
        writer
            .write_all(&json_to_blob(value)?)
            .map_err(CodecError::from)
    }

    fn decode(&self, reader: &mut dyn Read) -> Result<serde_json::Value, CodecError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).map_err(CodecError::from)?;
        let tensors = load_named_tensors(&bytes)?;
        Ok(blob_to_json(save_named_tensors(&tensors)?))
    }
}
