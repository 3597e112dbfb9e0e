//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! `neural-model` / `neural-model-with-custom-classes`: torch modules via
//! `tch`, mirroring the original's `TorchModelIO`. `tch::CModule` only knows
//! how to save/load via a real filesystem path, so we round-trip through a
//! scoped `tempfile::NamedTempFile` to obtain the serialized bytes — unlike
//! [`super::hierarchical_binary`], this codec's constraint is only that
//! *our* package format never materializes a persistent file, which a
//! temp file that's removed on drop satisfies.

use std::collections::HashMap;
use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::registry::Codec;

use super::{TAG_NEURAL_MODEL, TAG_NEURAL_MODEL_WITH_CUSTOM_CLASSES};

fn save_module_bytes(module: &tch::CModule) -> Result<Vec<u8>, CodecError> {
    let tmp = tempfile::NamedTempFile::new().map_err(CodecError::from)?;
    module
        .save(tmp.path())
        .map_err(|e| CodecError::EncodeFailed(format!("torch save: {e}")))?;
    std::fs::read(tmp.path()).map_err(CodecError::from)
}

fn load_module_bytes(bytes: &[u8]) -> Result<tch::CModule, CodecError> {
    let mut tmp = tempfile::NamedTempFile::new().map_err(CodecError::from)?;
    tmp.write_all(bytes).map_err(CodecError::from)?;
    tch::CModule::load(tmp.path()).map_err(|e| CodecError::DecodeFailed(format!("torch load: {e}")))
}

/// `neural-model`: a bare torch module, stored as a base64 blob produced by
/// `torch::save`.
pub struct NeuralModelCodec;

impl Codec for NeuralModelCodec {
    fn tag(&self) -> &'static str {
        TAG_NEURAL_MODEL
    }

    fn encode(&self, value: &serde_json::Value, writer: &mut dyn Write) -> Result<(), CodecError> {
        let b64 = value
            .as_str()
            .ok_or_else(|| CodecError::EncodeFailed("expected base64 torch blob".into()))?;
        let bytes = BASE64
            .decode(b64)
            .map_err(|e| CodecError::EncodeFailed(format!("invalid base64: {e}")))?;
        writer.write_all(&bytes).map_err(CodecError::from)
    }

    fn decode(&self, reader: &mut dyn Read) -> Result<serde_json::Value, CodecError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).map_err(CodecError::from)?;
        // Round-trip through tch to fail fast on a corrupt / non-torch blob,
        // matching the original's `model.eval()` call immediately after load.
        let module = load_module_bytes(&bytes)?;
        let reencoded = save_module_bytes(&module)?;
        Ok(serde_json::Value::String(BASE64.encode(reencoded)))
    }
}

#[derive(Serialize, Deserialize)]
struct CustomClassesPayload {
    model_bytes: String,
    custom_objects: HashMap<String, String>,
}

/// `neural-model-with-custom-classes`: a torch module paired with a map of
/// custom class names to their registration keys, matching the original's
/// `KerasCustomObjectsIO` pairing of `{keras_model, custom_objects}`.
pub struct NeuralModelWithCustomClassesCodec;

impl Codec for NeuralModelWithCustomClassesCodec {
    fn tag(&self) -> &'static str {
        TAG_NEURAL_MODEL_WITH_CUSTOM_CLASSES
    }

    fn encode(&self, value: &serde_json::Value, writer: &mut dyn Write) -> Result<(), CodecError> {
        let payload: CustomClassesPayload = serde_json::from_value(value.clone())
            .map_err(|e| CodecError::EncodeFailed(format!("expected {{model_bytes, custom_objects}}: {e}")))?;
        bincode::serialize_into(writer, &payload)
            .map_err(|e| CodecError::EncodeFailed(e.to_string()))
    }

    fn decode(&self, reader: &mut dyn Read) -> Result<serde_json::Value, CodecError> {
        let payload: CustomClassesPayload =
            bincode::deserialize_from(reader).map_err(|e| CodecError::DecodeFailed(e.to_string()))?;
        serde_json::to_value(payload).map_err(|e| CodecError::DecodeFailed(e.to_string()))
    }
}
