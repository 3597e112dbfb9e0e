//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! Pluggable codec registry: maps a string tag (as recorded in the
//! manifest) to the [`Codec`] implementation responsible for encoding and
//! decoding that payload.
//!
//! Every codec speaks a common currency type, [`serde_json::Value`], at its
//! boundary — the same trick `serde_json::Value` itself uses to let one type
//! round-trip through any `serde` data format. A codec that needs raw bytes
//! (e.g. the array-aware `disk-backed-binary` codec) extracts them from a
//! `Value::String`-or-`Value::Object` shape it defines itself; the registry
//! never has to know.

use std::collections::HashMap;
use std::io::{Read, Seek, Write};
use std::path::Path;
use std::sync::{Arc, OnceLock};

use crate::error::{CodecError, RegistryError};
use crate::stream::{self, VerifiableStream, VerifiedStream};

/// A pluggable encoder/decoder for one attribute payload format.
pub trait Codec: Send + Sync {
    /// Stable tag this codec is registered under, e.g. `"structured-text"`.
    fn tag(&self) -> &'static str;

    /// Serialize `value` to `writer`.
    fn encode(&self, value: &serde_json::Value, writer: &mut dyn Write) -> Result<(), CodecError>;

    /// Deserialize a value from `reader`.
    fn decode(&self, reader: &mut dyn Read) -> Result<serde_json::Value, CodecError>;

    /// Whether this codec supports `dump_to_path`/`load_from_path` (some
    /// codecs, like the framework-specific ones, require a real path handle
    /// rather than an arbitrary stream).
    fn supports_path(&self) -> bool {
        false
    }

    fn dump_to_path(&self, _value: &serde_json::Value, _path: &Path) -> Result<(), CodecError> {
        Err(CodecError::PathUnsupported(self.tag().to_string()))
    }

    fn load_from_path(&self, _path: &Path) -> Result<serde_json::Value, CodecError> {
        Err(CodecError::PathUnsupported(self.tag().to_string()))
    }
}

/// Encode `value` with `codec` into a freshly finalized [`VerifiableStream`],
/// returning its nonce/MAC alongside the readable result. Shared by every
/// codec so the MAC bookkeeping lives in exactly one place.
pub fn to_verifiable_stream(
    codec: &dyn Codec,
    value: &serde_json::Value,
) -> Result<(String, String, VerifiedStream), CodecError> {
    let mut buf = Vec::new();
    codec.encode(value, &mut buf)?;
    let mut vs = VerifiableStream::new();
    vs.write_all(&buf);
    let (nonce, mac, verified) = vs.finalize();
    Ok((nonce, mac, verified))
}

/// Verify `reader` against `nonce`/`mac`, then decode it with `codec`.
pub fn from_verifiable_stream<S: Read + Seek>(
    codec: &dyn Codec,
    nonce: &str,
    mac: &str,
    reader: &mut S,
) -> Result<serde_json::Value, CodecError> {
    stream::verify(nonce, mac, reader).map_err(|e| CodecError::DecodeFailed(e.to_string()))?;
    codec.decode(reader)
}

/// Maps string tags to registered [`Codec`] implementations.
#[derive(Default)]
pub struct CodecRegistry {
    codecs: HashMap<String, Arc<dyn Codec>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    /// Register a single codec. Errors if the tag is already registered.
    pub fn register(&mut self, codec: Arc<dyn Codec>) -> Result<(), RegistryError> {
        let tag = codec.tag().to_string();
        if self.codecs.contains_key(&tag) {
            return Err(RegistryError::DuplicateTag(tag));
        }
        self.codecs.insert(tag, codec);
        Ok(())
    }

    /// Register several codecs atomically: either all of them are added, or
    /// none are (mirrors the original's "check all names up front, then add
    /// them" two-pass registration, which avoids misleading duplicate-tag
    /// errors referring to an already-added codec from the same batch).
    pub fn register_many(&mut self, codecs: Vec<Arc<dyn Codec>>) -> Result<(), RegistryError> {
        let mut conflicts = Vec::new();
        for codec in &codecs {
            if self.codecs.contains_key(codec.tag()) {
                conflicts.push(codec.tag().to_string());
            }
        }
        if !conflicts.is_empty() {
            return Err(RegistryError::BatchConflict(conflicts));
        }
        for codec in codecs {
            self.codecs.insert(codec.tag().to_string(), codec);
        }
        Ok(())
    }

    pub fn get(&self, tag: &str) -> Result<Arc<dyn Codec>, RegistryError> {
        self.codecs
            .get(tag)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownCodec(tag.to_string()))
    }

    pub fn available(&self) -> std::collections::BTreeSet<String> {
        self.codecs.keys().cloned().collect()
    }
}

static DEFAULT_REGISTRY: OnceLock<CodecRegistry> = OnceLock::new();

impl CodecRegistry {
    /// The process-wide default registry, populated with the built-in
    /// codecs (and any feature-gated optional codecs compiled in) on first
    /// access.
    pub fn default_registry() -> &'static CodecRegistry {
        DEFAULT_REGISTRY.get_or_init(|| {
            let mut registry = CodecRegistry::new();
            crate::codecs::register_builtin_codecs(&mut registry)
                .expect("built-in codec tags must be unique");
            registry
        })
    }
}
