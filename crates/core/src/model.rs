//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! Model lifecycle (component F): the contract a model type implements to
//! participate in the tamper-evident package format, plus the
//! nullify/restore protocol that turns a live model into a "naked" one
//! whose custom-serialized attributes have been extracted and replaced by a
//! sentinel, ready for the root object to be serialized opaquely.
//!
//! Where the original represents the sentinel with a dedicated
//! `CustomSerializedValue` marker class, Rust ownership already gives us a
//! zero-cost equivalent: a declared attribute lives behind `Option<T>`, and
//! "taken" is simply `None`. [`ModelLifecycle::take_attribute`] is expected
//! to leave the field in that state.

use std::collections::BTreeMap;

use serde_json::Map;

use crate::error::ModelError;
use crate::registry::CodecRegistry;

/// How a declared attribute should be serialized, or that it should be
/// skipped entirely.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttributeSerialization {
    /// Serialize with the codec registered under `codec_tag`, into an
    /// archive member named `filename`.
    Custom { codec_tag: String, filename: String },
    /// The attribute is not serialized at all; [`nullify`] still clears it
    /// to `None` so the model is consistently "naked" either way.
    DoNotSerialize,
}

/// Set-once metadata, matching [`crate::model::ModelLifecycle::metadata`]'s
/// original "may be set once during build time, otherwise raises" contract.
#[derive(Clone, Debug, Default)]
pub enum Metadata {
    #[default]
    Unset,
    Set(Map<String, serde_json::Value>),
}

impl Metadata {
    pub fn set(&mut self, value: Map<String, serde_json::Value>) -> Result<(), ModelError> {
        match self {
            Metadata::Unset => {
                *self = Metadata::Set(value);
                Ok(())
            }
            Metadata::Set(existing) => Err(ModelError::ValidationFailed(format!(
                "metadata can only be set once during build time; current value: {existing:?}"
            ))),
        }
    }
}

/// The contract every model type must implement to be saved and loaded by
/// this crate. `predict`/`validate_model` describe the model's runtime
/// behavior; `custom_serialization`/`take_attribute`/`put_attribute` are
/// what let [`crate::manifest`] walk the model's declared attributes
/// without knowing their concrete types.
pub trait ModelLifecycle {
    /// Human-readable model name.
    fn model_name(&self) -> &str;

    /// Which attributes need custom serialization, and how.
    ///
    /// Implementors must call [`validate_custom_serialization`] with this
    /// value (against the registry they intend to serialize with) before
    /// returning from their constructor — Rust has no equivalent of
    /// overriding `__init__` to enforce this automatically, so it is a
    /// documented invariant rather than a compile-time one.
    fn custom_serialization(&self) -> BTreeMap<String, AttributeSerialization>;

    /// Extract and return the current value of `attr_name` as JSON, leaving
    /// the field behind it cleared (`None`, or the type's equivalent empty
    /// state). Called once per declared attribute during [`nullify`].
    fn take_attribute(&mut self, attr_name: &str) -> serde_json::Value;

    /// Set `attr_name` to the deserialized `value`. Called once per
    /// declared attribute during [`restore`].
    fn put_attribute(&mut self, attr_name: &str, value: serde_json::Value);

    /// Run the model on `input`.
    fn predict(&self, input: &serde_json::Value) -> Result<serde_json::Value, ModelError>;

    /// Raise if the model fails validation (e.g. does not reproduce its
    /// train-time predictions on held-out data serialized alongside it).
    fn validate_model(&self) -> Result<(), ModelError>;

    /// Any custom work needed right after deserialization, before the model
    /// is handed back to the caller.
    fn post_deserialize_hook(&mut self) -> Result<(), ModelError> {
        Ok(())
    }

    fn metadata(&self) -> &Metadata;
    fn metadata_mut(&mut self) -> &mut Metadata;

    /// Snapshot the model's own fields (everything *not* covered by
    /// [`custom_serialization`](Self::custom_serialization)) as JSON, to be
    /// handed to the `opaque-object` codec as the root payload. Call this
    /// only after [`nullify`] has cleared the declared attributes, the same
    /// way the original pickles the "naked" model object.
    fn to_snapshot(&self) -> Result<serde_json::Value, ModelError>;

    /// The inverse of [`to_snapshot`](Self::to_snapshot): rebuild a model
    /// from its naked snapshot, before [`restore`] puts the declared
    /// attributes back.
    fn from_snapshot(value: serde_json::Value) -> Result<Self, ModelError>
    where
        Self: Sized;
}

/// Check that every declared attribute either names a codec present in
/// `registry`, or is explicitly marked "do not serialize", and that the
/// declaration's own schema is sound: non-empty attribute names, a
/// filename-safe charset, no two attributes sharing a filename, and no
/// attribute claiming the reserved model filename for itself. Call this
/// from a model's constructor, against the registry you intend to use for
/// saving — see [`ModelLifecycle::custom_serialization`]'s doc comment.
pub fn validate_custom_serialization(
    declared: &BTreeMap<String, AttributeSerialization>,
    registry: &CodecRegistry,
) -> Result<(), ModelError> {
    let mut seen_filenames = std::collections::HashSet::new();
    for (attr_name, scheme) in declared {
        if attr_name.is_empty() {
            return Err(ModelError::ValidationFailed(
                "attribute names in custom_serialization must be non-empty".to_string(),
            ));
        }
        if let AttributeSerialization::Custom { codec_tag, filename } = scheme {
            if registry.get(codec_tag).is_err() {
                return Err(ModelError::UnknownDeclaredCodec(format!(
                    "{attr_name} -> {codec_tag}"
                )));
            }
            if !is_filename_safe(filename) {
                return Err(ModelError::ValidationFailed(format!(
                    "attribute {attr_name:?} declares filename {filename:?}, which is not filename-safe \
                     (only ASCII letters, digits, '-', '_', and '.' are allowed)"
                )));
            }
            if filename == crate::manifest::MODEL_FILE_NAME {
                return Err(ModelError::ValidationFailed(format!(
                    "attribute {attr_name:?} claims filename {filename:?}, which is reserved for the model itself"
                )));
            }
            if !seen_filenames.insert(filename.clone()) {
                return Err(ModelError::ValidationFailed(format!(
                    "filename {filename:?} is declared by more than one attribute"
                )));
            }
        }
    }
    Ok(())
}

/// ASCII letters, digits, `-`, `_`, and `.` only — keeps a declared filename
/// from ever being interpreted as a path (e.g. `../escape`) once written as
/// an archive member.
fn is_filename_safe(filename: &str) -> bool {
    !filename.is_empty()
        && filename
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

/// A raw payload extracted from one declared attribute, paired with the
/// serialization scheme that produced it, ready for [`crate::manifest`] to
/// push through the codec registry and into a verifiable stream.
pub struct ExtractedAttribute {
    pub attr_name: String,
    pub codec_tag: String,
    pub filename: String,
    pub value: serde_json::Value,
}

/// Extract every declared, serializable attribute from `model`, clearing
/// each one to its sentinel state as it goes, leaving `model` "naked" and
/// ready to be passed to the `opaque-object` codec as the root payload.
pub fn nullify<M: ModelLifecycle>(model: &mut M) -> Vec<ExtractedAttribute> {
    let mut extracted = Vec::new();
    for (attr_name, scheme) in model.custom_serialization() {
        let value = model.take_attribute(&attr_name);
        if let AttributeSerialization::Custom { codec_tag, filename } = scheme {
            extracted.push(ExtractedAttribute {
                attr_name,
                codec_tag,
                filename,
                value,
            });
        }
    }
    extracted
}

/// Restore every attribute in `attributes` onto `model`, then run its
/// post-deserialize hook. The inverse of [`nullify`].
pub fn restore<M: ModelLifecycle>(
    model: &mut M,
    attributes: Vec<(String, serde_json::Value)>,
) -> Result<(), ModelError> {
    for (attr_name, value) in attributes {
        model.put_attribute(&attr_name, value);
    }
    model.post_deserialize_hook()
}
