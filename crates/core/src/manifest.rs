//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! Manifest v3 (component G): the signed JSON document that ties together
//! every stream's nonce/MAC with the codec used to produce it, plus
//! provenance metadata. This is the orchestrator that drives components A
//! through F to actually save and load a model.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::archive::{self, write_member, write_member_bytes};
use crate::error::{ManifestError, ModelError, ModelPackError};
use crate::model::{self, ModelLifecycle};
use crate::registry::{self, CodecRegistry};
use crate::trust::{self, KeyHome, TrustContext};

pub const METADATA_FILENAME: &str = "meta.json.asc";
pub const MODEL_FILE_NAME: &str = "THEMODEL.pickle";
pub const MODEL_SELF_CODEC: &str = crate::codecs::TAG_OPAQUE_OBJECT;
pub const MANIFEST_VERSION: u32 = 3;

/// One serialized stream's recorded nonce/MAC and the codec that produced
/// it, as stored under the manifest's `"model"` key or inside
/// `"attributes"`.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct StreamDescriptor {
    pub filename: String,
    pub nonce: String,
    pub hmac_code: String,
    pub serializer: String,
}

/// The full manifest document, signed in its cleartext JSON form and
/// stored as the archive's `meta.json.asc` member.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct ManifestV3 {
    pub version: u32,
    pub model: StreamDescriptor,
    pub attributes: BTreeMap<String, StreamDescriptor>,
    pub written_on_date: String,
    pub serializing_package_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_packages: Option<Vec<String>>,
}

impl ManifestV3 {
    fn validate_shape(&self) -> Result<(), ManifestError> {
        if self.version != MANIFEST_VERSION {
            return Err(ManifestError::UnsupportedVersion(self.version));
        }
        if self.model.filename.is_empty() || self.model.nonce.is_empty() || self.model.hmac_code.is_empty() {
            return Err(ManifestError::SchemaViolation(
                "model stream descriptor has empty required fields".to_string(),
            ));
        }
        if self.model.serializer != MODEL_SELF_CODEC {
            return Err(ManifestError::SchemaViolation(format!(
                "model stream descriptor must use the {MODEL_SELF_CODEC:?} codec, found {:?}",
                self.model.serializer
            )));
        }
        for (attr_name, descriptor) in &self.attributes {
            if descriptor.filename.is_empty() || descriptor.nonce.is_empty() || descriptor.hmac_code.is_empty() {
                return Err(ManifestError::SchemaViolation(format!(
                    "attribute {attr_name:?} has empty required stream descriptor fields"
                )));
            }
            if descriptor.filename == MODEL_FILE_NAME {
                return Err(ManifestError::SchemaViolation(format!(
                    "attribute {attr_name:?} claims filename {MODEL_FILE_NAME:?}, which is reserved for the model itself"
                )));
            }
        }
        Ok(())
    }
}

fn check_installed_packages(manifest: &ManifestV3) {
    match &manifest.installed_packages {
        None => warn!(
            "manifest has no installed_packages field; this is optional for now but will \
             soon be required. Consider re-saving the model with a newer version"
        ),
        Some(packages) if packages.is_empty() => {
            warn!("manifest's installed_packages list is empty")
        }
        Some(_) => {}
    }
}

/// Save `model` into `model_directory` (the archive's single top-level
/// directory, already created by the caller) inside `builder`, signing the
/// resulting manifest with `fingerprint` from `key_home`.
///
/// `model_directory` is shared with whatever wrote `meta.version` so the
/// archive never ends up with two independent top-level directories — see
/// [`crate::archive::create_model_directory`].
///
/// Runs [`ModelLifecycle::validate_model`] first unless `validate` is false —
/// mirroring the original's `_run_model_validation_wrapper`, which logs a
/// loud warning rather than silently succeeding when validation is skipped.
#[allow(clippy::too_many_arguments)]
pub fn save_to_tarball<W: Write, M: ModelLifecycle>(
    builder: &mut tar::Builder<W>,
    model_directory: &str,
    model: &mut M,
    registry: &CodecRegistry,
    ctx: &TrustContext,
    key_home: &KeyHome,
    fingerprint: &str,
    validate: bool,
) -> Result<(), ModelPackError> {
    if validate {
        model.validate_model().map_err(ModelPackError::from)?;
    } else {
        warn!(
            model = model.model_name(),
            "skipping model validation before save; the saved model may not reproduce its \
             train-time behavior on load"
        );
    }

    let declared = model.custom_serialization();
    if declared.contains_key("model") {
        return Err(ModelError::ValidationFailed(
            "custom_serialization declares an attribute named \"model\", which collides with \
             the manifest key reserved for the root model payload"
                .to_string(),
        )
        .into());
    }
    model::validate_custom_serialization(&declared, registry).map_err(ModelPackError::from)?;

    info!(model_directory, "serializing model attributes to streams");
    let extracted = model::nullify(model);
    let mut attribute_descriptors = BTreeMap::new();
    for attr in extracted {
        let codec = registry
            .get(&attr.codec_tag)
            .map_err(|e| ModelError::ValidationFailed(format!("attribute {:?}: {e}", attr.attr_name)))?;
        let (nonce, hmac_code, verified) = registry::to_verifiable_stream(codec.as_ref(), &attr.value)
            .map_err(|e| ModelError::ValidationFailed(format!("encoding attribute {:?}: {e}", attr.attr_name)))?;
        let member_path = format!("{model_directory}/{}", attr.filename);
        write_member(builder, &member_path, verified).map_err(ModelPackError::from)?;
        attribute_descriptors.insert(
            attr.attr_name,
            StreamDescriptor {
                filename: attr.filename,
                nonce,
                hmac_code,
                serializer: attr.codec_tag,
            },
        );
    }

    info!("serializing naked model object into stream");
    let model_codec = registry
        .get(MODEL_SELF_CODEC)
        .expect("opaque-object codec is always registered");
    let model_value = model.to_snapshot().map_err(ModelPackError::from)?;
    let (model_nonce, model_hmac, model_verified) =
        registry::to_verifiable_stream(model_codec.as_ref(), &model_value)
            .map_err(|e| ModelError::ValidationFailed(format!("encoding model payload: {e}")))?;
    let model_path = format!("{model_directory}/{MODEL_FILE_NAME}");
    write_member(builder, &model_path, model_verified).map_err(ModelPackError::from)?;

    let manifest = ManifestV3 {
        version: MANIFEST_VERSION,
        model: StreamDescriptor {
            filename: MODEL_FILE_NAME.to_string(),
            nonce: model_nonce,
            hmac_code: model_hmac,
            serializer: MODEL_SELF_CODEC.to_string(),
        },
        attributes: attribute_descriptors,
        written_on_date: chrono::Utc::now().to_rfc3339(),
        serializing_package_version: env!("CARGO_PKG_VERSION").to_string(),
        installed_packages: installed_packages_best_effort(),
    };
    manifest.validate_shape().map_err(ModelPackError::from)?;

    info!("writing signed manifest into the archive");
    let meta_json = serde_json::to_string(&manifest).map_err(ModelPackError::from)?;
    let mut meta_with_newline = meta_json.into_bytes();
    meta_with_newline.push(b'\n');
    let signed = trust::sign(ctx, key_home, fingerprint, &meta_with_newline).map_err(ModelPackError::from)?;

    let meta_path = format!("{model_directory}/{METADATA_FILENAME}");
    write_member_bytes(builder, &meta_path, &signed).map_err(ModelPackError::from)?;

    Ok(())
}

/// Load a model out of `archive_index` (already read in a single pass out of
/// the underlying tar stream — see [`crate::archive::ArchiveIndex`]),
/// verifying the manifest's signature and every stream's MAC along the way.
///
/// `on_disk_version` is the integer read from the archive's `meta.version`
/// member; it must agree with the signed manifest's own `version` field (I6)
/// or the load is rejected outright, even though both independently equal
/// [`MANIFEST_VERSION`] for this handler.
///
/// Runs [`ModelLifecycle::validate_model`] on the reconstructed model after
/// [`crate::model::restore`] unless `validate` is false.
pub fn load_from_tarball<M: ModelLifecycle>(
    archive_index: &archive::ArchiveIndex,
    on_disk_version: u32,
    registry: &CodecRegistry,
    key_home: &KeyHome,
    validate: bool,
) -> Result<M, ModelPackError> {
    let model_directory = archive_index.directory();

    let meta_path = format!("{model_directory}/{METADATA_FILENAME}");
    let signed_bytes = archive_index.member_bytes(&meta_path).map_err(ModelPackError::from)?;
    let verified_bytes = trust::verify_and_extract(key_home, &signed_bytes).map_err(ModelPackError::from)?;

    info!("metadata signature verified; parsing manifest");
    let manifest: ManifestV3 = serde_json::from_slice(&verified_bytes).map_err(ModelPackError::from)?;

    if manifest.version != on_disk_version {
        return Err(ManifestError::VersionMismatch {
            on_disk: on_disk_version,
            manifest: manifest.version,
        }
        .into());
    }
    manifest.validate_shape().map_err(ModelPackError::from)?;
    check_installed_packages(&manifest);

    for (attr_name, descriptor) in &manifest.attributes {
        if registry.get(&descriptor.serializer).is_err() {
            return Err(ManifestError::MissingCodec(format!(
                "{attr_name} -> {}",
                descriptor.serializer
            ))
            .into());
        }
    }

    let mut attribute_values = Vec::new();
    for (attr_name, descriptor) in &manifest.attributes {
        let member_path = format!("{model_directory}/{}", descriptor.filename);
        let bytes = archive_index.member_bytes(&member_path).map_err(ModelPackError::from)?;
        let codec = registry.get(&descriptor.serializer).expect("checked above");
        let mut cursor = std::io::Cursor::new(bytes);
        let value = registry::from_verifiable_stream(codec.as_ref(), &descriptor.nonce, &descriptor.hmac_code, &mut cursor)
            .map_err(|e| ModelError::ValidationFailed(format!("decoding attribute {attr_name:?}: {e}")))?;
        attribute_values.push((attr_name.clone(), value));
    }

    let model_member_path = format!("{model_directory}/{}", manifest.model.filename);
    let model_bytes = archive_index.member_bytes(&model_member_path).map_err(ModelPackError::from)?;
    let model_codec = registry
        .get(&manifest.model.serializer)
        .map_err(|_| ManifestError::MissingCodec(manifest.model.serializer.clone()))?;
    let mut model_cursor = std::io::Cursor::new(model_bytes);
    let model_value = registry::from_verifiable_stream(
        model_codec.as_ref(),
        &manifest.model.nonce,
        &manifest.model.hmac_code,
        &mut model_cursor,
    )
    .map_err(|e| ModelError::ValidationFailed(format!("decoding model payload: {e}")))?;

    let mut model = M::from_snapshot(model_value).map_err(ModelPackError::from)?;
    model::restore(&mut model, attribute_values).map_err(ModelPackError::from)?;

    if validate {
        model.validate_model().map_err(ModelPackError::from)?;
    } else {
        warn!(
            model = model.model_name(),
            "skipping model validation after load"
        );
    }

    Ok(model)
}

fn installed_packages_best_effort() -> Option<Vec<String>> {
    // Best-effort provenance: record this crate's own resolved version.
    // A full dependency walk would require shelling out to `cargo metadata`,
    // which is unavailable to a library at runtime; record what we can.
    Some(vec![format!(
        "{}@{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    )])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_manifest() -> ManifestV3 {
        ManifestV3 {
            version: MANIFEST_VERSION,
            model: StreamDescriptor {
                filename: MODEL_FILE_NAME.to_string(),
                nonce: "bm9uY2U=".to_string(),
                hmac_code: "aG1hYw==".to_string(),
                serializer: MODEL_SELF_CODEC.to_string(),
            },
            attributes: BTreeMap::new(),
            written_on_date: "2026-01-01T00:00:00Z".to_string(),
            serializing_package_version: "0.1.0".to_string(),
            installed_packages: None,
        }
    }

    #[test]
    fn valid_manifest_passes_shape_validation() {
        assert!(sample_manifest().validate_shape().is_ok());
    }

    #[test]
    fn wrong_version_is_rejected() {
        let mut manifest = sample_manifest();
        manifest.version = 4;
        let err = manifest.validate_shape().unwrap_err();
        assert!(matches!(err, ManifestError::UnsupportedVersion(4)));
    }

    #[test]
    fn model_descriptor_must_use_the_opaque_object_codec() {
        let mut manifest = sample_manifest();
        manifest.model.serializer = "structured-text".to_string();
        let err = manifest.validate_shape().unwrap_err();
        assert!(matches!(err, ManifestError::SchemaViolation(_)));
    }

    #[test]
    fn attribute_filename_colliding_with_model_file_is_rejected() {
        let mut manifest = sample_manifest();
        manifest.attributes.insert(
            "weights".to_string(),
            StreamDescriptor {
                filename: MODEL_FILE_NAME.to_string(),
                nonce: "bm9uY2U=".to_string(),
                hmac_code: "aG1hYw==".to_string(),
                serializer: "structured-text".to_string(),
            },
        );
        assert!(manifest.validate_shape().is_err());
    }
}
