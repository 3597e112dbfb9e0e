//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! Top-level API and version dispatch (component H). This is the only
//! module most callers need: `save_to_path`/`load_from_path` for files on
//! disk, `save_to_tar`/`load_from_tar` for an already-open stream.
//!
//! Version dispatch is deliberately a small `match` over the integer read
//! from `meta.version`, not a trait-object registry — there is exactly one
//! manifest version today (`manifest::v3`), and a future `manifest::v4`
//! module is a new match arm here, not a rewrite.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{error, info};

use crate::archive;
use crate::error::{ManifestError, ModelPackError};
use crate::manifest::{self, MANIFEST_VERSION};
use crate::model::ModelLifecycle;
use crate::registry::CodecRegistry;
use crate::trust::{KeyHome, TrustContext, TrustedKeysDir};

const META_VERSION_FILENAME: &str = "meta.version";

/// Save `model` into `writer` as a fresh tar archive, consuming the model
/// (per the destructive-save contract: once saved, the value is gone).
///
/// `validate` runs [`ModelLifecycle::validate_model`] before anything is
/// written; pass `false` only when you have already validated the model
/// through some other means, since a failed validation blocks the save.
#[allow(clippy::too_many_arguments)]
pub fn save_to_tar<W: Write, M: ModelLifecycle>(
    writer: W,
    mut model: M,
    registry: &CodecRegistry,
    ctx: &TrustContext,
    key_home: &KeyHome,
    fingerprint: &str,
    validate: bool,
) -> Result<(), ModelPackError> {
    let mut builder = tar::Builder::new(writer);
    // Created once here and threaded through to `manifest::save_to_tarball`
    // so `meta.version` and the manifest's own members land under the same
    // top-level directory (I1) — never call `create_model_directory` twice
    // for a single save.
    let model_directory = archive::create_model_directory(&mut builder)?;

    let version_path = format!("{model_directory}/{META_VERSION_FILENAME}");
    let version_bytes = format!("{MANIFEST_VERSION}\n").into_bytes();
    archive::write_member_bytes(&mut builder, &version_path, &version_bytes)?;

    info!(model_directory, version = MANIFEST_VERSION, "writing model archive");
    match MANIFEST_VERSION {
        3 => manifest::save_to_tarball(
            &mut builder,
            &model_directory,
            &mut model,
            registry,
            ctx,
            key_home,
            fingerprint,
            validate,
        )?,
        other => return Err(ManifestError::UnsupportedVersion(other).into()),
    }

    builder.finish().map_err(std::io::Error::from)?;
    Ok(())
}

/// Load a model out of `reader`, an already-open (uncompressed) tar stream.
///
/// If `key_home` is `None`, a temporary key home is created, seeded from
/// the trusted-keys directory named by `SERIALIZATION_TRUSTED_KEYS_DIR`,
/// and torn down once loading completes. `validate` runs
/// [`ModelLifecycle::validate_model`] on the reconstructed model before
/// returning it.
pub fn load_from_tar<R: Read, M: ModelLifecycle>(
    reader: R,
    registry: &CodecRegistry,
    key_home: Option<&KeyHome>,
    validate: bool,
) -> Result<M, ModelPackError> {
    // Read the whole archive in a single pass — `tar::Archive<R>`'s entry
    // iterator consumes `reader` as it goes, so every subsequent member
    // lookup (meta.version, meta.json.asc, every attribute, THEMODEL.pickle)
    // has to come from this one buffered index rather than a fresh scan.
    let archive_index = archive::ArchiveIndex::read(reader)?;
    let model_directory = archive_index.directory().to_string();

    let version_path = format!("{model_directory}/{META_VERSION_FILENAME}");
    let version_bytes = archive_index.member_bytes(&version_path)?;
    let version_text = String::from_utf8_lossy(&version_bytes);
    let on_disk_version: u32 = version_text
        .trim()
        .parse()
        .map_err(|_| ManifestError::SchemaViolation(format!("malformed {META_VERSION_FILENAME}: {version_text:?}")))?;

    match on_disk_version {
        3 => {
            let owned_home;
            let key_home = match key_home {
                Some(home) => home,
                None => {
                    let ctx = TrustContext::from_env()?;
                    let trusted = TrustedKeysDir::open(trusted_keys_dir_from_env()?)?;
                    owned_home = KeyHome::seed(&ctx, &trusted)?;
                    &owned_home
                }
            };
            let model =
                manifest::load_from_tarball(&archive_index, on_disk_version, registry, key_home, validate)?;
            info!(model_directory, "model loaded and verified");
            Ok(model)
        }
        other => {
            error!(on_disk_version = other, "unsupported manifest version");
            Err(ManifestError::UnsupportedVersion(other).into())
        }
    }
}

/// Save `model` to a gzip-compressed tar archive at `path`.
#[allow(clippy::too_many_arguments)]
pub fn save_to_path<M: ModelLifecycle>(
    path: impl AsRef<Path>,
    model: M,
    registry: &CodecRegistry,
    ctx: &TrustContext,
    key_home: &KeyHome,
    fingerprint: &str,
    validate: bool,
) -> Result<(), ModelPackError> {
    let file = File::create(path.as_ref())?;
    let encoder = GzEncoder::new(file, Compression::default());
    save_to_tar(encoder, model, registry, ctx, key_home, fingerprint, validate)
}

/// Load a model from the archive at `path`. Accepts either a gzip-compressed
/// or a plain tar file, mirroring the original's "compressed on write,
/// either on read" contract.
pub fn load_from_path<M: ModelLifecycle>(
    path: impl AsRef<Path>,
    registry: &CodecRegistry,
    key_home: Option<&KeyHome>,
    validate: bool,
) -> Result<M, ModelPackError> {
    let path = path.as_ref();
    let mut header = [0u8; 2];
    {
        let mut probe = File::open(path)?;
        let n = probe.read(&mut header)?;
        if n < 2 {
            // Too short to be a meaningful archive either way; let the tar
            // reader produce the real error.
            header = [0, 0];
        }
    }

    let file = File::open(path)?;
    if header == [0x1f, 0x8b] {
        load_from_tar(GzDecoder::new(file), registry, key_home, validate)
    } else {
        load_from_tar(file, registry, key_home, validate)
    }
}

fn trusted_keys_dir_from_env() -> Result<std::path::PathBuf, ModelPackError> {
    std::env::var_os("SERIALIZATION_TRUSTED_KEYS_DIR")
        .map(std::path::PathBuf::from)
        .ok_or_else(|| {
            crate::error::TrustError::MalformedTrustedKeysDir(
                "SERIALIZATION_TRUSTED_KEYS_DIR is not set".to_string(),
            )
            .into()
        })
}
