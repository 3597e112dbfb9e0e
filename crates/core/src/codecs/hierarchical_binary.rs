//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! `hierarchical-binary`: a container for codecs whose underlying framework
//! insists on a real file handle (the original's `h5py`-backed Keras
//! serializer is the canonical example). We satisfy that requirement
//! literally rather than by writing a tempfile and unlinking it: HDF5's
//! "core" virtual file driver keeps the entire file image in a process
//! memory buffer, which we then copy verbatim into the verifiable stream.
//! No path on disk is ever opened.

use std::io::{Read, Write};

use hdf5::file::FileAccessBuilder;

use crate::error::CodecError;
use crate::registry::Codec;

use super::TAG_HIERARCHICAL_BINARY;

const DATASET_NAME: &str = "payload";
/// Name used only to satisfy the HDF5 API's path parameter; the core driver
/// never touches the filesystem for it.
const CORE_BACKING_NAME: &str = "modelpack-core-image.h5";

pub struct HierarchicalBinaryCodec;

impl Codec for HierarchicalBinaryCodec {
    fn tag(&self) -> &'static str {
        TAG_HIERARCHICAL_BINARY
    }

    fn encode(&self, value: &serde_json::Value, writer: &mut dyn Write) -> Result<(), CodecError> {
        let bytes = value
            .as_str()
            .ok_or_else(|| CodecError::EncodeFailed("expected a base64-encoded string payload".into()))
            .and_then(|s| {
                use base64::Engine;
                base64::engine::general_purpose::STANDARD
                    .decode(s)
                    .map_err(|e| CodecError::EncodeFailed(format!("invalid base64: {e}")))
            })?;

        let fapl = FileAccessBuilder::new()
            .core_filebacked(false)
            .finish()
            .map_err(|e| CodecError::EncodeFailed(format!("hdf5 fapl: {e}")))?;
        let file = hdf5::File::with_access_plist(CORE_BACKING_NAME, &fapl)
            .map_err(|e| CodecError::EncodeFailed(format!("hdf5 create: {e}")))?;

        let dataset = file
            .new_dataset::<u8>()
            .shape(bytes.len())
            .create(DATASET_NAME)
            .map_err(|e| CodecError::EncodeFailed(format!("hdf5 dataset: {e}")))?;
        dataset
            .write(&bytes)
            .map_err(|e| CodecError::EncodeFailed(format!("hdf5 write: {e}")))?;

        let image = file
            .as_file_image()
            .map_err(|e| CodecError::EncodeFailed(format!("hdf5 image retrieval: {e}")))?;

        writer.write_all(&image).map_err(CodecError::from)
    }

    fn decode(&self, reader: &mut dyn Read) -> Result<serde_json::Value, CodecError> {
        let mut image = Vec::new();
        reader.read_to_end(&mut image).map_err(CodecError::from)?;

        let fapl = FileAccessBuilder::new()
            .core_filebacked(false)
            .finish()
            .map_err(|e| CodecError::DecodeFailed(format!("hdf5 fapl: {e}")))?;
        let file = hdf5::File::from_file_image(&image, &fapl)
            .map_err(|e| CodecError::DecodeFailed(format!("hdf5 open from image: {e}")))?;

        let dataset = file
            .dataset(DATASET_NAME)
            .map_err(|e| CodecError::DecodeFailed(format!("hdf5 dataset: {e}")))?;
        let bytes: Vec<u8> = dataset
            .read_raw()
            .map_err(|e| CodecError::DecodeFailed(format!("hdf5 read: {e}")))?;

        use base64::Engine;
        Ok(serde_json::Value::String(
            base64::engine::general_purpose::STANDARD.encode(bytes),
        ))
    }
}
