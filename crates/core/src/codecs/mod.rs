//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! Built-in codec implementations, registered into the default
//! [`crate::registry::CodecRegistry`] by [`register_builtin_codecs`].

mod binary_dict;
mod labeled_dict;
mod opaque_object;
mod structured_text;

#[cfg(feature = "disk-backed-binary")]
mod disk_backed_binary;

#[cfg(feature = "hierarchical-binary")]
mod hierarchical_binary;

#[cfg(feature = "neural-model")]
mod neural_model;

#[cfg(feature = "tensor-model")]
mod tensor_model;

pub use binary_dict::BinaryDictCodec;
pub use labeled_dict::LabeledDictCodec;
pub use opaque_object::OpaqueObjectCodec;
pub use structured_text::StructuredTextCodec;

#[cfg(feature = "disk-backed-binary")]
pub use disk_backed_binary::DiskBackedBinaryCodec;

#[cfg(feature = "hierarchical-binary")]
pub use hierarchical_binary::HierarchicalBinaryCodec;

#[cfg(feature = "neural-model")]
pub use neural_model::{NeuralModelCodec, NeuralModelWithCustomClassesCodec};

#[cfg(feature = "tensor-model")]
pub use tensor_model::{TensorModelCodec, TensorStateCodec};

use std::sync::Arc;

use crate::error::RegistryError;
use crate::registry::{Codec, CodecRegistry};

/// Tag constants, mirroring the role each codec plays in the original
/// Python implementation's serializer map (`pickle`, `json`, `msgpack`,
/// `joblib`, `dill`, and the optional `keras`/`torch` variants).
pub const TAG_OPAQUE_OBJECT: &str = "opaque-object";
pub const TAG_STRUCTURED_TEXT: &str = "structured-text";
pub const TAG_BINARY_DICT: &str = "binary-dict";
pub const TAG_DISK_BACKED_BINARY: &str = "disk-backed-binary";
pub const TAG_LABELED_DICT: &str = "labeled-dict";
pub const TAG_HIERARCHICAL_BINARY: &str = "hierarchical-binary";
pub const TAG_NEURAL_MODEL: &str = "neural-model";
pub const TAG_NEURAL_MODEL_WITH_CUSTOM_CLASSES: &str = "neural-model-with-custom-classes";
pub const TAG_TENSOR_MODEL: &str = "tensor-model";
pub const TAG_TENSOR_STATE: &str = "tensor-state";

/// Register every codec compiled into this build into `registry`.
pub fn register_builtin_codecs(registry: &mut CodecRegistry) -> Result<(), RegistryError> {
    let mut codecs: Vec<Arc<dyn Codec>> = vec![
        Arc::new(OpaqueObjectCodec),
        Arc::new(StructuredTextCodec),
        Arc::new(BinaryDictCodec),
        Arc::new(LabeledDictCodec),
    ];

    #[cfg(feature = "disk-backed-binary")]
    codecs.push(Arc::new(DiskBackedBinaryCodec));

    #[cfg(feature = "hierarchical-binary")]
    codecs.push(Arc::new(HierarchicalBinaryCodec));

    #[cfg(feature = "neural-model")]
    {
        codecs.push(Arc::new(NeuralModelCodec));
        codecs.push(Arc::new(NeuralModelWithCustomClassesCodec));
    }

    #[cfg(feature = "tensor-model")]
    {
        codecs.push(Arc::new(TensorModelCodec));
        codecs.push(Arc::new(TensorStateCodec));
    }

    registry.register_many(codecs)
}
