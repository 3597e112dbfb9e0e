//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

#![cfg_attr(docsrs, feature(doc_cfg))]

//! # modelpack-core
//!
//! A tamper-evident model package format: serializes an in-memory model
//! object (a root object plus a set of named attributes requiring
//! heterogeneous encodings) into a single archive whose integrity is
//! protected by two layers of cryptography — a per-stream keyed MAC over
//! every payload, and a single OpenPGP-signed manifest that records every
//! payload's filename, codec tag, nonce, and MAC.
//!
//! Loading proceeds in three steps: verify the manifest's signature and
//! trust chain; for each payload, recompute its MAC from the
//! manifest-stated nonce and check it against the manifest-stated MAC;
//! only then decode the bytes with the named codec. A single signature
//! therefore commits the producer to every byte of every payload.
//!
//! ## Quick start
//!
//! ```no_run
//! use modelpack_core::{api, registry::CodecRegistry, trust::{KeyHome, TrustContext, TrustedKeysDir}};
//! # use modelpack_core::model::{ModelLifecycle, Metadata, AttributeSerialization};
//! # use std::collections::BTreeMap;
//! # struct MyModel { metadata: Metadata }
//! # impl ModelLifecycle for MyModel {
//! #     fn model_name(&self) -> &str { "my-model" }
//! #     fn custom_serialization(&self) -> BTreeMap<String, AttributeSerialization> { BTreeMap::new() }
//! #     fn take_attribute(&mut self, _: &str) -> serde_json::Value { unreachable!() }
//! #     fn put_attribute(&mut self, _: &str, _: serde_json::Value) {}
//! #     fn predict(&self, input: &serde_json::Value) -> Result<serde_json::Value, modelpack_core::error::ModelError> { Ok(input.clone()) }
//! #     fn validate_model(&self) -> Result<(), modelpack_core::error::ModelError> { Ok(()) }
//! #     fn metadata(&self) -> &Metadata { &self.metadata }
//! #     fn metadata_mut(&mut self) -> &mut Metadata { &mut self.metadata }
//! #     fn to_snapshot(&self) -> Result<serde_json::Value, modelpack_core::error::ModelError> { Ok(serde_json::json!({})) }
//! #     fn from_snapshot(_: serde_json::Value) -> Result<Self, modelpack_core::error::ModelError> { Ok(MyModel { metadata: Metadata::Unset }) }
//! # }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ctx = TrustContext::from_env()?;
//! let trusted = TrustedKeysDir::open(std::env::var("SERIALIZATION_TRUSTED_KEYS_DIR")?)?;
//! let key_home = KeyHome::seed(&ctx, &trusted)?;
//! let registry = CodecRegistry::default_registry();
//!
//! let model = MyModel { metadata: Metadata::Unset };
//! api::save_to_path("model.tar.gz", model, registry, &ctx, &key_home, "MY40CHARFINGERPRINTGOESRIGHTHEREXXXX", true)?;
//!
//! let loaded: MyModel = api::load_from_path("model.tar.gz", registry, Some(&key_home), true)?;
//! # let _ = loaded;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`stream`] — the verifiable stream: an in-memory buffer that computes
//!   a keyed MAC as it is written, under a freshly sampled per-stream nonce.
//! - [`registry`] — the codec registry: a mapping from codec tag to
//!   encoder/decoder, with a process-wide default populated at startup.
//! - [`codecs`] — the built-in codecs (`opaque-object`, `structured-text`,
//!   `binary-dict`, `labeled-dict`, plus optional, feature-gated
//!   framework-specific codecs).
//! - [`trust`] — signing and trust: OpenPGP cleartext signatures over the
//!   manifest, a scoped trusted-keys directory, the unsafe-key testing
//!   gate, and key-expiry policy.
//! - [`archive`] — tar archive I/O: the single top-level model directory
//!   convention, member read/write.
//! - [`model`] — the model lifecycle contract and the nullify/restore
//!   protocol that strips an object's custom-serialized attributes before
//!   it is handed to the opaque codec.
//! - [`manifest`] — the manifest v3 orchestrator tying components A–F
//!   together for one save/load.
//! - [`api`] — the top-level entry points and version dispatch.
//!
//! ## Feature flags
//!
//! `modelpack-core` uses `default = ["disk-backed-binary"]`. Enable the
//! others as the relevant framework becomes available in your deployment:
//!
//! - **`disk-backed-binary`** (default-on) — a `safetensors`-backed codec
//!   for numerical arrays.
//! - **`hierarchical-binary`** — an `hdf5`-backed codec for frameworks that
//!   require a real file-system handle (served entirely in-memory via
//!   HDF5's core virtual file driver).
//! - **`neural-model`** — `tch` (libtorch) module serialization, implies
//!   `hierarchical-binary`.
//! - **`tensor-model`** — raw named-tensor serialization via `tch`.

pub mod api;
pub mod archive;
pub mod codecs;
pub mod error;
pub mod manifest;
pub mod model;
pub mod registry;
pub mod stream;
pub mod trust;

pub use api::{load_from_path, load_from_tar, save_to_path, save_to_tar};
pub use error::ModelPackError;
pub use manifest::{ManifestV3, StreamDescriptor};
pub use model::{AttributeSerialization, Metadata, ModelLifecycle};
pub use registry::{Codec, CodecRegistry};
pub use stream::{VerifiableStream, VerifiedStream};
pub use trust::{KeyHome, TrustContext, TrustedKeysDir};
