//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! Unified error hierarchy for the tamper-evident model package format.

use thiserror::Error;

/// Top-level unified error type for model package operations.
#[derive(Error, Debug)]
pub enum ModelPackError {
    #[error("stream error")]
    Stream(#[from] StreamError),

    #[error("codec registry error")]
    Registry(#[from] RegistryError),

    #[error("codec error")]
    Codec(#[from] CodecError),

    #[error("trust/signing error")]
    Trust(#[from] TrustError),

    #[error("archive error")]
    Archive(#[from] ArchiveError),

    #[error("model lifecycle error")]
    Model(#[from] ModelError),

    #[error("manifest error")]
    Manifest(#[from] ManifestError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from the verifiable stream state machine (component A).
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("stream is still writing; finalize() must be called before it can be verified")]
    NotFinalized,

    #[error("stream has already been finalized")]
    AlreadyFinalized,

    #[error("MAC mismatch: stream contents do not match the recorded nonce/MAC")]
    MacMismatch,

    #[error("malformed nonce or MAC encoding: {0}")]
    MalformedEncoding(String),
}

/// Errors from the codec registry (component B).
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("no codec registered for tag {0:?}")]
    UnknownCodec(String),

    #[error("codec tag {0:?} is already registered")]
    DuplicateTag(String),

    #[error("one or more codecs in a batch registration already existed; none were registered")]
    BatchConflict(Vec<String>),
}

/// Errors from individual codec implementations (component C).
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("encoding failed: {0}")]
    EncodeFailed(String),

    #[error("decoding failed: {0}")]
    DecodeFailed(String),

    #[error("codec {0:?} does not support path-based payloads")]
    PathUnsupported(String),

    #[error("underlying IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from signing, trust, and key-expiry operations (component D).
#[derive(Error, Debug)]
pub enum TrustError {
    #[error("trusted keys directory is malformed: {0}")]
    MalformedTrustedKeysDir(String),

    #[error("no valid signature found over the manifest")]
    NoValidSignature,

    #[error("signing/verification key is not in the trusted set: {0}")]
    UntrustedKey(String),

    #[error(
        "refusing to use unsafe testing fingerprint {0} outside of an explicitly gated test run"
    )]
    UnsafeKey(String),

    #[error("UNSAFE_GPG_TESTING_ENABLED is set to an unrecognized value: {0:?}")]
    BadEnvFlag(String),

    #[error("invariant violation in key-expiry policy: {0}")]
    InvariantViolation(String),

    #[error("OpenPGP operation failed: {0}")]
    OpenPgp(String),

    #[error("message to be signed must be non-empty and newline-terminated")]
    MalformedMessage,
}

/// Errors from archive (tar) I/O (component E).
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive contains no top-level model directory")]
    NoDirectory,

    #[error("archive contains more than one top-level directory: {0:?}")]
    MultipleDirectories(Vec<String>),

    #[error("missing archive member: {0}")]
    MissingMember(String),

    #[error("archive member {0:?} is not a regular file")]
    NotAFile(String),
}

/// Errors from model lifecycle operations (component F).
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("attribute {0:?} declares a custom serialization but the registry has no matching codec")]
    UnknownDeclaredCodec(String),

    #[error("expected the nullify sentinel in attribute {0:?} but found a real value")]
    ExpectedSentinel(String),

    #[error("payload decoded for attribute {0:?} is not a model at all")]
    NotAModel(String),

    #[error("post-deserialize hook failed: {0}")]
    PostDeserializeFailed(String),
}

/// Errors from manifest (de)serialization and schema validation (component G).
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("manifest schema violation: {0}")]
    SchemaViolation(String),

    #[error("unsupported manifest version: {0}")]
    UnsupportedVersion(u32),

    #[error("manifest references unknown codec tag {0:?}")]
    MissingCodec(String),

    #[error("meta.version on disk ({on_disk}) does not match the signed manifest's own version field ({manifest})")]
    VersionMismatch { on_disk: u32, manifest: u32 },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
