//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! Signing and trust (component D): a GPG-style cleartext signature scheme
//! over the manifest, backed by `sequoia-openpgp` instead of shelling out to
//! a `gpg` binary. Trust is rooted in a directory of public keys the
//! deployment ships alongside the library (`TrustedKeysDir`), never in the
//! ambient system keyring.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use sequoia_openpgp as openpgp;
use openpgp::cert::Cert;
use openpgp::parse::stream::{
    GoodChecksum, MessageLayer, MessageStructure, VerificationHelper, VerifierBuilder,
};
use openpgp::parse::Parse;
use openpgp::policy::StandardPolicy;
use openpgp::serialize::stream::{Message, Signer};
use openpgp::types::HashAlgorithm;
use tracing::{info, warn};

use crate::error::TrustError;

/// Fingerprint of the key checked into the test suite for exercising the
/// signing/verification path without touching production keys. Only usable
/// when [`TrustContext::unsafe_testing_enabled`] is true.
pub const UNSAFE_TEST_FINGERPRINT: &str = "56BC24E20C87C09D3F8C76A96FD20A3075CFFAF2";

const DAYS_WARNING_FOR_KEY_EXPIRATION: i64 = 30;

const TRUSTED_HASH_ALGORITHMS: &[HashAlgorithm] = &[
    HashAlgorithm::SHA224,
    HashAlgorithm::SHA256,
    HashAlgorithm::SHA384,
    HashAlgorithm::SHA512,
];

/// Process-wide configuration resolved once, at the edge, from environment
/// variables — never read directly by the signing/verification code paths
/// (see SPEC_FULL.md's "process-wide state" design note).
#[derive(Clone, Debug)]
pub struct TrustContext {
    pub unsafe_testing_enabled: bool,
}

impl TrustContext {
    /// Build a `TrustContext` from `UNSAFE_GPG_TESTING_ENABLED`.
    pub fn from_env() -> Result<Self, TrustError> {
        let unsafe_testing_enabled = match std::env::var("UNSAFE_GPG_TESTING_ENABLED").ok().as_deref() {
            None | Some("0") => false,
            Some("1") => true,
            Some(other) => return Err(TrustError::BadEnvFlag(other.to_string())),
        };
        Ok(Self {
            unsafe_testing_enabled,
        })
    }

    fn reject_unsafe_key(&self, fingerprint: &str) -> Result<(), TrustError> {
        if fingerprint == UNSAFE_TEST_FINGERPRINT && !self.unsafe_testing_enabled {
            return Err(TrustError::UnsafeKey(fingerprint.to_string()));
        }
        Ok(())
    }
}

/// An on-disk directory of trusted public keys shipped with a deployment:
/// one `*.pub.asc` armored certificate per trusted key, a
/// `keyname-to-fingerprint.json` lookup, and a `trustdb.txt` ownertrust
/// database (kept for parity with the original format even though
/// `sequoia-openpgp` does not consult it the way GnuPG's trust engine does).
pub struct TrustedKeysDir {
    path: PathBuf,
    keyname_to_fingerprint: HashMap<String, String>,
}

impl TrustedKeysDir {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TrustError> {
        let path = path.as_ref().to_path_buf();

        let lookup_path = path.join("keyname-to-fingerprint.json");
        let lookup_bytes = std::fs::read(&lookup_path).map_err(|e| {
            TrustError::MalformedTrustedKeysDir(format!(
                "could not read {}: {e}",
                lookup_path.display()
            ))
        })?;
        let keyname_to_fingerprint: HashMap<String, String> =
            serde_json::from_slice(&lookup_bytes).map_err(|e| {
                TrustError::MalformedTrustedKeysDir(format!("malformed keyname lookup: {e}"))
            })?;

        for fingerprint in keyname_to_fingerprint.values() {
            if fingerprint.len() != 40 || !fingerprint.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()) {
                return Err(TrustError::MalformedTrustedKeysDir(format!(
                    "fingerprint {fingerprint:?} is not 40 uppercase hex characters"
                )));
            }
        }

        if !path.join("trustdb.txt").is_file() {
            return Err(TrustError::MalformedTrustedKeysDir(
                "missing trustdb.txt".to_string(),
            ));
        }

        if keyname_to_fingerprint.is_empty() {
            return Err(TrustError::MalformedTrustedKeysDir(
                "trusted keys directory contains no keys".to_string(),
            ));
        }

        let has_any_pub_asc = std::fs::read_dir(&path)
            .map_err(|e| TrustError::MalformedTrustedKeysDir(format!("reading {}: {e}", path.display())))?
            .filter_map(|entry| entry.ok())
            .any(|entry| entry.file_name().to_string_lossy().ends_with(".pub.asc"));
        if !has_any_pub_asc {
            return Err(TrustError::MalformedTrustedKeysDir(
                "trusted keys directory contains no *.pub.asc key file".to_string(),
            ));
        }

        Ok(Self {
            path,
            keyname_to_fingerprint,
        })
    }

    /// Yields `(key filename, fingerprint)` for every trusted key, where the
    /// filename is the keyname from `keyname-to-fingerprint.json` with the
    /// conventional `.pub.asc` suffix appended.
    fn key_filenames(&self) -> impl Iterator<Item = (String, &str)> {
        self.keyname_to_fingerprint
            .iter()
            .map(|(name, fpr)| (format!("{name}.pub.asc"), fpr.as_str()))
    }
}

/// An in-memory set of imported certs, scoped to one signing/verification
/// operation. Unlike the original's literal `GNUPGHOME` directory, no
/// on-disk GPG home is needed since `sequoia-openpgp` operates directly on
/// [`Cert`] values.
pub struct KeyHome {
    certs: Vec<Cert>,
}

impl KeyHome {
    /// Import every trusted public key into a new `KeyHome`, rejecting the
    /// [`UNSAFE_TEST_FINGERPRINT`] unless `ctx.unsafe_testing_enabled`.
    pub fn seed(ctx: &TrustContext, trusted: &TrustedKeysDir) -> Result<Self, TrustError> {
        let mut certs = Vec::new();
        for (filename, fingerprint) in trusted.key_filenames() {
            ctx.reject_unsafe_key(fingerprint)?;

            let key_path = trusted.path.join(filename);
            let bytes = std::fs::read(&key_path).map_err(|e| {
                TrustError::MalformedTrustedKeysDir(format!(
                    "could not read key file {}: {e}",
                    key_path.display()
                ))
            })?;
            let cert = Cert::from_bytes(&bytes)
                .map_err(|e| TrustError::OpenPgp(format!("parsing {filename:?}: {e}")))?;

            info!(fingerprint, filename, "imported trusted public key");
            certs.push(cert);
        }
        Ok(Self { certs })
    }

    /// Find a cert by fingerprint, if trusted.
    pub fn find(&self, fingerprint: &str) -> Option<&Cert> {
        self.certs
            .iter()
            .find(|c| c.fingerprint().to_hex() == fingerprint)
    }

    pub fn certs(&self) -> &[Cert] {
        &self.certs
    }
}

/// Sign `message` (which must be non-empty and newline-terminated, matching
/// the original's `_validate_message`) with the key in `key_home` matching
/// `fingerprint`, producing an OpenPGP cleartext-signature-framework
/// message.
pub fn sign(
    ctx: &TrustContext,
    key_home: &KeyHome,
    fingerprint: &str,
    message: &[u8],
) -> Result<Vec<u8>, TrustError> {
    ctx.reject_unsafe_key(fingerprint)?;
    if message.is_empty() || !message.ends_with(b"\n") {
        return Err(TrustError::MalformedMessage);
    }

    let cert = key_home
        .find(fingerprint)
        .ok_or_else(|| TrustError::UntrustedKey(fingerprint.to_string()))?;

    warn_if_near_expiry(cert)?;

    let policy = StandardPolicy::new();
    let signing_keypair = cert
        .keys()
        .with_policy(&policy, None)
        .alive()
        .revoked(false)
        .for_signing()
        .secret()
        .next()
        .ok_or_else(|| TrustError::OpenPgp(format!("no usable signing subkey for {fingerprint}")))?
        .key()
        .clone()
        .into_keypair()
        .map_err(|e| TrustError::OpenPgp(format!("loading signing key: {e}")))?;

    let mut signed = Vec::new();
    {
        let message_writer = Message::new(&mut signed);
        let mut signer = Signer::new(message_writer, signing_keypair)
            .cleartext()
            .build()
            .map_err(|e| TrustError::OpenPgp(format!("building signer: {e}")))?;
        std::io::Write::write_all(&mut signer, message)
            .map_err(|e| TrustError::OpenPgp(format!("writing message: {e}")))?;
        signer
            .finalize()
            .map_err(|e| TrustError::OpenPgp(format!("finalizing signature: {e}")))?;
    }

    Ok(signed)
}

struct VerifyHelper<'a> {
    key_home: &'a KeyHome,
}

impl<'a> VerificationHelper for VerifyHelper<'a> {
    fn get_certs(&mut self, _ids: &[openpgp::KeyHandle]) -> openpgp::Result<Vec<Cert>> {
        Ok(key_home_certs_cloned(self.key_home))
    }

    fn check(&mut self, structure: MessageStructure) -> openpgp::Result<()> {
        let now = std::time::SystemTime::now();
        for layer in structure.into_iter() {
            if let MessageLayer::SignatureGroup { results } = layer {
                let has_valid = results.into_iter().any(|result| match result {
                    Ok(GoodChecksum { sig, .. }) => {
                        let hash_ok = TRUSTED_HASH_ALGORITHMS.contains(&sig.hash_algo());
                        let time_ok = sig
                            .signature_creation_time()
                            .map(|t| t <= now)
                            .unwrap_or(false);
                        hash_ok && time_ok
                    }
                    Err(_) => false,
                });
                if !has_valid {
                    return Err(anyhow::anyhow!("no trustworthy signature in this layer"));
                }
            }
        }
        Ok(())
    }
}

fn key_home_certs_cloned(key_home: &KeyHome) -> Vec<Cert> {
    key_home.certs().to_vec()
}

/// Verify the cleartext-signed `signed` message against `key_home`'s
/// trusted certs, and return the recovered cleartext on success.
pub fn verify_and_extract(key_home: &KeyHome, signed: &[u8]) -> Result<Vec<u8>, TrustError> {
    for cert in key_home.certs() {
        warn_if_near_expiry(cert)?;
    }

    let policy = StandardPolicy::new();
    let helper = VerifyHelper { key_home };
    let mut verifier = VerifierBuilder::from_bytes(signed)
        .map_err(|e| TrustError::OpenPgp(format!("parsing signed message: {e}")))?
        .with_policy(&policy, None, helper)
        .map_err(|_| TrustError::NoValidSignature)?;

    let mut recovered = Vec::new();
    verifier
        .read_to_end(&mut recovered)
        .map_err(|_| TrustError::NoValidSignature)?;

    Ok(recovered)
}

/// Days remaining until `cert`'s earliest-expiring live subkey expires,
/// matching the original's "max across subkeys unless any has no
/// expiration" rule. `None` means the key never expires.
pub fn days_until_expiry(cert: &Cert) -> Option<i64> {
    let policy = StandardPolicy::new();
    let now = chrono::Utc::now();

    let mut max_days: Option<i64> = None;
    for key in cert.keys().with_policy(&policy, None) {
        match key.key_expiration_time() {
            None => return None, // a subkey that never expires dominates the max
            Some(expiry) => {
                let expiry: chrono::DateTime<chrono::Utc> = expiry.into();
                let days = (expiry - now).num_days();
                max_days = Some(max_days.map_or(days, |m: i64| m.max(days)));
            }
        }
    }
    max_days
}

fn warn_if_near_expiry(cert: &Cert) -> Result<(), TrustError> {
    let fingerprint = cert.fingerprint().to_hex();
    match days_until_expiry(cert) {
        None => Ok(()),
        Some(days) if days < 0 => {
            warn!(fingerprint, days_ago = -days, "key has expired; fix now");
            Ok(())
        }
        Some(days) if days <= DAYS_WARNING_FOR_KEY_EXPIRATION => {
            warn!(fingerprint, days, "key is near expiry; renew soon");
            Ok(())
        }
        Some(_) => Ok(()),
    }
}

/// Three invariant checks a healthy key-expiry implementation must never
/// violate, as called out in SPEC_FULL.md: a subkey reported as both
/// expired and never-expiring, a key reported expired with a positive days
/// count, and a key reported not-expired with a negative days count.
pub fn assert_expiry_invariants(days: Option<i64>, now_expired_bool: bool) -> Result<(), TrustError> {
    match (days, now_expired_bool) {
        (None, true) => Err(TrustError::InvariantViolation(
            "key reported both never-expiring and expired".to_string(),
        )),
        (Some(d), true) if d >= 0 => Err(TrustError::InvariantViolation(format!(
            "key reported expired but has {d} non-negative days remaining"
        ))),
        (Some(d), false) if d < 0 => Err(TrustError::InvariantViolation(format!(
            "key reported not expired but has negative days remaining: {d}"
        ))),
        _ => Ok(()),
    }
}
