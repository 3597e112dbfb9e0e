//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! Signing and trust integration tests (§8: "Signature required", "Unsafe-key
//! gate", MAC/signature tamper-evidence at the manifest layer).

mod support;

use modelpack_core::error::TrustError;
use modelpack_core::trust::{self, KeyHome, TrustContext, TrustedKeysDir, UNSAFE_TEST_FINGERPRINT};

#[test]
fn sign_then_verify_round_trips_the_cleartext() {
    let key = support::provision_test_key();
    let ctx = key.trust_context();
    let home = key.key_home();

    let message = b"hello, manifest\n".to_vec();
    let signed = trust::sign(&ctx, &home, &key.fingerprint, &message).expect("sign");
    let recovered = trust::verify_and_extract(&home, &signed).expect("verify");

    assert_eq!(recovered, message);
}

#[test]
fn message_must_be_newline_terminated() {
    let key = support::provision_test_key();
    let ctx = key.trust_context();
    let home = key.key_home();

    let err = trust::sign(&ctx, &home, &key.fingerprint, b"no trailing newline").unwrap_err();
    assert!(matches!(err, TrustError::MalformedMessage));
}

#[test]
fn empty_message_is_rejected() {
    let key = support::provision_test_key();
    let ctx = key.trust_context();
    let home = key.key_home();

    let err = trust::sign(&ctx, &home, &key.fingerprint, b"").unwrap_err();
    assert!(matches!(err, TrustError::MalformedMessage));
}

#[test]
fn tampered_signature_byte_fails_verification() {
    let key = support::provision_test_key();
    let ctx = key.trust_context();
    let home = key.key_home();

    let message = b"integrity matters\n".to_vec();
    let mut signed = trust::sign(&ctx, &home, &key.fingerprint, &message).expect("sign");

    // Flip a byte roughly in the middle of the armored signature block.
    let mid = signed.len() / 2;
    signed[mid] ^= 0xFF;

    let result = trust::verify_and_extract(&home, &signed);
    assert!(result.is_err(), "flipping a signature byte must invalidate it");
}

#[test]
fn verification_fails_against_an_untrusted_key_home() {
    let signer = support::provision_test_key();
    let other = support::provision_test_key();

    let signed = trust::sign(&signer.trust_context(), &signer.key_home(), &signer.fingerprint, b"payload\n")
        .expect("sign with signer's own key");

    // `other`'s key home only trusts its own key, not the signer's.
    let err = trust::verify_and_extract(&other.key_home(), &signed).unwrap_err();
    assert!(matches!(err, TrustError::NoValidSignature));
}

#[test]
fn unsafe_test_fingerprint_is_refused_outside_the_gate() {
    let key = support::provision_test_key();
    let home = key.key_home();
    let ctx = TrustContext {
        unsafe_testing_enabled: false,
    };

    let err = trust::sign(&ctx, &home, UNSAFE_TEST_FINGERPRINT, b"payload\n").unwrap_err();
    assert!(matches!(err, TrustError::UnsafeKey(_)));
}

#[test]
fn trusted_keys_dir_rejects_missing_trustdb() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("keyname-to-fingerprint.json"),
        b"{\"k\": \"0123456789ABCDEF0123456789ABCDEF01234567\"}",
    )
    .unwrap();
    // No trustdb.txt, no *.pub.asc.

    let err = TrustedKeysDir::open(dir.path()).unwrap_err();
    assert!(matches!(err, TrustError::MalformedTrustedKeysDir(_)));
}

#[test]
fn trusted_keys_dir_rejects_lowercase_fingerprints() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("trustdb.txt"), b"x").unwrap();
    std::fs::write(
        dir.path().join("keyname-to-fingerprint.json"),
        b"{\"k\": \"0123456789abcdef0123456789abcdef01234567\"}",
    )
    .unwrap();

    let err = TrustedKeysDir::open(dir.path()).unwrap_err();
    assert!(matches!(err, TrustError::MalformedTrustedKeysDir(_)));
}

#[test]
fn key_expiry_reports_infinite_for_a_never_expiring_key() {
    let key = support::provision_test_key();
    let home = key.key_home();
    let cert = home.find(&key.fingerprint).expect("cert present");

    // `CertBuilder::general_purpose` with no explicit expiration produces
    // keys that never expire.
    assert_eq!(trust::days_until_expiry(cert), None);
}
