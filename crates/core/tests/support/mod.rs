//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! Shared fixtures for the integration test suite: a throwaway OpenPGP key
//! generated at test time (never the reserved unsafe-testing fingerprint)
//! and a scratch trusted-keys directory seeded from it.
//!
//! The generated key carries secret material, which we deliberately place
//! in the same trusted-keys directory the loader reads back from. A real
//! deployment would keep the signer's secret key entirely separate from
//! the trusted-keys directory it publishes to verifiers; this test only
//! needs one end-to-end key to exercise sign -> verify -> extract.

use std::io::Write;
use std::path::PathBuf;

use sequoia_openpgp::armor;
use sequoia_openpgp::cert::CertBuilder;
use sequoia_openpgp::serialize::SerializeInto;
use sequoia_openpgp::Cert;

use modelpack_core::trust::{KeyHome, TrustContext, TrustedKeysDir};

pub struct TestKey {
    pub fingerprint: String,
    pub _dir: tempfile::TempDir,
    pub trusted_dir_path: PathBuf,
}

/// Generate a fresh signing-capable OpenPGP cert and seed a scratch
/// trusted-keys directory with it.
pub fn provision_test_key() -> TestKey {
    let (cert, _revocation) = CertBuilder::general_purpose(None, Some("modelpack-core tests <tests@modelpack.invalid>"))
        .generate()
        .expect("generating a throwaway test cert");

    let fingerprint = cert.fingerprint().to_hex();
    let armored = armor_tsk(&cert);

    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("test-key.pub.asc"), &armored).expect("write key file");
    std::fs::write(dir.path().join("trustdb.txt"), b"test trustdb\n").expect("write trustdb");
    let lookup = serde_json::json!({ "test-key": fingerprint });
    std::fs::write(
        dir.path().join("keyname-to-fingerprint.json"),
        serde_json::to_vec(&lookup).unwrap(),
    )
    .expect("write lookup");

    TestKey {
        fingerprint,
        trusted_dir_path: dir.path().to_path_buf(),
        _dir: dir,
    }
}

fn armor_tsk(cert: &Cert) -> Vec<u8> {
    let tsk_bytes = cert.as_tsk().to_vec().expect("serialize cert with secret key material");
    let mut armored = Vec::new();
    {
        let mut writer =
            armor::Writer::new(&mut armored, armor::Kind::SecretKey).expect("build armor writer");
        writer.write_all(&tsk_bytes).expect("write tsk bytes");
        writer.finalize().expect("finalize armor");
    }
    armored
}

impl TestKey {
    pub fn trust_context(&self) -> TrustContext {
        TrustContext {
            unsafe_testing_enabled: false,
        }
    }

    pub fn key_home(&self) -> KeyHome {
        let trusted = TrustedKeysDir::open(&self.trusted_dir_path).expect("open trusted keys dir");
        KeyHome::seed(&self.trust_context(), &trusted).expect("seed key home")
    }
}
