//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! Verifiable stream: an in-memory byte buffer whose contents are proven
//! unchanged by a keyed MAC, where the key is a random nonce generated for
//! that stream alone.
//!
//! The MAC does not assert anything about *origin* — only that the bytes
//! read back are the bytes written. Origin is the job of the manifest
//! signature (see [`crate::trust`]) that records each stream's nonce and MAC.
//!
//! A [`VerifiableStream`] moves through exactly two states, enforced by the
//! type system rather than a runtime flag: [`Writing`] accepts `write` calls
//! and has no `read`; [`finalize`](VerifiableStream::finalize) consumes it
//! and returns the recorded nonce/MAC plus a [`VerifiedStream`] that can only
//! be read and seeked, never written.

use std::io::{self, Cursor, Read, Seek, SeekFrom};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::error::StreamError;

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 16;

/// A stream in its writable phase. Accepts bytes, accumulates a running MAC,
/// and cannot be read until [`finalize`](VerifiableStream::finalize) is called.
pub struct VerifiableStream {
    nonce: [u8; NONCE_LEN],
    buffer: Vec<u8>,
    mac: HmacSha256,
}

impl Default for VerifiableStream {
    fn default() -> Self {
        Self::new()
    }
}

impl VerifiableStream {
    /// Create a new stream with a freshly sampled random nonce.
    pub fn new() -> Self {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce);
        let mac = HmacSha256::new_from_slice(&nonce).expect("HMAC accepts any key length");
        Self {
            nonce,
            buffer: Vec::new(),
            mac,
        }
    }

    /// Append bytes to the stream, folding them into the running MAC.
    pub fn write_all(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
        self.mac.update(data);
    }

    /// Finalize the stream: stop accepting writes, compute the final MAC, and
    /// return the base64-encoded nonce, the base64-encoded MAC, and a
    /// [`VerifiedStream`] ready for reading.
    pub fn finalize(self) -> (String, String, VerifiedStream) {
        let nonce_string = BASE64.encode(self.nonce);
        let mac_bytes = self.mac.finalize().into_bytes();
        let mac_string = BASE64.encode(mac_bytes);
        let verified = VerifiedStream {
            cursor: Cursor::new(self.buffer),
        };
        (nonce_string, mac_string, verified)
    }
}

/// A stream in its finalized, read-only phase.
pub struct VerifiedStream {
    cursor: Cursor<Vec<u8>>,
}

impl Read for VerifiedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Seek for VerifiedStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl VerifiedStream {
    /// Consume the stream, returning its underlying bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.cursor.into_inner()
    }

    /// Current buffered length in bytes.
    pub fn len(&self) -> u64 {
        self.cursor.get_ref().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Verify that the contents of `stream` match the given base64-encoded
/// `nonce`/`expected_mac`, rewinding the stream both before and, on success,
/// after reading.
///
/// This is a freestanding function rather than a method on
/// [`VerifiedStream`], matching the original design intent that it can
/// verify *any* readable, seekable stream — not only ones produced by this
/// module — as long as the caller supplies the nonce/MAC pair recorded for
/// it in a manifest.
pub fn verify<S: Read + Seek>(
    nonce: &str,
    expected_mac: &str,
    stream: &mut S,
) -> Result<(), StreamError> {
    let nonce_bytes = BASE64
        .decode(nonce)
        .map_err(|e| StreamError::MalformedEncoding(format!("nonce: {e}")))?;
    let expected_mac_bytes = BASE64
        .decode(expected_mac)
        .map_err(|e| StreamError::MalformedEncoding(format!("mac: {e}")))?;

    stream
        .seek(SeekFrom::Start(0))
        .map_err(|e| StreamError::MalformedEncoding(format!("seek: {e}")))?;

    let mut mac = HmacSha256::new_from_slice(&nonce_bytes)
        .map_err(|e| StreamError::MalformedEncoding(format!("nonce length: {e}")))?;

    let mut buf = [0u8; 4096];
    loop {
        let n = stream
            .read(&mut buf)
            .map_err(|e| StreamError::MalformedEncoding(format!("read: {e}")))?;
        if n == 0 {
            break;
        }
        mac.update(&buf[..n]);
    }

    stream
        .seek(SeekFrom::Start(0))
        .map_err(|e| StreamError::MalformedEncoding(format!("seek: {e}")))?;

    mac.verify_slice(&expected_mac_bytes)
        .map_err(|_| StreamError::MacMismatch)
}
