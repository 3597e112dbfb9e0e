//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! `binary-dict`: MessagePack, matching the original's use of `msgpack` as a
//! compact, length-prefixed, binary/textual-type-preserving encoding for
//! plain dict/list payloads.

use std::io::{Read, Write};

use crate::error::CodecError;
use crate::registry::Codec;

use super::TAG_BINARY_DICT;

pub struct BinaryDictCodec;

impl Codec for BinaryDictCodec {
    fn tag(&self) -> &'static str {
        TAG_BINARY_DICT
    }

    fn encode(&self, value: &serde_json::Value, writer: &mut dyn Write) -> Result<(), CodecError> {
        rmp_serde::encode::write(writer, value).map_err(|e| CodecError::EncodeFailed(e.to_string()))
    }

    fn decode(&self, reader: &mut dyn Read) -> Result<serde_json::Value, CodecError> {
        rmp_serde::decode::from_read(reader).map_err(|e| CodecError::DecodeFailed(e.to_string()))
    }
}
