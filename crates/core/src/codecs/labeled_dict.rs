//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! `labeled-dict`: CBOR, a second independent generic binary object
//! notation alongside `binary-dict`, matching the original's use of `dill`
//! as "a different generic binary dumper" than its primary pickle codec.

use std::io::{Read, Write};

use crate::error::CodecError;
use crate::registry::Codec;

use super::TAG_LABELED_DICT;

pub struct LabeledDictCodec;

impl Codec for LabeledDictCodec {
    fn tag(&self) -> &'static str {
        TAG_LABELED_DICT
    }

    fn encode(&self, value: &serde_json::Value, writer: &mut dyn Write) -> Result<(), CodecError> {
        ciborium::into_writer(value, writer).map_err(|e| CodecError::EncodeFailed(e.to_string()))
    }

    fn decode(&self, reader: &mut dyn Read) -> Result<serde_json::Value, CodecError> {
        ciborium::from_reader(reader).map_err(|e| CodecError::DecodeFailed(e.to_string()))
    }
}
