//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! `structured-text`: UTF-8 JSON, for attributes that benefit from being
//! human-readable and diffable, such as hyperparameters and metadata.

use std::io::{Read, Write};

use crate::error::CodecError;
use crate::registry::Codec;

use super::TAG_STRUCTURED_TEXT;

pub struct StructuredTextCodec;

impl Codec for StructuredTextCodec {
    fn tag(&self) -> &'static str {
        TAG_STRUCTURED_TEXT
    }

    fn encode(&self, value: &serde_json::Value, writer: &mut dyn Write) -> Result<(), CodecError> {
        serde_json::to_writer(writer, value).map_err(|e| CodecError::EncodeFailed(e.to_string()))
    }

    fn decode(&self, reader: &mut dyn Read) -> Result<serde_json::Value, CodecError> {
        serde_json::from_reader(reader).map_err(|e| CodecError::DecodeFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_and_stays_human_readable() {
        let codec = StructuredTextCodec;
        let value = json!({"learning_rate": 0.001, "epochs": 10});

        let mut buf = Vec::new();
        codec.encode(&value, &mut buf).unwrap();
        assert!(std::str::from_utf8(&buf).is_ok());

        let mut cursor = std::io::Cursor::new(buf);
        let decoded = codec.decode(&mut cursor).unwrap();
        assert_eq!(decoded, value);
    }
}
