// Copyright Motia LLC and/or licensed to Motia LLC under one or more
// contributor license agreements. Licensed under the Elastic License 2.0;
// you may not use this file except in compliance with the Elastic License 2.0.
// This software is patent protected. We welcome discussions - reach out at support@motia.dev
// See LICENSE and PATENTS files for details.

//! Value marshalling between application JSON and the store's string values.
//!
//! Outgoing values are reduced to a single string: strings pass through,
//! anything else is JSON-encoded. Incoming strings are sniffed by their first
//! character and parsed only when they look like JSON text, so plain scalar
//! replies (counters, status tokens, bare words) come back untouched.

use serde_json::Value;

/// Which first characters mark a reply as JSON text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sniff {
    /// `"`, `[` and `{`.
    #[default]
    Structured,
    /// As `Structured`, plus the bare `null` token.
    WithNullToken,
}

#[derive(Debug, thiserror::Error)]
#[error("value looks like JSON but failed to parse ({source}): {raw}")]
pub struct DecodeError {
    pub raw: String,
    #[source]
    pub source: serde_json::Error,
}

pub fn encode(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn looks_structured(raw: &str) -> bool {
    matches!(raw.as_bytes().first(), Some(b'"' | b'[' | b'{'))
}

/// Decodes one raw string reply. Never fails for strings that do not look
/// like JSON text.
pub fn decode_str(raw: &str, sniff: Sniff) -> Result<Value, DecodeError> {
    if sniff == Sniff::WithNullToken && raw == "null" {
        return Ok(Value::Null);
    }

    if !looks_structured(raw) {
        return Ok(Value::String(raw.to_string()));
    }

    serde_json::from_str(raw).map_err(|source| DecodeError {
        raw: raw.to_string(),
        source,
    })
}

/// Decodes a reply that has already been lifted into JSON. Only string
/// values are inspected; numbers, arrays, objects and null pass through.
pub fn decode(wire: Value, sniff: Sniff) -> Result<Value, DecodeError> {
    match wire {
        Value::String(raw) => decode_str(&raw, sniff),
        other => Ok(other),
    }
}

/// Decodes an optional string reply; a missing key becomes `null`.
pub fn decode_opt(raw: Option<String>, sniff: Sniff) -> Result<Value, DecodeError> {
    match raw {
        Some(raw) => decode_str(&raw, sniff),
        None => Ok(Value::Null),
    }
}
