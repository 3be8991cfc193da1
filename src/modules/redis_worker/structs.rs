// Copyright Motia LLC and/or licensed to Motia LLC under one or more
// contributor license agreements. Licensed under the Elastic License 2.0;
// you may not use this file except in compliance with the Elastic License 2.0.
// This software is patent protected. We welcome discussions - reach out at support@motia.dev
// See LICENSE and PATENTS files for details.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::keys::KeySpec;

/// `"key"` or `{ "key": "..." }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyInput {
    Bare(String),
    Keyed { key: String },
}

impl KeyInput {
    pub fn key(&self) -> &str {
        match self {
            KeyInput::Bare(key) | KeyInput::Keyed { key } => key,
        }
    }
}

/// `"pattern"` or `{ "pattern": "..." }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatternInput {
    Bare(String),
    Keyed { pattern: String },
}

impl PatternInput {
    pub fn pattern(&self) -> &str {
        match self {
            PatternInput::Bare(pattern) | PatternInput::Keyed { pattern } => pattern,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetInput {
    pub key: String,
    pub value: Value,
    #[serde(
        rename = "expiresInSeconds",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_in_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashSetInput {
    pub key: String,
    pub value: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Members {
    Many(Vec<String>),
    One(String),
}

impl Members {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Members::Many(members) => members,
            Members::One(member) => vec![member],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetMembersInput {
    pub key: String,
    pub value: Members,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushInput {
    pub key: String,
    pub value: Value,
}

/// Keys to pop from, optionally with a wait limit. A missing or zero
/// timeout waits forever.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PopInput {
    Options {
        key: KeySpec,
        #[serde(
            rename = "timeoutInSeconds",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        timeout_in_seconds: Option<f64>,
    },
    Keys(KeySpec),
}

impl PopInput {
    pub fn keys(&self) -> Vec<String> {
        match self {
            PopInput::Options { key, .. } | PopInput::Keys(key) => key.normalize(),
        }
    }

    pub fn timeout_seconds(&self) -> f64 {
        match self {
            PopInput::Options {
                timeout_in_seconds: Some(timeout),
                ..
            } if *timeout > 0.0 => *timeout,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishInput {
    pub channel: KeySpec,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncrByInput {
    pub key: String,
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZAddInput {
    pub key: String,
    pub score: f64,
    pub member: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZRemInput {
    pub key: String,
    pub member: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZRemRangeByRankInput {
    pub key: String,
    pub min: isize,
    pub max: isize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZRevRangeInput {
    pub key: String,
    pub start: isize,
    pub stop: isize,
    #[serde(rename = "withScores", default)]
    pub with_scores: bool,
}
