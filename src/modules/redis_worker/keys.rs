// Copyright Motia LLC and/or licensed to Motia LLC under one or more
// contributor license agreements. Licensed under the Elastic License 2.0;
// you may not use this file except in compliance with the Elastic License 2.0.
// This software is patent protected. We welcome discussions - reach out at support@motia.dev
// See LICENSE and PATENTS files for details.

use serde::{Deserialize, Serialize};

/// One or more keys (or channels): `"k"`, `"a,b,c"` or `["a", "b"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeySpec {
    Many(Vec<String>),
    One(String),
}

impl KeySpec {
    /// Canonical ordered key list. A comma-joined string is split on `,`
    /// without trimming, so `"a, b"` yields `"a"` and `" b"`.
    pub fn normalize(&self) -> Vec<String> {
        match self {
            KeySpec::Many(keys) => keys.clone(),
            KeySpec::One(key) if key.contains(',') => key.split(',').map(str::to_string).collect(),
            KeySpec::One(key) => vec![key.clone()],
        }
    }
}

impl From<&str> for KeySpec {
    fn from(key: &str) -> Self {
        KeySpec::One(key.to_string())
    }
}

impl From<Vec<String>> for KeySpec {
    fn from(keys: Vec<String>) -> Self {
        KeySpec::Many(keys)
    }
}
