// Copyright Motia LLC and/or licensed to Motia LLC under one or more
// contributor license agreements. Licensed under the Elastic License 2.0;
// you may not use this file except in compliance with the Elastic License 2.0.
// This software is patent protected. We welcome discussions - reach out at support@motia.dev
// See LICENSE and PATENTS files for details.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    codec::{self, Sniff},
    error::{RedisWorkerError, Result},
};

/// Reply of a blocking pop. Both fields are `null` when the wait timed out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListPopResult {
    pub list: Option<String>,
    pub value: Value,
}

impl ListPopResult {
    pub fn timed_out() -> Self {
        Self {
            list: None,
            value: Value::Null,
        }
    }
}

/// Shapes the `[list, value]` pair returned by BLPOP/BRPOP. The list name is
/// kept verbatim; the value goes through the codec.
pub fn shape_list_pop(reply: Option<(String, String)>) -> Result<ListPopResult> {
    match reply {
        None => Ok(ListPopResult::timed_out()),
        Some((list, raw)) => Ok(ListPopResult {
            list: Some(list),
            value: codec::decode_str(&raw, Sniff::WithNullToken)?,
        }),
    }
}

/// A sorted set score. JSON has no infinities, so `inf` and `-inf` stay as
/// the text Redis sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Score {
    Number(f64),
    Text(String),
}

impl Score {
    fn parse(raw: String) -> Option<Self> {
        let number = raw.parse::<f64>().ok()?;
        if number.is_finite() {
            Some(Score::Number(number))
        } else {
            Some(Score::Text(raw))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMember {
    pub member: String,
    pub score: Score,
}

/// Regroups a flat `[member, score, member, score, ...]` reply, keeping order.
pub fn group_scores(flat: Vec<String>) -> Result<Vec<ScoredMember>> {
    if flat.len() % 2 != 0 {
        return Err(RedisWorkerError::InvalidInput(format!(
            "expected member/score pairs, got {} elements",
            flat.len()
        )));
    }

    let mut grouped = Vec::with_capacity(flat.len() / 2);
    let mut items = flat.into_iter();
    while let (Some(member), Some(score)) = (items.next(), items.next()) {
        let Some(score) = Score::parse(score.clone()) else {
            return Err(RedisWorkerError::InvalidInput(format!(
                "score {:?} of {:?} is not a number",
                score, member
            )));
        };
        grouped.push(ScoredMember { member, score });
    }

    Ok(grouped)
}
