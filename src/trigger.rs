// Copyright Motia LLC and/or licensed to Motia LLC under one or more
// contributor license agreements. Licensed under the Elastic License 2.0;
// you may not use this file except in compliance with the Elastic License 2.0.
// This software is patent protected. We welcome discussions - reach out at support@motia.dev
// See LICENSE and PATENTS files for details.

use std::sync::Arc;

use colored::Colorize;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Binds a listener function to a notification name.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub id: String,
    pub event: String,
    pub function_id: String,
}

// Only `id` is considered for Hash and Eq/PartialEq
impl PartialEq for Trigger {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl std::hash::Hash for Trigger {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[derive(Default)]
pub struct TriggerRegistry {
    pub triggers: Arc<DashMap<String, Trigger>>,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self {
            triggers: Arc::new(DashMap::new()),
        }
    }

    pub fn register_trigger(&self, trigger: Trigger) {
        tracing::info!(
            "{} Trigger {} → {}",
            "[REGISTERED]".green(),
            trigger.event.purple(),
            trigger.function_id.cyan()
        );
        self.triggers.insert(trigger.id.clone(), trigger);
    }

    pub fn unregister_trigger(&self, id: &str) -> Option<Trigger> {
        let removed = self.triggers.remove(id).map(|(_, trigger)| trigger);
        match &removed {
            Some(trigger) => tracing::info!(
                "{} Trigger {} → {}",
                "[REMOVED]".red(),
                trigger.event.purple(),
                trigger.function_id.cyan()
            ),
            None => tracing::warn!(trigger_id = %id, "Trigger not found"),
        }
        removed
    }

    pub fn triggers_for(&self, event: &str) -> Vec<Trigger> {
        self.triggers
            .iter()
            .filter(|pair| pair.value().event == event)
            .map(|pair| pair.value().clone())
            .collect()
    }
}
