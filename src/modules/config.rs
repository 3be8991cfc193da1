// Copyright Motia LLC and/or licensed to Motia LLC under one or more
// contributor license agreements. Licensed under the Elastic License 2.0;
// you may not use this file except in compliance with the Elastic License 2.0.
// This software is patent protected. We welcome discussions - reach out at support@motia.dev
// See LICENSE and PATENTS files for details.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::{
    engine::Engine,
    modules::{module::Module, redis_worker::RedisWorkerModule},
};

// =============================================================================
// Engine Config (root of YAML)
// =============================================================================

pub const REDIS_WORKER_MODULE: &str = "modules::redis_worker::RedisWorkerModule";

/// Default modules to load when no config.yaml is present
const DEFAULT_MODULES: &[&str] = &[REDIS_WORKER_MODULE];

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default)]
    pub modules: Vec<ModuleEntry>,
}

impl EngineConfig {
    /// Creates an EngineConfig with default modules
    pub fn default_modules() -> Self {
        let modules = DEFAULT_MODULES
            .iter()
            .map(|class| ModuleEntry {
                class: class.to_string(),
                config: None,
            })
            .collect();

        Self { modules }
    }

    /// Loads config from YAML string
    pub fn from_yaml(yaml_content: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml_content)?;
        Ok(config)
    }

    /// Loads config from file, or returns default if file doesn't exist
    pub fn from_file_or_default(path: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(yaml_content) => {
                tracing::info!("Loading modules from {}", path);
                Self::from_yaml(&yaml_content)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No {} found, using default modules", path);
                Ok(Self::default_modules())
            }
            Err(err) => Err(anyhow::anyhow!("Failed to read {}: {}", path, err)),
        }
    }

    /// Creates all modules from the configuration
    pub async fn create_modules(&self, engine: Arc<Engine>) -> anyhow::Result<Vec<Box<dyn Module>>> {
        let mut modules = Vec::new();

        for entry in &self.modules {
            tracing::debug!("Creating module: {}", entry.class);
            modules.push(entry.create_module(engine.clone()).await?);
        }

        Ok(modules)
    }

    /// Creates, registers and initializes all modules. If any module fails to
    /// initialize, the ones already created are destroyed before returning.
    pub async fn load_modules(&self, engine: Arc<Engine>) -> anyhow::Result<Vec<Box<dyn Module>>> {
        tracing::info!("Loading {} modules from config", self.modules.len());

        let modules = self.create_modules(engine.clone()).await?;

        for module in &modules {
            module.register_functions(engine.clone());
        }

        for module in &modules {
            if let Err(err) = module.initialize().await {
                tracing::error!(module = module.name(), error = %err, "Module failed to initialize");
                destroy_modules(&modules).await;
                return Err(err);
            }
        }

        tracing::info!("All {} modules initialized successfully", modules.len());

        Ok(modules)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleEntry {
    pub class: String,
    #[serde(default)]
    pub config: Option<Value>,
}

impl ModuleEntry {
    /// Creates a module instance from this entry
    pub async fn create_module(&self, engine: Arc<Engine>) -> anyhow::Result<Box<dyn Module>> {
        match self.class.as_str() {
            REDIS_WORKER_MODULE => RedisWorkerModule::make_module(engine, self.config.clone()).await,
            unknown => Err(anyhow::anyhow!("Unknown module class: {}", unknown)),
        }
    }
}

async fn destroy_modules(modules: &[Box<dyn Module>]) {
    for module in modules.iter().rev() {
        if let Err(err) = module.destroy().await {
            tracing::error!(module = module.name(), error = %err, "Failed to destroy module");
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

#[derive(Default)]
pub struct EngineBuilder {
    config: Option<EngineConfig>,
    engine: Option<Arc<Engine>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn config_file_or_default(self, path: &str) -> anyhow::Result<Self> {
        Ok(self.config(EngineConfig::from_file_or_default(path)?))
    }

    /// Uses an existing engine instead of a fresh one, e.g. to share it with
    /// other in-process services.
    pub fn engine(mut self, engine: Arc<Engine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub async fn build(self) -> anyhow::Result<RunningEngine> {
        let engine = self.engine.unwrap_or_else(|| Arc::new(Engine::new()));
        let config = self.config.unwrap_or_else(EngineConfig::default_modules);
        let modules = config.load_modules(engine.clone()).await?;

        Ok(RunningEngine { engine, modules })
    }
}

pub struct RunningEngine {
    pub engine: Arc<Engine>,
    modules: Vec<Box<dyn Module>>,
}

impl RunningEngine {
    pub fn module_names(&self) -> Vec<&'static str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    /// Destroys modules in reverse load order.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        tracing::info!("Shutting down {} modules", self.modules.len());
        destroy_modules(&self.modules).await;
        Ok(())
    }
}
