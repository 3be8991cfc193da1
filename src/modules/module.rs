// Copyright Motia LLC and/or licensed to Motia LLC under one or more
// contributor license agreements. Licensed under the Elastic License 2.0;
// you may not use this file except in compliance with the Elastic License 2.0.
// This software is patent protected. We welcome discussions - reach out at support@motia.dev
// See LICENSE and PATENTS files for details.

use std::{future::Future, pin::Pin, sync::Arc};

use serde_json::Value;

use crate::engine::Engine;

pub type ModuleFuture = Pin<Box<dyn Future<Output = anyhow::Result<Box<dyn Module>>> + Send>>;

#[async_trait::async_trait]
pub trait Module: Send + Sync {
    fn name(&self) -> &'static str;

    /// Builds the module from its raw config. Must not touch the network.
    async fn create(engine: Arc<Engine>, config: Option<Value>) -> anyhow::Result<Box<dyn Module>>
    where
        Self: Sized;

    fn make_module(engine: Arc<Engine>, config: Option<Value>) -> ModuleFuture
    where
        Self: Sized + 'static,
    {
        Box::pin(async move { Self::create(engine, config).await })
    }

    /// Acquires external resources. An error here aborts start-up.
    async fn initialize(&self) -> anyhow::Result<()>;

    /// Releases everything `initialize` acquired. Must be safe to call even
    /// when `initialize` never ran or failed.
    async fn destroy(&self) -> anyhow::Result<()> {
        tracing::info!("Destroying module: {}", self.name());
        Ok(())
    }

    /// Registers functions to the engine
    #[allow(unused_variables)]
    fn register_functions(&self, engine: Arc<Engine>) {
        // blank implementation since it going to be overriden by the macros
    }
}
