// Copyright Motia LLC and/or licensed to Motia LLC under one or more
// contributor license agreements. Licensed under the Elastic License 2.0;
// you may not use this file except in compliance with the Elastic License 2.0.
// This software is patent protected. We welcome discussions - reach out at support@motia.dev
// See LICENSE and PATENTS files for details.

//! Locating the store: a fixed descriptor, a bus discovery function, or the
//! platform's service-binding environment variable, in that order.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Value, json};

use super::{
    config::{ConnectionDescriptor, DiscoveryConfig, RedisWorkerConfig, deserialize_port},
    error::{RedisWorkerError, Result},
};
use crate::engine::{Engine, EngineTrait};

const NO_CONNECTION_FOUND: &str = "no redis connection found";

/// One entry of a discovery function's reply.
#[derive(Debug, Clone, Deserialize)]
pub struct GenericConnection {
    #[serde(rename = "type")]
    pub kind: String,
    pub host: String,
    #[serde(deserialize_with = "deserialize_port")]
    pub port: u16,
    #[serde(default)]
    pub password: Option<String>,
}

impl From<GenericConnection> for ConnectionDescriptor {
    fn from(conn: GenericConnection) -> Self {
        ConnectionDescriptor {
            hostname: conn.host,
            port: conn.port,
            password: conn.password,
        }
    }
}

/// First connection of the wanted store type, in reply order.
pub fn select_connection(
    connections: Vec<GenericConnection>,
    store_type: &str,
) -> Option<ConnectionDescriptor> {
    connections
        .into_iter()
        .find(|conn| conn.kind == store_type)
        .map(Into::into)
}

#[derive(Debug, Deserialize)]
struct ServiceBinding {
    credentials: Credentials,
}

#[derive(Debug, Deserialize)]
struct Credentials {
    #[serde(default)]
    hostname: Option<String>,
    #[serde(default)]
    host: Option<String>,
    #[serde(deserialize_with = "deserialize_port")]
    port: u16,
    #[serde(default)]
    password: Option<String>,
}

/// Parses a service-binding document and returns the first binding under
/// `label`.
pub fn from_service_bindings(raw: &str, label: &str) -> Result<ConnectionDescriptor> {
    let mut bindings: HashMap<String, Vec<ServiceBinding>> = serde_json::from_str(raw)
        .map_err(|e| RedisWorkerError::Discovery(format!("invalid service bindings: {}", e)))?;

    let binding = bindings
        .remove(label)
        .and_then(|bindings| bindings.into_iter().next())
        .ok_or_else(|| RedisWorkerError::Discovery(NO_CONNECTION_FOUND.into()))?;

    let Credentials {
        hostname,
        host,
        port,
        password,
    } = binding.credentials;

    let hostname = hostname.or(host).ok_or_else(|| {
        RedisWorkerError::Discovery(format!("binding {} has no host in its credentials", label))
    })?;

    Ok(ConnectionDescriptor {
        hostname,
        port,
        password,
    })
}

async fn from_discovery_function(
    engine: &Engine,
    function_id: &str,
    discovery: &DiscoveryConfig,
) -> Result<ConnectionDescriptor> {
    let reply = engine
        .call(function_id, json!({}))
        .await
        .map_err(|err| {
            RedisWorkerError::Discovery(format!("discovery function {} failed: {}", function_id, err))
        })?
        .unwrap_or(Value::Array(vec![]));

    let connections: Vec<GenericConnection> = serde_json::from_value(reply).map_err(|e| {
        RedisWorkerError::Discovery(format!(
            "discovery function {} returned an unexpected reply: {}",
            function_id, e
        ))
    })?;

    tracing::debug!(
        function_id = %function_id,
        candidates = connections.len(),
        "Received generic connections"
    );

    select_connection(connections, &discovery.store_type)
        .ok_or_else(|| RedisWorkerError::Discovery(NO_CONNECTION_FOUND.into()))
}

/// Resolves where the store lives. The first configured source wins.
pub async fn resolve(engine: &Engine, config: &RedisWorkerConfig) -> Result<ConnectionDescriptor> {
    if let Some(connection) = &config.connection {
        return Ok(connection.clone());
    }

    let discovery = &config.discovery;

    if let Some(function_id) = &discovery.function {
        return from_discovery_function(engine, function_id, discovery).await;
    }

    match std::env::var(&discovery.env_var) {
        Ok(raw) => from_service_bindings(&raw, &discovery.label),
        Err(_) => Err(RedisWorkerError::Discovery(NO_CONNECTION_FOUND.into())),
    }
}
