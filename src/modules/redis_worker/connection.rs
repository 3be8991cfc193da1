// Copyright Motia LLC and/or licensed to Motia LLC under one or more
// contributor license agreements. Licensed under the Elastic License 2.0;
// you may not use this file except in compliance with the Elastic License 2.0.
// This software is patent protected. We welcome discussions - reach out at support@motia.dev
// See LICENSE and PATENTS files for details.

use std::{sync::Arc, time::Duration};

use redis::{
    Client, Cmd, Pipeline, RedisFuture,
    aio::{ConnectionLike, ConnectionManager, MultiplexedConnection, PubSub},
};
use tokio::time::timeout;

use super::{
    config::{ConnectionDescriptor, ConnectionMode, RedisWorkerConfig},
    discovery,
    error::{RedisWorkerError, Result},
};
use crate::engine::Engine;

/// A connection able to run ordinary commands.
#[derive(Clone)]
pub enum StoreConnection {
    Managed(ConnectionManager),
    Direct(MultiplexedConnection),
}

impl ConnectionLike for StoreConnection {
    fn req_packed_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, redis::Value> {
        match self {
            StoreConnection::Managed(conn) => conn.req_packed_command(cmd),
            StoreConnection::Direct(conn) => conn.req_packed_command(cmd),
        }
    }

    fn req_packed_commands<'a>(
        &'a mut self,
        cmd: &'a Pipeline,
        offset: usize,
        count: usize,
    ) -> RedisFuture<'a, Vec<redis::Value>> {
        match self {
            StoreConnection::Managed(conn) => conn.req_packed_commands(cmd, offset, count),
            StoreConnection::Direct(conn) => conn.req_packed_commands(cmd, offset, count),
        }
    }

    fn get_db(&self) -> i64 {
        match self {
            StoreConnection::Managed(conn) => conn.get_db(),
            StoreConnection::Direct(conn) => conn.get_db(),
        }
    }
}

async fn connect_within<T, F>(
    descriptor: &ConnectionDescriptor,
    limit: Duration,
    connecting: F,
) -> Result<T>
where
    F: Future<Output = redis::RedisResult<T>>,
{
    timeout(limit, connecting)
        .await
        .map_err(|_| RedisWorkerError::ConnectionTimeout {
            target: descriptor.to_string(),
            timeout: limit,
        })?
        .map_err(|source| RedisWorkerError::Connection {
            target: descriptor.to_string(),
            source,
        })
}

fn open_client(descriptor: &ConnectionDescriptor) -> Result<Client> {
    Client::open(descriptor.connection_info()).map_err(|source| RedisWorkerError::Connection {
        target: descriptor.to_string(),
        source,
    })
}

/// Owns every connection the worker opens to the store, except the
/// subscriber connection.
pub struct Connections {
    engine: Arc<Engine>,
    config: RedisWorkerConfig,
    descriptor: ConnectionDescriptor,
    client: Client,
    shared: Option<ConnectionManager>,
}

impl Connections {
    /// Resolves the store and proves it reachable within the configured
    /// connection timeout.
    pub async fn connect(engine: Arc<Engine>, config: RedisWorkerConfig) -> Result<Self> {
        let descriptor = discovery::resolve(&engine, &config).await?;
        let client = open_client(&descriptor)?;
        let limit = config.connection_timeout();

        let shared = match config.connection_mode {
            ConnectionMode::Shared => Some(
                connect_within(&descriptor, limit, client.get_connection_manager()).await?,
            ),
            ConnectionMode::PerCall => {
                let mut first =
                    connect_within(&descriptor, limit, client.get_multiplexed_async_connection())
                        .await?;
                let _: String = redis::cmd("PING").query_async(&mut first).await?;
                None
            }
        };

        tracing::info!(
            target_addr = %descriptor,
            mode = ?config.connection_mode,
            "Connected to Redis"
        );

        Ok(Self {
            engine,
            config,
            descriptor,
            client,
            shared,
        })
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    /// Client for the current target: the start-up one when shared, a
    /// freshly resolved one per call otherwise.
    async fn current_client(&self) -> Result<(Client, ConnectionDescriptor)> {
        match self.config.connection_mode {
            ConnectionMode::Shared => Ok((self.client.clone(), self.descriptor.clone())),
            ConnectionMode::PerCall => {
                let descriptor = discovery::resolve(&self.engine, &self.config).await?;
                Ok((open_client(&descriptor)?, descriptor))
            }
        }
    }

    /// Connection for an ordinary command.
    pub async fn command(&self) -> Result<StoreConnection> {
        if let Some(manager) = &self.shared {
            return Ok(StoreConnection::Managed(manager.clone()));
        }

        self.dedicated().await.map(StoreConnection::Direct)
    }

    /// A connection nobody else uses, for commands that park the connection
    /// (blocking pops).
    pub async fn dedicated(&self) -> Result<MultiplexedConnection> {
        let (client, descriptor) = self.current_client().await?;
        connect_within(
            &descriptor,
            self.config.connection_timeout(),
            client.get_multiplexed_async_connection(),
        )
        .await
    }

    /// Opens the subscriber connection, bounded by the connection timeout.
    pub async fn pubsub(&self) -> Result<PubSub> {
        let (client, descriptor) = self.current_client().await?;
        connect_within(
            &descriptor,
            self.config.connection_timeout(),
            client.get_async_pubsub(),
        )
        .await
    }
}
