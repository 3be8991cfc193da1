// Copyright Motia LLC and/or licensed to Motia LLC under one or more
// contributor license agreements. Licensed under the Elastic License 2.0;
// you may not use this file except in compliance with the Elastic License 2.0.
// This software is patent protected. We welcome discussions - reach out at support@motia.dev
// See LICENSE and PATENTS files for details.

use std::{collections::HashMap, sync::Arc};

use function_macros::{function, service};
use redis::AsyncCommands;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{RwLock, watch};

use super::{
    codec::{self, Sniff},
    config::RedisWorkerConfig,
    connection::{Connections, StoreConnection},
    error::{RedisWorkerError, Result},
    keys::KeySpec,
    reply,
    structs::{
        HashSetInput, IncrByInput, KeyInput, PatternInput, PopInput, PublishInput, PushInput,
        SetInput, SetMembersInput, ZAddInput, ZRemInput, ZRemRangeByRankInput, ZRevRangeInput,
    },
    subscriber::Subscriber,
};
use crate::{engine::Engine, function::FunctionResult, modules::module::Module, protocol::ErrorBody};

#[derive(Clone, Copy)]
enum PopSide {
    Left,
    Right,
}

impl PopSide {
    fn command(self) -> &'static str {
        match self {
            PopSide::Left => "BLPOP",
            PopSide::Right => "BRPOP",
        }
    }
}

fn respond<T: Serialize>(result: Result<T>) -> FunctionResult<Option<Value>, ErrorBody> {
    match result.and_then(|value| {
        serde_json::to_value(value)
            .map_err(|e| RedisWorkerError::InvalidInput(format!("unserializable reply: {}", e)))
    }) {
        Ok(Value::Null) => FunctionResult::Success(None),
        Ok(value) => FunctionResult::Success(Some(value)),
        Err(err) => {
            tracing::debug!(code = err.code(), error = %err, "Redis command failed");
            FunctionResult::Failure(err.into())
        }
    }
}

fn non_empty(keys: Vec<String>, what: &str) -> Result<Vec<String>> {
    if keys.is_empty() {
        return Err(RedisWorkerError::InvalidInput(format!("at least one {} is required", what)));
    }
    Ok(keys)
}

#[derive(Clone)]
pub struct RedisWorkerModule {
    engine: Arc<Engine>,
    config: RedisWorkerConfig,
    connections: Arc<RwLock<Option<Arc<Connections>>>>,
    subscriber: Arc<Subscriber>,
    /// Flips to true on `destroy`; every in-flight command is dropped, and
    /// its connection with it.
    closed: Arc<watch::Sender<bool>>,
}

impl RedisWorkerModule {
    pub fn new(engine: Arc<Engine>, config: RedisWorkerConfig) -> Self {
        Self {
            subscriber: Arc::new(Subscriber::new(engine.clone())),
            engine,
            config,
            connections: Arc::new(RwLock::new(None)),
            closed: Arc::new(watch::Sender::new(false)),
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.connections.read().await.is_some()
    }

    async fn connections(&self) -> Result<Arc<Connections>> {
        self.connections
            .read()
            .await
            .clone()
            .ok_or(RedisWorkerError::NotConnected)
    }

    /// Runs `command` to completion unless the worker is destroyed first, in
    /// which case the command is abandoned with a connection error.
    async fn run<T, F>(&self, command: F) -> FunctionResult<Option<Value>, ErrorBody>
    where
        T: Serialize,
        F: Future<Output = Result<T>>,
    {
        let mut closed = self.closed.subscribe();
        let result = tokio::select! {
            result = command => result,
            _ = closed.wait_for(|closed| *closed) => Err(RedisWorkerError::Closed),
        };
        respond(result)
    }

    async fn conn(&self) -> Result<StoreConnection> {
        self.connections().await?.command().await
    }

    async fn set_value(&self, input: SetInput) -> Result<()> {
        let expiry = match input.expires_in_seconds {
            Some(0) => {
                return Err(RedisWorkerError::InvalidInput(
                    "expiresInSeconds must be greater than zero".into(),
                ));
            }
            Some(seconds) => Some(i64::try_from(seconds).map_err(|_| {
                RedisWorkerError::InvalidInput(format!("expiry of {} seconds is too large", seconds))
            })?),
            None => None,
        };

        let mut conn = self.conn().await?;
        let payload = codec::encode(&input.value);
        tracing::debug!(key = %input.key, expires_in_seconds = ?expiry, "SET");

        match expiry {
            Some(seconds) => {
                let _: () = redis::pipe()
                    .atomic()
                    .set(&input.key, payload)
                    .ignore()
                    .expire(&input.key, seconds)
                    .ignore()
                    .query_async(&mut conn)
                    .await?;
            }
            None => conn.set::<_, _, ()>(&input.key, payload).await?,
        }

        Ok(())
    }

    async fn get_value(&self, key: &str) -> Result<Value> {
        tracing::debug!(key = %key, "GET");
        let raw: Option<String> = self.conn().await?.get(key).await?;
        Ok(codec::decode_opt(raw, Sniff::Structured)?)
    }

    async fn delete_key(&self, key: &str) -> Result<i64> {
        tracing::debug!(key = %key, "DEL");
        Ok(self.conn().await?.del(key).await?)
    }

    async fn matching_keys(&self, pattern: &str) -> Result<Vec<String>> {
        tracing::debug!(pattern = %pattern, "KEYS");
        Ok(self.conn().await?.keys(pattern).await?)
    }

    /// Deletes every key matching `pattern`, one at a time. Stops at the
    /// first failure; keys already deleted stay deleted.
    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        let keys = self.matching_keys(pattern).await?;
        let mut conn = self.conn().await?;

        for key in &keys {
            conn.del::<_, i64>(key).await?;
        }

        tracing::debug!(pattern = %pattern, deleted = keys.len(), "Deleted keys by pattern");
        Ok(())
    }

    async fn hash_set(&self, input: HashSetInput) -> Result<String> {
        if input.value.is_empty() {
            return Err(RedisWorkerError::InvalidInput("hmset needs at least one field".into()));
        }

        let fields: Vec<(String, String)> = input
            .value
            .iter()
            .map(|(field, value)| (field.clone(), codec::encode(value)))
            .collect();

        tracing::debug!(key = %input.key, fields = fields.len(), "HMSET");
        let mut conn = self.conn().await?;
        Ok(redis::cmd("HMSET")
            .arg(&input.key)
            .arg(&fields)
            .query_async(&mut conn)
            .await?)
    }

    async fn hash_get_all(&self, key: &str) -> Result<Value> {
        tracing::debug!(key = %key, "HGETALL");
        let fields: HashMap<String, String> = self.conn().await?.hgetall(key).await?;

        if fields.is_empty() {
            return Ok(Value::Null);
        }

        let object: Map<String, Value> = fields
            .into_iter()
            .map(|(field, value)| (field, Value::String(value)))
            .collect();
        Ok(codec::decode(Value::Object(object), Sniff::Structured)?)
    }

    async fn push(&self, input: PushInput, side: PopSide) -> Result<i64> {
        let payload = codec::encode(&input.value);
        let mut conn = self.conn().await?;
        let length: i64 = match side {
            PopSide::Left => conn.lpush(&input.key, payload).await?,
            PopSide::Right => conn.rpush(&input.key, payload).await?,
        };
        tracing::debug!(key = %input.key, length, "Pushed to list");
        Ok(length)
    }

    async fn blocking_pop(&self, input: PopInput, side: PopSide) -> Result<reply::ListPopResult> {
        let keys = non_empty(input.keys(), "key")?;
        let timeout = input.timeout_seconds();

        // Parks its own connection so other commands keep flowing.
        let mut conn = self.connections().await?.dedicated().await?;

        let mut cmd = redis::cmd(side.command());
        cmd.arg(&keys);
        if timeout.fract() == 0.0 {
            cmd.arg(timeout as u64);
        } else {
            cmd.arg(timeout);
        }

        tracing::debug!(keys = ?keys, timeout, command = side.command(), "Waiting on lists");
        let popped: Option<(String, String)> = cmd.query_async(&mut conn).await?;
        reply::shape_list_pop(popped)
    }

    async fn publish_to(&self, input: PublishInput) -> Result<i64> {
        let channels = non_empty(input.channel.normalize(), "channel")?;
        let payload = codec::encode(&input.value);
        let mut conn = self.conn().await?;

        let mut receivers = 0;
        for channel in &channels {
            receivers += conn.publish::<_, _, i64>(channel, &payload).await?;
        }

        tracing::debug!(channels = ?channels, receivers, "Published message");
        Ok(receivers)
    }

    async fn subscribe_to(&self, channels: KeySpec) -> Result<Vec<String>> {
        let channels = non_empty(channels.normalize(), "channel")?;
        let connections = self.connections().await?;
        let active = self.subscriber.subscribe(&connections, channels).await?;
        tracing::info!(channels = ?active, "Subscribed");
        Ok(active)
    }

    async fn unsubscribe_from(&self, channels: KeySpec) -> Result<Vec<String>> {
        let channels = non_empty(channels.normalize(), "channel")?;
        let remaining = self.subscriber.unsubscribe(channels).await?;
        tracing::info!(channels = ?remaining, "Unsubscribed");
        Ok(remaining)
    }

    async fn reverse_range(&self, input: ZRevRangeInput) -> Result<Value> {
        let mut conn = self.conn().await?;
        let mut cmd = redis::cmd("ZREVRANGE");
        cmd.arg(&input.key).arg(input.start).arg(input.stop);

        if !input.with_scores {
            let members: Vec<String> = cmd.query_async(&mut conn).await?;
            return Ok(Value::from(members));
        }

        cmd.arg("WITHSCORES");
        let flat: Vec<String> = cmd.query_async(&mut conn).await?;
        let grouped = reply::group_scores(flat)?;
        serde_json::to_value(grouped)
            .map_err(|e| RedisWorkerError::InvalidInput(format!("unserializable scores: {}", e)))
    }
}

#[async_trait::async_trait]
impl Module for RedisWorkerModule {
    fn name(&self) -> &'static str {
        "RedisWorkerModule"
    }

    async fn create(engine: Arc<Engine>, config: Option<Value>) -> anyhow::Result<Box<dyn Module>> {
        let config: RedisWorkerConfig = match config {
            Some(config) => serde_json::from_value(config)
                .map_err(|e| anyhow::anyhow!("Invalid RedisWorkerModule config: {}", e))?,
            None => RedisWorkerConfig::default(),
        };

        Ok(Box::new(RedisWorkerModule::new(engine, config)))
    }

    fn register_functions(&self, engine: Arc<Engine>) {
        self.register_functions(engine);
    }

    async fn initialize(&self) -> anyhow::Result<()> {
        tracing::info!("Initializing RedisWorkerModule");

        let connections = Connections::connect(self.engine.clone(), self.config.clone()).await?;
        self.closed.send_replace(false);
        *self.connections.write().await = Some(Arc::new(connections));

        Ok(())
    }

    async fn destroy(&self) -> anyhow::Result<()> {
        tracing::info!("Destroying RedisWorkerModule");

        self.closed.send_replace(true);
        self.subscriber.close().await;
        if let Some(connections) = self.connections.write().await.take() {
            tracing::info!(target_addr = %connections.descriptor(), "Closing Redis connections");
        }

        Ok(())
    }
}

#[service(name = "redis-worker")]
impl RedisWorkerModule {
    #[function(id = "set", description = "Store a value, optionally with a TTL")]
    pub async fn set(&self, input: SetInput) -> FunctionResult<Option<Value>, ErrorBody> {
        self.run(self.set_value(input)).await
    }

    #[function(id = "get", description = "Read a value, null when absent")]
    pub async fn get(&self, input: KeyInput) -> FunctionResult<Option<Value>, ErrorBody> {
        self.run(self.get_value(input.key())).await
    }

    #[function(id = "del", description = "Delete a key")]
    pub async fn del(&self, input: KeyInput) -> FunctionResult<Option<Value>, ErrorBody> {
        self.run(self.delete_key(input.key())).await
    }

    #[function(id = "del-pattern", description = "Delete every key matching a pattern")]
    pub async fn del_pattern(&self, input: PatternInput) -> FunctionResult<Option<Value>, ErrorBody> {
        self.run(self.delete_pattern(input.pattern())).await
    }

    #[function(id = "keys", description = "List keys matching a pattern")]
    pub async fn keys(&self, input: PatternInput) -> FunctionResult<Option<Value>, ErrorBody> {
        self.run(self.matching_keys(input.pattern())).await
    }

    #[function(id = "hmset", description = "Set hash fields")]
    pub async fn hmset(&self, input: HashSetInput) -> FunctionResult<Option<Value>, ErrorBody> {
        self.run(self.hash_set(input)).await
    }

    #[function(id = "hgetall", description = "Read a whole hash, null when absent")]
    pub async fn hgetall(&self, input: KeyInput) -> FunctionResult<Option<Value>, ErrorBody> {
        self.run(self.hash_get_all(input.key())).await
    }

    #[function(id = "sadd", description = "Add members to a set")]
    pub async fn sadd(&self, input: SetMembersInput) -> FunctionResult<Option<Value>, ErrorBody> {
        let result = async {
            let members = non_empty(input.value.into_vec(), "member")?;
            Ok::<_, RedisWorkerError>(self.conn().await?.sadd::<_, _, i64>(&input.key, members).await?)
        };
        self.run(result).await
    }

    #[function(id = "smembers", description = "List set members")]
    pub async fn smembers(&self, input: KeyInput) -> FunctionResult<Option<Value>, ErrorBody> {
        let result = async {
            Ok::<_, RedisWorkerError>(self
                .conn()
                .await?
                .smembers::<_, Vec<String>>(input.key())
                .await?)
        };
        self.run(result).await
    }

    #[function(id = "srem", description = "Remove members from a set")]
    pub async fn srem(&self, input: SetMembersInput) -> FunctionResult<Option<Value>, ErrorBody> {
        let result = async {
            let members = non_empty(input.value.into_vec(), "member")?;
            Ok::<_, RedisWorkerError>(self.conn().await?.srem::<_, _, i64>(&input.key, members).await?)
        };
        self.run(result).await
    }

    #[function(id = "lpush", description = "Prepend a value to a list")]
    pub async fn lpush(&self, input: PushInput) -> FunctionResult<Option<Value>, ErrorBody> {
        self.run(self.push(input, PopSide::Left)).await
    }

    #[function(id = "rpush", description = "Append a value to a list")]
    pub async fn rpush(&self, input: PushInput) -> FunctionResult<Option<Value>, ErrorBody> {
        self.run(self.push(input, PopSide::Right)).await
    }

    #[function(id = "blpop", description = "Pop the head of the first non-empty list, waiting if needed")]
    pub async fn blpop(&self, input: PopInput) -> FunctionResult<Option<Value>, ErrorBody> {
        self.run(self.blocking_pop(input, PopSide::Left)).await
    }

    #[function(id = "brpop", description = "Pop the tail of the first non-empty list, waiting if needed")]
    pub async fn brpop(&self, input: PopInput) -> FunctionResult<Option<Value>, ErrorBody> {
        self.run(self.blocking_pop(input, PopSide::Right)).await
    }

    #[function(id = "subscribe", description = "Subscribe to channels")]
    pub async fn subscribe(&self, input: KeySpec) -> FunctionResult<Option<Value>, ErrorBody> {
        self.run(self.subscribe_to(input)).await
    }

    #[function(id = "unsubscribe", description = "Unsubscribe from channels")]
    pub async fn unsubscribe(&self, input: KeySpec) -> FunctionResult<Option<Value>, ErrorBody> {
        self.run(self.unsubscribe_from(input)).await
    }

    #[function(id = "publish", description = "Publish a value to channels")]
    pub async fn publish(&self, input: PublishInput) -> FunctionResult<Option<Value>, ErrorBody> {
        self.run(self.publish_to(input)).await
    }

    #[function(id = "incrby", description = "Increment an integer value")]
    pub async fn incrby(&self, input: IncrByInput) -> FunctionResult<Option<Value>, ErrorBody> {
        let result = async {
            Ok::<_, RedisWorkerError>(self
                .conn()
                .await?
                .incr::<_, _, i64>(&input.key, input.amount)
                .await?)
        };
        self.run(result).await
    }

    #[function(id = "zadd", description = "Add a scored member to a sorted set")]
    pub async fn zadd(&self, input: ZAddInput) -> FunctionResult<Option<Value>, ErrorBody> {
        let result = async {
            Ok::<_, RedisWorkerError>(self
                .conn()
                .await?
                .zadd::<_, _, _, i64>(&input.key, &input.member, input.score)
                .await?)
        };
        self.run(result).await
    }

    #[function(id = "zrem", description = "Remove a member from a sorted set")]
    pub async fn zrem(&self, input: ZRemInput) -> FunctionResult<Option<Value>, ErrorBody> {
        let result = async {
            Ok::<_, RedisWorkerError>(self
                .conn()
                .await?
                .zrem::<_, _, i64>(&input.key, &input.member)
                .await?)
        };
        self.run(result).await
    }

    #[function(id = "zremrangebyrank", description = "Remove sorted set members by rank range")]
    pub async fn zremrangebyrank(
        &self,
        input: ZRemRangeByRankInput,
    ) -> FunctionResult<Option<Value>, ErrorBody> {
        let result = async {
            Ok::<_, RedisWorkerError>(self
                .conn()
                .await?
                .zremrangebyrank::<_, i64>(&input.key, input.min, input.max)
                .await?)
        };
        self.run(result).await
    }

    #[function(id = "zrevrange", description = "Sorted set members by descending score")]
    pub async fn zrevrange(&self, input: ZRevRangeInput) -> FunctionResult<Option<Value>, ErrorBody> {
        self.run(self.reverse_range(input)).await
    }
}
