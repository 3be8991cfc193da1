// Copyright Motia LLC and/or licensed to Motia LLC under one or more
// contributor license agreements. Licensed under the Elastic License 2.0;
// you may not use this file except in compliance with the Elastic License 2.0.
// This software is patent protected. We welcome discussions - reach out at support@motia.dev
// See LICENSE and PATENTS files for details.

//! The single subscriber connection shared by every channel subscription.
//!
//! A connection in subscribe mode cannot run ordinary commands, so it lives in
//! its own task. The task is started by the first `subscribe` and stopped when
//! the last channel is unsubscribed or the worker is destroyed.

use std::{collections::BTreeSet, sync::Arc};

use futures::StreamExt;
use redis::aio::PubSub;
use serde_json::{Value, json};
use tokio::{
    sync::{Mutex, mpsc, oneshot},
    task::JoinHandle,
};

use super::{
    codec::{self, Sniff},
    connection::Connections,
    error::{RedisWorkerError, Result},
};
use crate::engine::{Engine, EngineTrait};

pub const MESSAGE_NOTIFICATION: &str = "redis-worker.message";

/// Replaces every character outside `[A-Za-z0-9_]` with `_`.
pub fn sanitize_channel(channel: &str) -> String {
    channel
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

pub fn channel_notification(channel: &str) -> String {
    format!("{}.{}", MESSAGE_NOTIFICATION, sanitize_channel(channel))
}

enum SubscriberCommand {
    Subscribe(Vec<String>, oneshot::Sender<redis::RedisResult<()>>),
    Unsubscribe(Vec<String>, oneshot::Sender<redis::RedisResult<()>>),
}

struct ActiveSubscriber {
    commands: mpsc::Sender<SubscriberCommand>,
    channels: BTreeSet<String>,
    task: JoinHandle<()>,
}

enum SubscriberState {
    Absent,
    Active(ActiveSubscriber),
}

pub struct Subscriber {
    engine: Arc<Engine>,
    state: Mutex<SubscriberState>,
}

impl Subscriber {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            state: Mutex::new(SubscriberState::Absent),
        }
    }

    pub async fn is_active(&self) -> bool {
        matches!(*self.state.lock().await, SubscriberState::Active(_))
    }

    pub async fn channels(&self) -> Vec<String> {
        match &*self.state.lock().await {
            SubscriberState::Active(active) => active.channels.iter().cloned().collect(),
            SubscriberState::Absent => vec![],
        }
    }

    /// Subscribes to `channels`, opening the subscriber connection through
    /// `connections` when none is active. Returns every channel now subscribed.
    pub async fn subscribe(
        &self,
        connections: &Connections,
        channels: Vec<String>,
    ) -> Result<Vec<String>> {
        let mut state = self.state.lock().await;

        if let SubscriberState::Active(active) = &mut *state {
            match send(&active.commands, |reply| {
                SubscriberCommand::Subscribe(channels.clone(), reply)
            })
            .await
            {
                Some(result) => {
                    result?;
                    active.channels.extend(channels);
                    return Ok(active.channels.iter().cloned().collect());
                }
                None => {
                    tracing::warn!("Subscriber task is gone, reconnecting");
                    if let SubscriberState::Active(stale) =
                        std::mem::replace(&mut *state, SubscriberState::Absent)
                    {
                        stale.task.abort();
                    }
                }
            }
        }

        let mut pubsub = connections.pubsub().await?;
        pubsub.subscribe(&channels).await?;

        let (commands, receiver) = mpsc::channel(16);
        let task = tokio::spawn(run(pubsub, receiver, self.engine.clone()));
        let channels: BTreeSet<String> = channels.into_iter().collect();

        tracing::info!(channels = ?channels, "Subscriber connection opened");

        let active_channels = channels.iter().cloned().collect();
        *state = SubscriberState::Active(ActiveSubscriber {
            commands,
            channels,
            task,
        });

        Ok(active_channels)
    }

    /// Unsubscribes from `channels`. The subscriber connection is closed once
    /// no channel is left. Returns every channel still subscribed.
    pub async fn unsubscribe(&self, channels: Vec<String>) -> Result<Vec<String>> {
        let mut state = self.state.lock().await;

        let SubscriberState::Active(active) = &mut *state else {
            return Ok(vec![]);
        };

        let reply = send(&active.commands, |reply| {
            SubscriberCommand::Unsubscribe(channels.clone(), reply)
        })
        .await;

        match reply {
            Some(result) => result?,
            None => {
                if let SubscriberState::Active(stale) =
                    std::mem::replace(&mut *state, SubscriberState::Absent)
                {
                    stale.task.abort();
                }
                return Err(RedisWorkerError::NotConnected);
            }
        }

        for channel in &channels {
            active.channels.remove(channel);
        }

        if active.channels.is_empty() {
            if let SubscriberState::Active(done) =
                std::mem::replace(&mut *state, SubscriberState::Absent)
            {
                shutdown(done).await;
            }
            tracing::info!("Last channel unsubscribed, subscriber connection closed");
            return Ok(vec![]);
        }

        Ok(active.channels.iter().cloned().collect())
    }

    /// Drops the subscriber connection, if any.
    pub async fn close(&self) {
        let previous = std::mem::replace(&mut *self.state.lock().await, SubscriberState::Absent);
        if let SubscriberState::Active(active) = previous {
            shutdown(active).await;
            tracing::info!("Subscriber connection closed");
        }
    }
}

async fn send<F>(
    commands: &mpsc::Sender<SubscriberCommand>,
    build: F,
) -> Option<redis::RedisResult<()>>
where
    F: FnOnce(oneshot::Sender<redis::RedisResult<()>>) -> SubscriberCommand,
{
    let (reply, response) = oneshot::channel();
    commands.send(build(reply)).await.ok()?;
    response.await.ok()
}

async fn shutdown(active: ActiveSubscriber) {
    // Closing the command channel ends the task, which drops the connection.
    drop(active.commands);
    if let Err(err) = active.task.await
        && err.is_panic()
    {
        tracing::error!(error = %err, "Subscriber task panicked");
    }
}

async fn run(mut pubsub: PubSub, mut commands: mpsc::Receiver<SubscriberCommand>, engine: Arc<Engine>) {
    loop {
        let command = {
            let mut messages = std::pin::pin!(pubsub.on_message());
            loop {
                tokio::select! {
                    command = commands.recv() => break command,
                    message = messages.next() => match message {
                        Some(message) => deliver(&engine, &message),
                        None => {
                            tracing::error!("Subscriber connection closed by the server");
                            return;
                        }
                    },
                }
            }
        };

        match command {
            Some(SubscriberCommand::Subscribe(channels, reply)) => {
                let _ = reply.send(pubsub.subscribe(&channels).await);
            }
            Some(SubscriberCommand::Unsubscribe(channels, reply)) => {
                let _ = reply.send(pubsub.unsubscribe(&channels).await);
            }
            None => return,
        }
    }
}

fn deliver(engine: &Engine, message: &redis::Msg) {
    let channel = message.get_channel_name().to_string();
    let raw: String = match message.get_payload() {
        Ok(raw) => raw,
        Err(err) => {
            tracing::error!(channel = %channel, error = %err, "Unreadable message payload");
            return;
        }
    };

    let value = match codec::decode_str(&raw, Sniff::WithNullToken) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(channel = %channel, error = %err, "Delivering undecodable message as a string");
            Value::String(raw)
        }
    };

    tracing::debug!(channel = %channel, "Message received");

    engine.notify(&channel_notification(&channel), value.clone());
    engine.notify(MESSAGE_NOTIFICATION, json!({ "channel": channel, "value": value }));
}
