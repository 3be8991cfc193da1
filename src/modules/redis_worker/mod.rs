// Copyright Motia LLC and/or licensed to Motia LLC under one or more
// contributor license agreements. Licensed under the Elastic License 2.0;
// you may not use this file except in compliance with the Elastic License 2.0.
// This software is patent protected. We welcome discussions - reach out at support@motia.dev
// See LICENSE and PATENTS files for details.

pub mod codec;
pub mod config;
pub mod connection;
pub mod discovery;
pub mod error;
pub mod keys;
pub mod reply;
pub mod structs;
pub mod subscriber;
mod worker;

pub use self::{
    config::{ConnectionDescriptor, ConnectionMode, RedisWorkerConfig},
    error::RedisWorkerError,
    worker::RedisWorkerModule,
};
