// Copyright Motia LLC and/or licensed to Motia LLC under one or more
// contributor license agreements. Licensed under the Elastic License 2.0;
// you may not use this file except in compliance with the Elastic License 2.0.
// This software is patent protected. We welcome discussions - reach out at support@motia.dev
// See LICENSE and PATENTS files for details.

use std::time::Duration;

use crate::{modules::redis_worker::codec::DecodeError, protocol::ErrorBody};

#[derive(Debug, thiserror::Error)]
pub enum RedisWorkerError {
    #[error("failed to connect to Redis at {target}: {source}")]
    Connection {
        target: String,
        #[source]
        source: redis::RedisError,
    },

    #[error("Redis connection to {target} timed out after {timeout:?}")]
    ConnectionTimeout { target: String, timeout: Duration },

    #[error("Redis worker is not connected")]
    NotConnected,

    #[error("Redis worker was destroyed while the command was running")]
    Closed,

    #[error(transparent)]
    Command(#[from] redis::RedisError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("{0}")]
    Discovery(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl RedisWorkerError {
    pub fn code(&self) -> &'static str {
        match self {
            RedisWorkerError::Connection { .. }
            | RedisWorkerError::ConnectionTimeout { .. }
            | RedisWorkerError::NotConnected
            | RedisWorkerError::Closed => "connection_error",
            RedisWorkerError::Command(_) => "command_error",
            RedisWorkerError::Decode(_) => "decode_error",
            RedisWorkerError::Discovery(_) => "discovery_error",
            RedisWorkerError::InvalidInput(_) => "invalid_input",
        }
    }
}

impl From<RedisWorkerError> for ErrorBody {
    fn from(err: RedisWorkerError) -> Self {
        ErrorBody {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RedisWorkerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::redis_worker::codec::{Sniff, decode_str};

    #[test]
    fn test_error_codes() {
        let decode = decode_str("{oops", Sniff::Structured).unwrap_err();
        let cases = [
            (RedisWorkerError::from(decode), "decode_error"),
            (
                RedisWorkerError::Discovery("no redis connection found".into()),
                "discovery_error",
            ),
            (RedisWorkerError::InvalidInput("empty".into()), "invalid_input"),
            (RedisWorkerError::NotConnected, "connection_error"),
            (RedisWorkerError::Closed, "connection_error"),
            (
                RedisWorkerError::ConnectionTimeout {
                    target: "localhost:6379".into(),
                    timeout: Duration::from_secs(5),
                },
                "connection_error",
            ),
            (
                RedisWorkerError::from(redis::RedisError::from((
                    redis::ErrorKind::ResponseError,
                    "WRONGTYPE",
                ))),
                "command_error",
            ),
        ];

        for (err, code) in cases {
            assert_eq!(err.code(), code);
        }
    }

    #[test]
    fn test_into_error_body() {
        let body: ErrorBody = RedisWorkerError::Discovery("no redis connection found".into()).into();
        assert_eq!(body.code, "discovery_error");
        assert_eq!(body.message, "no redis connection found");
    }
}
