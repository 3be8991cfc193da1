// Copyright Motia LLC and/or licensed to Motia LLC under one or more
// contributor license agreements. Licensed under the Elastic License 2.0;
// you may not use this file except in compliance with the Elastic License 2.0.
// This software is patent protected. We welcome discussions - reach out at support@motia.dev
// See LICENSE and PATENTS files for details.

use std::{fmt, time::Duration};

use serde::{Deserialize, Deserializer, Serialize};

pub const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_STORE_TYPE: &str = "redis";
pub const DEFAULT_BINDINGS_ENV_VAR: &str = "VCAP_SERVICES";
pub const DEFAULT_BINDINGS_LABEL: &str = "p-redis";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisWorkerConfig {
    /// Fixed connection; skips discovery entirely when set.
    #[serde(default)]
    pub connection: Option<ConnectionDescriptor>,

    #[serde(default)]
    pub discovery: DiscoveryConfig,

    #[serde(default)]
    pub connection_mode: ConnectionMode,

    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
}

fn default_connection_timeout_ms() -> u64 {
    DEFAULT_CONNECTION_TIMEOUT_MS
}

impl Default for RedisWorkerConfig {
    fn default() -> Self {
        Self {
            connection: None,
            discovery: DiscoveryConfig::default(),
            connection_mode: ConnectionMode::default(),
            connection_timeout_ms: DEFAULT_CONNECTION_TIMEOUT_MS,
        }
    }
}

impl RedisWorkerConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscoveryConfig {
    /// Bus function listing the environment's generic connections.
    #[serde(default)]
    pub function: Option<String>,

    #[serde(default = "default_store_type")]
    pub store_type: String,

    #[serde(default = "default_env_var")]
    pub env_var: String,

    #[serde(default = "default_label")]
    pub label: String,
}

fn default_store_type() -> String {
    DEFAULT_STORE_TYPE.to_string()
}

fn default_env_var() -> String {
    DEFAULT_BINDINGS_ENV_VAR.to_string()
}

fn default_label() -> String {
    DEFAULT_BINDINGS_LABEL.to_string()
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            function: None,
            store_type: default_store_type(),
            env_var: default_env_var(),
            label: default_label(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionMode {
    /// One multiplexed connection for the worker's lifetime.
    #[default]
    Shared,
    /// Resolve and connect again for every command.
    PerCall,
}

/// Where the store lives.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConnectionDescriptor {
    #[serde(alias = "host")]
    pub hostname: String,
    #[serde(deserialize_with = "deserialize_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ConnectionDescriptor {
    pub fn connection_info(&self) -> redis::ConnectionInfo {
        redis::ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp(self.hostname.clone(), self.port),
            redis: redis::RedisConnectionInfo {
                password: self.password.clone().filter(|p| !p.is_empty()),
                ..Default::default()
            },
        }
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hostname, self.port)
    }
}

// Keeps the password out of logs.
impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Service bindings report ports as numbers or as strings.
pub(super) fn deserialize_port<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(port) => Ok(port),
        Port::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid port: {:?}", text))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config: RedisWorkerConfig = serde_json::from_value(json!({})).unwrap();
        assert!(config.connection.is_none());
        assert_eq!(config.connection_mode, ConnectionMode::Shared);
        assert_eq!(config.connection_timeout(), Duration::from_secs(5));
        assert_eq!(config.discovery.store_type, "redis");
        assert_eq!(config.discovery.env_var, "VCAP_SERVICES");
        assert_eq!(config.discovery.label, "p-redis");
        assert!(config.discovery.function.is_none());
    }

    #[test]
    fn test_full_config() {
        let config: RedisWorkerConfig = serde_json::from_value(json!({
            "connection": { "hostname": "cache.internal", "port": "6380", "password": "s3cret" },
            "discovery": { "function": "env.list-generic-connections", "store_type": "cache" },
            "connection_mode": "per_call",
            "connection_timeout_ms": 250
        }))
        .unwrap();

        let connection = config.connection.unwrap();
        assert_eq!(connection.hostname, "cache.internal");
        assert_eq!(connection.port, 6380);
        assert_eq!(connection.password.as_deref(), Some("s3cret"));
        assert_eq!(config.connection_mode, ConnectionMode::PerCall);
        assert_eq!(config.connection_timeout_ms, 250);
        assert_eq!(
            config.discovery.function.as_deref(),
            Some("env.list-generic-connections")
        );
        assert_eq!(config.discovery.store_type, "cache");
        assert_eq!(config.discovery.label, "p-redis");
    }

    #[test]
    fn test_rejects_unknown_fields() {
        assert!(serde_json::from_value::<RedisWorkerConfig>(json!({"hostname": "x"})).is_err());
        assert!(
            serde_json::from_value::<RedisWorkerConfig>(json!({"connection_mode": "pooled"})).is_err()
        );
    }

    #[test]
    fn test_descriptor_host_alias_and_bad_port() {
        let descriptor: ConnectionDescriptor =
            serde_json::from_value(json!({"host": "10.0.0.1", "port": 6379})).unwrap();
        assert_eq!(descriptor.hostname, "10.0.0.1");
        assert!(descriptor.password.is_none());

        assert!(
            serde_json::from_value::<ConnectionDescriptor>(json!({"host": "h", "port": "abc"})).is_err()
        );
        assert!(
            serde_json::from_value::<ConnectionDescriptor>(json!({"host": "h", "port": 70000})).is_err()
        );
    }

    #[test]
    fn test_descriptor_display_hides_password() {
        let descriptor = ConnectionDescriptor {
            hostname: "localhost".into(),
            port: 6379,
            password: Some("hunter2".into()),
        };
        assert_eq!(descriptor.to_string(), "localhost:6379");
        assert!(!format!("{:?}", descriptor).contains("hunter2"));
    }

    #[test]
    fn test_connection_info_empty_password_is_none() {
        let descriptor = ConnectionDescriptor {
            hostname: "localhost".into(),
            port: 6379,
            password: Some(String::new()),
        };
        let info = descriptor.connection_info();
        assert!(info.redis.password.is_none());
        assert!(matches!(
            info.addr,
            redis::ConnectionAddr::Tcp(ref host, 6379) if host == "localhost"
        ));
    }
}
