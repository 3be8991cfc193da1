//! End-to-end tests against a live Redis.
//!
//! Set `REDIS_URL` to point at a server (default `redis://127.0.0.1:6379`).
//! Every test is skipped when no server answers.

use std::{sync::Arc, time::Duration};

use redis::{ConnectionAddr, IntoConnectionInfo};
use redis_worker::{
    EngineBuilder, EngineConfig, RunningEngine,
    engine::{Engine, EngineTrait, Handler, RegisterFunctionRequest},
    function::FunctionResult,
    modules::config::{ModuleEntry, REDIS_WORKER_MODULE},
    trigger::Trigger,
};
use serde_json::{Value, json};
use tokio::{sync::mpsc, time::timeout};
use uuid::Uuid;

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

fn worker_config(mode: &str) -> Option<EngineConfig> {
    let info = redis_url().as_str().into_connection_info().ok()?;
    let ConnectionAddr::Tcp(hostname, port) = info.addr else {
        return None;
    };

    Some(EngineConfig {
        modules: vec![ModuleEntry {
            class: REDIS_WORKER_MODULE.to_string(),
            config: Some(json!({
                "connection": {
                    "hostname": hostname,
                    "port": port,
                    "password": info.redis.password,
                },
                "connection_mode": mode,
                "connection_timeout_ms": 1000,
            })),
        }],
    })
}

async fn start_worker_with_mode(mode: &str) -> Option<RunningEngine> {
    let config = worker_config(mode)?;
    match EngineBuilder::new().config(config).build().await {
        Ok(running) => Some(running),
        Err(e) => {
            eprintln!("Skipping test: Redis not available at {}: {}", redis_url(), e);
            None
        }
    }
}

async fn start_worker() -> Option<RunningEngine> {
    start_worker_with_mode("shared").await
}

fn unique(prefix: &str) -> String {
    format!("redis-worker-test.{}.{}", prefix, Uuid::new_v4())
}

async fn call(engine: &Engine, op: &str, input: Value) -> Option<Value> {
    engine
        .call(&format!("redis-worker.{}", op), input)
        .await
        .unwrap_or_else(|err| panic!("redis-worker.{} failed: {}", op, err))
}

/// Registers a function that forwards everything it receives to a channel
/// and binds it to `event`.
fn listen(engine: &Engine, event: &str) -> mpsc::UnboundedReceiver<Value> {
    let (tx, rx) = mpsc::unbounded_channel();
    let function_id = format!("test.listener.{}", Uuid::new_v4());

    engine.register_function_handler(
        RegisterFunctionRequest {
            function_id: function_id.clone(),
            description: None,
            request_format: None,
            response_format: None,
        },
        Handler::new(move |input: Value| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(input);
                FunctionResult::NoResult
            }
        }),
    );

    engine.register_trigger(Trigger {
        id: function_id.clone(),
        event: event.to_string(),
        function_id,
    });

    rx
}

#[tokio::test]
async fn test_set_then_get_returns_structure() {
    let Some(running) = start_worker().await else {
        return;
    };
    let engine = running.engine.clone();
    let key = unique("get");

    call(&engine, "set", json!({"key": key, "value": {"some": "data"}})).await;
    assert_eq!(call(&engine, "get", json!(key)).await, Some(json!({"some": "data"})));
    assert_eq!(call(&engine, "get", json!({"key": key})).await, Some(json!({"some": "data"})));

    call(&engine, "del", json!(key)).await;
    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_set_then_del_then_get_is_null() {
    let Some(running) = start_worker().await else {
        return;
    };
    let engine = running.engine.clone();
    let key = unique("del");

    call(&engine, "set", json!({"key": key, "value": {"some": "data"}})).await;
    assert_eq!(call(&engine, "del", json!(key)).await, Some(json!(1)));
    assert_eq!(call(&engine, "get", json!(key)).await, None);

    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_set_with_expiry_sets_ttl() {
    let Some(running) = start_worker().await else {
        return;
    };
    let engine = running.engine.clone();
    let key = unique("ttl");

    call(&engine, "set", json!({"key": key, "value": "short-lived", "expiresInSeconds": 1})).await;
    assert_eq!(call(&engine, "get", json!(key)).await, Some(json!("short-lived")));

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(call(&engine, "get", json!(key)).await, None);

    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_fire_and_forget_set() {
    let Some(running) = start_worker().await else {
        return;
    };
    let engine = running.engine.clone();
    let key = unique("notify");

    engine.notify("redis-worker.set", json!({"key": key, "value": [1, 2, 3]}));

    let mut stored = None;
    for _ in 0..50 {
        stored = call(&engine, "get", json!(key)).await;
        if stored.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(stored, Some(json!([1, 2, 3])));

    call(&engine, "del", json!(key)).await;
    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_del_pattern_removes_matching_keys() {
    let Some(running) = start_worker().await else {
        return;
    };
    let engine = running.engine.clone();
    let prefix = unique("pattern");
    let pattern = format!("{}.*", prefix);

    call(&engine, "set", json!({"key": format!("{}.a", prefix), "value": 1})).await;
    call(&engine, "set", json!({"key": format!("{}.b", prefix), "value": 2})).await;

    let keys = call(&engine, "keys", json!(pattern)).await.unwrap();
    assert_eq!(keys.as_array().map(Vec::len), Some(2));

    assert_eq!(call(&engine, "del-pattern", json!(pattern)).await, None);
    assert_eq!(call(&engine, "keys", json!({"pattern": pattern})).await, Some(json!([])));

    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_push_then_blocking_pop() {
    let Some(running) = start_worker().await else {
        return;
    };
    let engine = running.engine.clone();
    let list = unique("list");

    call(&engine, "rpush", json!({"key": list, "value": {"job": 7}})).await;
    assert_eq!(
        call(&engine, "blpop", json!(list)).await,
        Some(json!({"list": list, "value": {"job": 7}}))
    );

    call(&engine, "lpush", json!({"key": list, "value": "tail"})).await;
    assert_eq!(
        call(&engine, "brpop", json!({"key": [list.clone()], "timeoutInSeconds": 1})).await,
        Some(json!({"list": list, "value": "tail"}))
    );

    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_blocking_pop_times_out_with_nulls() {
    let Some(running) = start_worker().await else {
        return;
    };
    let engine = running.engine.clone();
    let empty = unique("empty");

    let started = std::time::Instant::now();
    let reply = call(&engine, "blpop", json!({"key": empty, "timeoutInSeconds": 1})).await;
    assert_eq!(reply, Some(json!({"list": null, "value": null})));
    assert!(started.elapsed() >= Duration::from_millis(900));

    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_blocking_pop_does_not_block_other_commands() {
    let Some(running) = start_worker().await else {
        return;
    };
    let engine = running.engine.clone();
    let list = unique("parked");
    let key = unique("meanwhile");

    let waiter = {
        let engine = engine.clone();
        let list = list.clone();
        tokio::spawn(async move {
            engine
                .call("redis-worker.blpop", json!({"key": list, "timeoutInSeconds": 5}))
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    let quick = timeout(
        Duration::from_secs(1),
        call(&engine, "set", json!({"key": key, "value": "ok"})),
    )
    .await;
    assert!(quick.is_ok(), "set was blocked behind blpop");

    call(&engine, "rpush", json!({"key": list, "value": "wake"})).await;
    let popped = waiter.await.unwrap().unwrap();
    assert_eq!(popped, Some(json!({"list": list, "value": "wake"})));

    call(&engine, "del", json!(key)).await;
    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_releases_pending_blocking_pop() {
    let Some(running) = start_worker().await else {
        return;
    };
    let engine = running.engine.clone();
    let list = unique("forever");

    let waiter = {
        let engine = engine.clone();
        let list = list.clone();
        tokio::spawn(async move {
            engine
                .call("redis-worker.blpop", json!({"key": list, "timeoutInSeconds": 0}))
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!waiter.is_finished());

    running.shutdown().await.unwrap();

    let err = timeout(Duration::from_secs(2), waiter)
        .await
        .expect("blpop still waiting after shutdown")
        .unwrap()
        .unwrap_err();
    assert_eq!(err.code, "connection_error");
}

#[tokio::test]
async fn test_set_with_zero_expiry_is_rejected() {
    let Some(running) = start_worker().await else {
        return;
    };
    let engine = running.engine.clone();
    let key = unique("zero-ttl");

    let err = engine
        .call("redis-worker.set", json!({"key": key, "value": "v", "expiresInSeconds": 0}))
        .await
        .unwrap_err();
    assert_eq!(err.code, "invalid_input");
    assert_eq!(call(&engine, "get", json!(key)).await, None);

    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_hash_and_set_commands() {
    let Some(running) = start_worker().await else {
        return;
    };
    let engine = running.engine.clone();
    let hash = unique("hash");
    let set = unique("set");

    assert_eq!(
        call(&engine, "hmset", json!({"key": hash, "value": {"name": "ada", "age": 36}})).await,
        Some(json!("OK"))
    );
    assert_eq!(
        call(&engine, "hgetall", json!(hash)).await,
        Some(json!({"name": "ada", "age": "36"}))
    );
    assert_eq!(call(&engine, "hgetall", json!(unique("missing"))).await, None);

    assert_eq!(call(&engine, "sadd", json!({"key": set, "value": ["a", "b"]})).await, Some(json!(2)));
    assert_eq!(call(&engine, "sadd", json!({"key": set, "value": "a"})).await, Some(json!(0)));
    let mut members: Vec<String> =
        serde_json::from_value(call(&engine, "smembers", json!({"key": set})).await.unwrap()).unwrap();
    members.sort();
    assert_eq!(members, vec!["a", "b"]);
    assert_eq!(call(&engine, "srem", json!({"key": set, "value": "b"})).await, Some(json!(1)));

    call(&engine, "del", json!(hash)).await;
    call(&engine, "del", json!(set)).await;
    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_counter_and_sorted_set_commands() {
    let Some(running) = start_worker().await else {
        return;
    };
    let engine = running.engine.clone();
    let counter = unique("counter");
    let board = unique("board");

    assert_eq!(call(&engine, "incrby", json!({"key": counter, "amount": 5})).await, Some(json!(5)));
    assert_eq!(call(&engine, "incrby", json!({"key": counter, "amount": -2})).await, Some(json!(3)));
    assert_eq!(call(&engine, "get", json!(counter)).await, Some(json!("3")));

    for (member, score) in [("m1", 3.0), ("m2", 1.5), ("m3", 2.0)] {
        call(&engine, "zadd", json!({"key": board, "score": score, "member": member})).await;
    }

    assert_eq!(
        call(&engine, "zrevrange", json!({"key": board, "start": 0, "stop": -1})).await,
        Some(json!(["m1", "m3", "m2"]))
    );
    assert_eq!(
        call(&engine, "zrevrange", json!({"key": board, "start": 0, "stop": 1, "withScores": true}))
            .await,
        Some(json!([{"member": "m1", "score": 3.0}, {"member": "m3", "score": 2.0}]))
    );

    assert_eq!(call(&engine, "zrem", json!({"key": board, "member": "m3"})).await, Some(json!(1)));
    assert_eq!(
        call(&engine, "zremrangebyrank", json!({"key": board, "min": 0, "max": 0})).await,
        Some(json!(1))
    );
    assert_eq!(
        call(&engine, "zrevrange", json!({"key": board, "start": 0, "stop": -1})).await,
        Some(json!(["m1"]))
    );

    call(&engine, "del", json!(counter)).await;
    call(&engine, "del", json!(board)).await;
    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_subscribe_delivers_both_notifications() {
    let Some(running) = start_worker().await else {
        return;
    };
    let engine = running.engine.clone();
    let channel = unique("ch");
    let sanitized: String = channel
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    let mut per_channel = listen(&engine, &format!("redis-worker.message.{}", sanitized));
    let mut generic = listen(&engine, "redis-worker.message");

    assert_eq!(call(&engine, "subscribe", json!(channel)).await, Some(json!([channel])));

    let receivers = call(&engine, "publish", json!({"channel": channel, "value": {"some": "data"}}))
        .await
        .unwrap();
    assert_eq!(receivers, json!(1));

    let value = timeout(Duration::from_secs(2), per_channel.recv()).await.unwrap().unwrap();
    assert_eq!(value, json!({"some": "data"}));

    let message = timeout(Duration::from_secs(2), generic.recv()).await.unwrap().unwrap();
    assert_eq!(message, json!({"channel": channel, "value": {"some": "data"}}));

    assert_eq!(call(&engine, "unsubscribe", json!(channel)).await, Some(json!([])));

    let receivers = call(&engine, "publish", json!({"channel": channel, "value": "late"}))
        .await
        .unwrap();
    assert_eq!(receivers, json!(0));
    assert!(timeout(Duration::from_millis(300), generic.recv()).await.is_err());

    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_subscribe_multiple_channels_then_partial_unsubscribe() {
    let Some(running) = start_worker().await else {
        return;
    };
    let engine = running.engine.clone();
    let a = unique("a");
    let b = unique("b");

    let mut generic = listen(&engine, "redis-worker.message");

    let active = call(&engine, "subscribe", json!(format!("{},{}", a, b))).await.unwrap();
    assert_eq!(active.as_array().map(Vec::len), Some(2));

    let remaining = call(&engine, "unsubscribe", json!([a.clone()])).await;
    assert_eq!(remaining, Some(json!([b])));

    call(&engine, "publish", json!({"channel": b, "value": "null"})).await;
    let message = timeout(Duration::from_secs(2), generic.recv()).await.unwrap().unwrap();
    assert_eq!(message, json!({"channel": b, "value": null}));

    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_per_call_mode_runs_commands() {
    let Some(running) = start_worker_with_mode("per_call").await else {
        return;
    };
    let engine = running.engine.clone();
    let key = unique("per-call");

    call(&engine, "set", json!({"key": key, "value": {"fresh": true}})).await;
    assert_eq!(call(&engine, "get", json!(key)).await, Some(json!({"fresh": true})));
    assert_eq!(call(&engine, "del", json!(key)).await, Some(json!(1)));

    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_decode_error_on_malformed_structure() {
    let Some(running) = start_worker().await else {
        return;
    };
    let engine = running.engine.clone();
    let key = unique("malformed");

    call(&engine, "set", json!({"key": key, "value": "{not json"})).await;
    let err = engine.call("redis-worker.get", json!(key)).await.unwrap_err();
    assert_eq!(err.code, "decode_error");

    call(&engine, "del", json!(key)).await;
    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_wrong_type_is_command_error() {
    let Some(running) = start_worker().await else {
        return;
    };
    let engine: Arc<Engine> = running.engine.clone();
    let key = unique("wrongtype");

    call(&engine, "sadd", json!({"key": key, "value": "x"})).await;
    let err = engine.call("redis-worker.get", json!(key)).await.unwrap_err();
    assert_eq!(err.code, "command_error");

    call(&engine, "del", json!(key)).await;
    running.shutdown().await.unwrap();
}
