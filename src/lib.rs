pub mod engine;
pub mod function;
pub mod logging;
pub mod protocol;
pub mod trigger;

pub mod modules {
    pub mod config;
    pub mod module;
    pub mod redis_worker;
}

// Re-export commonly used types
pub use modules::{
    config::{EngineBuilder, EngineConfig, RunningEngine},
    module::Module,
    redis_worker::{RedisWorkerConfig, RedisWorkerError, RedisWorkerModule},
};
