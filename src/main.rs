use clap::Parser;
use redis_worker::{EngineBuilder, logging};

#[derive(Parser, Debug)]
#[command(name = "redis-worker", about = "Redis commands exposed as engine functions")]
struct Args {
    #[arg(short, long, default_value = "config.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_log();
    let args = Args::parse();

    let running = EngineBuilder::new()
        .config_file_or_default(&args.config)?
        .build()
        .await?;

    tracing::info!(modules = ?running.module_names(), "redis-worker ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    running.shutdown().await
}
