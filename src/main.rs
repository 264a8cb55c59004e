use tokio;

use tzindex::config::Config;
use tzindex::core::decoding::JsonDecoder;
use tzindex::core::tracking::Coordinator;
use tzindex::core::tracking::NodeSource;
use tzindex::core::Node;
use tzindex::engine::Engine;
use tzindex::monitor::Monitor;
use tzindex::store::PgStore;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<(), String> {
    let config = Config::from_env().map_err(|e| e.to_string())?;

    // Configure tracing subscriber
    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_max_level(tracing::Level::INFO)
        .with_env_filter(config.log.as_str())
        .finish();

    let _guard = tracing::subscriber::set_global_default(subscriber);

    tracing::info!("starting tzindex v{VERSION}");
    if cfg!(feature = "test-utilities") {
        tracing::warn!("build includes test-utilities, use cargo's `--no-default-features` flag");
    } else {
        tracing::debug!("compiled without test-utilities");
    }

    let mut monitor = Monitor::new(config.monitor_port);
    let monitor_tx = monitor.sender();
    tokio::spawn(async move {
        monitor.start().await;
    });

    tracing::info!("configuring coordinator");
    let store = PgStore::new(&config.postgres)
        .await
        .map_err(|e| e.to_string())?;
    let engine = Engine::new(store, config.constants.clone())
        .await
        .map_err(|e| e.to_string())?;
    let source = NodeSource::new(Node::new("local-node", &config.node_url), JsonDecoder::new());
    let mut coordinator =
        Coordinator::new(engine, source, config.tracking.clone()).with_monitor(monitor_tx);

    tokio::select! {
        e = coordinator.run() => {
            tracing::error!("coordinator stopped: {e}");
            Err(e.to_string())
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("exiting");
            Ok(())
        }
    }
}
