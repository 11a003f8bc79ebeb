//! Dashboard core demo entry point.
//!
//! Runs the full pipeline against the in-process store with a simulated
//! device feed: a sync session streams and normalizes records while a
//! heartbeat command is dispatched through the command path.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use processors::ProcessorRegistry;
use serde_json::{json, Map, Value};
use store::MemoryStore;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use types::{ConnectionState, DeviceId, MessageTab};

use fieldops_dashboard::{
    CommandDispatcher, CommandValue, DashboardConfig, DeviceMessageSync, SyncConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Device to observe
    #[arg(short, long, default_value = "demo-device-001")]
    device: String,

    /// Item limit for the sync buffer
    #[arg(short, long, default_value_t = 20)]
    limit: usize,

    /// Processor id (omit for the registry default)
    #[arg(short, long)]
    processor: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fieldops_dashboard=info,store=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => DashboardConfig::from_file(path)?,
        None => DashboardConfig::default(),
    };
    info!("Starting FieldOps dashboard core demo");
    info!("Configuration loaded: {:?}", config);

    let store = MemoryStore::new(config.store_root.clone());
    let registry = Arc::new(ProcessorRegistry::with_builtin()?);
    let device = DeviceId::new(args.device)?;

    let sync = DeviceMessageSync::start(
        Arc::new(store.clone()),
        registry.clone(),
        SyncConfig {
            device: device.clone(),
            tab: config.default_tab,
            data_limit: args.limit.max(1),
            processor_id: args.processor.or(config.default_processor),
        },
    )?;

    let dispatcher = CommandDispatcher::with_builtin(Arc::new(store.clone()));

    store.set_connection(ConnectionState::Connected);
    spawn_simulated_feed(store.clone(), device.clone(), config.default_tab);

    match dispatcher
        .dispatch(&device, "setHeartbeatInterval", CommandValue::Int(60))
        .await
    {
        Ok(()) => info!(
            value = ?store.command_value(&device, "setHeartbeatInterval"),
            "heartbeat interval command written"
        ),
        Err(e) => warn!(error = %e, "heartbeat interval command failed"),
    }

    let mut updates = sync.watch_updates();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow().clone();
                info!(
                    messages = snapshot.entries.len(),
                    rejected = snapshot.entries.iter().filter(|e| e.is_rejected()).count(),
                    connection = ?snapshot.connection,
                    loading = snapshot.loading,
                    error = ?snapshot.error,
                    "sync snapshot updated"
                );
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    sync.stop();
    Ok(())
}

fn spawn_simulated_feed(store: MemoryStore, device: DeviceId, tab: MessageTab) {
    tokio::spawn(async move {
        let mut n = 0u32;
        loop {
            let mut fields = Map::new();
            fields.insert("body".to_string(), json!(format!("telemetry report {}", n)));
            fields.insert("phone".to_string(), json!("+15550001111"));
            fields.insert(
                "timestamp".to_string(),
                Value::from(now_millis()),
            );
            store.push_record(&device, tab, fields);
            n += 1;
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    });
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
