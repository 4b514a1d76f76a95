use anyhow::{Context, Result};
use lookalike_core::config::BusKind;
use lookalike_core::{Config, Pipeline, RecordStore};
use lookalike_hw::Camera;
use lookalike_store::SqliteStore;
use lookaliked::dbus_interface::{LookalikeService, ServiceInfo, BUS_NAME, OBJECT_PATH};
use lookaliked::engine::spawn_engine;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("lookaliked starting");

    let config = Config::load().context("failed to load configuration")?;
    tracing::info!(
        db = %config.db_path.display(),
        camera = %config.camera_device,
        threshold = config.match_threshold,
        capture_timeout_ms = config.capture_timeout_ms,
        "configuration loaded"
    );

    let store = Arc::new(
        SqliteStore::open_with_timeout(&config.db_path, config.busy_timeout_ms)
            .context("failed to open record store")?,
    );

    // Open the camera up front so a missing device fails startup, not the
    // first request.
    let camera = Camera::open(
        &config.camera_device,
        config.capture_width,
        config.capture_height,
    )
    .with_context(|| format!("failed to open camera {}", config.camera_device))?
    .with_capture_timeout(config.capture_timeout())
    .with_warmup_frames(config.warmup_frames);

    let pipeline = Pipeline::new(Arc::clone(&store), camera)
        .with_threshold(config.match_threshold)
        .with_encoding(config.photo_encoding())
        .with_signature_cache(config.signature_cache);
    let engine = spawn_engine(pipeline)?;

    let shared_store: Arc<dyn RecordStore + Send + Sync> = store;
    let service = LookalikeService::new(
        engine,
        shared_store,
        ServiceInfo {
            camera_device: config.camera_device.clone(),
            db_path: config.db_path.display().to_string(),
            match_threshold: config.match_threshold,
        },
    );

    let builder = match config.bus {
        BusKind::Session => zbus::connection::Builder::session()?,
        BusKind::System => zbus::connection::Builder::system()?,
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .context("failed to register on D-Bus")?;

    tracing::info!(bus = ?config.bus, name = BUS_NAME, "lookaliked ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("lookaliked shutting down");

    Ok(())
}
