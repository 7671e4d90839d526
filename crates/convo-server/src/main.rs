//! # convo-server
//!
//! Real-time core of the Convo chat service.
//!
//! This binary provides:
//! - **Connection registry** tracking which identities are online, with a
//!   presence broadcast on every connect and disconnect
//! - **Message delivery** over HTTP: authorize, persist, then push to the
//!   receiver's live connections
//! - **Typing and call signaling relays** over WebSocket, forwarding
//!   payloads verbatim to the addressed identity
//! - **Attachment storage** on local disk or a remote object store

mod api;
mod attachments;
mod caller;
mod config;
mod error;
mod gateway;
mod pipeline;
mod registry;
mod relay;

use std::sync::Arc;
use std::time::Instant;

use tracing::info;
use tracing_subscriber::EnvFilter;

use convo_store::Store;

use crate::api::AppState;
use crate::attachments::{AttachmentStorage, LocalDiskStorage, ObjectStorage};
use crate::config::ServerConfig;
use crate::pipeline::DeliveryPipeline;
use crate::registry::ConnectionRegistry;
use crate::relay::SignalRelay;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,convo_server=debug,convo_store=debug")),
        )
        .init();

    info!("Starting Convo server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(
        ?config,
        admin_enabled = config.admin_token.is_some(),
        "Loaded configuration"
    );

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let store = Store::open(&config.database_path)?;
    info!(path = %config.database_path.display(), "Store opened");

    let storage: Arc<dyn AttachmentStorage> = match &config.object_storage {
        Some(remote) => {
            info!(endpoint = %remote.upload_url, folder = %remote.folder, "Using object storage for attachments");
            Arc::new(ObjectStorage::new(remote.clone()))
        }
        None => Arc::new(
            LocalDiskStorage::new(config.uploads_dir.clone(), config.uploads_route.clone())
                .await?,
        ),
    };

    let registry = ConnectionRegistry::new();
    let pipeline = DeliveryPipeline::new(
        store.clone(),
        registry.clone(),
        storage,
        config.max_attachment_size,
        config.max_attachments,
    );

    let http_addr = config.http_addr;
    let app_state = AppState {
        store,
        relay: SignalRelay::new(registry.clone()),
        registry,
        pipeline,
        config: Arc::new(config),
        started_at: Instant::now(),
    };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP + WebSocket server until it fails or Ctrl+C arrives
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
