// src/main.rs

use clap::Parser;
use room_chat_server::{
    build_router, config::Config, router::EventRouter, rooms::RoomStore, state::ChatState,
    uploads::UploadStore,
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// The main entry point for our application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();

    // RUST_LOG wins over --log-level.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    let addr = config.bind_addr()?;
    let uploads =
        UploadStore::open(&config.upload_dir, &config.public_url, config.max_upload_bytes).await?;
    let state = ChatState::new(EventRouter::new(RoomStore::default()), uploads);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, upload_dir = %config.upload_dir, "chat server listening");

    axum::serve(listener, app).await?;
    Ok(())
}
