//! Room session coordinator for small voice/video rooms.
//!
//! Clients discover, create, and join rooms over a WebSocket, then exchange
//! presence, chat, and peer identifiers so the media layer can link them
//! directly. Media itself never reaches this server.

pub mod broadcast;
pub mod builder;
pub mod error;
pub mod relay;
pub mod rest;
pub mod room;
pub mod session;
pub mod validate;
pub mod ws;

#[cfg(test)]
mod testing;

use crate::broadcast::BroadcastRouter;
use crate::rest::AppState;
use crate::room::{CapacityBounds, RoomRegistry};
use crate::session::SessionBinder;
use crate::ws::WsState;
use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use discuss_protocol::{DEFAULT_CAPACITY, MAX_CAPACITY};
use std::sync::Arc;
use std::time::Duration;

pub use builder::ServerBuilder;
pub use error::{CoordinatorError, ServerError};

/// The coordinator server.
pub struct Server {
    config: ServerConfig,
}

/// Configuration for the server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Address to bind HTTP + WebSocket server.
    pub http_addr: String,
    /// Capacity used when a create request omits it.
    pub default_capacity: u32,
    /// Upper bound for room capacity.
    pub max_capacity: u32,
    /// Per-connection outbound queue length.
    pub outbound_buffer: usize,
    /// WebSocket ping interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Drop clients silent for this long.
    pub client_timeout_secs: u64,
    /// Remove rooms nobody joined within this many seconds of creation.
    pub unclaimed_room_timeout_secs: u64,
    /// Allowed CORS origins. Empty allows any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:5000".to_string(),
            default_capacity: DEFAULT_CAPACITY,
            max_capacity: MAX_CAPACITY,
            outbound_buffer: 256,
            heartbeat_interval_secs: 5,
            client_timeout_secs: 30,
            unclaimed_room_timeout_secs: 300, // 5 minutes
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    fn capacity_bounds(&self) -> CapacityBounds {
        CapacityBounds {
            default: self.default_capacity,
            max: self.max_capacity,
        }
    }
}

impl Server {
    /// Create a new server builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Run the server until the HTTP listener stops.
    pub async fn run(self) -> Result<(), ServerError> {
        let config = self.config;
        tracing::info!(addr = %config.http_addr, "server starting");

        let registry = Arc::new(RoomRegistry::new(config.capacity_bounds()));
        let router = Arc::new(BroadcastRouter::new());
        let binder = Arc::new(SessionBinder::new(registry, router));

        let app_state = web::Data::new(AppState {
            binder: Arc::clone(&binder),
        });
        let ws_state = web::Data::new(WsState {
            binder: Arc::clone(&binder),
            outbound_buffer: config.outbound_buffer,
            heartbeat_interval: Duration::from_secs(config.heartbeat_interval_secs),
            client_timeout: Duration::from_secs(config.client_timeout_secs),
        });

        // Spawn unclaimed-room sweeper
        let sweep_binder = Arc::clone(&binder);
        let max_age = Duration::from_secs(config.unclaimed_room_timeout_secs);
        let sweeper = tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(30)).await;
                sweep_binder.sweep_unclaimed(max_age).await;
            }
        });

        let cors_origins = config.cors_origins.clone();
        let result = HttpServer::new(move || {
            App::new()
                .wrap(build_cors(&cors_origins))
                .app_data(app_state.clone())
                .app_data(ws_state.clone())
                .route("/ws", web::get().to(ws::connection_ws))
                .route("/rooms", web::get().to(rest::list_rooms))
                .route("/rooms", web::post().to(rest::create_room))
                .route("/health", web::get().to(rest::health))
        })
        .bind(&config.http_addr)?
        .run()
        .await;

        sweeper.abort();
        result.map_err(|e| ServerError::Http(e.to_string()))
    }
}

fn build_cors(origins: &[String]) -> Cors {
    if origins.is_empty() {
        return Cors::permissive();
    }
    origins
        .iter()
        .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
        .allow_any_method()
        .allow_any_header()
        .max_age(3600)
}
