//! Discuss room coordinator.
//!
//! Run with: cargo run --bin discuss-server
//!
//! Environment:
//!   DISCUSS_HTTP_ADDR     bind address (default 0.0.0.0:5000)
//!   PORT                  shorthand for 0.0.0.0:$PORT
//!   DISCUSS_CORS_ORIGINS  comma-separated allowed origins (default: any)
//!   RUST_LOG              log filter (default: info)

use discuss_server::Server;
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let http_addr = std::env::var("DISCUSS_HTTP_ADDR")
        .ok()
        .or_else(|| std::env::var("PORT").ok().map(|port| format!("0.0.0.0:{port}")));

    let mut builder = Server::builder();
    if let Some(addr) = http_addr {
        builder = builder.http_addr(addr);
    }
    if let Ok(origins) = std::env::var("DISCUSS_CORS_ORIGINS") {
        builder = builder.cors_origins(
            origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty()),
        );
    }

    let server = builder.build()?;

    println!("Starting Discuss coordinator on {}", server.config().http_addr);
    println!("  WS:   ws://{}/ws", server.config().http_addr);
    println!("  GET  /rooms   - List rooms");
    println!("  POST /rooms   - Create room");
    println!("  GET  /health  - Health check");

    server.run().await?;

    Ok(())
}
