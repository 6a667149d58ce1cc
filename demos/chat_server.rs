//! Chat event server demo
//!
//! Run with: cargo run --example chat_server [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example chat_server                    # binds to 0.0.0.0:3000
//!   cargo run --example chat_server localhost          # binds to 127.0.0.1:3000
//!   cargo run --example chat_server 127.0.0.1:3001     # binds to 127.0.0.1:3001
//!
//! ## Subscribe
//!
//!   curl -N 'http://localhost:3000/events?roomId=lobby'
//!
//! ## Publish
//!
//! Stand-in for the write path: each stdin line `<room> <username> <text>`
//! is treated as a stored message and published to the room.
//!
//!   lobby alice hello there

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use roomcast::{Broadcaster, ChatEvent, ChatMessage, ChatServer, RoomId, ServerConfig};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Parse bind address from command line argument.
///
/// Accepts "localhost", "localhost:PORT", "IP" or "IP:PORT".
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    const DEFAULT_PORT: u16 = 3000;

    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: chat_server [BIND_ADDR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: 0.0.0.0:3000)");
}

/// Reads `<room> <username> <text>` lines and publishes them as messages
async fn stdin_write_path(broadcaster: Broadcaster) {
    let next_id = AtomicU64::new(1);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let mut parts = line.splitn(3, ' ');
        let (Some(room), Some(user), Some(text)) = (parts.next(), parts.next(), parts.next())
        else {
            eprintln!("expected: <room> <username> <text>");
            continue;
        };

        let room_id = match RoomId::new(room) {
            Ok(id) => id,
            Err(e) => {
                eprintln!("{}", e);
                continue;
            }
        };

        let id = format!("m{}", next_id.fetch_add(1, Ordering::Relaxed));
        let message = ChatMessage::new(id, text, user, chrono::Utc::now());
        let outcome = broadcaster.publish(&room_id, ChatEvent::message(room_id.clone(), message));
        tracing::debug!(room = %room_id, ?outcome, "Published from stdin");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let config = match args.get(1) {
        Some(addr_str) => match parse_bind_addr(addr_str) {
            Ok(addr) => ServerConfig::with_addr(addr),
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        },
        None => ServerConfig::default(),
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roomcast=info,chat_server=debug".into()),
        )
        .init();

    println!("Starting chat event server on {}", config.bind_addr);
    println!("Subscribe: curl -N 'http://localhost:{}/events?roomId=lobby'", config.bind_addr.port());
    println!("Publish:   type '<room> <username> <text>' and press enter");

    let server = ChatServer::new(config);
    tokio::spawn(stdin_write_path(server.broadcaster().clone()));

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            println!("\nShutting down...");
        })
        .await?;

    Ok(())
}
