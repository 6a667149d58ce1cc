//! Chat event server listener
//!
//! Binds the HTTP listener, serves the event routes and tears the fan-out
//! layer down on shutdown.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;

use crate::broadcast::Broadcaster;
use crate::error::Result;
use crate::registry::{RegistryConfig, RoomRegistry};
use crate::server::config::ServerConfig;
use crate::server::routes::build_router;

/// Event-stream server
///
/// Owns the one [`Broadcaster`] of the process. The write path obtains a
/// clone through [`ChatServer::broadcaster`] and publishes after each
/// successful write.
pub struct ChatServer {
    config: ServerConfig,
    broadcaster: Broadcaster,
}

impl ChatServer {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        Self::with_registry_config(config, RegistryConfig::default())
    }

    /// Create a new server with custom registry configuration
    pub fn with_registry_config(config: ServerConfig, registry_config: RegistryConfig) -> Self {
        let registry = Arc::new(RoomRegistry::with_config(registry_config));

        Self {
            config,
            broadcaster: Broadcaster::new(registry),
        }
    }

    /// Get the broadcaster shared with request handlers
    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Get a reference to the room registry
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        self.broadcaster.registry()
    }

    /// Router serving the event endpoints
    ///
    /// Merge it into a larger application to share the port with the write-path routes.
    pub fn router(&self) -> Router {
        build_router(self.broadcaster.clone(), &self.config)
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Run the server
    ///
    /// This method blocks until the server fails.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "Chat event server listening");

        // Spawn cleanup task for room registry
        let cleanup_handle = self.registry().spawn_cleanup_task();

        let broadcaster = self.broadcaster.clone();
        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                shutdown.await;
                tracing::info!("Shutdown signal received");
                // Ends every open event stream so connections can drain
                broadcaster.shutdown();
            })
            .await;

        // Stop cleanup task on shutdown
        cleanup_handle.abort();

        result?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    use super::*;
    use crate::event::ChatEvent;
    use crate::registry::RoomId;

    async fn read_until(socket: &mut TcpStream, buf: &mut Vec<u8>, needle: &str) {
        let read = async {
            let mut chunk = [0u8; 1024];
            while !String::from_utf8_lossy(buf).contains(needle) {
                let n = socket.read(&mut chunk).await.unwrap();
                assert!(n > 0, "connection closed before {:?}", needle);
                buf.extend_from_slice(&chunk[..n]);
            }
        };
        tokio::time::timeout(Duration::from_secs(5), read)
            .await
            .expect("timed out waiting for frame");
    }

    #[test]
    fn test_server_accessors() {
        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let server = ChatServer::new(ServerConfig::with_addr(addr));

        assert_eq!(server.bind_addr(), addr);
        assert_eq!(server.registry().room_count(), 0);
        assert!(!server.broadcaster().is_shut_down());
    }

    #[tokio::test]
    async fn test_serve_stream_and_shutdown() {
        let server = ChatServer::new(ServerConfig::default());
        let broadcaster = server.broadcaster().clone();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let serving = tokio::spawn(async move {
            server
                .serve(listener, async move {
                    let _ = stop_rx.await;
                })
                .await
        });

        let mut socket = TcpStream::connect(addr).await.unwrap();
        socket
            .write_all(b"GET /events?roomId=lobby HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();

        let mut buf = Vec::new();
        read_until(&mut socket, &mut buf, "text/event-stream").await;
        read_until(&mut socket, &mut buf, "data: {\"type\":\"connected\",\"roomId\":\"lobby\"}").await;

        let room = RoomId::new("lobby").unwrap();
        broadcaster.publish(&room, ChatEvent::user_joined(room.clone(), "bob"));
        read_until(&mut socket, &mut buf, "\"type\":\"user-joined\"").await;

        stop_tx.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), serving)
            .await
            .expect("server did not stop")
            .unwrap();
        assert!(result.is_ok());
        assert!(broadcaster.is_shut_down());
        assert_eq!(broadcaster.registry().subscriber_count(), 0);
    }
}
