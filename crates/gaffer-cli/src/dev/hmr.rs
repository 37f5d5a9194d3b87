//! The TCP listener backend servers report their build hash to.
//!
//! Frames are newline-terminated hashes. Each one is recorded in the shared
//! state, broadcast to SSE clients and answered with `ack <hash>\n`.

use gaffer_config::HmrSettings;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;

use crate::dev::{ServiceHandle, SharedState};
use crate::error::{CliError, Result};

pub struct HmrListener {
    host: String,
    port: u16,
    state: SharedState,
}

impl HmrListener {
    pub fn new(settings: &HmrSettings, state: SharedState) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            state,
        }
    }

    pub async fn start(self) -> Result<ServiceHandle> {
        let listener = TcpListener::bind((self.host.as_str(), self.port))
            .await
            .map_err(|e| CliError::Server(format!("Failed to bind HMR listener to {}:{}: {}", self.host, self.port, e)))?;
        let addr = listener.local_addr()?;
        tracing::info!(%addr, "hmr listener ready");

        let task = tokio::spawn(accept_loop(listener, self.state));
        Ok(ServiceHandle::new(addr, task))
    }
}

async fn accept_loop(listener: TcpListener, state: SharedState) -> Result<()> {
    // dropped with the loop, which aborts every connection
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (socket, peer) = accepted?;
                tracing::debug!(%peer, "hmr client connected");
                connections.spawn(handle_connection(socket, state.clone()));
            }
            Some(finished) = connections.join_next(), if !connections.is_empty() => {
                if let Err(err) = finished {
                    tracing::debug!(error = %err, "hmr connection task failed");
                }
            }
        }
    }
}

async fn handle_connection(socket: TcpStream, state: SharedState) {
    let (read, mut write) = socket.into_split();
    let mut lines = BufReader::new(read).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                tracing::debug!(error = %err, "hmr read failed");
                break;
            }
        };

        let hash = line.trim();
        if hash.is_empty() {
            continue;
        }

        tracing::info!(hash, "hmr hash received");
        state.record_hash(hash);

        if let Err(err) = write.write_all(format!("ack {hash}\n").as_bytes()).await {
            tracing::debug!(error = %err, "hmr ack failed");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dev::DevServerState;
    use std::path::PathBuf;
    use std::sync::Arc;

    #[tokio::test]
    async fn hashes_are_recorded_and_acknowledged() {
        let state = Arc::new(DevServerState::new(PathBuf::from("out"), ["frontend"]));
        let settings = HmrSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..HmrSettings::default()
        };
        let handle = HmrListener::new(&settings, state.clone()).start().await.unwrap();

        let socket = TcpStream::connect(handle.local_addr()).await.unwrap();
        let (read, mut write) = socket.into_split();
        write.write_all(b"abc123\n\nfff\n").await.unwrap();

        let mut lines = BufReader::new(read).lines();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("ack abc123"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("ack fff"));
        assert_eq!(state.last_hash().as_deref(), Some("fff"));

        handle.stop().await;
    }
}
