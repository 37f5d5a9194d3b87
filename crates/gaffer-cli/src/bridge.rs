//! The HMR notification bridge.
//!
//! Build hashes reach the running server over one TCP channel at a time.
//! Every (re)start of the supervised server opens a fresh channel shortly
//! after the process comes up; the previous channel is closed before the new
//! one is stored, so a hash is never written to a server that was replaced.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use gaffer_config::HmrSettings;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::supervisor::SupervisorEvent;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write to HMR channel: {0}")]
    Write(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// One TCP connection to the server's HMR listener.
#[derive(Debug)]
pub struct HmrChannel {
    remote_host: String,
    remote_port: u16,
    state: ConnectionState,
    last_hash_sent: Option<String>,
    writer: Option<OwnedWriteHalf>,
    reader: Option<JoinHandle<()>>,
}

impl HmrChannel {
    /// A channel that never connected. `send` on it does nothing.
    pub fn disconnected(host: impl Into<String>, port: u16) -> Self {
        Self {
            remote_host: host.into(),
            remote_port: port,
            state: ConnectionState::Disconnected,
            last_hash_sent: None,
            writer: None,
            reader: None,
        }
    }

    pub async fn connect(host: &str, port: u16) -> Result<Self, ChannelError> {
        let mut channel = Self::disconnected(host, port);
        channel.state = ConnectionState::Connecting;

        let addr = channel.addr();
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| ChannelError::Connect {
                addr: addr.clone(),
                source,
            })?;

        let (read, write) = stream.into_split();
        channel.reader = Some(tokio::spawn(log_inbound(read, addr)));
        channel.writer = Some(write);
        channel.state = ConnectionState::Connected;
        Ok(channel)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.remote_host, self.remote_port)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn last_hash_sent(&self) -> Option<&str> {
        self.last_hash_sent.as_deref()
    }

    /// Write `hash` as one frame. Does nothing unless connected.
    ///
    /// A failed write leaves the channel `Disconnected`.
    pub async fn send(&mut self, hash: &str) -> Result<(), ChannelError> {
        if self.state != ConnectionState::Connected {
            return Ok(());
        }
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };

        let frame = format!("{hash}\n");
        let written = match writer.write_all(frame.as_bytes()).await {
            Ok(()) => writer.flush().await,
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            self.close().await;
            return Err(ChannelError::Write(err));
        }

        self.last_hash_sent = Some(hash.to_string());
        Ok(())
    }

    /// Stop the inbound reader and shut the write half down.
    pub async fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.shutdown().await;
        }
        self.state = ConnectionState::Disconnected;
    }

    fn status(&self) -> ChannelStatus {
        ChannelStatus {
            addr: self.addr(),
            state: self.state,
            last_hash_sent: self.last_hash_sent.clone(),
        }
    }
}

/// Whatever the server writes back is only logged.
async fn log_inbound(read: OwnedReadHalf, addr: String) {
    let mut lines = BufReader::new(read).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => tracing::info!(%addr, data = %line, "hmr channel"),
            Ok(None) => {
                tracing::debug!(%addr, "hmr channel closed by peer");
                break;
            }
            Err(err) => {
                tracing::debug!(%addr, error = %err, "hmr channel read failed");
                break;
            }
        }
    }
}

/// A snapshot of the current channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStatus {
    pub addr: String,
    pub state: ConnectionState,
    pub last_hash_sent: Option<String>,
}

/// Owns the single channel slot.
pub struct NotificationBridge {
    host: String,
    port: u16,
    connect_delay: Duration,
    slot: tokio::sync::Mutex<Option<HmrChannel>>,
    staged: parking_lot::Mutex<Option<String>>,
}

impl NotificationBridge {
    pub fn new(host: impl Into<String>, port: u16, connect_delay: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            connect_delay,
            slot: tokio::sync::Mutex::new(None),
            staged: parking_lot::Mutex::new(None),
        }
    }

    pub fn from_settings(settings: &HmrSettings) -> Self {
        Self::new(
            settings.host.clone(),
            settings.port,
            Duration::from_millis(settings.connect_delay_ms),
        )
    }

    /// Remember `hash` for the channel opened after the next start.
    pub fn stage(&self, hash: impl Into<String>) {
        *self.staged.lock() = Some(hash.into());
    }

    pub fn staged(&self) -> Option<String> {
        self.staged.lock().clone()
    }

    /// Close and drop the current channel.
    pub async fn release(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(mut channel) = slot.take() {
            channel.close().await;
        }
    }

    /// Replace the channel after the server (re)started.
    ///
    /// Connection failures are logged and leave a disconnected channel in
    /// the slot. Once connected, the staged hash is pushed.
    pub async fn bridge_after_start(&self) {
        self.release().await;
        tokio::time::sleep(self.connect_delay).await;

        let channel = match HmrChannel::connect(&self.host, self.port).await {
            Ok(channel) => {
                tracing::info!(addr = %channel.addr(), "hmr channel connected");
                channel
            }
            Err(err) => {
                tracing::warn!(error = %err, "hmr channel unavailable");
                HmrChannel::disconnected(self.host.clone(), self.port)
            }
        };

        let mut slot = self.slot.lock().await;
        if let Some(mut previous) = slot.take() {
            previous.close().await;
        }
        let channel = slot.insert(channel);

        let staged = self.staged.lock().clone();
        if let Some(hash) = staged {
            send_logged(channel, &hash).await;
        }
    }

    /// Write `hash` to the current channel. Returns false when nothing was
    /// written.
    pub async fn push(&self, hash: &str) -> bool {
        let mut slot = self.slot.lock().await;
        match slot.as_mut() {
            Some(channel) if channel.state() == ConnectionState::Connected => {
                send_logged(channel, hash).await
            }
            _ => {
                tracing::debug!(hash, "no hmr channel, hash not sent");
                false
            }
        }
    }

    pub async fn current(&self) -> Option<ChannelStatus> {
        self.slot.lock().await.as_ref().map(HmrChannel::status)
    }

    /// Open a new channel every time the server starts.
    ///
    /// The task ends when the event stream closes, releasing the channel.
    pub fn attach(self: Arc<Self>, mut events: broadcast::Receiver<SupervisorEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(SupervisorEvent::Started { generation, .. }) => {
                        tracing::debug!(generation, "bridging after start");
                        self.bridge_after_start().await;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "missed supervisor events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            self.release().await;
        })
    }
}

async fn send_logged(channel: &mut HmrChannel, hash: &str) -> bool {
    match channel.send(hash).await {
        Ok(()) => channel.state() == ConnectionState::Connected,
        Err(err) => {
            tracing::warn!(addr = %channel.addr(), error = %err, "hmr push failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn send_on_disconnected_channel_is_a_noop() {
        let mut channel = HmrChannel::disconnected("localhost", 1);
        channel.send("abc").await.unwrap();
        assert_eq!(channel.state(), ConnectionState::Disconnected);
        assert_eq!(channel.last_hash_sent(), None);
    }

    #[tokio::test]
    async fn connected_channel_writes_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut channel = HmrChannel::connect("127.0.0.1", port).await.unwrap();
        let (socket, _) = listener.accept().await.unwrap();

        channel.send("abc123").await.unwrap();
        assert_eq!(channel.last_hash_sent(), Some("abc123"));

        let mut lines = BufReader::new(socket).lines();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("abc123"));

        channel.close().await;
        assert_eq!(channel.state(), ConnectionState::Disconnected);
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn connect_failure_names_the_address() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = HmrChannel::connect("127.0.0.1", port).await.unwrap_err();
        assert!(err.to_string().contains(&format!("127.0.0.1:{port}")));
    }

    #[tokio::test]
    async fn staged_hash_is_kept() {
        let bridge = NotificationBridge::new("127.0.0.1", 1, Duration::ZERO);
        assert_eq!(bridge.staged(), None);
        bridge.stage("one");
        bridge.stage("two");
        assert_eq!(bridge.staged().as_deref(), Some("two"));
        assert!(bridge.current().await.is_none());
    }
}
