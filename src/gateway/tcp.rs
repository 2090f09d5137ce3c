// ABOUTME: Line-delimited JSON transport over TCP, the default concrete gateway.
// ABOUTME: One task per direction bridges the socket to the connection's frame channels.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use super::{ClientFrame, GatewayConnection, GatewayFrame, GatewayTransport};

const CHANNEL_DEPTH: usize = 256;

/// Connects to a gateway speaking newline-delimited JSON frames.
pub struct TcpTransport {
    addr: String,
}

impl TcpTransport {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl GatewayTransport for TcpTransport {
    async fn connect(&self) -> Result<GatewayConnection> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .with_context(|| format!("failed to connect to gateway at {}", self.addr))?;
        let (read_half, mut write_half) = stream.into_split();

        let (frames_tx, frames_rx) = mpsc::channel::<GatewayFrame>(CHANNEL_DEPTH);
        let (sink_tx, mut sink_rx) = mpsc::channel::<ClientFrame>(CHANNEL_DEPTH);

        // Inbound: socket lines -> frames channel. Ends when the socket closes
        // or the session controller drops its receiver.
        tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let frame = match serde_json::from_str::<GatewayFrame>(&line) {
                            Ok(f) => f,
                            Err(e) => {
                                tracing::warn!(error = %e, "dropping malformed gateway frame");
                                continue;
                            }
                        };
                        if frames_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::debug!(error = %e, "gateway socket read failed");
                        break;
                    }
                }
            }
        });

        // Outbound: sink channel -> socket lines. A Close frame ends the task
        // after flushing.
        tokio::spawn(async move {
            while let Some(frame) = sink_rx.recv().await {
                let is_close = matches!(frame, ClientFrame::Close);
                let mut line = match serde_json::to_string(&frame) {
                    Ok(s) => s,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to encode client frame");
                        continue;
                    }
                };
                line.push('\n');
                if let Err(e) = write_half.write_all(line.as_bytes()).await {
                    tracing::debug!(error = %e, "gateway socket write failed");
                    break;
                }
                if is_close {
                    let _ = write_half.shutdown().await;
                    break;
                }
            }
        });

        Ok(GatewayConnection {
            frames: frames_rx,
            sink: sink_tx,
        })
    }
}
