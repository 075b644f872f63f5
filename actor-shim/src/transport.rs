//! Transport actor bridging the shim to a pub/sub bus over TCP.
//!
//! Frames are newline-delimited JSON [`TransportMessage`] values.
//! Subscriptions are registered with `#subscribe:<filter>` control lines,
//! matching the bus in [`crate::bus`]. The shim itself is transport-agnostic:
//! it only sees the channel pair returned by [`connect`].

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::Actor;
use crate::constants::{SUBSCRIBE_COMMAND_PREFIX, TRANSPORT_CHANNEL_CAPACITY};
use crate::types::TransportMessage;

/// Errors raised by the transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to bus at {address}: {source}")]
    ConnectionFailed {
        address: String,
        source: std::io::Error,
    },

    #[error("failed to register subscription: {0}")]
    SubscribeFailed(#[from] std::io::Error),
}

/// Actor that owns the bus connection: forwards outbound messages onto the
/// socket and delivers inbound frames to the shim.
struct TransportActor {
    stream: TcpStream,
    outbound_rx: mpsc::Receiver<TransportMessage>,
    inbound_tx: mpsc::Sender<TransportMessage>,
}

impl Actor for TransportActor {
    async fn run(mut self) {
        let (read_half, mut write_half) = self.stream.split();
        let mut reader = BufReader::new(read_half);
        let mut line = String::new();

        loop {
            tokio::select! {
                // Frames from the bus, forwarded to the shim.
                result = reader.read_line(&mut line) => {
                    match result {
                        Ok(0) => {
                            info!("bus connection closed");
                            break;
                        }
                        Ok(_) => {
                            let frame = line.trim();
                            if !frame.is_empty() {
                                match serde_json::from_str::<TransportMessage>(frame) {
                                    Ok(message) => {
                                        if self.inbound_tx.send(message).await.is_err() {
                                            info!("inbound channel closed, disconnecting");
                                            break;
                                        }
                                    }
                                    Err(e) => {
                                        warn!("failed to parse frame from bus: {e} - {frame}");
                                    }
                                }
                            }
                            line.clear();
                        }
                        Err(e) => {
                            error!("error reading from bus: {e}");
                            break;
                        }
                    }
                }

                // Messages to publish.
                message = self.outbound_rx.recv() => {
                    match message {
                        Some(message) => {
                            match serde_json::to_string(&message) {
                                Ok(json) => {
                                    let frame = format!("{json}\n");
                                    if let Err(e) = write_half.write_all(frame.as_bytes()).await {
                                        error!("failed to write to bus: {e}");
                                        break;
                                    }
                                }
                                Err(e) => {
                                    error!("failed to serialize frame: {e}");
                                }
                            }
                        }
                        None => {
                            info!("outbound channel closed, disconnecting");
                            break;
                        }
                    }
                }
            }
        }
    }
}

/// Connect to the bus, register `filters`, and spawn the transport actor.
///
/// Returns the sender for outbound publishes and the receiver for delivered
/// messages. A connection failure here is fatal to the caller; there is no
/// reconnection once established.
pub async fn connect(
    address: &str,
    port: u16,
    filters: &[String],
) -> Result<
    (
        mpsc::Sender<TransportMessage>,
        mpsc::Receiver<TransportMessage>,
    ),
    TransportError,
> {
    let mut stream =
        TcpStream::connect((address, port))
            .await
            .map_err(|source| TransportError::ConnectionFailed {
                address: format!("{address}:{port}"),
                source,
            })?;
    info!("connected to bus at {address}:{port}");

    for filter in filters {
        let command = format!("{SUBSCRIBE_COMMAND_PREFIX}{filter}\n");
        stream.write_all(command.as_bytes()).await?;
        info!("subscribed to {filter}");
    }
    stream.flush().await?;

    let (outbound_tx, outbound_rx) = mpsc::channel(TRANSPORT_CHANNEL_CAPACITY);
    let (inbound_tx, inbound_rx) = mpsc::channel(TRANSPORT_CHANNEL_CAPACITY);

    TransportActor {
        stream,
        outbound_rx,
        inbound_tx,
    }
    .spawn();

    Ok((outbound_tx, inbound_rx))
}
