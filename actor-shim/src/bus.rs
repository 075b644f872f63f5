//! Development message bus.
//!
//! A minimal TCP pub/sub broker speaking newline-delimited JSON
//! [`TransportMessage`] frames. Clients register MQTT-style topic filters
//! with `#subscribe:<filter>` control lines; published frames are delivered
//! to every client with a matching filter, including the publisher. Meant
//! for demos and integration tests, not production traffic.

use std::collections::HashMap;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::Actor;
use crate::constants::SUBSCRIBE_COMMAND_PREFIX;
use crate::topic::filter_matches;
use crate::types::TransportMessage;

/// Requests handled by the bus actor.
enum BusRequest {
    Connect {
        client_id: usize,
        tx: mpsc::UnboundedSender<String>,
    },
    Subscribe {
        client_id: usize,
        filter: String,
    },
    Publish {
        client_id: usize,
        frame: String,
    },
    Disconnect {
        client_id: usize,
    },
}

struct BusClient {
    tx: mpsc::UnboundedSender<String>,
    filters: Vec<String>,
}

/// Actor owning all subscription state; every connection handler feeds it.
struct BusActor {
    request_rx: mpsc::UnboundedReceiver<BusRequest>,
    clients: HashMap<usize, BusClient>,
}

impl Actor for BusActor {
    async fn run(mut self) {
        while let Some(request) = self.request_rx.recv().await {
            match request {
                BusRequest::Connect { client_id, tx } => {
                    self.clients.insert(
                        client_id,
                        BusClient {
                            tx,
                            filters: Vec::new(),
                        },
                    );
                }
                BusRequest::Subscribe { client_id, filter } => {
                    if let Some(client) = self.clients.get_mut(&client_id) {
                        info!(client_id, %filter, "bus subscription registered");
                        client.filters.push(filter);
                    }
                }
                BusRequest::Publish { client_id, frame } => {
                    self.broadcast(client_id, &frame);
                }
                BusRequest::Disconnect { client_id } => {
                    self.clients.remove(&client_id);
                }
            }
        }
        info!("bus actor stopped");
    }
}

impl BusActor {
    fn broadcast(&mut self, from_client_id: usize, frame: &str) {
        let message: TransportMessage = match serde_json::from_str(frame) {
            Ok(message) => message,
            Err(e) => {
                warn!(from_client_id, "dropping unparseable frame: {e}");
                return;
            }
        };

        self.clients.retain(|client_id, client| {
            let subscribed = client
                .filters
                .iter()
                .any(|filter| filter_matches(filter, &message.topic));
            if !subscribed {
                return true;
            }
            match client.tx.send(frame.to_string()) {
                Ok(()) => true,
                Err(_) => {
                    info!(client_id, "dropping disconnected bus client");
                    false
                }
            }
        });
    }
}

/// Bind and serve the bus until the process exits.
pub async fn run_bus(bind: &str, port: u16) -> Result<()> {
    let listener = TcpListener::bind((bind, port))
        .await
        .with_context(|| format!("failed to bind bus on {bind}:{port}"))?;
    info!("message bus listening on {}", listener.local_addr()?);
    serve(listener).await
}

/// Serve the bus on an already-bound listener.
pub async fn serve(listener: TcpListener) -> Result<()> {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    BusActor {
        request_rx,
        clients: HashMap::new(),
    }
    .spawn();

    let mut next_client_id = 0usize;
    loop {
        let (stream, peer) = listener.accept().await.context("bus accept failed")?;
        next_client_id += 1;
        let client_id = next_client_id;
        info!(client_id, %peer, "bus client connected");
        tokio::spawn(handle_client(client_id, stream, request_tx.clone()));
    }
}

/// One connection: reads frames and control lines from the client, writes
/// broadcast frames back.
async fn handle_client(
    client_id: usize,
    mut stream: TcpStream,
    request_tx: mpsc::UnboundedSender<BusRequest>,
) {
    let (reader, mut writer) = stream.split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    let (client_tx, mut client_rx) = mpsc::unbounded_channel::<String>();
    if request_tx
        .send(BusRequest::Connect {
            client_id,
            tx: client_tx,
        })
        .is_err()
    {
        error!(client_id, "bus actor unavailable");
        return;
    }

    loop {
        tokio::select! {
            result = reader.read_line(&mut line) => {
                match result {
                    Ok(0) => {
                        info!(client_id, "bus client disconnected (EOF)");
                        break;
                    }
                    Ok(_) => {
                        let frame = line.trim().to_string();
                        if !frame.is_empty() {
                            let request = match frame.strip_prefix(SUBSCRIBE_COMMAND_PREFIX) {
                                Some(filter) => BusRequest::Subscribe {
                                    client_id,
                                    filter: filter.to_string(),
                                },
                                None => BusRequest::Publish { client_id, frame },
                            };
                            if request_tx.send(request).is_err() {
                                break;
                            }
                        }
                        line.clear();
                    }
                    Err(e) => {
                        error!(client_id, "error reading from bus client: {e}");
                        break;
                    }
                }
            }

            result = client_rx.recv() => {
                match result {
                    Some(frame) => {
                        let frame = format!("{frame}\n");
                        if let Err(e) = writer.write_all(frame.as_bytes()).await {
                            error!(client_id, "failed to write to bus client: {e}");
                            break;
                        }
                        if let Err(e) = writer.flush().await {
                            error!(client_id, "failed to flush to bus client: {e}");
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    let _ = request_tx.send(BusRequest::Disconnect { client_id });
}
