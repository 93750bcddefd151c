#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]
#![allow(
    dead_code,
    reason = "Not every test binary uses every helper"
)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use certstream_client::ws::config::{Config, ReconnectConfig};
use futures_util::{SinkExt as _, StreamExt as _};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

/// How long tests wait for something that should happen.
pub const WAIT: Duration = Duration::from_secs(2);

/// Mock certstream server.
pub struct MockWsServer {
    addr: SocketAddr,
    /// Broadcast frames to ALL connected clients
    frame_tx: broadcast::Sender<Message>,
    /// Receives the sequence number of each completed handshake
    connected_rx: mpsc::UnboundedReceiver<usize>,
    /// Receives the sequence number of each connection once it ends
    disconnected_rx: mpsc::UnboundedReceiver<usize>,
    pings: Arc<AtomicUsize>,
}

impl MockWsServer {
    /// Start a mock server on a random port.
    pub async fn start() -> Self {
        Self::start_refusing(0).await
    }

    /// Start a mock server that drops the first `refused` TCP connections
    /// before the WebSocket handshake.
    pub async fn start_refusing(refused: usize) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (frame_tx, _) = broadcast::channel::<Message>(100);
        let (connected_tx, connected_rx) = mpsc::unbounded_channel();
        let (disconnected_tx, disconnected_rx) = mpsc::unbounded_channel();
        let pings = Arc::new(AtomicUsize::new(0));

        let broadcast_tx = frame_tx.clone();
        let ping_counter = Arc::clone(&pings);

        tokio::spawn(async move {
            let mut accepted = 0_usize;
            let mut connections = 0_usize;

            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };

                accepted += 1;
                if accepted <= refused {
                    drop(stream);
                    continue;
                }

                let Ok(ws_stream) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };

                connections += 1;
                let id = connections;

                let (mut write, mut read) = ws_stream.split();
                let mut frame_rx = broadcast_tx.subscribe();
                let pings = Arc::clone(&ping_counter);
                let disconnected_tx = disconnected_tx.clone();

                drop(connected_tx.send(id));

                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            frame = read.next() => {
                                match frame {
                                    Some(Ok(Message::Ping(_))) => {
                                        pings.fetch_add(1, Ordering::SeqCst);
                                    }
                                    Some(Ok(_)) => {}
                                    _ => break,
                                }
                            }
                            frame = frame_rx.recv() => {
                                match frame {
                                    Ok(frame) => {
                                        let closing = frame.is_close();
                                        if write.send(frame).await.is_err() || closing {
                                            break;
                                        }
                                    }
                                    Err(_) => break,
                                }
                            }
                        }
                    }

                    drop(disconnected_tx.send(id));
                });
            }
        });

        Self {
            addr,
            frame_tx,
            connected_rx,
            disconnected_rx,
            pings,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/", self.addr)
    }

    /// TLS URL for the same listener. The server never speaks TLS, so every
    /// handshake fails.
    pub fn wss_url(&self) -> String {
        format!("wss://{}/", self.addr)
    }

    /// Send a text frame to all connected clients.
    pub fn send(&self, text: &str) {
        drop(self.frame_tx.send(Message::Text(text.to_owned().into())));
    }

    /// Send an arbitrary frame to all connected clients.
    pub fn send_frame(&self, frame: Message) {
        drop(self.frame_tx.send(frame));
    }

    /// Wait for the next client to complete its handshake.
    pub async fn recv_connection(&mut self) -> Option<usize> {
        timeout(WAIT, self.connected_rx.recv()).await.ok().flatten()
    }

    /// Wait for the next connection to end.
    pub async fn recv_disconnect(&mut self) -> Option<usize> {
        timeout(WAIT, self.disconnected_rx.recv())
            .await
            .ok()
            .flatten()
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }
}

/// Configuration with test-friendly timings.
pub fn config(skip_heartbeats: bool) -> Config {
    Config::builder()
        .skip_heartbeats(skip_heartbeats)
        .read_timeout(Duration::from_secs(5))
        .ping_interval(Duration::from_secs(5))
        .reconnect(
            ReconnectConfig::builder()
                .delay(Duration::from_millis(50))
                .build(),
        )
        .build()
}

/// Example payloads modelled on the public certstream feed.
pub mod payloads {
    use super::json;

    #[must_use]
    pub fn heartbeat() -> String {
        json!({"message_type": "heartbeat", "timestamp": 1_740_963_600.5}).to_string()
    }

    #[must_use]
    pub fn certificate_update(cert_index: u64) -> String {
        json!({
            "message_type": "certificate_update",
            "data": {
                "cert_index": cert_index,
                "cert_link": format!("https://oak.ct.letsencrypt.org/2025h1/ct/v1/get-entries?start={cert_index}&end={cert_index}"),
                "leaf_cert": {
                    "all_domains": ["example.org", "www.example.org"],
                    "extensions": {
                        "basicConstraints": "CA:FALSE",
                        "ctlPoisonByte": false,
                        "keyUsage": "Digital Signature",
                        "subjectAltName": "DNS:example.org, DNS:www.example.org"
                    },
                    "fingerprint": "01:23:45:67:89:AB:CD:EF:01:23:45:67:89:AB:CD:EF:01:23:45:67",
                    "not_after": 1_748_736_000,
                    "not_before": 1_740_960_000,
                    "serial_number": "03A1B2C3D4E5F6",
                    "signature_algorithm": "sha256, rsa",
                    "subject": {"CN": "example.org", "aggregated": "/CN=example.org", "C": null},
                    "issuer": {"C": "US", "CN": "R10", "O": "Let's Encrypt", "aggregated": "/C=US/CN=R10/O=Let's Encrypt"},
                    "is_ca": false
                },
                "seen": 1_740_963_600.123,
                "source": {"name": "Let's Encrypt 'Oak2025h1' log", "url": "https://oak.ct.letsencrypt.org/2025h1/"},
                "update_type": "X509LogEntry"
            }
        })
        .to_string()
    }
}
