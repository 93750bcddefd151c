#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::ops::ControlFlow;
use std::time::Duration;

use backoff::backoff::{Backoff as _, Constant};
use futures::stream::SplitStream;
use futures::{Sink, SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep, timeout, timeout_at};
use tokio_tungstenite::tungstenite::{Error as TungsteniteError, Message as Frame};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use super::config::Config;
use super::error::WsError;
use crate::Result;
use crate::error::{Error, Kind};
use crate::types::Message;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSource = SplitStream<WsStream>;

/// Upper bound on the close handshake when tearing a connection down.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected: the first dial has not started yet, or the client has stopped
    Disconnected,
    /// Attempting to connect
    Connecting,
    /// Successfully connected
    Connected {
        /// When the connection was established
        since: Instant,
    },
    /// Waiting out the reconnect delay after a failure
    Reconnecting {
        /// Number of consecutive failures so far
        attempt: u32,
    },
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected { .. })
    }
}

/// Supervises the certstream connection: dials, keeps it alive with pings,
/// reads and decodes frames, and reconnects after every failure.
///
/// Events are pushed into `events_tx`, failures into `errors_tx`. The loop
/// only ends when `shutdown` is cancelled or the event receiver is dropped.
pub(crate) struct ConnectionManager {
    endpoint: String,
    config: Config,
    events_tx: mpsc::Sender<Message>,
    errors_tx: mpsc::UnboundedSender<Error>,
    state_tx: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
}

impl ConnectionManager {
    pub(crate) fn new(
        endpoint: String,
        config: Config,
        events_tx: mpsc::Sender<Message>,
        errors_tx: mpsc::UnboundedSender<Error>,
        state_tx: watch::Sender<ConnectionState>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            endpoint,
            config,
            events_tx,
            errors_tx,
            state_tx,
            shutdown,
        }
    }

    /// Main connection loop with automatic reconnection.
    pub(crate) async fn connection_loop(self) {
        let mut attempt = 0_u32;
        let mut backoff: Constant = self.config.reconnect.clone().into();

        loop {
            _ = self.state_tx.send(ConnectionState::Connecting);

            #[cfg(feature = "tracing")]
            tracing::debug!(endpoint = %self.endpoint, attempt, "Connecting to certstream");

            let dialed = tokio::select! {
                () = self.shutdown.cancelled() => break,
                result = connect_async(self.endpoint.as_str()) => result,
            };

            match dialed {
                Ok((ws_stream, _)) => {
                    attempt = 0;
                    _ = self.state_tx.send(ConnectionState::Connected {
                        since: Instant::now(),
                    });

                    #[cfg(feature = "tracing")]
                    tracing::info!(endpoint = %self.endpoint, "Connected to certstream");

                    if self.handle_connection(ws_stream).await.is_break() {
                        break;
                    }
                }
                Err(e) => {
                    self.report(WsError::Connection(e).into_error(Kind::Connect));
                }
            }

            attempt = attempt.saturating_add(1);
            _ = self.state_tx.send(ConnectionState::Reconnecting { attempt });

            if let Some(delay) = backoff.next_backoff() {
                tokio::select! {
                    () = self.shutdown.cancelled() => break,
                    () = sleep(delay) => {}
                }
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(endpoint = %self.endpoint, "Certstream connection loop stopped");

        _ = self.state_tx.send(ConnectionState::Disconnected);
    }

    /// Run one connection cycle. Breaks when the whole client should stop,
    /// continues when the caller should reconnect.
    async fn handle_connection(&self, ws_stream: WsStream) -> ControlFlow<()> {
        let (write, mut read) = ws_stream.split();

        // Single-use per cycle; also fires on shutdown since it is a child token
        let done = self.shutdown.child_token();

        let heartbeat_handle = tokio::spawn(heartbeat_loop(
            write,
            self.config.ping_interval,
            done.clone(),
            self.errors_tx.clone(),
        ));

        let flow = tokio::select! {
            () = self.shutdown.cancelled() => ControlFlow::Break(()),
            result = self.read_loop(&mut read) => match result {
                Ok(()) => ControlFlow::Break(()),
                Err(e) => {
                    self.report(e);
                    ControlFlow::Continue(())
                }
            },
        };

        done.cancel();

        if let Ok(mut write) = heartbeat_handle.await {
            _ = timeout(CLOSE_TIMEOUT, write.close()).await;
        }

        flow
    }

    /// Read, decode and publish frames until something goes wrong.
    ///
    /// Only returns `Ok` once the event receiver has been dropped.
    async fn read_loop(&self, read: &mut WsSource) -> Result<()> {
        let read_timeout = self.config.read_timeout;

        loop {
            let deadline = Instant::now() + read_timeout;

            // Control frames are handled by tungstenite and do not extend the deadline
            let message = loop {
                let frame = timeout_at(deadline, read.next())
                    .await
                    .map_err(|_elapsed| WsError::Timeout(read_timeout).into_error(Kind::Read))?;

                match frame {
                    Some(Ok(Frame::Text(text))) => break Message::from_slice(text.as_bytes())?,
                    Some(Ok(Frame::Binary(data))) => break Message::from_slice(&data)?,
                    Some(Ok(Frame::Close(_))) | None => {
                        return Err(WsError::ConnectionClosed.into_error(Kind::Read));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(WsError::Connection(e).into_error(Kind::Read)),
                }
            };

            if self.config.skip_heartbeats && message.is_heartbeat() {
                #[cfg(feature = "tracing")]
                tracing::trace!("Skipping certstream heartbeat");
                continue;
            }

            #[cfg(feature = "tracing")]
            tracing::trace!(
                message_type = %message.message_type,
                cert_index = message.data.cert_index,
                "Publishing certstream message"
            );

            if self.events_tx.send(message).await.is_err() {
                #[cfg(feature = "tracing")]
                tracing::debug!("Event receiver dropped, stopping");
                return Ok(());
            }
        }
    }

    fn report(&self, error: Error) {
        report(&self.errors_tx, error);
    }
}

/// Send an empty PING every `period` until `done` fires or a send fails.
///
/// Hands the sink back so the connection can be closed afterwards.
async fn heartbeat_loop<S>(
    mut write: S,
    period: Duration,
    done: CancellationToken,
    errors_tx: mpsc::UnboundedSender<Error>,
) -> S
where
    S: Sink<Frame, Error = TungsteniteError> + Unpin,
{
    let mut ping_interval = interval_at(Instant::now() + period, period);
    ping_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = done.cancelled() => break,
            _ = ping_interval.tick() => {}
        }

        let sent = tokio::select! {
            () = done.cancelled() => break,
            sent = write.send(Frame::Ping(Vec::<u8>::new().into())) => sent,
        };

        if let Err(e) = sent {
            report(&errors_tx, WsError::Connection(e).into_error(Kind::Heartbeat));
            break;
        }

        #[cfg(feature = "tracing")]
        tracing::trace!("Sent certstream PING");
    }

    write
}

fn report(errors_tx: &mpsc::UnboundedSender<Error>, error: Error) {
    #[cfg(feature = "tracing")]
    tracing::warn!(kind = ?error.kind(), error = %error, "Certstream connection failure");

    _ = errors_tx.send(error);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn heartbeat_send_failure_reports_once_and_stops() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);

        // Accepts two pings, then fails like a dead socket
        let sink = Box::pin(futures::sink::unfold((), move |(), _frame: Frame| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt > 2 {
                    Err(TungsteniteError::ConnectionClosed)
                } else {
                    Ok(())
                }
            }
        }));

        let done = CancellationToken::new();
        let (errors_tx, mut errors_rx) = mpsc::unbounded_channel();

        timeout(
            Duration::from_secs(2),
            heartbeat_loop(sink, Duration::from_millis(10), done.clone(), errors_tx),
        )
        .await
        .expect("heartbeat loop must stop after a failed send");

        let error = errors_rx.recv().await.unwrap();
        assert_eq!(error.kind(), Kind::Heartbeat);
        assert!(matches!(
            error.downcast_ref::<WsError>(),
            Some(WsError::Connection(TungsteniteError::ConnectionClosed))
        ));
        assert!(errors_rx.recv().await.is_none(), "exactly one heartbeat error");

        sleep(Duration::from_millis(50)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 3, "no pings after the failure");

        // Ending the cycle is left to the reader
        assert!(!done.is_cancelled());
    }

    #[tokio::test]
    async fn heartbeat_stops_when_done_fires() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let sink = Box::pin(futures::sink::unfold((), move |(), _frame: Frame| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, TungsteniteError>(()) }
        }));

        let done = CancellationToken::new();
        let (errors_tx, mut errors_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(heartbeat_loop(
            sink,
            Duration::from_millis(10),
            done.clone(),
            errors_tx,
        ));

        sleep(Duration::from_millis(100)).await;
        done.cancel();
        timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();

        let sent = attempts.load(Ordering::SeqCst);
        assert!(sent >= 2, "expected several pings, got {sent}");
        assert!(errors_rx.recv().await.is_none());
    }
}
