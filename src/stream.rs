use futures::Stream;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::Result;
use crate::error::{Error, Kind};
use crate::types::Message;
use crate::ws::ConnectionState;
use crate::ws::config::Config;
use crate::ws::connection::ConnectionManager;

/// Public certstream endpoint operated by Calidog.
pub const DEFAULT_ENDPOINT: &str = "wss://certstream.calidog.io";

/// A live subscription to a certstream server.
///
/// Creating an [`EventStream`] spawns a background task that connects to the
/// server and keeps reconnecting forever, with a fixed delay after every
/// failure. Decoded messages and failures arrive on two separate channels.
/// Both must be drained: the event channel is deliberately small, so a
/// consumer that stops reading also stops the reader.
///
/// Dropping the [`EventStream`] (or the [`Shutdown`] handle obtained from
/// [`EventStream::split`]) stops the background task and closes the connection.
///
/// # Example
///
/// ```rust, no_run
/// use certstream_client::EventStream;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let mut stream = EventStream::new(true, "wss://certstream.calidog.io", 15)?;
///
///     while let Some(result) = stream.recv().await {
///         match result {
///             Ok(message) => println!("{:?}", message.data.leaf_cert.all_domains),
///             Err(e) => eprintln!("certstream error: {e}"),
///         }
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct EventStream {
    events: mpsc::Receiver<Message>,
    errors: mpsc::UnboundedReceiver<Error>,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown: Shutdown,
}

impl EventStream {
    /// Subscribe to `endpoint`, reconnecting whenever no message arrives within
    /// `timeout_secs` seconds (`0` selects the 15 second default).
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(skip_heartbeats: bool, endpoint: &str, timeout_secs: u64) -> Result<Self> {
        Self::with_config(endpoint, Config::with_timeout_secs(skip_heartbeats, timeout_secs))
    }

    /// Subscribe to [`DEFAULT_ENDPOINT`] with the default configuration.
    pub fn with_default_endpoint(skip_heartbeats: bool) -> Result<Self> {
        Self::new(skip_heartbeats, DEFAULT_ENDPOINT, 0)
    }

    /// Subscribe to `endpoint` with full control over the [`Config`].
    pub fn with_config(endpoint: &str, config: Config) -> Result<Self> {
        let endpoint = validate_endpoint(endpoint)?;
        validate_config(&config)?;

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::with_source(Kind::Internal, e))?;

        // Only fails when a process-level provider is already installed
        _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let (events_tx, events) = mpsc::channel(config.event_capacity);
        let (errors_tx, errors) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let token = CancellationToken::new();

        let manager = ConnectionManager::new(
            endpoint.into(),
            config,
            events_tx,
            errors_tx,
            state_tx,
            token.clone(),
        );
        runtime.spawn(manager.connection_loop());

        Ok(Self {
            events,
            errors,
            state_rx,
            shutdown: Shutdown(token),
        })
    }

    /// Wait for the next message or error, whichever is ready first.
    ///
    /// Returns `None` once the stream has been shut down and both channels
    /// are drained.
    pub async fn recv(&mut self) -> Option<Result<Message>> {
        tokio::select! {
            biased;

            Some(message) = self.events.recv() => Some(Ok(message)),
            Some(error) = self.errors.recv() => Some(Err(error)),
            else => None,
        }
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Stop reconnecting and close the current connection, if any.
    pub fn shutdown(&self) {
        self.shutdown.shutdown();
    }

    /// Take the raw channels, for callers that want to consume events and
    /// errors from different tasks.
    #[must_use]
    pub fn split(
        self,
    ) -> (
        mpsc::Receiver<Message>,
        mpsc::UnboundedReceiver<Error>,
        Shutdown,
    ) {
        (self.events, self.errors, self.shutdown)
    }

    /// Merge both channels into a single [`Stream`].
    pub fn into_stream(mut self) -> impl Stream<Item = Result<Message>> {
        async_stream::stream! {
            while let Some(item) = self.recv().await {
                yield item;
            }
        }
    }
}

/// Stops the background connection task when dropped or when
/// [`Shutdown::shutdown`] is called.
#[derive(Debug)]
pub struct Shutdown(CancellationToken);

impl Shutdown {
    /// Stop reconnecting and close the current connection, if any.
    pub fn shutdown(&self) {
        self.0.cancel();
    }

    /// Whether [`Self::shutdown`] has been called or the guard was dropped.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.0.is_cancelled()
    }
}

impl Drop for Shutdown {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

fn validate_endpoint(endpoint: &str) -> Result<Url> {
    let url = Url::parse(endpoint)?;

    match url.scheme() {
        "ws" | "wss" => Ok(url),
        scheme => Err(Error::validation(format!(
            "endpoint scheme must be ws or wss, got {scheme}"
        ))),
    }
}

fn validate_config(config: &Config) -> Result<()> {
    if config.event_capacity == 0 {
        return Err(Error::validation("event_capacity must be greater than zero"));
    }
    if config.ping_interval.is_zero() {
        return Err(Error::validation("ping_interval must be greater than zero"));
    }
    if config.read_timeout.is_zero() {
        return Err(Error::validation("read_timeout must be greater than zero"));
    }

    Ok(())
}
