//! Listener lifecycle: connect, reconnect with backoff, terminate.

use crate::{
    Connection, ConnectionEnd, EventCallback, EventSink, ListenError, ListenerSettings,
    ResumeCursor, SessionError,
};
use delta_decoder::{DeltaDecoder, MessageEvent};
use edge_transport::Connector;
use listener_config_and_utils::ConnectionOptions;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{error, info, warn};

/// Connection state of a listener.
///
/// `Terminated` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Open,
    Reconnecting,
    Terminated,
}

/// Builder for a listening session.
pub struct Listener<C: Connector> {
    connector: C,
    settings: ListenerSettings,
    decoder: DeltaDecoder,
}

impl<C: Connector> Listener<C> {
    pub fn new(connector: C, settings: ListenerSettings) -> Self {
        let decoder = DeltaDecoder::new(
            settings.protocol.delta_topic.clone(),
            settings.user_id.clone(),
            settings.listen.self_listen,
        );
        Self {
            connector,
            settings,
            decoder,
        }
    }

    /// Use a decoder with custom payload decoding or attachment handling.
    pub fn with_decoder(mut self, decoder: DeltaDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    /// Spawn the session task and return its handle.
    ///
    /// Without a callback, events and the terminal error are exposed as two
    /// channels on the handle. Must be called inside a tokio runtime.
    pub fn start(self, callback: Option<EventCallback>) -> ListenerHandle {
        let (sink, message_rx, error_rx) = match callback {
            Some(callback) => (EventSink::from_callback(callback), None, None),
            None => {
                let (sink, messages, errors) = EventSink::channels();
                (sink, Some(messages), Some(errors))
            }
        };

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let cursor = ResumeCursor::new(self.settings.resume_from);
        let handshakes = Arc::new(AtomicU32::new(0));

        let task = ListenTask {
            connector: self.connector,
            settings: self.settings,
            decoder: self.decoder,
            sink,
            cursor: cursor.clone(),
            handshakes: handshakes.clone(),
            state_tx,
            shutdown_rx,
        };
        let join = tokio::spawn(task.run());

        ListenerHandle {
            state_rx,
            shutdown_tx,
            cursor,
            handshakes,
            task: tokio::sync::Mutex::new(Some(join)),
            message_rx: parking_lot::Mutex::new(message_rx),
            error_rx: parking_lot::Mutex::new(error_rx),
        }
    }
}

/// Start listening with the default decoder.
pub fn start_listening<C: Connector>(
    connector: C,
    settings: ListenerSettings,
    callback: Option<EventCallback>,
) -> ListenerHandle {
    Listener::new(connector, settings).start(callback)
}

/// Caller-side view of a running listener.
pub struct ListenerHandle {
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    cursor: ResumeCursor,
    handshakes: Arc<AtomicU32>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    message_rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<MessageEvent>>>,
    error_rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<ListenError>>>,
}

impl ListenerHandle {
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    pub fn resume_cursor(&self) -> Option<i64> {
        self.cursor.get()
    }

    /// Number of handshakes attempted so far.
    pub fn handshake_count(&self) -> u32 {
        self.handshakes.load(Ordering::SeqCst)
    }

    /// Message channel, present once when started without a callback.
    pub fn take_message_receiver(&self) -> Option<mpsc::UnboundedReceiver<MessageEvent>> {
        self.message_rx.lock().take()
    }

    /// Error channel, present once when started without a callback.
    pub fn take_error_receiver(&self) -> Option<mpsc::UnboundedReceiver<ListenError>> {
        self.error_rx.lock().take()
    }

    /// Wait until the listener has terminated on its own or been closed.
    pub async fn terminated(&self) {
        let mut state_rx = self.state_rx.clone();
        let _ = state_rx
            .wait_for(|state| *state == ConnectionState::Terminated)
            .await;
    }

    /// Close the socket and stop reconnecting. Safe to call more than once.
    ///
    /// Closing delivers no error to the consumer.
    pub async fn close(&self) {
        self.shutdown_tx.send_replace(true);

        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Listener task ended abnormally");
            }
        }
    }
}

struct ListenTask<C: Connector> {
    connector: C,
    settings: ListenerSettings,
    decoder: DeltaDecoder,
    sink: EventSink,
    cursor: ResumeCursor,
    handshakes: Arc<AtomicU32>,
    state_tx: watch::Sender<ConnectionState>,
    shutdown_rx: watch::Receiver<bool>,
}

impl<C: Connector> ListenTask<C> {
    async fn run(mut self) {
        let mut attempt: u32 = 0;

        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }
            self.set_state(ConnectionState::Connecting);
            self.handshakes.fetch_add(1, Ordering::SeqCst);

            let established = tokio::select! {
                result = Connection::establish(&self.connector, &self.settings, &self.cursor) => Some(result),
                _ = wait_for_shutdown(&mut self.shutdown_rx) => None,
            };
            let Some(established) = established else {
                break;
            };

            let mut connection = match established {
                Ok(connection) => connection,
                Err(e) => {
                    if self.recover(e, &mut attempt).await {
                        continue;
                    }
                    break;
                }
            };

            attempt = 0;
            self.set_state(ConnectionState::Open);

            let ended = connection
                .run(&self.decoder, &self.cursor, &mut self.sink, &mut self.shutdown_rx)
                .await;
            drop(connection);

            match ended {
                Ok(ConnectionEnd::Closed) => break,
                Err(e) => {
                    if !self.recover(e, &mut attempt).await {
                        break;
                    }
                }
            }
        }

        self.set_state(ConnectionState::Terminated);
        info!(cursor = ?self.cursor.get(), "Listener stopped");
    }

    /// Decide what follows a failed connection. Returns whether to reconnect.
    async fn recover(&mut self, error: SessionError, attempt: &mut u32) -> bool {
        if *self.shutdown_rx.borrow() {
            return false;
        }

        match error {
            SessionError::Handshake(rejected) => {
                error!(error = %rejected, "Handshake rejected, not retrying");
                self.sink.deliver_error(ListenError::Handshake(rejected));
                false
            }
            other if !self.settings.listen.auto_reconnect => {
                error!(error = %other, "Connection lost and auto-reconnect is off");
                self.sink.deliver_error(ListenError::server_down());
                false
            }
            other => {
                *attempt += 1;
                let delay = reconnect_delay(&self.settings.connection, *attempt);
                self.set_state(ConnectionState::Reconnecting);
                warn!(
                    error = %other,
                    attempt = *attempt,
                    delay_ms = delay.as_millis() as u64,
                    cursor = ?self.cursor.get(),
                    "Connection lost, scheduling reconnect"
                );

                tokio::select! {
                    _ = tokio::time::sleep(delay) => true,
                    _ = wait_for_shutdown(&mut self.shutdown_rx) => false,
                }
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }
}

/// Resolves once shutdown is requested; never resolves if the handle is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Capped exponential delay for the given 1-based attempt.
fn reconnect_delay(connection: &ConnectionOptions, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let delay_ms = connection
        .reconnect_base_delay_ms
        .saturating_mul(1u64 << exponent)
        .min(connection.reconnect_max_delay_ms);
    Duration::from_millis(delay_ms)
}
