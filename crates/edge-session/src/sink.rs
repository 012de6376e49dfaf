//! Consumer-facing delivery of events and the terminal error.

use crate::ListenError;
use delta_decoder::MessageEvent;
use tokio::sync::mpsc;
use tracing::debug;

/// Callback invoked for each event, and once with the terminal error.
pub type EventCallback = Box<dyn FnMut(Result<MessageEvent, ListenError>) + Send + 'static>;

enum Target {
    Callback(EventCallback),
    Channels {
        messages: mpsc::UnboundedSender<MessageEvent>,
        errors: mpsc::UnboundedSender<ListenError>,
    },
}

/// Serialized push boundary for one listener.
///
/// Delivers in call order. After the terminal error nothing else is delivered.
pub struct EventSink {
    target: Target,
    terminated: bool,
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("terminated", &self.terminated)
            .finish_non_exhaustive()
    }
}

impl EventSink {
    pub fn from_callback(callback: EventCallback) -> Self {
        Self {
            target: Target::Callback(callback),
            terminated: false,
        }
    }

    /// Sink backed by two named channels, returned as (sink, messages, errors).
    pub fn channels() -> (
        Self,
        mpsc::UnboundedReceiver<MessageEvent>,
        mpsc::UnboundedReceiver<ListenError>,
    ) {
        let (messages, message_rx) = mpsc::unbounded_channel();
        let (errors, error_rx) = mpsc::unbounded_channel();
        let sink = Self {
            target: Target::Channels { messages, errors },
            terminated: false,
        };
        (sink, message_rx, error_rx)
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn deliver_event(&mut self, event: MessageEvent) {
        if self.terminated {
            debug!(message_id = %event.message_id, "Dropping event after termination");
            return;
        }
        match &mut self.target {
            Target::Callback(callback) => callback(Ok(event)),
            Target::Channels { messages, .. } => {
                if messages.send(event).is_err() {
                    debug!("Message receiver dropped");
                }
            }
        }
    }

    /// Deliver the terminal error. Only the first call has any effect.
    pub fn deliver_error(&mut self, error: ListenError) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        match &mut self.target {
            Target::Callback(callback) => callback(Err(error)),
            Target::Channels { errors, .. } => {
                if errors.send(error).is_err() {
                    debug!("Error receiver dropped");
                }
            }
        }
    }
}
