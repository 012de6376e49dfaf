//! Listening session for the chat edge.
//!
//! A [`Listener`] owns one logical subscription to the edge. Each connection
//! attempt opens a duplex stream through a [`Connector`], performs the MQTT
//! handshake with a fresh [`SessionIdentity`], subscribes to the configured
//! topics and asks the server to resume at the current [`ResumeCursor`].
//! Inbound delta batches are decoded and pushed to the consumer through the
//! [`EventSink`] in arrival order.
//!
//! [`Connector`]: edge_transport::Connector

mod connection;
mod cursor;
mod error;
mod identity;
mod listener;
mod settings;
mod sink;

pub use connection::{Connection, ConnectionEnd};
pub use cursor::ResumeCursor;
pub use error::{HandshakeError, ListenError, SessionError, SessionResult, SERVER_DOWN};
pub use identity::{endpoint_url, new_session_nonce, SessionIdentity};
pub use listener::{start_listening, ConnectionState, Listener, ListenerHandle};
pub use settings::ListenerSettings;
pub use sink::{EventCallback, EventSink};
