//! The opaque chat-transport boundary.
//!
//! The dispatch core never parses protocol framing, negotiates TLS, or
//! retries connections; all of that lives behind [`Transport`]. The manager
//! drives the trait object and drains its inbound event stream into the
//! module fan-out.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::event::Payload;

/// A wire-level chat client, treated as opaque by the core.
///
/// Implementations push every inbound protocol event into the stream handed
/// out by [`Transport::incoming`]; the manager is the sole consumer.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the connection. Failures abort [`connect`](crate::manager::ModuleManager::connect).
    async fn connect(&self) -> Result<(), TransportError>;

    /// Close the connection, sending any configured quit message.
    async fn quit(&self);

    fn connected(&self) -> bool;

    async fn join(&self, channel: &str) -> Result<(), TransportError>;

    async fn part(&self, channel: &str) -> Result<(), TransportError>;

    /// Send a message to a channel or nick.
    async fn privmsg(&self, target: &str, text: &str) -> Result<(), TransportError>;

    /// Take the inbound event stream.
    ///
    /// Returns `None` if the stream was already taken; the manager takes it
    /// once per connection when spawning the fan-out loop.
    fn incoming(&self) -> Option<mpsc::UnboundedReceiver<Payload>>;
}
