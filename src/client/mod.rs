//! Client side of the real-time channel: a reconnecting link to the
//! session endpoint and a router that hands delivered events to local
//! observers.

mod backoff;
mod manager;
mod router;
mod transport;

pub use backoff::{Backoff, ReconnectPolicy};
pub use manager::{ConnectionState, RealtimeClient};
pub use router::{EventRouter, Notification, Subscription};
pub use transport::{Connector, Inbound, Link, WsConnector};
