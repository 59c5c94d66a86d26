//! Server-side fan-out of committed mutations to connected clients.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `event` | Wire event enum and entity summaries |
//! | `registry` | Live sessions and their bounded channels |
//! | `broadcaster` | `publish` fan-out, slow-session eviction, shutdown |
//! | `ws` | `/ws` WebSocket session endpoint |
//! | `sse` | `/events` Server-Sent-Events session endpoint |

pub mod broadcaster;
pub mod event;
pub mod registry;
mod sse;
mod ws;

pub use broadcaster::Broadcaster;
pub use event::*;
pub use registry::{Session, SessionId, SessionRegistry, SessionState};
pub use sse::events_sse;
pub use ws::ws_handler;

use axum::{Router, routing::get};

/// Session endpoints. Expects an `Extension<Arc<Broadcaster>>` layer.
pub fn routes() -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/events", get(events_sse))
}
