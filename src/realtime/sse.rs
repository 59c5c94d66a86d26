use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    extract::Extension,
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
};
use futures::stream::Stream;
use serde::Deserialize;
use tracing::{info, warn};

use crate::realtime::{Broadcaster, SessionId};

/// Unregisters the session when the SSE stream is dropped.
struct SessionGuard {
    broadcaster: Arc<Broadcaster>,
    id: SessionId,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.broadcaster.close_session(self.id) {
            info!(session_id = %self.id, "sse stream closed");
        }
    }
}

#[derive(Deserialize)]
struct Tagged<'a> {
    #[serde(rename = "type", borrow)]
    kind: &'a str,
}

fn to_sse(payload: &str) -> SseEvent {
    let name = serde_json::from_str::<Tagged>(payload)
        .map(|t| t.kind)
        .unwrap_or("message");
    SseEvent::default().event(name).data(payload)
}

pub async fn events_sse(
    Extension(broadcaster): Extension<Arc<Broadcaster>>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, StatusCode> {
    let (session_id, mut rx) = broadcaster.open_session().map_err(|e| {
        warn!(error = %e, "could not register sse session");
        StatusCode::SERVICE_UNAVAILABLE
    })?;
    info!(%session_id, "sse stream opened");

    let guard = SessionGuard {
        broadcaster,
        id: session_id,
    };

    let stream = async_stream::stream! {
        let _guard = guard;
        while let Some(payload) = rx.recv().await {
            yield Ok(to_sse(&payload));
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keep-alive"),
    ))
}
