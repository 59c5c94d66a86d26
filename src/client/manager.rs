//! Client-side connection lifecycle.
//!
//! One driver task owns the physical link. It moves through
//! `Idle → Connecting → Open → (Closing | Closed)` and back to `Connecting`
//! after an unexpected drop, waiting out the [`Backoff`] delay on a tokio
//! timer that `disconnect()` can interrupt. Past the retry budget it stops
//! and tells observers real-time updates are unavailable.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::client::backoff::{Backoff, ReconnectPolicy};
use crate::client::router::{EventRouter, Notification};
use crate::client::transport::{Connector, Inbound, Link};
use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

enum Command {
    Send(String),
    Disconnect,
}

enum LinkEnd {
    Disconnect,
    CleanClose(String),
    Dropped(String),
}

type RefreshHook = Arc<dyn Fn() + Send + Sync>;

/// Handle to a running reconnection manager.
pub struct RealtimeClient {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    router: EventRouter,
    task: JoinHandle<()>,
}

impl RealtimeClient {
    /// Start connecting in the background.
    ///
    /// `on_refresh` runs once per successful reconnect, after observers
    /// have been told [`Notification::Reconnected`].
    pub fn spawn<C, F>(
        connector: C,
        policy: ReconnectPolicy,
        router: EventRouter,
        on_refresh: F,
    ) -> Self
    where
        C: Connector,
        F: Fn() + Send + Sync + 'static,
    {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Idle);

        let driver = Driver {
            connector,
            backoff: Backoff::new(policy),
            router: router.clone(),
            on_refresh: Arc::new(on_refresh),
            state: state_tx,
            commands: command_rx,
        };
        let task = tokio::spawn(driver.run());

        Self {
            commands,
            state,
            router,
            task,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    /// Wait for the link to be open. Fails once the manager has stopped.
    pub async fn wait_open(&self) -> Result<(), ClientError> {
        let mut state = self.state.clone();
        loop {
            if *state.borrow_and_update() == ConnectionState::Open {
                return Ok(());
            }
            if state.changed().await.is_err() {
                return Err(ClientError::NotConnected);
            }
        }
    }

    /// Queue `text` for the server. A no-op with a warning unless open.
    pub fn send(&self, text: impl Into<String>) -> bool {
        let state = self.state();
        if state != ConnectionState::Open {
            warn!(?state, "send while not connected, message dropped");
            return false;
        }
        self.commands.send(Command::Send(text.into())).is_ok()
    }

    /// Close cleanly and cancel any scheduled reconnect.
    pub fn disconnect(&self) {
        let _ = self.commands.send(Command::Disconnect);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the driver task to stop.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

struct Driver<C> {
    connector: C,
    backoff: Backoff,
    router: EventRouter,
    on_refresh: RefreshHook,
    state: watch::Sender<ConnectionState>,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl<C: Connector> Driver<C> {
    async fn run(mut self) {
        let mut ever_connected = false;

        loop {
            self.set_state(ConnectionState::Connecting);

            let Some(result) = self.connect().await else {
                self.stop();
                return;
            };

            match result {
                Ok(mut link) => {
                    let reconnect = ever_connected || self.backoff.attempt() > 0;
                    ever_connected = true;
                    self.backoff.reset();
                    self.set_state(ConnectionState::Open);

                    if reconnect {
                        info!("realtime connection restored");
                        self.router.notify(&Notification::Reconnected);
                        if catch_unwind(AssertUnwindSafe(|| (self.on_refresh)())).is_err() {
                            error!("refresh hook panicked");
                        }
                    } else {
                        info!("realtime connection open");
                        self.router.notify(&Notification::Connected);
                    }

                    match self.pump(link.as_mut()).await {
                        LinkEnd::Disconnect => {
                            self.set_state(ConnectionState::Closing);
                            link.close().await;
                            self.stop();
                            return;
                        }
                        LinkEnd::CleanClose(reason) => {
                            info!(%reason, "server closed the connection");
                            self.stop();
                            return;
                        }
                        LinkEnd::Dropped(reason) => {
                            let e = ClientError::TransportDropped(reason);
                            warn!(error = %e, "realtime connection lost");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, attempt = self.backoff.attempt(), "connect failed");
                }
            }

            self.set_state(ConnectionState::Closed);

            let Some((attempt, delay)) = self.backoff.next_delay() else {
                error!(
                    attempts = self.backoff.attempt(),
                    "reconnect budget exhausted, realtime updates unavailable"
                );
                self.router.notify(&Notification::Unavailable);
                return;
            };

            info!(
                attempt,
                max_attempts = self.backoff.policy().max_attempts,
                delay_ms = delay.as_millis() as u64,
                "scheduling reconnect"
            );
            self.router.notify(&Notification::Reconnecting { attempt, delay });

            if !self.wait(delay).await {
                self.stop();
                return;
            }
        }
    }

    /// Dial once. `None` means a disconnect arrived first.
    async fn connect(&mut self) -> Option<Result<Box<dyn Link>, ClientError>> {
        let connect = self.connector.connect();
        tokio::pin!(connect);
        loop {
            tokio::select! {
                result = &mut connect => return Some(result),
                command = self.commands.recv() => match command {
                    Some(Command::Send(_)) => warn!("send while connecting, message dropped"),
                    Some(Command::Disconnect) | None => return None,
                },
            }
        }
    }

    /// Sleep for the backoff delay. Returns `false` if disconnected meanwhile.
    async fn wait(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                command = self.commands.recv() => match command {
                    Some(Command::Send(_)) => warn!("send while reconnecting, message dropped"),
                    Some(Command::Disconnect) | None => return false,
                },
            }
        }
    }

    async fn pump(&mut self, link: &mut dyn Link) -> LinkEnd {
        loop {
            tokio::select! {
                inbound = link.recv() => match inbound {
                    Inbound::Text(text) => {
                        let _ = self.router.dispatch_raw(&text);
                    }
                    Inbound::Closed { clean: true, reason } => return LinkEnd::CleanClose(reason),
                    Inbound::Closed { clean: false, reason } => return LinkEnd::Dropped(reason),
                },
                command = self.commands.recv() => match command {
                    Some(Command::Send(text)) => {
                        if let Err(e) = link.send(text).await {
                            return LinkEnd::Dropped(e.to_string());
                        }
                    }
                    Some(Command::Disconnect) | None => return LinkEnd::Disconnect,
                },
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        debug!(?state, "connection state");
        self.state.send_replace(state);
    }

    fn stop(&self) {
        self.set_state(ConnectionState::Closed);
        self.router.notify(&Notification::Disconnected);
    }
}
