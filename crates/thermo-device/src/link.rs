//! The one connection to the controller.
//!
//! The link is the only reader and writer of the controller socket. After
//! connecting it sends the setpoint once, then polls `STATUS?` on a fixed
//! period. Every chunk the controller sends replaces the mailbox content.

use std::sync::Arc;

use thermo_core::{BridgeError, LinkState, StatusMailbox};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::DeviceConfig;
use crate::decode::Utf8Chunker;

const READ_BUFFER_SIZE: usize = 1024;

/// Owner of the controller connection.
pub struct DeviceLink {
    config: DeviceConfig,
    mailbox: Arc<StatusMailbox>,
    state: watch::Sender<LinkState>,
}

impl DeviceLink {
    pub fn new(config: DeviceConfig, mailbox: Arc<StatusMailbox>) -> Self {
        let (state, _) = watch::channel(LinkState::Connecting);
        Self {
            config,
            mailbox,
            state,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    /// Watch connection state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: LinkState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            tracing::debug!(from = %prev, to = %next, "device link state");
        }
    }

    /// Open the TCP connection to the controller.
    pub async fn connect(&self) -> Result<TcpStream, BridgeError> {
        self.set_state(LinkState::Connecting);
        match TcpStream::connect(&self.config.addr).await {
            Ok(stream) => {
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!(error = %e, "set_nodelay failed");
                }
                tracing::info!(addr = %self.config.addr, "connected to controller");
                Ok(stream)
            }
            Err(source) => {
                self.set_state(LinkState::Closed);
                Err(BridgeError::ConnectionFailure {
                    addr: self.config.addr.clone(),
                    source,
                })
            }
        }
    }

    /// Drive one established session until the peer goes away or `cancel`
    /// fires. Returns `Ok(())` only on cancellation.
    pub async fn serve<S>(&self, stream: S, cancel: &CancellationToken) -> Result<(), BridgeError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.set_state(LinkState::Open);
        let result = self.session(stream, cancel).await;
        self.set_state(LinkState::Closed);
        result
    }

    async fn session<S>(&self, stream: S, cancel: &CancellationToken) -> Result<(), BridgeError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (mut reader, mut writer) = tokio::io::split(stream);

        send_command(&mut writer, &self.config.config_command()).await;

        let period = self.config.poll_interval;
        let mut poll = time::interval_at(Instant::now() + period, period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let poll_command = self.config.poll_command();

        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let mut decoder = Utf8Chunker::new();

        loop {
            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                _ = poll.tick() => {
                    send_command(&mut writer, &poll_command).await;
                }
                read = reader.read(&mut buf) => match read {
                    Ok(0) => return Err(BridgeError::ConnectionClosed),
                    Ok(n) => self.on_data(&decoder.decode(&buf[..n])),
                    Err(e) => return Err(BridgeError::Io(e)),
                },
            }
        }
    }

    fn on_data(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        tracing::debug!(response = %text, "controller response");
        if self.mailbox.set(text) {
            tracing::trace!("unread status overwritten");
        }
    }

    /// Connect and serve until cancelled.
    ///
    /// Without a reconnect policy a refused connect or a dropped session
    /// leaves the link closed for the rest of the process.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut failures: u32 = 0;

        loop {
            let connected = tokio::select! {
                () = cancel.cancelled() => break,
                r = self.connect() => r,
            };

            match connected {
                Ok(stream) => {
                    failures = 0;
                    match self.serve(stream, &cancel).await {
                        Ok(()) => break,
                        Err(e) => tracing::warn!(
                            error = %e,
                            kind = e.error_kind(),
                            "controller session ended"
                        ),
                    }
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(error = %e, kind = e.error_kind(), attempt = failures, "controller connect failed");
                }
            }

            let Some(policy) = self.config.reconnect else {
                tracing::warn!("reconnect disabled, device link is inert");
                return;
            };
            if failures >= policy.max_attempts {
                tracing::error!(attempts = failures, "giving up on controller");
                return;
            }

            let delay = policy.next(failures.saturating_sub(1));
            tracing::info!(delay_ms = delay.as_millis() as u64, "reconnecting to controller");
            tokio::select! {
                () = cancel.cancelled() => break,
                () = time::sleep(delay) => {}
            }
        }

        self.set_state(LinkState::Closed);
    }
}

/// Fire-and-forget write. A failed write is logged and otherwise ignored; the
/// read side notices a dead socket.
async fn send_command<W: AsyncWrite + Unpin>(writer: &mut W, command: &str) {
    if let Err(e) = writer.write_all(command.as_bytes()).await {
        tracing::debug!(error = %e, command, "controller write failed");
    } else {
        tracing::trace!(command, "sent controller command");
    }
}
