//! Per-subscriber WebSocket session.
//!
//! Each subscriber gets an outbound pump, which owns its heartbeat timer and
//! forwards events queued by the hub, and an inbound reader, which validates
//! `client_data` frames and hands the characters to the input relay. When
//! either side ends the subscriber is unregistered, which cancels the pump
//! and its timers.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt};
use thermo_core::{ClientEvent, Clock, ServerEvent, SubscriberId};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::registry::SubscriberRegistry;

/// Timer periods for one subscriber session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionTiming {
    /// Period of the `date` heartbeat event.
    pub heartbeat: Duration,
    /// Period of WebSocket pings.
    pub ping: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            heartbeat: Duration::from_secs(1),
            ping: Duration::from_secs(30),
        }
    }
}

/// A character typed by a subscriber, tagged with who sent it.
pub type InputEvent = (SubscriberId, char);

/// Serve one upgraded WebSocket until the subscriber goes away.
pub async fn handle_subscriber(
    socket: WebSocket,
    registry: Arc<SubscriberRegistry>,
    input_tx: mpsc::Sender<InputEvent>,
    timing: SessionTiming,
    clock: Arc<dyn Clock>,
) {
    let registration = registry.register();
    let subscriber_id = registration.id.clone();
    tracing::info!(subscriber_id = %subscriber_id, "subscriber connected");

    let (ws_tx, ws_rx) = socket.split();

    let mut writer = tokio::spawn(pump_outbound(
        ws_tx,
        registration.rx,
        timing,
        clock,
        registration.cancel,
    ));
    let mut reader = tokio::spawn(read_inbound(
        ws_rx,
        subscriber_id.clone(),
        Arc::clone(&registry),
        input_tx,
    ));

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => {},
    }

    registry.unregister(&subscriber_id);
    tracing::info!(subscriber_id = %subscriber_id, "subscriber disconnected");
}

/// Write hub events, heartbeats and pings to the transport until `cancel`
/// fires or the transport fails.
pub async fn pump_outbound<T>(
    mut transport: T,
    mut rx: mpsc::Receiver<ServerEvent>,
    timing: SessionTiming,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
) where
    T: Sink<WsMessage> + Unpin,
{
    let start = Instant::now();
    let mut heartbeat = time::interval_at(start + timing.heartbeat, timing.heartbeat);
    let mut ping = time::interval_at(start + timing.ping, timing.ping);

    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            queued = rx.recv() => match queued {
                Some(event) => event,
                None => break,
            },
            _ = heartbeat.tick() => ServerEvent::date(clock.now()),
            _ = ping.tick() => {
                if transport.send(WsMessage::Ping(vec![].into())).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let json = match event.to_json() {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, event = event.name(), "failed to serialize event");
                continue;
            }
        };
        if transport.send(WsMessage::Text(json.into())).await.is_err() {
            break;
        }
    }
}

/// Read subscriber frames, relaying valid `client_data` characters in order.
pub async fn read_inbound<S, E>(
    mut stream: S,
    subscriber_id: SubscriberId,
    registry: Arc<SubscriberRegistry>,
    input_tx: mpsc::Sender<InputEvent>,
) where
    S: Stream<Item = Result<WsMessage, E>> + Unpin,
{
    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            WsMessage::Text(text) => match ClientEvent::parse(text.as_str()) {
                Ok(ClientEvent::ClientData { letter }) => {
                    if input_tx.send((subscriber_id.clone(), letter)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        subscriber_id = %subscriber_id,
                        error = %e,
                        kind = e.error_kind(),
                        "dropping subscriber payload"
                    );
                }
            },
            WsMessage::Pong(_) => registry.record_pong(&subscriber_id),
            WsMessage::Close(_) => break,
            _ => {}
        }
    }
}
