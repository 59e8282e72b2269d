//! Realtime push channels over the backend's websocket endpoint.

mod protocol;

pub use protocol::{ChannelConfig, PostgresChangeFilter};

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::discovery::{VibeFeed, VibeSubscription};
use crate::error::VibeError;
use crate::models::VibeSignal;
use protocol::{Frame, Inbound, PresenceKeys};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
const RECONNECT_DELAY: Duration = Duration::from_secs(3);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Subscribed,
    Change {
        event: String,
        table: String,
        record: Value,
    },
    PresenceSync(BTreeSet<String>),
    Disconnected(VibeError),
}

enum ChannelCommand {
    Track(Value),
    Untrack,
}

enum SessionEnd {
    Closed,
    Lost(String),
}

/// Factory for realtime channels; cheap to clone.
#[derive(Clone)]
pub struct RealtimeClient {
    socket_url: String,
    access_token: String,
}

impl RealtimeClient {
    pub fn new(base_url: &str, anon_key: &str, access_token: Option<&str>) -> Self {
        let ws_base = if let Some(rest) = base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base_url.to_string()
        };

        Self {
            socket_url: format!("{ws_base}/realtime/v1/websocket?apikey={anon_key}&vsn=1.0.0"),
            access_token: access_token.unwrap_or(anon_key).to_string(),
        }
    }

    /// Joins `realtime:{name}`. The connection is re-established and the
    /// channel rejoined after every disconnect until the handle is closed.
    pub fn channel(
        &self,
        name: &str,
        config: ChannelConfig,
    ) -> (Channel, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let link = ChannelLink {
            url: self.socket_url.clone(),
            topic: format!("realtime:{name}"),
            join_config: config.to_join_config(),
            access_token: self.access_token.clone(),
            commands: command_rx,
            events: event_tx,
            tracked: None,
            next_ref: 0,
        };
        tokio::spawn(link.run());

        (
            Channel {
                name: name.to_string(),
                commands: Some(command_tx),
            },
            event_rx,
        )
    }
}

/// Handle to a joined channel. Closing (or dropping) it leaves the topic.
pub struct Channel {
    name: String,
    commands: Option<mpsc::UnboundedSender<ChannelCommand>>,
}

impl Channel {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn track(&self, state: Value) {
        if let Some(tx) = &self.commands {
            let _ = tx.send(ChannelCommand::Track(state));
        }
    }

    pub fn untrack(&self) {
        if let Some(tx) = &self.commands {
            let _ = tx.send(ChannelCommand::Untrack);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_none()
    }

    /// Safe to call more than once.
    pub fn close(&mut self) {
        // 关闭命令通道后，后台任务会发送 phx_leave 并退出
        if self.commands.take().is_some() {
            debug!("Leaving realtime channel {}", self.name);
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
    }
}

struct ChannelLink {
    url: String,
    topic: String,
    join_config: Value,
    access_token: String,
    commands: mpsc::UnboundedReceiver<ChannelCommand>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    // 断线重连后需要重新 track
    tracked: Option<Value>,
    next_ref: u64,
}

impl ChannelLink {
    async fn run(mut self) {
        loop {
            let end = match connect_async(self.url.as_str()).await {
                Ok((socket, _)) => self.session(socket).await,
                Err(e) => SessionEnd::Lost(e.to_string()),
            };

            match end {
                SessionEnd::Closed => return,
                SessionEnd::Lost(reason) => {
                    warn!("Realtime channel {} lost: {}", self.topic, reason);
                    if self
                        .events
                        .send(ChannelEvent::Disconnected(VibeError::ChannelDisconnected(
                            reason,
                        )))
                        .is_err()
                    {
                        return;
                    }
                }
            }

            // 等待重连，期间仍然响应关闭和 track 命令
            let delay = sleep(RECONNECT_DELAY);
            tokio::pin!(delay);
            loop {
                tokio::select! {
                    _ = &mut delay => break,
                    command = self.commands.recv() => match command {
                        None => return,
                        Some(ChannelCommand::Track(state)) => self.tracked = Some(state),
                        Some(ChannelCommand::Untrack) => self.tracked = None,
                    },
                }
            }
            info!("Reconnecting realtime channel {}", self.topic);
        }
    }

    fn reference(&mut self) -> u64 {
        self.next_ref += 1;
        self.next_ref
    }

    async fn session(&mut self, socket: Socket) -> SessionEnd {
        let (mut write, mut read) = socket.split();

        let join_ref = self.reference();
        let join = Frame::join(&self.topic, self.join_config.clone(), &self.access_token, join_ref);
        if let Err(e) = send_frame(&mut write, &join).await {
            return SessionEnd::Lost(e);
        }
        let join_ref = join_ref.to_string();

        let mut heartbeat = interval(HEARTBEAT_INTERVAL);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.tick().await;
        let mut presence = PresenceKeys::default();

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    let frame = Frame::heartbeat(self.reference());
                    if let Err(e) = send_frame(&mut write, &frame).await {
                        return SessionEnd::Lost(e);
                    }
                }
                command = self.commands.recv() => {
                    let frame = match command {
                        None => {
                            let reference = self.reference();
                            let leave = Frame::leave(&self.topic, reference);
                            let _ = send_frame(&mut write, &leave).await;
                            let _ = write.close().await;
                            return SessionEnd::Closed;
                        }
                        Some(ChannelCommand::Track(state)) => {
                            self.tracked = Some(state.clone());
                            let reference = self.reference();
                            Frame::track(&self.topic, state, reference)
                        }
                        Some(ChannelCommand::Untrack) => {
                            self.tracked = None;
                            let reference = self.reference();
                            Frame::untrack(&self.topic, reference)
                        }
                    };
                    if let Err(e) = send_frame(&mut write, &frame).await {
                        return SessionEnd::Lost(e);
                    }
                }
                message = read.next() => {
                    let text = match message {
                        None => return SessionEnd::Lost("connection closed".to_string()),
                        Some(Err(e)) => return SessionEnd::Lost(e.to_string()),
                        Some(Ok(Message::Close(_))) => {
                            return SessionEnd::Lost("closed by server".to_string());
                        }
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(_)) => continue,
                    };

                    let frame: Frame = match serde_json::from_str(text.as_str()) {
                        Ok(frame) => frame,
                        Err(e) => {
                            debug!("Skipping undecodable realtime frame: {}", e);
                            continue;
                        }
                    };

                    let event = match protocol::decode(&frame, &self.topic, Some(&join_ref)) {
                        Inbound::JoinOk => {
                            info!("Joined realtime channel {}", self.topic);
                            if let Some(state) = self.tracked.clone() {
                                let reference = self.reference();
                                let track = Frame::track(&self.topic, state, reference);
                                if let Err(e) = send_frame(&mut write, &track).await {
                                    return SessionEnd::Lost(e);
                                }
                            }
                            ChannelEvent::Subscribed
                        }
                        Inbound::JoinError(reason) => return SessionEnd::Lost(reason),
                        Inbound::Closed(reason) => return SessionEnd::Lost(reason),
                        Inbound::Change { event, table, record } => {
                            ChannelEvent::Change { event, table, record }
                        }
                        Inbound::PresenceState(state) => {
                            presence.replace(&state);
                            ChannelEvent::PresenceSync(presence.keys().clone())
                        }
                        Inbound::PresenceDiff { joins, leaves } => {
                            presence.apply_diff(&joins, &leaves);
                            ChannelEvent::PresenceSync(presence.keys().clone())
                        }
                        Inbound::Ignored => continue,
                    };

                    // 订阅方已经离开
                    if self.events.send(event).is_err() {
                        let reference = self.reference();
                        let leave = Frame::leave(&self.topic, reference);
                        let _ = send_frame(&mut write, &leave).await;
                        return SessionEnd::Closed;
                    }
                }
            }
        }
    }
}

async fn send_frame<S>(write: &mut S, frame: &Frame) -> Result<(), String>
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let text = serde_json::to_string(frame).map_err(|e| e.to_string())?;
    write
        .send(Message::Text(text.into()))
        .await
        .map_err(|e| e.to_string())
}

#[async_trait]
impl VibeFeed for RealtimeClient {
    async fn subscribe_vibes(&self, user_id: &str) -> Result<VibeSubscription, VibeError> {
        let (channel, mut events) = self.channel(
            &format!("vibes:{user_id}"),
            ChannelConfig::changes(vec![PostgresChangeFilter::inserts("vibes")]),
        );
        let (tx, rx) = mpsc::unbounded_channel();

        let pump = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    ChannelEvent::Change { table, record, .. } if table == "vibes" => {
                        match serde_json::from_value::<VibeSignal>(record) {
                            Ok(signal) => {
                                if tx.send(signal).is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!("Malformed vibe record: {}", e),
                        }
                    }
                    ChannelEvent::Disconnected(e) => {
                        warn!("{}, relying on periodic refresh until rejoined", e);
                    }
                    _ => {}
                }
            }
        });

        let mut channel = channel;
        Ok(VibeSubscription::new(rx, move || {
            pump.abort();
            channel.close();
        }))
    }
}
