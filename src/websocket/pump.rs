//! Connection Pumps
//!
//! Every connection runs two loops. The inbound pump is the only reader of
//! the socket; it decodes frames and hands them to the hub. The outbound
//! pump is the only writer; it drains the connection's queue, keeps the
//! shadow document current, and sends keepalive pings. The queue is the
//! only thing they share.
//!
//! Both pumps are generic over the socket halves so they can be driven by
//! an axum `WebSocket` or by in-memory streams in tests.

use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{interval_at, timeout, timeout_at, Instant};

use super::connection::{ConnectionId, Outbound, RoomKey};
use super::hub::{Envelope, HubHandle};
use super::messages::ClientFrame;
use crate::config::ConnectionConfig;
use crate::ot::{DocumentState, OtError};

const MIN_PING_PERIOD: Duration = Duration::from_millis(100);

/// Why a pump stopped
#[derive(Debug, Error)]
pub enum PumpError {
    #[error("No pong within {0:?}")]
    ReadTimeout(Duration),

    #[error("Write did not complete within {0:?}")]
    WriteTimeout(Duration),

    #[error("Frame of {size} bytes exceeds limit of {limit}")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("Invalid frame: {0}")]
    Decode(#[from] OtError),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection was dropped by the hub")]
    Evicted,

    #[error("Own outbound queue is full")]
    Backlogged,

    #[error("Hub is not running")]
    HubUnavailable,
}

/// Reads frames from the socket and submits them to the hub
pub struct InboundPump {
    id: ConnectionId,
    room: RoomKey,
    hub: HubHandle,
    mirror: mpsc::WeakSender<Outbound>,
    pong_wait: Duration,
    max_message_size: usize,
}

impl InboundPump {
    pub fn new(
        id: ConnectionId,
        room: RoomKey,
        hub: HubHandle,
        mirror: mpsc::WeakSender<Outbound>,
        config: &ConnectionConfig,
    ) -> Self {
        Self {
            id,
            room,
            hub,
            mirror,
            pong_wait: config.pong_wait(),
            max_message_size: config.max_message_size,
        }
    }

    /// Read until the peer closes or something fails, then unregister.
    ///
    /// The read deadline is only pushed back by pongs.
    pub async fn run<S, E>(self, mut stream: S) -> Result<(), PumpError>
    where
        S: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        let mut deadline = Instant::now() + self.pong_wait;

        let result = loop {
            let message = match timeout_at(deadline, stream.next()).await {
                Err(_) => break Err(PumpError::ReadTimeout(self.pong_wait)),
                Ok(None) => break Ok(()),
                Ok(Some(Err(e))) => break Err(PumpError::Transport(e.to_string())),
                Ok(Some(Ok(message))) => message,
            };

            match message {
                Message::Text(text) => {
                    if let Err(e) = self.handle_text(&text).await {
                        break Err(e);
                    }
                }
                Message::Pong(_) => {
                    deadline = Instant::now() + self.pong_wait;
                }
                Message::Close(_) => break Ok(()),
                Message::Ping(_) => {}
                Message::Binary(data) => {
                    tracing::debug!(connection_id = %self.id, bytes = data.len(), "Binary frame ignored");
                }
            }
        };

        if self.hub.unregister(self.id.clone()).await.is_err() {
            tracing::debug!(connection_id = %self.id, "Hub gone before unregister");
        }
        result
    }

    async fn handle_text(&self, text: &str) -> Result<(), PumpError> {
        if text.len() > self.max_message_size {
            return Err(PumpError::FrameTooLarge {
                size: text.len(),
                limit: self.max_message_size,
            });
        }

        let frame = ClientFrame::decode(text)?;
        self.mirror(&frame)?;

        self.hub
            .dispatch(Envelope {
                room: self.room.clone(),
                origin: self.id.clone(),
                frame,
            })
            .await
            .map_err(|_| PumpError::HubUnavailable)
    }

    /// Queue our own edit so the outbound pump's shadow sees it too
    fn mirror(&self, frame: &ClientFrame) -> Result<(), PumpError> {
        let sender = self.mirror.upgrade().ok_or(PumpError::Evicted)?;
        match sender.try_send(Outbound::Local(frame.clone())) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(PumpError::Backlogged),
            Err(TrySendError::Closed(_)) => Err(PumpError::Evicted),
        }
    }
}

/// Drains the outbound queue onto the socket
pub struct OutboundPump {
    id: ConnectionId,
    shadow: DocumentState,
    queue: mpsc::Receiver<Outbound>,
    /// Own edits seen before the hub's snapshot; `None` once seeded
    unseeded: Option<Vec<ClientFrame>>,
    write_wait: Duration,
    ping_period: Duration,
}

impl OutboundPump {
    pub fn new(id: ConnectionId, queue: mpsc::Receiver<Outbound>, config: &ConnectionConfig) -> Self {
        Self {
            id,
            shadow: DocumentState::default(),
            queue,
            unseeded: Some(Vec::new()),
            write_wait: config.write_wait(),
            ping_period: config.ping_period().max(MIN_PING_PERIOD),
        }
    }

    /// Write until the hub closes the queue or a write fails.
    pub async fn run<K>(mut self, mut sink: K) -> Result<(), PumpError>
    where
        K: Sink<Message> + Unpin,
        K::Error: Display,
    {
        let mut ping = interval_at(Instant::now() + self.ping_period, self.ping_period);

        loop {
            tokio::select! {
                item = self.queue.recv() => match item {
                    Some(item) => self.deliver(&mut sink, item).await?,
                    None => {
                        // Hub closed the queue; best effort goodbye
                        let _ = self.write(&mut sink, Message::Close(None)).await;
                        tracing::debug!(connection_id = %self.id, "Outbound queue closed");
                        return Ok(());
                    }
                },
                _ = ping.tick() => {
                    self.write(&mut sink, Message::Ping(Vec::new())).await?;
                }
            }
        }
    }

    async fn deliver<K>(&mut self, sink: &mut K, item: Outbound) -> Result<(), PumpError>
    where
        K: Sink<Message> + Unpin,
        K::Error: Display,
    {
        match item {
            Outbound::Snapshot(snapshot) => {
                self.shadow = snapshot.into();
                // Own edits read before the hub admitted us are not in the
                // snapshot; the hub applies them after it
                for frame in self.unseeded.take().unwrap_or_default() {
                    frame.apply_to(&mut self.shadow);
                }
                if self.shadow.content().is_empty() {
                    return Ok(());
                }
                let content = self.shadow.content().to_string();
                self.write(sink, Message::Text(content)).await
            }
            Outbound::Local(frame) => {
                match self.unseeded.as_mut() {
                    Some(early) => early.push(frame),
                    None => frame.apply_to(&mut self.shadow),
                }
                Ok(())
            }
            Outbound::Remote(frame) => {
                frame.apply_to(&mut self.shadow);
                let content = self.shadow.content().to_string();
                self.write(sink, Message::Text(content)).await
            }
            Outbound::Roster(json) => self.write(sink, Message::Text(json.to_string())).await,
        }
    }

    async fn write<K>(&self, sink: &mut K, message: Message) -> Result<(), PumpError>
    where
        K: Sink<Message> + Unpin,
        K::Error: Display,
    {
        match timeout(self.write_wait, sink.send(message)).await {
            Err(_) => Err(PumpError::WriteTimeout(self.write_wait)),
            Ok(Err(e)) => Err(PumpError::Transport(e.to_string())),
            Ok(Ok(())) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubConfig;
    use crate::ot::{DocumentSnapshot, Operation};
    use crate::websocket::connection::Connection;
    use crate::websocket::hub::{Hub, HubCommand, HubStats};
    use futures_util::stream;
    use std::convert::Infallible;
    use std::sync::Arc;

    fn config() -> ConnectionConfig {
        ConnectionConfig {
            write_wait_secs: 1,
            pong_wait_secs: 60,
            max_message_size: 512,
            send_queue_capacity: 8,
        }
    }

    /// Sink that forwards every written message into a channel
    fn channel_sink(
        tx: mpsc::UnboundedSender<Message>,
    ) -> impl Sink<Message, Error = Infallible> + Unpin {
        Box::pin(futures_util::sink::unfold(tx, |tx, message: Message| async move {
            let _ = tx.send(message);
            Ok::<_, Infallible>(tx)
        }))
    }

    fn text(message: Message) -> String {
        match message {
            Message::Text(text) => text,
            other => panic!("Expected text frame, got {:?}", other),
        }
    }

    fn inbound_with_probe(
        config: &ConnectionConfig,
    ) -> (InboundPump, mpsc::Receiver<HubCommand>, mpsc::Receiver<Outbound>, mpsc::Sender<Outbound>) {
        let (commands, hub_rx) = mpsc::channel(16);
        let hub = HubHandle::new(commands, Default::default());
        let (sender, queue) = mpsc::channel(config.send_queue_capacity);
        let pump = InboundPump::new(
            "c1".to_string(),
            "r1".to_string(),
            hub,
            sender.downgrade(),
            config,
        );
        (pump, hub_rx, queue, sender)
    }

    #[tokio::test]
    async fn test_outbound_sends_full_content_for_remote_operation() {
        let (sender, queue) = mpsc::channel(8);
        let pump = OutboundPump::new("c1".to_string(), queue, &config());
        let (tx, mut written) = mpsc::unbounded_channel();

        sender
            .send(Outbound::Snapshot(DocumentSnapshot {
                content: "hello".to_string(),
                version: 0,
            }))
            .await
            .unwrap();
        sender
            .send(Outbound::Remote(Arc::new(ClientFrame::Operation(
                Operation::insert(1, "Z", 0, "c2"),
            ))))
            .await
            .unwrap();
        sender
            .send(Outbound::Roster(Arc::from(r#"{"type":"userList","users":[]}"#)))
            .await
            .unwrap();
        drop(sender);

        pump.run(channel_sink(tx)).await.unwrap();

        assert_eq!(text(written.recv().await.unwrap()), "hello");
        assert_eq!(text(written.recv().await.unwrap()), "hZello");
        assert_eq!(
            text(written.recv().await.unwrap()),
            r#"{"type":"userList","users":[]}"#
        );
        assert!(matches!(written.recv().await, Some(Message::Close(None))));
    }

    #[tokio::test]
    async fn test_outbound_local_frames_update_shadow_silently() {
        let (sender, queue) = mpsc::channel(8);
        let pump = OutboundPump::new("c1".to_string(), queue, &config());
        let (tx, mut written) = mpsc::unbounded_channel();

        sender
            .send(Outbound::Snapshot(DocumentSnapshot::default()))
            .await
            .unwrap();
        sender
            .send(Outbound::Local(ClientFrame::Replace("mine".to_string())))
            .await
            .unwrap();
        sender
            .send(Outbound::Remote(Arc::new(ClientFrame::Operation(
                Operation::insert(4, "!", 0, "c2"),
            ))))
            .await
            .unwrap();
        drop(sender);

        pump.run(channel_sink(tx)).await.unwrap();

        assert_eq!(text(written.recv().await.unwrap()), "mine!");
        assert!(matches!(written.recv().await, Some(Message::Close(None))));
        assert!(written.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_outbound_replays_own_edits_made_before_snapshot() {
        let (sender, queue) = mpsc::channel(8);
        let pump = OutboundPump::new("c1".to_string(), queue, &config());
        let (tx, mut written) = mpsc::unbounded_channel();

        // Mirrored before the hub processed the register
        sender
            .send(Outbound::Local(ClientFrame::Operation(Operation::insert(0, "a", 0, "c1"))))
            .await
            .unwrap();
        sender
            .send(Outbound::Snapshot(DocumentSnapshot {
                content: "xyz".to_string(),
                version: 2,
            }))
            .await
            .unwrap();
        sender
            .send(Outbound::Remote(Arc::new(ClientFrame::Operation(
                Operation::insert(4, "!", 3, "c2"),
            ))))
            .await
            .unwrap();
        drop(sender);

        pump.run(channel_sink(tx)).await.unwrap();

        assert_eq!(text(written.recv().await.unwrap()), "axyz");
        assert_eq!(text(written.recv().await.unwrap()), "axyz!");
    }

    #[tokio::test]
    async fn test_outbound_survives_zero_pong_wait() {
        let config = ConnectionConfig {
            pong_wait_secs: 0,
            ..config()
        };
        let (sender, queue) = mpsc::channel(8);
        let pump = OutboundPump::new("c1".to_string(), queue, &config);
        let (tx, mut written) = mpsc::unbounded_channel();
        drop(sender);

        pump.run(channel_sink(tx)).await.unwrap();
        assert!(matches!(written.recv().await, Some(Message::Close(None))));
    }

    #[tokio::test]
    async fn test_late_joiner_sees_edits_applied_before_register() {
        let config = config();
        let (hub, _task) = Hub::spawn(&HubConfig::default());

        let alice = Connection::new("room", Some("alice"), 8);
        let (alice_handle, _alice_in, _alice_out) = alice.into_parts(hub.clone(), &config);
        let alice_id = alice_handle.id.clone();
        hub.register(alice_handle).await.unwrap();

        // Bob's connection exists before alice's first edit lands
        let bob = Connection::new("room", Some("bob"), 8);
        let (bob_handle, _bob_in, bob_out) = bob.into_parts(hub.clone(), &config);
        let bob_id = bob_handle.id.clone();

        hub.dispatch(Envelope {
            room: "room".to_string(),
            origin: alice_id.clone(),
            frame: ClientFrame::Operation(Operation::insert(0, "hello", 0, "a")),
        })
        .await
        .unwrap();
        hub.register(bob_handle).await.unwrap();
        hub.dispatch(Envelope {
            room: "room".to_string(),
            origin: alice_id,
            frame: ClientFrame::Operation(Operation::insert(5, "!", 1, "a")),
        })
        .await
        .unwrap();
        assert_eq!(hub.stats().await.unwrap().connections, 2);

        let (bob_tx, mut bob_written) = mpsc::unbounded_channel();
        let bob_writer = tokio::spawn(bob_out.run(channel_sink(bob_tx)));

        let mut documents = Vec::new();
        while documents.len() < 2 {
            let message = text(bob_written.recv().await.unwrap());
            if !message.starts_with("{\"type\":\"userList\"") {
                documents.push(message);
            }
        }
        assert_eq!(documents, vec!["hello".to_string(), "hello!".to_string()]);
        assert_eq!(hub.room_content("room"), "hello!");

        hub.unregister(bob_id).await.unwrap();
        bob_writer.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_outbound_pings_on_idle() {
        let (sender, queue) = mpsc::channel(8);
        let pump = OutboundPump::new("c1".to_string(), queue, &config());
        let (tx, mut written) = mpsc::unbounded_channel();

        let task = tokio::spawn(pump.run(channel_sink(tx)));
        tokio::time::sleep(config().ping_period() + Duration::from_millis(10)).await;

        assert!(matches!(written.recv().await, Some(Message::Ping(_))));

        drop(sender);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_outbound_stops_on_write_failure() {
        let (sender, queue) = mpsc::channel(8);
        let pump = OutboundPump::new("c1".to_string(), queue, &config());
        let failing = Box::pin(futures_util::sink::unfold((), |_, _message: Message| async {
            Err::<(), _>("socket closed")
        }));

        sender
            .send(Outbound::Remote(Arc::new(ClientFrame::Replace("x".to_string()))))
            .await
            .unwrap();

        let result = pump.run(failing).await;
        assert!(matches!(result, Err(PumpError::Transport(_))));
    }

    #[tokio::test]
    async fn test_inbound_dispatches_and_mirrors_then_unregisters() {
        let config = config();
        let (pump, mut hub_rx, mut queue, _sender) = inbound_with_probe(&config);
        let frames = stream::iter(vec![
            Ok::<_, Infallible>(Message::Text(
                r#"{"type":"insert","position":0,"character":"a","version":0,"clientId":"c1"}"#
                    .to_string(),
            )),
            Ok(Message::Pong(Vec::new())),
            Ok(Message::Text("whole\ndocument".to_string())),
        ]);

        pump.run(frames).await.unwrap();

        match hub_rx.recv().await {
            Some(HubCommand::Dispatch(envelope)) => {
                assert_eq!(envelope.room, "r1");
                assert_eq!(envelope.origin, "c1");
                assert!(matches!(envelope.frame, ClientFrame::Operation(_)));
            }
            other => panic!("Expected dispatch, got {:?}", other),
        }
        match hub_rx.recv().await {
            Some(HubCommand::Dispatch(envelope)) => {
                assert_eq!(envelope.frame, ClientFrame::Replace("whole document".to_string()));
            }
            other => panic!("Expected dispatch, got {:?}", other),
        }
        assert!(matches!(hub_rx.recv().await, Some(HubCommand::Unregister(id)) if id == "c1"));

        assert!(matches!(queue.try_recv(), Ok(Outbound::Local(ClientFrame::Operation(_)))));
        assert!(matches!(queue.try_recv(), Ok(Outbound::Local(ClientFrame::Replace(_)))));
    }

    #[tokio::test]
    async fn test_inbound_malformed_operation_tears_down() {
        let config = config();
        let (pump, mut hub_rx, _queue, _sender) = inbound_with_probe(&config);
        let frames = stream::iter(vec![
            Ok::<_, Infallible>(Message::Text(r#"{"type":"insert","position":0}"#.to_string())),
            Ok(Message::Text("never reached".to_string())),
        ]);

        let result = pump.run(frames).await;
        assert!(matches!(result, Err(PumpError::Decode(_))));
        assert!(matches!(hub_rx.recv().await, Some(HubCommand::Unregister(_))));
        assert!(hub_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_inbound_rejects_oversized_frame() {
        let config = config();
        let (pump, mut hub_rx, _queue, _sender) = inbound_with_probe(&config);
        let frames = stream::iter(vec![Ok::<_, Infallible>(Message::Text("x".repeat(513)))]);

        let result = pump.run(frames).await;
        assert!(matches!(
            result,
            Err(PumpError::FrameTooLarge { size: 513, limit: 512 })
        ));
        assert!(matches!(hub_rx.recv().await, Some(HubCommand::Unregister(_))));
    }

    #[tokio::test]
    async fn test_inbound_stops_when_evicted() {
        let config = config();
        let (pump, mut hub_rx, _queue, sender) = inbound_with_probe(&config);
        drop(sender);

        let frames = stream::iter(vec![Ok::<_, Infallible>(Message::Text("x".to_string()))]);
        let result = pump.run(frames).await;

        assert!(matches!(result, Err(PumpError::Evicted)));
        assert!(matches!(hub_rx.recv().await, Some(HubCommand::Unregister(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_read_timeout_without_pong() {
        let config = config();
        let (pump, mut hub_rx, _queue, _sender) = inbound_with_probe(&config);

        let result = pump.run(stream::pending::<Result<Message, Infallible>>()).await;
        assert!(matches!(result, Err(PumpError::ReadTimeout(_))));
        assert!(matches!(hub_rx.recv().await, Some(HubCommand::Unregister(_))));
    }

    #[tokio::test]
    async fn test_two_connections_converge_through_hub() {
        let config = config();
        let (hub, _task) = Hub::spawn(&HubConfig::default());

        let alice = Connection::new("room", Some("alice"), 8);
        let (alice_handle, alice_in, alice_out) = alice.into_parts(hub.clone(), &config);
        let bob = Connection::new("room", Some("bob"), 8);
        let (bob_handle, _bob_in, bob_out) = bob.into_parts(hub.clone(), &config);
        let bob_id = bob_handle.id.clone();

        hub.register(alice_handle).await.unwrap();
        hub.register(bob_handle).await.unwrap();

        let (alice_tx, _alice_written) = mpsc::unbounded_channel();
        let (bob_tx, mut bob_written) = mpsc::unbounded_channel();
        let alice_writer = tokio::spawn(alice_out.run(channel_sink(alice_tx)));
        let bob_writer = tokio::spawn(bob_out.run(channel_sink(bob_tx)));

        let frames = stream::iter(vec![
            Ok::<_, Infallible>(Message::Text("hello".to_string())),
            Ok(Message::Text(
                r#"{"type":"insert","position":5,"character":"!","version":0,"clientId":"a"}"#
                    .to_string(),
            )),
        ]);
        alice_in.run(frames).await.unwrap();

        // Bob gets two rosters (join, alice leaving) around the two snapshots
        let mut bob_texts = Vec::new();
        while bob_texts.len() < 4 {
            bob_texts.push(text(bob_written.recv().await.unwrap()));
        }
        let documents: Vec<_> = bob_texts
            .iter()
            .filter(|t| !t.starts_with("{\"type\":\"userList\""))
            .cloned()
            .collect();
        assert_eq!(documents, vec!["hello".to_string(), "hello!".to_string()]);

        assert_eq!(hub.room_content("room"), "hello!");
        assert_eq!(hub.snapshot("room").version, 1);
        assert_eq!(hub.stats().await.unwrap(), HubStats { rooms: 1, connections: 1 });

        alice_writer.await.unwrap().unwrap();
        hub.unregister(bob_id).await.unwrap();
        bob_writer.await.unwrap().unwrap();
        assert!(!hub.room_exists("room"));
    }
}
