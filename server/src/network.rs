//! Server session manager: accepts the two players, runs their reader tasks,
//! and drives the authoritative tick loop.
//!
//! The listener accepts exactly two connections, assigns ids 1 and 2 in
//! acceptance order, and sends each a `WELCOME` before anything else. Every
//! decoded inbound message is forwarded onto one inbox channel tagged with
//! the sender's id; the game-loop task drains that channel non-blockingly
//! once per tick, so world mutation never waits on the network.

use crate::client_manager::{Client, ClientManager};
use crate::snapshot;
use crate::world::World;
use log::{debug, info, warn};
use shared::{read_message, write_message, Message, ProtocolError};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{interval, Instant, MissedTickBehavior};

/// Number of players a match is played with; accepts stop at this count.
pub const PLAYER_COUNT: u32 = 2;

/// Largest delta time a single tick is allowed to integrate.
const MAX_DT: f32 = 1.0 / 10.0;

/// Lifecycle of a server session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Bound and listening, nobody connected yet.
    Listening,
    /// Waiting for the player with this id to connect.
    AwaitingPlayer(u32),
    /// Both players connected, tick loop may run.
    Running,
    /// Shut down; no further accepts or broadcasts.
    Closed,
}

/// Event fed from a reader task to the game-loop task.
///
/// Reader tasks never touch the client registry directly; a dead reader
/// reports itself here and is pruned when the event is drained.
#[derive(Debug)]
enum InboxEvent {
    Message { player_id: u32, message: Message },
    ReaderClosed { player_id: u32 },
}

/// One server session: listener, client registry, inbox, tick loop.
pub struct Server {
    listener: Option<TcpListener>,
    phase: Phase,
    clients: ClientManager,
    inbox_tx: mpsc::UnboundedSender<InboxEvent>,
    inbox_rx: mpsc::UnboundedReceiver<InboxEvent>,
}

impl Server {
    /// Binds the listener and enters the `Listening` phase.
    pub async fn bind(addr: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Listening on {}", listener.local_addr()?);

        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Ok(Server {
            listener: Some(listener),
            phase: Phase::Listening,
            clients: ClientManager::new(),
            inbox_tx,
            inbox_rx,
        })
    }

    /// Address the listener is bound to, while it is still open.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match &self.listener {
            Some(listener) => listener.local_addr(),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "listener already closed",
            )),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Number of currently connected players.
    pub fn player_count(&self) -> usize {
        self.clients.len()
    }

    /// Accepts exactly two connections in sequence.
    ///
    /// Each accepted connection is assigned the next player id, sent
    /// `Welcome{player_id}` immediately, and upgraded into a background
    /// reader feeding the inbox. The listener is dropped after the second
    /// accept, so a third connection attempt is refused by the OS rather
    /// than left queued. A failure while accepting or welcoming aborts
    /// startup; there is no slot reuse.
    pub async fn accept_players(&mut self) -> Result<(), ProtocolError> {
        let listener = self.listener.take().ok_or_else(|| {
            ProtocolError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "listener already closed",
            ))
        })?;

        for player_id in 1..=PLAYER_COUNT {
            self.phase = Phase::AwaitingPlayer(player_id);

            let (stream, addr) = listener.accept().await?;
            stream.set_nodelay(true)?;
            info!("Accepted player {} from {}", player_id, addr);

            let (reader, mut writer) = stream.into_split();
            write_message(&mut writer, &Message::Welcome { player_id }).await?;

            self.clients.add_client(Client::new(player_id, addr, writer));
            self.spawn_reader(player_id, reader);
        }

        // dropping the listener here closes the accept queue
        self.phase = Phase::Running;
        info!("Both players connected, session running");
        Ok(())
    }

    fn spawn_reader(&self, player_id: u32, mut reader: OwnedReadHalf) {
        let inbox = self.inbox_tx.clone();
        tokio::spawn(async move {
            loop {
                match read_message(&mut reader).await {
                    Ok(message) => {
                        debug!("Player {} sent {}", player_id, message.kind());
                        if inbox
                            .send(InboxEvent::Message { player_id, message })
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!("Reader for player {} stopped: {}", player_id, err);
                        let _ = inbox.send(InboxEvent::ReaderClosed { player_id });
                        break;
                    }
                }
            }
        });
    }

    /// Drains everything currently queued, never blocking.
    ///
    /// Messages come back FIFO per sender. Reader-termination events
    /// consumed during the drain prune the registry as a side effect, so
    /// a dead peer is observed here rather than as an error anywhere else.
    pub fn poll_inputs(&mut self) -> Vec<(u32, Message)> {
        let mut inputs = Vec::new();
        while let Ok(event) = self.inbox_rx.try_recv() {
            match event {
                InboxEvent::Message { player_id, message } => {
                    inputs.push((player_id, message));
                }
                InboxEvent::ReaderClosed { player_id } => {
                    self.clients.remove_client(player_id);
                }
            }
        }
        inputs
    }

    /// Best-effort send to every connected client; failing clients are
    /// pruned and the rest still receive the message in the same call.
    pub async fn broadcast(&mut self, msg: &Message) {
        let dropped = self.clients.broadcast(msg).await;
        for id in dropped {
            warn!("Player {} lost during broadcast", id);
        }
    }

    /// The authoritative tick loop.
    ///
    /// Once per tick: drain pending inputs into world mutations, advance
    /// the world by the measured (capped) delta, capture a snapshot, and
    /// broadcast it. The loop keeps ticking with an empty client set; it
    /// only exits on Ctrl+C, broadcasting `DISCONNECTED` on the way out.
    pub async fn run(&mut self, world: &mut World, tick_rate: u32) {
        let mut ticker = interval(Duration::from_secs_f32(1.0 / tick_rate as f32));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // the first tick fires immediately
        ticker.tick().await;

        let mut last_tick = Instant::now();
        let mut tick_count: u64 = 0;
        info!("Tick loop running at {} Hz", tick_rate);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Instant::now();
                    let dt = (now - last_tick).as_secs_f32().min(MAX_DT);
                    last_tick = now;

                    self.step(world, dt).await;

                    tick_count += 1;
                    if tick_count % (tick_rate as u64 * 10) == 0 {
                        debug!(
                            "Tick {}: {} clients, score {}",
                            tick_count,
                            self.clients.len(),
                            world.score
                        );
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown requested");
                    self.broadcast(&Message::Disconnected {
                        reason: "server shutting down".to_string(),
                    })
                    .await;
                    self.phase = Phase::Closed;
                    return;
                }
            }
        }
    }

    /// One tick body: drain, mutate, advance, capture, broadcast.
    pub async fn step(&mut self, world: &mut World, dt: f32) {
        for (player_id, message) in self.poll_inputs() {
            match message {
                Message::Input { action } => world.apply_input(player_id, &action),
                other => debug!(
                    "Ignoring unexpected {} from player {}",
                    other.kind(),
                    player_id
                ),
            }
        }

        world.update(dt);

        let data = snapshot::capture(world);
        self.broadcast(&Message::Snapshot { data }).await;
    }
}
