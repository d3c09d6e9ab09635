//! Client session: handshake, background reader, latest-wins snapshot slot.
//!
//! The reader task is the only consumer of the socket's read half. It sorts
//! inbound traffic into two lanes: `SNAPSHOT` messages overwrite a
//! single-slot buffer (only the newest state matters, older unconsumed
//! snapshots are dropped on purpose), everything else is queued FIFO for the
//! application to drain. Network failures never surface as errors into the
//! consuming loop; the session just goes dead and stays dead.

use log::{debug, info, warn};
use shared::{encode_frame, read_message, InputAction, Message, ProtocolError, WorldSnapshot};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// State shared between the reader task and the session handle.
#[derive(Default)]
struct Shared {
    /// Latest-wins slot: each write replaces any unread previous snapshot.
    snapshot: Mutex<Option<WorldSnapshot>>,
    /// Non-snapshot messages, in arrival order.
    control: Mutex<VecDeque<Message>>,
    alive: AtomicBool,
}

/// One connection to the server, from handshake to death.
pub struct Session {
    player_id: u32,
    writer: OwnedWriteHalf,
    shared: Arc<Shared>,
    closed: bool,
}

impl Session {
    /// Dials the server and performs the identity handshake.
    ///
    /// The first inbound message must be `Welcome`; anything else is a
    /// fatal [`ProtocolError::Handshake`] and the connection is dropped.
    /// On success the background reader is running and the assigned player
    /// id is stored for the lifetime of the session.
    pub async fn connect(addr: &str) -> Result<Self, ProtocolError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (mut reader, writer) = stream.into_split();

        let player_id = match read_message(&mut reader).await? {
            Message::Welcome { player_id } => player_id,
            other => return Err(ProtocolError::Handshake(other.kind().to_string())),
        };
        info!("Connected to {} as player {}", addr, player_id);

        let shared = Arc::new(Shared {
            alive: AtomicBool::new(true),
            ..Shared::default()
        });
        Self::spawn_reader(reader, Arc::clone(&shared));

        Ok(Session {
            player_id,
            writer,
            shared,
            closed: false,
        })
    }

    fn spawn_reader(mut reader: OwnedReadHalf, shared: Arc<Shared>) {
        tokio::spawn(async move {
            loop {
                match read_message(&mut reader).await {
                    Ok(Message::Snapshot { data }) => {
                        // overwrite, never queue: only the newest state
                        // is worth applying
                        *shared.snapshot.lock().unwrap() = Some(data);
                    }
                    Ok(msg @ Message::Disconnected { .. }) => {
                        info!("Server ended the session: {}", msg.kind());
                        shared.control.lock().unwrap().push_back(msg);
                        shared.alive.store(false, Ordering::Release);
                        break;
                    }
                    Ok(msg) => {
                        debug!("Queued control message {}", msg.kind());
                        shared.control.lock().unwrap().push_back(msg);
                    }
                    Err(err) => {
                        warn!("Reader stopped: {}", err);
                        shared.alive.store(false, Ordering::Release);
                        break;
                    }
                }
            }
        });
    }

    /// Player id assigned by the server at accept time.
    pub fn player_id(&self) -> u32 {
        self.player_id
    }

    /// Whether the connection is still usable.
    pub fn is_alive(&self) -> bool {
        self.shared.alive.load(Ordering::Acquire)
    }

    /// Best-effort input send.
    ///
    /// A no-op once the session is dead. A write failure marks the session
    /// dead and closes the socket instead of surfacing an error; callers
    /// notice through [`Session::is_alive`] at their own pace.
    pub async fn send_input(&mut self, action: InputAction) {
        if !self.is_alive() {
            return;
        }

        let msg = Message::Input { action };
        let frame = match encode_frame(&msg) {
            Ok(frame) => frame,
            Err(err) => {
                warn!("Failed to encode input: {}", err);
                return;
            }
        };

        let result = async {
            self.writer.write_all(&frame).await?;
            self.writer.flush().await
        }
        .await;

        if let Err(err) = result {
            warn!("Send failed, marking session dead: {}", err);
            self.shared.alive.store(false, Ordering::Release);
            self.close().await;
        }
    }

    /// Atomically takes and clears the latest snapshot.
    ///
    /// Returns `None` when nothing new arrived since the last call. This is
    /// the client's only simulation-advance signal; two snapshots arriving
    /// between calls yield only the second.
    pub fn take_snapshot(&self) -> Option<WorldSnapshot> {
        self.shared.snapshot.lock().unwrap().take()
    }

    /// Next queued control message, in arrival order.
    pub fn poll_control(&self) -> Option<Message> {
        self.shared.control.lock().unwrap().pop_front()
    }

    /// Shuts the write half down. Idempotent.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.shared.alive.store(false, Ordering::Release);
        let _ = self.writer.shutdown().await;
        info!("Session closed");
    }
}
