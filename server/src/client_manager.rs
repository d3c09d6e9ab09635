//! Client registry and snapshot fan-out for the game server
//!
//! This module owns the write half of every accepted connection:
//! - Tracking which player ids are currently connected
//! - Sending framed messages to all clients in one pass
//! - Pruning clients whose sockets fail, so a dead peer never
//!   stalls or poisons the broadcast path
//!
//! Read halves live in per-connection reader tasks elsewhere; by owning the
//! write halves here, exactly one component ever writes to a given socket.

use log::{info, warn};
use shared::{encode_frame, Message};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;

/// A connected player from the server's point of view
///
/// Holds the connection metadata and the only handle that may write to
/// this player's socket.
#[derive(Debug)]
pub struct Client {
    /// Player id assigned at accept time (1 or 2)
    pub player_id: u32,
    /// Remote address, kept for log messages
    pub addr: SocketAddr,
    /// Write half of the player's TCP stream
    pub writer: OwnedWriteHalf,
}

impl Client {
    /// Wraps an accepted connection's write half into a tracked client
    pub fn new(player_id: u32, addr: SocketAddr, writer: OwnedWriteHalf) -> Self {
        Self {
            player_id,
            addr,
            writer,
        }
    }
}

/// Registry of connected clients, keyed and iterated by player id
///
/// All sends go through [`ClientManager::broadcast`], which treats write
/// failures as disconnects: the failing client is logged, removed, and the
/// remaining clients keep receiving traffic.
#[derive(Debug, Default)]
pub struct ClientManager {
    clients: BTreeMap<u32, Client>,
}

impl ClientManager {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self {
            clients: BTreeMap::new(),
        }
    }

    /// Registers a client under its player id
    pub fn add_client(&mut self, client: Client) {
        info!("Client {} registered from {}", client.player_id, client.addr);
        self.clients.insert(client.player_id, client);
    }

    /// Removes a client, returning whether it was present
    ///
    /// Dropping the client closes the write half; the paired reader task
    /// notices on its own when the socket dies.
    pub fn remove_client(&mut self, player_id: u32) -> bool {
        let removed = self.clients.remove(&player_id).is_some();
        if removed {
            info!("Client {} removed", player_id);
        }
        removed
    }

    /// Whether the given player id is currently connected
    pub fn contains(&self, player_id: u32) -> bool {
        self.clients.contains_key(&player_id)
    }

    /// Connected player ids in ascending order
    pub fn player_ids(&self) -> Vec<u32> {
        self.clients.keys().cloned().collect()
    }

    /// Number of connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no clients are connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Sends one message to every connected client, best effort
    ///
    /// The message is encoded once and the same frame is written to each
    /// socket. Clients whose write fails are removed after the pass and
    /// their ids returned; with no clients connected this is a no-op.
    pub async fn broadcast(&mut self, msg: &Message) -> Vec<u32> {
        let frame = match encode_frame(msg) {
            Ok(frame) => frame,
            Err(err) => {
                warn!("Failed to encode {} broadcast: {}", msg.kind(), err);
                return Vec::new();
            }
        };

        let mut dropped = Vec::new();
        for (id, client) in self.clients.iter_mut() {
            let result = async {
                client.writer.write_all(&frame).await?;
                client.writer.flush().await
            }
            .await;

            if let Err(err) = result {
                warn!("Dropping client {} ({}): {}", id, client.addr, err);
                dropped.push(*id);
            }
        }

        for id in &dropped {
            self.clients.remove(id);
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::read_message;
    use std::time::Duration;
    use tokio::net::{TcpListener, TcpStream};

    /// Returns a registered client plus the peer end of its socket.
    async fn connected_client(player_id: u32) -> (Client, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let peer = TcpStream::connect(addr).await.unwrap();
        let (stream, remote) = listener.accept().await.unwrap();
        let (_, writer) = stream.into_split();

        (Client::new(player_id, remote, writer), peer)
    }

    #[test]
    fn test_manager_starts_empty() {
        let manager = ClientManager::new();
        assert!(manager.is_empty());
        assert_eq!(manager.len(), 0);
        assert!(manager.player_ids().is_empty());
    }

    #[tokio::test]
    async fn test_add_and_remove_client() {
        let (client, _peer) = connected_client(1).await;
        let mut manager = ClientManager::new();

        manager.add_client(client);
        assert!(manager.contains(1));
        assert_eq!(manager.len(), 1);

        assert!(manager.remove_client(1));
        assert!(!manager.remove_client(1));
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_player_ids_come_back_sorted() {
        let (second, _peer2) = connected_client(2).await;
        let (first, _peer1) = connected_client(1).await;

        let mut manager = ClientManager::new();
        manager.add_client(second);
        manager.add_client(first);

        assert_eq!(manager.player_ids(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_client() {
        let (client1, mut peer1) = connected_client(1).await;
        let (client2, mut peer2) = connected_client(2).await;

        let mut manager = ClientManager::new();
        manager.add_client(client1);
        manager.add_client(client2);

        let msg = Message::Welcome { player_id: 7 };
        let dropped = manager.broadcast(&msg).await;
        assert!(dropped.is_empty());

        assert_eq!(read_message(&mut peer1).await.unwrap(), msg);
        assert_eq!(read_message(&mut peer2).await.unwrap(), msg);
    }

    #[tokio::test]
    async fn test_broadcast_with_no_clients_is_noop() {
        let mut manager = ClientManager::new();
        let dropped = manager.broadcast(&Message::Welcome { player_id: 1 }).await;
        assert!(dropped.is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_prunes_dead_client_and_keeps_rest() {
        let (client1, peer1) = connected_client(1).await;
        let (client2, mut peer2) = connected_client(2).await;

        let mut manager = ClientManager::new();
        manager.add_client(client1);
        manager.add_client(client2);

        drop(peer1);
        tokio::time::sleep(Duration::from_millis(50)).await;

        // the first write after a hangup may still land in the socket
        // buffer, so keep broadcasting until the failure surfaces
        let msg = Message::Disconnected {
            reason: "test".to_string(),
        };
        let mut dropped = Vec::new();
        for _ in 0..20 {
            dropped = manager.broadcast(&msg).await;
            if !dropped.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert_eq!(dropped, vec![1]);
        assert!(!manager.contains(1));
        assert!(manager.contains(2));

        // the surviving client saw every broadcast
        let first = read_message(&mut peer2).await.unwrap();
        assert_eq!(first, msg);
    }
}
