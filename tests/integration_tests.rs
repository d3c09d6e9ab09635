//! Integration tests for the networked bomb-arena components
//!
//! These tests validate cross-crate interactions over real loopback
//! sockets: framing, the two-player handshake, input fan-in, snapshot
//! fan-out, and client-side reconciliation of server-produced snapshots.

use client::mirror::Mirror;
use client::network::Session;
use server::network::Server;
use server::snapshot;
use server::world::{World, WorldConfig};
use shared::{
    encode_frame, read_message, write_message, Axis, InputAction, Message, WallKind, WorldSnapshot,
};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::sleep;

/// WIRE PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// Every message kind survives a round trip over a real TCP socket.
    #[tokio::test]
    async fn frame_roundtrip_over_tcp() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let messages = vec![
            Message::Welcome { player_id: 1 },
            Message::Input {
                action: InputAction::Move { dx: -1, dy: 1 },
            },
            Message::Input {
                action: InputAction::StopMove { axis: Axis::Y },
            },
            Message::Input {
                action: InputAction::Bomb {},
            },
            Message::Snapshot {
                data: WorldSnapshot {
                    score: 7,
                    game_over: true,
                    ..Default::default()
                },
            },
            Message::Disconnected {
                reason: "bye".to_string(),
            },
        ];

        let sender = messages.clone();
        let writer = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            for msg in &sender {
                write_message(&mut stream, msg).await.unwrap();
            }
            stream
        });

        let (mut stream, _) = listener.accept().await.unwrap();
        for expected in &messages {
            let decoded = read_message(&mut stream).await.unwrap();
            assert_eq!(&decoded, expected);
        }
        writer.await.unwrap();
    }

    /// A frame delivered in two arbitrary chunks decodes exactly like an
    /// unsplit one; the reader suspends until the payload completes.
    #[tokio::test]
    async fn split_delivery_decodes_identically() {
        let msg = Message::Input {
            action: InputAction::Move { dx: 1, dy: 0 },
        };
        let frame = encode_frame(&msg).unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // chop mid-header and mid-payload
        for split in [2usize, 4, frame.len() - 3] {
            let chunk_a = frame[..split].to_vec();
            let chunk_b = frame[split..].to_vec();

            let writer = tokio::spawn(async move {
                let mut stream = TcpStream::connect(addr).await.unwrap();
                stream.write_all(&chunk_a).await.unwrap();
                stream.flush().await.unwrap();
                sleep(Duration::from_millis(20)).await;
                stream.write_all(&chunk_b).await.unwrap();
                stream.flush().await.unwrap();
                stream
            });

            let (mut stream, _) = listener.accept().await.unwrap();
            let decoded = read_message(&mut stream).await.unwrap();
            assert_eq!(decoded, msg, "split at byte {} failed", split);
            writer.await.unwrap();
        }
    }
}

/// SESSION TESTS
mod session_tests {
    use super::*;

    /// Two clients connecting in order receive ids 1 and 2.
    #[tokio::test]
    async fn handshake_assigns_ids_in_acceptance_order() {
        let (server, session1, session2) = connect_sessions().await;

        assert_eq!(session1.player_id(), 1);
        assert_eq!(session2.player_id(), 2);
        assert_eq!(server.player_count(), 2);
    }

    /// Two snapshots arriving before one take yield only the newest; an
    /// immediate second take yields nothing.
    #[tokio::test]
    async fn latest_snapshot_wins() {
        let (mut server, session1, _session2) = connect_sessions().await;

        server
            .broadcast(&Message::Snapshot {
                data: WorldSnapshot {
                    score: 1,
                    ..Default::default()
                },
            })
            .await;
        server
            .broadcast(&Message::Snapshot {
                data: WorldSnapshot {
                    score: 2,
                    ..Default::default()
                },
            })
            .await;
        sleep(Duration::from_millis(50)).await;

        assert_eq!(session1.take_snapshot().unwrap().score, 2);
        assert!(session1.take_snapshot().is_none());
    }

    /// Inputs sent by one connection drain in send order, regardless of
    /// the other connection's interleaved traffic.
    #[tokio::test]
    async fn inbox_is_fifo_per_sender() {
        let (mut server, mut session1, mut session2) = connect_sessions().await;

        session1.send_input(InputAction::Move { dx: 1, dy: 0 }).await;
        session2.send_input(InputAction::Bomb {}).await;
        session1
            .send_input(InputAction::StopMove { axis: Axis::X })
            .await;
        sleep(Duration::from_millis(50)).await;

        let inputs = server.poll_inputs();
        let from_one: Vec<&Message> = inputs
            .iter()
            .filter(|(id, _)| *id == 1)
            .map(|(_, msg)| msg)
            .collect();

        assert_eq!(
            from_one,
            vec![
                &Message::Input {
                    action: InputAction::Move { dx: 1, dy: 0 }
                },
                &Message::Input {
                    action: InputAction::StopMove { axis: Axis::X }
                },
            ]
        );
    }

    /// Losing one peer mid-broadcast prunes it without costing the other
    /// peer its delivery.
    #[tokio::test]
    async fn broadcast_survives_one_dead_peer() {
        let (mut server, mut session1, session2) = connect_sessions().await;

        session1.close().await;
        drop(session1);
        sleep(Duration::from_millis(50)).await;

        // the failure may take a write or two to surface
        let mut score = 10;
        for _ in 0..20 {
            server
                .broadcast(&Message::Snapshot {
                    data: WorldSnapshot {
                        score,
                        ..Default::default()
                    },
                })
                .await;
            server.poll_inputs();
            if server.player_count() == 1 {
                break;
            }
            score += 1;
            sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(server.player_count(), 1);

        // the surviving peer received the same call's message
        sleep(Duration::from_millis(50)).await;
        let latest = session2.take_snapshot().unwrap();
        assert_eq!(latest.score, score);
    }
}

/// END-TO-END SCENARIOS
mod scenario_tests {
    use super::*;

    /// A MOVE from client 1 shows up in the next broadcast as a larger x
    /// with y unchanged.
    #[tokio::test]
    async fn move_intent_advances_player_in_next_snapshot() {
        let (mut server, mut session1, _session2) = connect_sessions().await;
        let mut world = quiet_world();

        server.step(&mut world, 1.0 / 30.0).await;
        sleep(Duration::from_millis(50)).await;
        let before = session1.take_snapshot().unwrap();

        session1.send_input(InputAction::Move { dx: 1, dy: 0 }).await;
        sleep(Duration::from_millis(50)).await;
        server.step(&mut world, 1.0 / 30.0).await;
        sleep(Duration::from_millis(50)).await;
        let after = session1.take_snapshot().unwrap();

        assert!(after.players[&1].x > before.players[&1].x);
        assert_eq!(after.players[&1].y, before.players[&1].y);
    }

    /// A wall present in snapshot N and destroyed before N+1 disappears
    /// from the client mirror's wall map.
    #[tokio::test]
    async fn destroyed_wall_leaves_the_mirror() {
        let mut world = quiet_world();
        world.walls.insert(
            (3, 4),
            server::world::Wall {
                kind: WallKind::Breakable,
                hp: 1,
            },
        );
        let player = world.players.get_mut(&1).unwrap();
        player.x = 3.0 * 48.0;
        player.y = 3.0 * 48.0;

        let mut mirror = Mirror::new();
        world.place_bomb(1);
        mirror.apply(&snapshot::capture(&world));
        assert!(mirror.walls.contains_key(&(3, 4)));

        // fuse runs out, the blast reaches (3,4)
        world.update(2.1);
        mirror.apply(&snapshot::capture(&world));
        assert!(!mirror.walls.contains_key(&(3, 4)));
    }

    /// Applying the same captured snapshot twice leaves the wall map
    /// byte-for-byte unchanged.
    #[tokio::test]
    async fn wall_reconciliation_is_idempotent_on_real_snapshots() {
        let world = World::new(WorldConfig {
            seed: 3,
            ..WorldConfig::default()
        });
        let snap = snapshot::capture(&world);

        let mut mirror = Mirror::new();
        mirror.apply(&snap);
        let count = mirror.walls.len();
        let before: Vec<_> = {
            let mut walls: Vec<_> = mirror.walls.iter().map(|(c, w)| (*c, w.clone())).collect();
            walls.sort_by_key(|(c, _)| *c);
            walls
        };

        mirror.apply(&snap);
        let after: Vec<_> = {
            let mut walls: Vec<_> = mirror.walls.iter().map(|(c, w)| (*c, w.clone())).collect();
            walls.sort_by_key(|(c, _)| *c);
            walls
        };

        assert_eq!(before, after);
        assert_eq!(mirror.walls.len(), count);
    }

    /// Once game_over goes out as true it stays true in every later
    /// broadcast from the same server instance.
    #[tokio::test]
    async fn terminal_flags_persist_across_broadcasts() {
        let (mut server, mut peer1, _peer2) = connect_raw_pair().await;
        let mut world = quiet_world();

        for player in world.players.values_mut() {
            player.hp = 0;
            player.alive = false;
        }

        for _ in 0..3 {
            server.step(&mut world, 1.0 / 30.0).await;
            match read_message(&mut peer1).await.unwrap() {
                Message::Snapshot { data } => assert!(data.game_over),
                other => panic!("expected snapshot, got {}", other.kind()),
            }
        }
    }
}

// --- helpers ---------------------------------------------------------------

/// Binds a server and connects two full client sessions.
async fn connect_sessions() -> (Server, Session, Session) {
    let mut server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap().to_string();

    let sessions = async {
        let session1 = Session::connect(&addr).await.unwrap();
        let session2 = Session::connect(&addr).await.unwrap();
        (session1, session2)
    };
    let (accepted, (session1, session2)) = tokio::join!(server.accept_players(), sessions);
    accepted.unwrap();

    (server, session1, session2)
}

/// Binds a server and connects two raw sockets, welcomes consumed, so a
/// test can observe every broadcast frame instead of only the latest.
async fn connect_raw_pair() -> (Server, TcpStream, TcpStream) {
    let mut server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();

    let peers = async {
        let mut peer1 = TcpStream::connect(addr).await.unwrap();
        assert_eq!(
            read_message(&mut peer1).await.unwrap(),
            Message::Welcome { player_id: 1 }
        );
        let mut peer2 = TcpStream::connect(addr).await.unwrap();
        assert_eq!(
            read_message(&mut peer2).await.unwrap(),
            Message::Welcome { player_id: 2 }
        );
        (peer1, peer2)
    };
    let (accepted, (peer1, peer2)) = tokio::join!(server.accept_players(), peers);
    accepted.unwrap();

    (server, peer1, peer2)
}

/// A deterministic world with no random walls, no power-ups, no enemies.
fn quiet_world() -> World {
    World::new(WorldConfig {
        breakable_density: 0.0,
        powerup_chance: 0.0,
        enemy_count: 0,
        ..WorldConfig::default()
    })
}
