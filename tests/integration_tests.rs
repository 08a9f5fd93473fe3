//! Integration tests for the arena server and client
//!
//! These tests run a real server on a loopback socket and talk to it over UDP.

use server::network::{Server, ServerConfig};
use server::store::{AccountStore, MemoryBackend};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

struct TestServer {
    addr: SocketAddr,
    backend: MemoryBackend,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Server>,
}

impl TestServer {
    async fn start(session_ttl: Duration) -> Self {
        let backend = MemoryBackend::new();
        let store = AccountStore::open(Box::new(backend.clone())).unwrap();
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            session_ttl,
            poll_interval: Duration::from_millis(50),
        };

        let mut server = Server::new(&config, store).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            server
                .run_until(async {
                    let _ = stopped.await;
                })
                .await;
            server
        });

        TestServer {
            addr,
            backend,
            stop: Some(stop),
            handle,
        }
    }

    async fn stop(mut self) -> Server {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        timeout(Duration::from_secs(2), self.handle)
            .await
            .expect("server did not stop")
            .unwrap()
    }
}

/// One terminal talking to the server
struct Player {
    socket: UdpSocket,
    server: SocketAddr,
}

impl Player {
    async fn new(server: SocketAddr) -> Self {
        Player {
            socket: UdpSocket::bind("127.0.0.1:0").await.unwrap(),
            server,
        }
    }

    async fn send(&self, payload: &str) {
        self.socket
            .send_to(payload.as_bytes(), self.server)
            .await
            .unwrap();
    }

    async fn recv(&self) -> Option<String> {
        let mut buf = [0u8; 4096];
        match timeout(Duration::from_millis(500), self.socket.recv_from(&mut buf)).await {
            Ok(Ok((len, _))) => Some(String::from_utf8_lossy(&buf[..len]).into_owned()),
            _ => None,
        }
    }

    async fn request(&self, payload: &str) -> String {
        self.send(payload).await;
        self.recv()
            .await
            .unwrap_or_else(|| panic!("no reply to {}", payload))
    }

    async fn join(server: SocketAddr, name: &str, stats: &str) -> Self {
        let player = Player::new(server).await;
        let password = client::shell::hash_password(name);
        assert!(player
            .request(&format!("SIGNUP {} {}", name, password))
            .await
            .starts_with("SIGNUP_SUCCESS"));
        assert!(player
            .request(&format!("LOGIN {} {}", name, password))
            .await
            .starts_with("LOGIN_SUCCESS"));
        assert_eq!(player.request(stats).await, "SET_STATS_SUCCESS");
        player
    }
}

/// END-TO-END PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// Walks one player through signup, login and stat selection
    #[tokio::test]
    async fn signup_login_and_stats_scenario() {
        let server = TestServer::start(Duration::from_secs(15)).await;
        let player = Player::new(server.addr).await;

        assert_eq!(player.request("SIGNUP alice h").await, "SIGNUP_SUCCESS 1");
        assert_eq!(player.request("LOGIN alice h").await, "LOGIN_SUCCESS 1");
        assert_eq!(player.request("LOGINS").await, "LOGINS_COUNT 1");
        assert_eq!(player.request("SET_STATS:2,1,3,4").await, "SET_STATS_SUCCESS");
        assert_eq!(player.request("GET_STATS").await, "GET_STATS_SUCCESS 2,1,3,4,2");

        let saved = server.backend.snapshot();
        let record = saved.get("1").expect("account persisted");
        assert_eq!(record.username, "alice");
        assert_eq!(record.login_count, 1);
        assert_eq!(record.stats.map(|s| s.health), Some(2));

        server.stop().await;
    }

    #[tokio::test]
    async fn duplicate_signup_and_bad_password() {
        let server = TestServer::start(Duration::from_secs(15)).await;
        let player = Player::new(server.addr).await;

        player.request("SIGNUP alice h").await;
        assert_eq!(player.request("SIGNUP alice x").await, "SIGNUP_FAIL Username taken");
        assert_eq!(
            player.request("LOGIN alice wrong").await,
            "LOGIN_FAIL Invalid credentials"
        );

        server.stop().await;
    }

    #[tokio::test]
    async fn unknown_verb_gets_no_reply() {
        let server = TestServer::start(Duration::from_secs(15)).await;
        let player = Player::new(server.addr).await;

        player.send("DANCE now").await;
        assert_eq!(player.recv().await, None);

        // The server is still alive afterwards
        assert_eq!(player.request("SIGNUP alice h").await, "SIGNUP_SUCCESS 1");

        server.stop().await;
    }

    #[tokio::test]
    async fn commands_without_session_are_rejected() {
        let server = TestServer::start(Duration::from_secs(15)).await;
        let player = Player::new(server.addr).await;

        for command in ["GET_STATS", "LOGINS", "LIST_USERS", "ATTACK bob", "SET_STATS:1,1,1,1"] {
            assert_eq!(player.request(command).await, "ERROR Not logged in");
        }

        server.stop().await;
    }
}

/// MULTI-PLAYER TESTS
mod multiplayer_tests {
    use super::*;

    #[tokio::test]
    async fn private_message_is_relayed() {
        let server = TestServer::start(Duration::from_secs(15)).await;
        let alice = Player::join(server.addr, "alice", "SET_STATS:1,1,1,1").await;
        let bob = Player::join(server.addr, "bob", "SET_STATS:1,1,1,1").await;

        alice.send("P2P_MESSAGE bob hello   there").await;
        assert_eq!(
            bob.recv().await.as_deref(),
            Some("P2P_MESSAGE_FROM alice:hello   there")
        );
        assert_eq!(alice.recv().await, None);

        assert_eq!(
            alice.request("P2P_MESSAGE carol hi").await,
            "P2P_FAIL User not online"
        );

        let users = alice.request("LIST_USERS").await;
        assert_eq!(users, "LIST_USERS_SUCCESS alice,bob");

        server.stop().await;
    }

    #[tokio::test]
    async fn battle_result_reaches_both_players() {
        let server = TestServer::start(Duration::from_secs(15)).await;
        let alice = Player::join(server.addr, "alice", "SET_STATS:3,0,0,0").await;
        let bob = Player::join(server.addr, "bob", "SET_STATS:0,3,0,0").await;

        alice.send("ATTACK bob").await;
        let attacker_view = alice.recv().await.expect("attacker result");
        let defender_view = bob.recv().await.expect("defender result");

        // A 3 sword against a 3 shield never lands, so neither side can win
        assert!(attacker_view.starts_with("BATTLE_RESULT DRAW:"));
        assert!(defender_view.starts_with("BATTLE_RESULT DRAW:"));
        assert!(attacker_view.ends_with("Draw after 20 turns"));

        assert_eq!(alice.request("GET_STATS").await, "GET_STATS_SUCCESS 3,0,0,0,2");
        assert_eq!(bob.request("GET_STATS").await, "GET_STATS_SUCCESS 0,3,0,0,2");

        server.stop().await;
    }

    #[tokio::test]
    async fn loser_health_is_written_back() {
        let server = TestServer::start(Duration::from_secs(15)).await;
        let alice = Player::join(server.addr, "alice", "SET_STATS:3,0,0,0").await;
        let bob = Player::join(server.addr, "bob", "SET_STATS:0,0,0,0").await;

        alice.send("ATTACK bob").await;
        assert_eq!(
            alice.recv().await.as_deref(),
            Some(concat!(
                "BATTLE_RESULT WIN:",
                "Turn 1: alice hits bob for 3 damage (bob health 0) | alice wins"
            ))
        );
        assert!(bob.recv().await.unwrap().starts_with("BATTLE_RESULT LOSE:"));

        assert_eq!(bob.request("GET_STATS").await, "GET_STATS_SUCCESS 0,0,0,0,0");
        assert_eq!(
            alice.request("ATTACK bob").await,
            "ATTACK_FAIL target has no lives left"
        );
        assert_eq!(
            bob.request("ATTACK alice").await,
            "ATTACK_FAIL no lives left"
        );

        server.stop().await;
    }
}

/// SESSION LIFETIME TESTS
mod session_tests {
    use super::*;

    #[tokio::test]
    async fn silent_session_is_evicted() {
        let server = TestServer::start(Duration::from_millis(300)).await;
        let player = Player::new(server.addr).await;
        player.request("SIGNUP alice h").await;
        player.request("LOGIN alice h").await;

        sleep(Duration::from_millis(900)).await;
        assert_eq!(player.request("GET_STATS").await, "ERROR Not logged in");

        let server = server.stop().await;
        assert!(server.dispatcher().sessions().is_empty());
    }

    #[tokio::test]
    async fn heartbeats_keep_session_alive() {
        let server = TestServer::start(Duration::from_millis(300)).await;
        let player = Player::new(server.addr).await;
        player.request("SIGNUP alice h").await;
        player.request("LOGIN alice h").await;

        for _ in 0..8 {
            sleep(Duration::from_millis(100)).await;
            player.send("HEARTBEAT").await;
        }
        assert_eq!(player.request("LOGINS").await, "LOGINS_COUNT 1");

        server.stop().await;
    }

    /// The real client keeps its session alive on its own
    #[tokio::test]
    async fn client_heartbeat_task_keeps_session_alive() {
        use client::console::Console;
        use client::network::{Client, ClientConfig};
        use std::sync::Arc;

        let server = TestServer::start(Duration::from_millis(400)).await;
        let setup = Player::new(server.addr).await;
        setup
            .request(&format!("SIGNUP alice {}", client::shell::hash_password("pw")))
            .await;

        let config = ClientConfig {
            server_addr: server.addr.to_string(),
            heartbeat_interval: Duration::from_millis(100),
        };
        let console = Arc::new(Console::new(Box::new(std::io::sink())));
        let client = Client::connect(&config, console).await.unwrap();

        client.run_shell(&b"login alice pw\n"[..]).await.unwrap();
        sleep(Duration::from_millis(200)).await;
        assert!(client.is_logged_in());

        sleep(Duration::from_millis(1000)).await;
        client.shutdown().await;

        let server = server.stop().await;
        assert_eq!(server.dispatcher().sessions().len(), 1);
    }
}
