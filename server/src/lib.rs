//! # Arena Server Library
//!
//! This library provides the authoritative server for the two-player arena
//! game. It turns a stream of unreliable, connectionless UDP datagrams into
//! authenticated, stateful interactions: accounts, sessions, stat
//! progression and turn-based battles.
//!
//! ## Core Responsibilities
//!
//! ### Authentication
//! Accounts are created with SIGNUP and bound to a client address with
//! LOGIN. Passwords arrive already hashed by the client; the server only
//! compares the opaque hash strings.
//!
//! ### Session Management
//! Handles the lifecycle of logged-in addresses:
//! - Session creation on LOGIN, replacement on re-LOGIN from the same address
//! - Activity tracking on every authenticated command, HEARTBEAT included
//! - Silent eviction of sessions idle past the TTL
//!
//! ### Battle Arbitration
//! ATTACK runs a deterministic, turn-alternating simulation from the stored
//! stats of both players and writes the resulting health back.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Event Loop
//! One loop alternates between a bounded receive and command handling. The
//! receive timeout is the only suspension point and exists so idle sessions
//! can be swept even when nobody is sending. No locks are needed around the
//! account store or the session table.
//!
//! ### Text Protocol over UDP
//! Requests and replies are single ASCII lines (see [`shared::protocol`]).
//! Delivery is best effort; there is no retransmission or ordering.
//!
//! ## Module Organization
//!
//! ### Transport Module (`transport`)
//! The UDP socket with a bounded receive that yields a timeout tick.
//!
//! ### Store Module (`store`)
//! Durable accounts behind an injected persistence backend (JSON or bincode
//! file, or memory for tests).
//!
//! ### Session Module (`session`)
//! Transient address to account bindings and the idle sweep.
//!
//! ### Dispatcher Module (`dispatcher`)
//! Parsing, the authenticated/unauthenticated state check and all command
//! handlers. Pure with respect to I/O: it returns the datagrams to send.
//!
//! ### Battle Module (`battle`)
//! The battle resolver, a pure function of two stat snapshots.
//!
//! ### Network Module (`network`)
//! The [`network::Server`] loop tying everything together.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//! use server::store::{AccountStore, FileBackend, StoreFormat};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = FileBackend::new("server_db.json", StoreFormat::Json);
//!     let store = AccountStore::open_or_empty(Box::new(backend));
//!
//!     let mut server = Server::new(&ServerConfig::default(), store).await?;
//!     server
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await;
//!     Ok(())
//! }
//! ```

pub mod battle;
pub mod dispatcher;
pub mod network;
pub mod session;
pub mod store;
pub mod transport;
