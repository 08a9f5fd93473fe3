//! # Arena Client Library
//!
//! A terminal client for the arena server. The user types commands at a
//! prompt; they are turned into protocol requests and sent over UDP.
//! Replies and unsolicited pushes (private messages, battle results) are
//! printed as they arrive.
//!
//! ## Architecture Overview
//!
//! Three activities share one socket:
//!
//! ### Input Loop
//! Reads lines from stdin, parses them with [`shell::ShellCommand`] and sends
//! the resulting request. Passwords are hashed locally before they leave the
//! machine.
//!
//! ### Listener Task
//! Receives every datagram from the server and prints it through the
//! [`console::Console`], which redraws the prompt so pushes do not corrupt
//! what the user is typing.
//!
//! ### Heartbeat Task
//! Once a login succeeds, sends `HEARTBEAT` at a fixed interval so the
//! server keeps the session alive while the user is idle.
//!
//! Both tasks watch a cancellation token and are joined within a bounded
//! window on shutdown.
//!
//! ## Module Organization
//!
//! ### Shell Module (`shell`)
//! Command syntax, usage errors and password hashing.
//!
//! ### Console Module (`console`)
//! Synchronized terminal output and reply formatting.
//!
//! ### Network Module (`network`)
//! The [`network::Client`], its background tasks and shutdown.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::console::Console;
//! use client::network::{Client, ClientConfig};
//! use std::sync::Arc;
//! use tokio::io::BufReader;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let console = Arc::new(Console::stdout());
//!     let client = Client::connect(&ClientConfig::default(), console).await?;
//!
//!     client.run_shell(BufReader::new(tokio::io::stdin())).await?;
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod console;
pub mod network;
pub mod shell;
