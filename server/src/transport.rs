//! Datagram transport for the server loop
//!
//! Wraps a single UDP socket. `receive` never waits longer than the poll
//! interval so the caller gets a regular [`Received::Timeout`] tick for
//! maintenance even when nobody is talking.

use log::debug;
use shared::MAX_DATAGRAM_SIZE;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// Shortest accepted poll interval; anything lower would spin the loop
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Result of one bounded receive
#[derive(Debug)]
pub enum Received {
    Datagram { payload: String, addr: SocketAddr },
    Timeout,
    Error(io::Error),
}

pub struct Transport {
    socket: UdpSocket,
    poll_interval: Duration,
    buffer: Box<[u8]>,
}

impl Transport {
    pub async fn bind(addr: &str, poll_interval: Duration) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self::from_socket(socket, poll_interval))
    }

    pub fn from_socket(socket: UdpSocket, poll_interval: Duration) -> Self {
        Self {
            socket,
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
            buffer: vec![0u8; MAX_DATAGRAM_SIZE].into_boxed_slice(),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Waits up to one poll interval for a datagram
    ///
    /// Payloads are decoded lossily; anything that is not the ASCII
    /// protocol fails verb recognition further up.
    pub async fn receive(&mut self) -> Received {
        match timeout(self.poll_interval, self.socket.recv_from(&mut self.buffer)).await {
            Ok(Ok((len, addr))) => {
                let payload = String::from_utf8_lossy(&self.buffer[..len]).into_owned();
                debug!("Received {} bytes from {}", len, addr);
                Received::Datagram { payload, addr }
            }
            Ok(Err(e)) => Received::Error(e),
            Err(_) => Received::Timeout,
        }
    }

    pub async fn send(&self, addr: SocketAddr, payload: &str) -> io::Result<()> {
        self.socket.send_to(payload.as_bytes(), addr).await?;
        Ok(())
    }
}
