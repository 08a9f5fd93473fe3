//! Server loop coordinating the transport, dispatcher and timeout sweeper

use crate::dispatcher::{Dispatcher, Outbound};
use crate::session::SessionTable;
use crate::store::AccountStore;
use crate::transport::{Received, Transport};
use log::{debug, error, info};
use shared::{DEFAULT_PORT, POLL_INTERVAL, SESSION_TTL};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Runtime settings for [`Server`]
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the UDP socket binds to
    pub bind_addr: String,
    /// Idle time before a session is evicted
    pub session_ttl: Duration,
    /// Longest a single receive may block
    pub poll_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("127.0.0.1:{}", DEFAULT_PORT),
            session_ttl: SESSION_TTL,
            poll_interval: POLL_INTERVAL,
        }
    }
}

/// Single-socket authority
///
/// Everything runs on one loop: a bounded receive, then either command
/// handling or a sweep of idle sessions. There is no background task and no
/// locking; mutation is serialized by the loop itself.
pub struct Server {
    transport: Transport,
    dispatcher: Dispatcher,
    last_sweep: Instant,
}

impl Server {
    pub async fn new(config: &ServerConfig, store: AccountStore) -> io::Result<Self> {
        let transport = Transport::bind(&config.bind_addr, config.poll_interval).await?;
        info!("Server listening on {}", transport.local_addr()?);

        Ok(Server {
            transport,
            dispatcher: Dispatcher::new(store, SessionTable::new(config.session_ttl)),
            last_sweep: Instant::now(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    async fn deliver(transport: &Transport, outbound: Vec<Outbound>) {
        for Outbound { addr, reply } in outbound {
            let payload = reply.to_string();
            if let Err(e) = transport.send(addr, &payload).await {
                error!("Failed to send {} to {}: {}", reply.tag(), addr, e);
            }
        }
    }

    fn sweep(&mut self, now: Instant) {
        let evicted = self.dispatcher.sweep(now);
        if evicted > 0 {
            debug!(
                "Evicted {} idle sessions, {} remaining",
                evicted,
                self.dispatcher.sessions().len()
            );
        }
        self.last_sweep = now;
    }

    /// Runs the loop until `shutdown` completes
    ///
    /// Transport and persistence errors are logged and the loop carries on.
    /// Dropping the server afterwards closes the socket.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("Server started successfully");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Server shutting down");
                    break;
                }

                received = self.transport.receive() => match received {
                    Received::Datagram { payload, addr } => {
                        let now = Instant::now();
                        let outbound = self.dispatcher.handle(&payload, addr, now);
                        Self::deliver(&self.transport, outbound).await;

                        // Busy sockets never time out, so sweep on a schedule too
                        if now.duration_since(self.last_sweep) >= self.transport.poll_interval() {
                            self.sweep(now);
                        }
                    }
                    Received::Timeout => self.sweep(Instant::now()),
                    Received::Error(e) => {
                        error!("Error receiving data: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                },
            }
        }
    }
}
