use crate::console::{describe, Console};
use crate::shell::{ShellCommand, HELP};
use log::{debug, error, info, warn};
use shared::{Reply, Request, HEARTBEAT_INTERVAL, MAX_DATAGRAM_SIZE};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// How long shutdown waits for each background task
pub const JOIN_WINDOW: Duration = Duration::from_secs(2);

/// Shortest accepted heartbeat period
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_addr: String,
    pub heartbeat_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: format!("127.0.0.1:{}", shared::DEFAULT_PORT),
            heartbeat_interval: HEARTBEAT_INTERVAL,
        }
    }
}

/// Shell client with a heartbeat sender and a push listener running beside
/// the input loop
pub struct Client {
    socket: Arc<UdpSocket>,
    server_addr: SocketAddr,
    console: Arc<Console>,
    logged_in: Arc<AtomicBool>,
    cancel: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Client {
    pub async fn connect(
        config: &ClientConfig,
        console: Arc<Console>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let server_addr: SocketAddr = config.server_addr.parse()?;
        let bind_addr = if server_addr.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
        info!("Client bound to {}", socket.local_addr()?);

        let mut client = Client {
            socket,
            server_addr,
            console,
            logged_in: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
            tasks: Vec::with_capacity(2),
        };

        let listener = tokio::spawn(listen(
            client.socket.clone(),
            client.console.clone(),
            client.logged_in.clone(),
            client.cancel.clone(),
        ));
        let heartbeat = tokio::spawn(heartbeat(
            client.socket.clone(),
            server_addr,
            config.heartbeat_interval,
            client.logged_in.clone(),
            client.cancel.clone(),
        ));
        client.tasks.push(("listener", listener));
        client.tasks.push(("heartbeat", heartbeat));

        Ok(client)
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    pub async fn send(&self, request: &Request) -> io::Result<()> {
        let payload = request.to_string();
        debug!("Sending {}", request.verb());
        self.socket.send_to(payload.as_bytes(), self.server_addr).await?;
        Ok(())
    }

    /// Reads commands until end of input or `quit`
    pub async fn run_shell<R>(&self, input: R) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        self.console.line(HELP);

        while let Some(line) = lines.next_line().await? {
            match ShellCommand::parse(&line) {
                Ok(None) => self.console.prompt(),
                Ok(Some(ShellCommand::Help)) => self.console.line(HELP),
                Ok(Some(ShellCommand::Quit)) => break,
                Ok(Some(ShellCommand::Send(request))) => match self.send(&request).await {
                    Ok(()) => self.console.prompt(),
                    Err(e) => {
                        error!("Error sending {}: {}", request.verb(), e);
                        self.console.line("Could not reach the server");
                    }
                },
                Err(e) => self.console.line(&e.to_string()),
            }
        }

        Ok(())
    }

    /// Stops both background tasks
    ///
    /// Each task gets [`JOIN_WINDOW`] to notice the cancellation. A task that
    /// misses it is detached, never aborted.
    pub async fn shutdown(self) {
        self.cancel.cancel();

        for (name, handle) in self.tasks {
            match timeout(JOIN_WINDOW, handle).await {
                Ok(Ok(())) => debug!("{} task stopped", name),
                Ok(Err(e)) => error!("{} task failed: {}", name, e),
                Err(_) => warn!(
                    "{} task did not stop within {:?}, detaching it",
                    name, JOIN_WINDOW
                ),
            }
        }
        info!("Client shut down");
    }
}

async fn listen(
    socket: Arc<UdpSocket>,
    console: Arc<Console>,
    logged_in: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            result = socket.recv_from(&mut buffer) => match result {
                Ok((len, _)) => {
                    let payload = String::from_utf8_lossy(&buffer[..len]);
                    match Reply::parse(&payload) {
                        Ok(reply) => {
                            match &reply {
                                Reply::LoginSuccess { .. } => {
                                    logged_in.store(true, Ordering::SeqCst)
                                }
                                // The server forgot us, so heartbeats would only draw errors
                                Reply::Error { .. } if reply == Reply::not_logged_in() => {
                                    logged_in.store(false, Ordering::SeqCst)
                                }
                                _ => {}
                            }
                            console.push(&describe(&reply));
                        }
                        Err(e) => {
                            warn!("Unrecognised reply: {}", e);
                            console.push(payload.trim());
                        }
                    }
                }
                Err(e) => {
                    error!("Error receiving packet: {}", e);
                    sleep(Duration::from_millis(10)).await;
                }
            },
        }
    }
    debug!("Listener stopped");
}

async fn heartbeat(
    socket: Arc<UdpSocket>,
    server_addr: SocketAddr,
    period: Duration,
    logged_in: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    let mut ticker = interval(period.max(MIN_HEARTBEAT_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let payload = Request::Heartbeat.to_string();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            _ = ticker.tick() => {
                if !logged_in.load(Ordering::SeqCst) {
                    continue;
                }
                if let Err(e) = socket.send_to(payload.as_bytes(), server_addr).await {
                    warn!("Heartbeat failed: {}", e);
                }
            }
        }
    }
    debug!("Heartbeat stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fake_server() -> (UdpSocket, String) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap().to_string();
        (socket, addr)
    }

    async fn recv_text(socket: &UdpSocket, within: Duration) -> Option<(String, SocketAddr)> {
        let mut buf = [0u8; 1024];
        match timeout(within, socket.recv_from(&mut buf)).await {
            Ok(Ok((len, from))) => Some((String::from_utf8_lossy(&buf[..len]).into_owned(), from)),
            _ => None,
        }
    }

    fn quiet_console() -> Arc<Console> {
        Arc::new(Console::new(Box::new(io::sink())))
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.server_addr, "127.0.0.1:9999");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_heartbeat_starts_after_login() {
        let (server, server_addr) = fake_server().await;
        let config = ClientConfig {
            server_addr,
            heartbeat_interval: Duration::from_millis(50),
        };
        let client = Client::connect(&config, quiet_console()).await.unwrap();

        client.send(&Request::Logins).await.unwrap();
        let (first, client_addr) = recv_text(&server, Duration::from_secs(1)).await.unwrap();
        assert_eq!(first, "LOGINS");

        // Not logged in yet: silence
        assert!(recv_text(&server, Duration::from_millis(200)).await.is_none());
        assert!(!client.is_logged_in());

        server.send_to(b"LOGIN_SUCCESS 1", client_addr).await.unwrap();
        let (beat, _) = recv_text(&server, Duration::from_secs(1)).await.unwrap();
        assert_eq!(beat, "HEARTBEAT");
        assert!(client.is_logged_in());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_zero_heartbeat_interval_still_beats() {
        let (server, server_addr) = fake_server().await;
        let config = ClientConfig {
            server_addr,
            heartbeat_interval: Duration::ZERO,
        };
        let client = Client::connect(&config, quiet_console()).await.unwrap();

        client.send(&Request::Logins).await.unwrap();
        let (_, client_addr) = recv_text(&server, Duration::from_secs(1)).await.unwrap();
        server.send_to(b"LOGIN_SUCCESS 1", client_addr).await.unwrap();

        let (beat, _) = recv_text(&server, Duration::from_secs(1)).await.unwrap();
        assert_eq!(beat, "HEARTBEAT");

        let started = std::time::Instant::now();
        client.shutdown().await;
        assert!(started.elapsed() < JOIN_WINDOW);
    }

    #[tokio::test]
    async fn test_not_logged_in_stops_heartbeat() {
        let (server, server_addr) = fake_server().await;
        let config = ClientConfig {
            server_addr,
            heartbeat_interval: Duration::from_millis(50),
        };
        let client = Client::connect(&config, quiet_console()).await.unwrap();

        client.send(&Request::GetStats).await.unwrap();
        let (_, client_addr) = recv_text(&server, Duration::from_secs(1)).await.unwrap();
        server.send_to(b"LOGIN_SUCCESS 1", client_addr).await.unwrap();
        recv_text(&server, Duration::from_secs(1)).await.unwrap();

        server.send_to(b"ERROR Not logged in", client_addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!client.is_logged_in());

        // Drain anything already in flight, then expect silence
        while recv_text(&server, Duration::from_millis(120)).await.is_some() {}
        assert!(recv_text(&server, Duration::from_millis(200)).await.is_none());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_shell_sends_wire_commands() {
        let (server, server_addr) = fake_server().await;
        let config = ClientConfig {
            server_addr,
            heartbeat_interval: Duration::from_secs(60),
        };
        let client = Client::connect(&config, quiet_console()).await.unwrap();

        let script: &[u8] = b"help\n\nsetstats 2 1 3 4\nbogus\nattack bob\nquit\nusers\n";
        client.run_shell(script).await.unwrap();

        let (first, _) = recv_text(&server, Duration::from_secs(1)).await.unwrap();
        let (second, _) = recv_text(&server, Duration::from_secs(1)).await.unwrap();
        assert_eq!(first, "SET_STATS:2,1,3,4");
        assert_eq!(second, "ATTACK bob");
        // Nothing after quit
        assert!(recv_text(&server, Duration::from_millis(200)).await.is_none());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_is_prompt() {
        let (_server, server_addr) = fake_server().await;
        let config = ClientConfig {
            server_addr,
            heartbeat_interval: Duration::from_millis(10),
        };
        let client = Client::connect(&config, quiet_console()).await.unwrap();

        let started = std::time::Instant::now();
        client.shutdown().await;
        assert!(started.elapsed() < JOIN_WINDOW);
    }
}
