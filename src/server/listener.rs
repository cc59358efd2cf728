//! TCP accept loop with cooperative, polling-based shutdown

use crate::server::connection::ConnectionHandler;
use crate::{RelayError, Result};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket};
use tokio::time::timeout;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

const LISTEN_BACKLOG: u32 = 1024;

// Pause after a failed accept (e.g. out of file descriptors) so the loop does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Control handle for a running [`Listener`]
#[derive(Clone)]
pub struct ListenerHandle {
    stop: Arc<AtomicBool>,
    accepted: Arc<AtomicU64>,
    sessions: TaskTracker,
    local_addr: SocketAddr,
}

impl ListenerHandle {
    /// Ask the accept loop to stop; observed within one polling interval.
    ///
    /// Sessions already running are left to finish on their own.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Connections accepted so far
    pub fn accepted_connections(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Sessions still running
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Wait until the accept loop has exited and every session has ended
    pub async fn drained(&self) {
        self.sessions.wait().await;
    }
}

/// Accepts connections and runs one [`ConnectionHandler`] task per connection
pub struct Listener {
    listener: TcpListener,
    handler: ConnectionHandler,
    poll_interval: Duration,
    handle: ListenerHandle,
}

impl Listener {
    /// Bind `addr` (`host:port`) with address reuse enabled
    pub async fn bind(addr: &str, handler: ConnectionHandler, poll_interval: Duration) -> Result<Self> {
        let bind_failure = |source: std::io::Error| RelayError::BindFailure {
            addr: addr.to_string(),
            source,
        };

        let socket_addr = tokio::net::lookup_host(addr)
            .await
            .map_err(bind_failure)?
            .next()
            .ok_or_else(|| {
                bind_failure(std::io::Error::new(
                    std::io::ErrorKind::AddrNotAvailable,
                    "address did not resolve",
                ))
            })?;

        let socket = if socket_addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_failure)?;
        socket.set_reuseaddr(true).map_err(bind_failure)?;
        socket.bind(socket_addr).map_err(bind_failure)?;
        let listener = socket.listen(LISTEN_BACKLOG).map_err(bind_failure)?;
        let local_addr = listener.local_addr().map_err(bind_failure)?;

        info!(addr = %local_addr, "Listening for log records");

        Ok(Self {
            listener,
            handler,
            poll_interval,
            handle: ListenerHandle {
                stop: Arc::new(AtomicBool::new(false)),
                accepted: Arc::new(AtomicU64::new(0)),
                sessions: TaskTracker::new(),
                local_addr,
            },
        })
    }

    /// Control handle; clone it before calling [`Listener::serve_until_stopped`]
    pub fn handle(&self) -> ListenerHandle {
        self.handle.clone()
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.handle.local_addr
    }

    /// Run the accept loop until [`ListenerHandle::stop`] is called.
    ///
    /// The listening socket is closed on return, so later connection attempts
    /// are refused. Running sessions keep going.
    pub async fn serve_until_stopped(self) -> Result<()> {
        let Listener {
            listener,
            handler,
            poll_interval,
            handle,
        } = self;

        while !handle.is_stopped() {
            let accepted = match timeout(poll_interval, listener.accept()).await {
                Err(_) => continue,
                Ok(result) => result,
            };

            match accepted {
                Ok((stream, peer)) => {
                    if handle.is_stopped() {
                        debug!(peer = %peer, "Stop requested, refusing connection");
                        break;
                    }
                    handle.accepted.fetch_add(1, Ordering::Relaxed);
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(peer = %peer, error = %e, "Could not set TCP_NODELAY");
                    }

                    let handler = handler.clone();
                    handle.sessions.spawn(async move {
                        handler.handle(stream, Some(peer)).await;
                    });
                }
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }

        drop(listener);
        handle.sessions.close();
        info!(
            addr = %handle.local_addr,
            accepted = handle.accepted_connections(),
            active = handle.active_sessions(),
            "Listener stopped"
        );
        Ok(())
    }
}
