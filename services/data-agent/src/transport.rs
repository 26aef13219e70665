//! TCP adapter for the router's transport seam

use dataagent_protocol::{codec, Message};
use dataagent_router::{ConnectionId, Dispatcher, Role, Transport};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

const READ_BUFFER: usize = 16 * 1024;

struct Link {
    outbound: mpsc::UnboundedSender<String>,
    closed: Arc<Notify>,
}

/// Per-connection writer queues keyed by [`ConnectionId`]
#[derive(Default)]
pub struct TcpTransport {
    links: Mutex<HashMap<ConnectionId, Link>>,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn links(&self) -> MutexGuard<'_, HashMap<ConnectionId, Link>> {
        self.links.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn attach(&self, conn: ConnectionId, outbound: mpsc::UnboundedSender<String>, closed: Arc<Notify>) {
        self.links().insert(conn, Link { outbound, closed });
    }

    fn detach(&self, conn: &ConnectionId) {
        self.links().remove(conn);
    }
}

impl Transport for TcpTransport {
    fn send(&self, conn: &ConnectionId, message: &Message) -> bool {
        let line = match codec::encode(message) {
            Ok(line) => line,
            Err(e) => {
                warn!(conn = %conn, error = %e, "failed to encode outbound message");
                return false;
            }
        };
        match self.links().get(conn) {
            Some(link) => link.outbound.send(line).is_ok(),
            None => false,
        }
    }

    fn is_connected(&self, conn: &ConnectionId) -> bool {
        self.links()
            .get(conn)
            .is_some_and(|link| !link.outbound.is_closed())
    }

    fn disconnect(&self, conn: &ConnectionId) {
        if let Some(link) = self.links().remove(conn) {
            link.closed.notify_one();
        }
    }
}

/// Drive one TCP connection until it closes
///
/// Inbound bytes go to the dispatcher in arrival order; outbound lines are
/// written by a companion task fed from the transport's queue.
pub async fn serve_connection(
    stream: TcpStream,
    role: Role,
    dispatcher: Arc<Dispatcher>,
    transport: Arc<TcpTransport>,
) {
    let conn = ConnectionId::generate();
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let (mut reader, mut writer) = stream.into_split();
    let (outbound, mut queue) = mpsc::unbounded_channel::<String>();
    let closed = Arc::new(Notify::new());

    transport.attach(conn.clone(), outbound, closed.clone());
    info!(conn = %conn, %role, %peer, "peer connected");
    dispatcher.on_connected(&conn, role);

    let writer_conn = conn.clone();
    let writer_task = tokio::spawn(async move {
        while let Some(line) = queue.recv().await {
            if let Err(e) = writer.write_all(line.as_bytes()).await {
                warn!(conn = %writer_conn, error = %e, "write failed");
                break;
            }
        }
        let _ = writer.shutdown().await;
    });

    let mut buf = vec![0u8; READ_BUFFER];
    loop {
        tokio::select! {
            _ = closed.notified() => {
                debug!(conn = %conn, "closed by gateway");
                break;
            }
            read = reader.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => {
                    dispatcher.on_data(&conn, role, &buf[..n]);
                }
                Err(e) => {
                    warn!(conn = %conn, error = %e, "read failed");
                    break;
                }
            }
        }
    }

    transport.detach(&conn);
    dispatcher.on_disconnected(&conn);
    let _ = writer_task.await;
    info!(conn = %conn, %role, %peer, "peer disconnected");
}
