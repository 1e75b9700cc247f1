//! Per-connection task.
//!
//! The socket is split at accept time. A writer task drains the outbound
//! channel and is the only writer of the socket, so direct replies and
//! fanout pushes leave in the order they were queued. The read loop handles
//! one line at a time; commands run to completion before the next line is
//! read.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::commands::{self, Session};
use crate::server::ServerContext;

/// Runs one client connection to completion. EOF, an I/O error, the idle
/// timeout and server shutdown all end in the same cleanup path.
pub async fn serve_connection(
    ctx: Arc<ServerContext>,
    stream: TcpStream,
    peer: SocketAddr,
    shutdown: CancellationToken,
) {
    let (read_half, write_half) = stream.into_split();
    let (conn, outbound_rx) = ctx.registry.register();
    info!(
        target: "parley_server::connection",
        conn_id = conn.id,
        %peer,
        "connection accepted"
    );

    let writer = tokio::spawn(write_loop(write_half, outbound_rx, shutdown.clone()));

    let mut session = Session::new(conn);
    let mut lines = BufReader::new(read_half).lines();
    loop {
        let next = tokio::select! {
            () = shutdown.cancelled() => {
                debug!(target: "parley_server::connection", conn_id = session.conn.id, "shutdown requested");
                break;
            }
            next = timeout(ctx.config.idle_timeout, lines.next_line()) => next,
        };
        match next {
            Err(_elapsed) => {
                info!(
                    target: "parley_server::connection",
                    conn_id = session.conn.id,
                    "idle timeout, dropping connection"
                );
                break;
            }
            Ok(Ok(None)) => {
                debug!(target: "parley_server::connection", conn_id = session.conn.id, "client closed connection");
                break;
            }
            Ok(Err(err)) => {
                warn!(
                    target: "parley_server::connection",
                    conn_id = session.conn.id,
                    error = %err,
                    "read failed"
                );
                break;
            }
            Ok(Ok(Some(line))) => {
                let line = line.trim_end_matches('\r');
                if line.is_empty() {
                    continue;
                }
                commands::dispatch(&ctx, &mut session, line).await;
            }
        }
    }

    // Disconnection cleanup: persist the departure and tell the room, then
    // drop the registry entry so fanout stops targeting this connection.
    if let Err(err) = commands::meetings::leave_current(&ctx, &mut session).await {
        warn!(
            target: "parley_server::connection",
            conn_id = session.conn.id,
            error = %err,
            "leave on disconnect failed"
        );
    }
    ctx.registry.unregister(&session.conn);
    info!(
        target: "parley_server::connection",
        conn_id = session.conn.id,
        %peer,
        "connection closed"
    );
    // Dropping the session releases the last outbound sender; the writer
    // drains what is queued and exits.
    drop(session);
    let _ = writer.await;
}

async fn write_loop(
    mut write_half: OwnedWriteHalf,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    shutdown: CancellationToken,
) {
    loop {
        let line = tokio::select! {
            () = shutdown.cancelled() => break,
            line = outbound_rx.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };
        if let Err(err) = write_half.write_all(line.as_bytes()).await {
            debug!(target: "parley_server::connection", error = %err, "write failed");
            break;
        }
        if let Err(err) = write_half.write_all(b"\n").await {
            debug!(target: "parley_server::connection", error = %err, "write failed");
            break;
        }
    }
    let _ = write_half.shutdown().await;
}
