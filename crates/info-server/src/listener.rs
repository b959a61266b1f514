//! Blocking TCP accept loop feeding the worker pool (spec.md §4.H),
//! grounded in the teacher's preference for plain blocking `std::net`
//! sockets over an async runtime or reactor (no `mio`/`tokio` anywhere in
//! its dependency stack).

use info_core::dispatch::{auth::Principal, dispatch_body, pool::WorkerPool};
use info_core::node::NodeContext;
use info_core::sync::OpenCloseGauge;
use info_core::wire;
use slog::{error, info, o, warn, Logger};
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

/// Keeps `client_connections`'s open/close counters balanced across every
/// return path out of `handle_connection`, including the early returns on a
/// malformed header or a dropped socket.
struct ConnectionGuard<'a> {
    gauge: &'a OpenCloseGauge,
}

impl<'a> ConnectionGuard<'a> {
    fn new(gauge: &'a OpenCloseGauge) -> ConnectionGuard<'a> {
        gauge.record_open();
        ConnectionGuard { gauge }
    }
}

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        self.gauge.record_close();
    }
}

pub fn serve(bind: &str, ctx: Arc<NodeContext>, pool: Arc<WorkerPool>, logger: Logger) -> io::Result<()> {
    let listener = TcpListener::bind(bind)?;
    info!(logger, "info listener bound"; "addr" => bind);
    serve_listener(listener, ctx, pool, logger)
}

/// Runs the accept loop against an already-bound listener. Split out from
/// `serve` so tests can bind an ephemeral port themselves and learn its
/// address before the accept loop starts.
pub fn serve_listener(
    listener: TcpListener,
    ctx: Arc<NodeContext>,
    pool: Arc<WorkerPool>,
    logger: Logger,
) -> io::Result<()> {
    for stream in listener.incoming() {
        if ctx.shutdown.load(Ordering::Relaxed) {
            break;
        }

        let stream = match stream {
            Ok(s) => s,
            Err(err) => {
                warn!(logger, "accept failed"; "error" => %err);
                continue;
            }
        };

        let ctx = ctx.clone();
        let logger = logger.new(o!("peer" => stream.peer_addr().map(|a| a.to_string()).unwrap_or_default()));

        pool.submit(Box::new(move || {
            if let Err(err) = handle_connection(stream, &ctx, &logger) {
                warn!(logger, "connection ended with error"; "error" => %err);
            }
        }));
    }

    Ok(())
}

fn handle_connection(mut stream: TcpStream, ctx: &Arc<NodeContext>, logger: &Logger) -> io::Result<()> {
    let principal = Principal::root();
    let _conn = ConnectionGuard::new(&ctx.stats.client_connections);

    loop {
        let arrived_at = Instant::now();

        let header = match wire::Header::read(&mut stream) {
            Ok(h) => h,
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(err) => return Err(err),
        };

        if header.version != wire::VERSION || header.kind != wire::TYPE_INFO {
            error!(logger, "rejecting frame with unrecognized header"; "version" => header.version, "kind" => header.kind);
            return Ok(());
        }

        let mut body = vec![0u8; header.body_len as usize];
        stream.read_exact(&mut body)?;
        let body = String::from_utf8_lossy(&body).into_owned();

        let reply = dispatch_body(&ctx.registry, &principal, &body, logger);
        wire::write_reply(&mut stream, &reply)?;
        stream.flush()?;

        ctx.stats.info_complete.incr();
        ctx.stats.info_latency.record(arrived_at.elapsed());
    }
}
