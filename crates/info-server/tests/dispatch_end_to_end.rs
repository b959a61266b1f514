//! Drives the dispatcher over a real loopback `TcpStream`, exercising the
//! wire framing, registry lookup, and reply encoding together the way a
//! real client connection would.

use info_core::config::ConfigMutator;
use info_core::dispatch::pool::WorkerPool;
use info_core::node::NodeContext;
use info_core::stats::NodeStats;
use info_core::wire;
use info_server::{endpoints, listener, smd_client::LocalSmdClient};
use slog::Logger;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

fn test_logger() -> Logger {
    Logger::root(slog::Discard, slog::o!())
}

fn spawn_test_server() -> String {
    let config = Arc::new(ConfigMutator::new(false));
    let stats = Arc::new(NodeStats::default());
    let smd = Arc::new(LocalSmdClient::new());
    let pool = Arc::new(WorkerPool::new(1, 2, 8));
    let ctx = Arc::new(NodeContext::new(config, stats, smd, "test-build", pool.clone()));
    endpoints::register_all(&ctx);

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    std::thread::spawn(move || {
        let _ = listener::serve_listener(listener, ctx, pool, test_logger());
    });

    std::thread::sleep(Duration::from_millis(100));
    addr
}

fn request(addr: &str, body: &str) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    let mut framed = Vec::new();
    wire::write_reply(&mut framed, body.as_bytes()).unwrap();
    stream.write_all(&framed).unwrap();

    let header = wire::Header::read(&mut stream).unwrap();
    let mut reply = vec![0u8; header.body_len as usize];
    stream.read_exact(&mut reply).unwrap();

    String::from_utf8(reply).unwrap()
}

#[test]
fn version_round_trips_over_the_wire() {
    let addr = spawn_test_server();
    let reply = request(&addr, "version");
    assert!(reply.starts_with("version\tinfo-server-"));
}

#[test]
fn unknown_command_reports_an_error_reply() {
    let addr = spawn_test_server();
    let reply = request(&addr, "totally-bogus-command");
    assert!(reply.starts_with("totally-bogus-command\tERROR:"));
}

#[test]
fn config_get_then_set_then_get_reflects_the_change() {
    let addr = spawn_test_server();

    let before = request(&addr, "config-get:context=service");
    assert!(before.contains("ticker-interval="));

    let set_reply = request(&addr, "config-set:context=service;ticker-interval=20");
    assert!(set_reply.contains("ok"));

    let after = request(&addr, "config-get:context=service");
    assert!(after.contains("ticker-interval=20"));
}

#[test]
fn config_set_info_threads_resizes_the_live_pool() {
    let addr = spawn_test_server();

    let set_reply = request(&addr, "config-set:context=service;info-threads=1");
    assert!(set_reply.contains("ok"));

    let after = request(&addr, "config-get:context=service");
    assert!(after.contains("info-threads=1"));
}

#[test]
fn multiple_requests_on_one_connection_each_get_a_reply() {
    let addr = spawn_test_server();
    let mut stream = TcpStream::connect(&addr).unwrap();

    for _ in 0..3 {
        let mut framed = Vec::new();
        wire::write_reply(&mut framed, b"version").unwrap();
        stream.write_all(&framed).unwrap();

        let header = wire::Header::read(&mut stream).unwrap();
        let mut reply = vec![0u8; header.body_len as usize];
        stream.read_exact(&mut reply).unwrap();
        assert!(String::from_utf8(reply).unwrap().starts_with("version\t"));
    }
}
