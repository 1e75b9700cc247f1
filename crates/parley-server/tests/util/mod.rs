//! Shared harness for the wire-level tests: starts a real server on an
//! ephemeral port and drives it over plain TCP.

// Not every test crate uses every helper.
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use parley_server::config::Config;
use parley_server::server::Server;
use parley_server::store::memory::MemoryStore;

pub const ADMIN_PASSWORD: &str = "bootstrap-secret";

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Binds a server on 127.0.0.1:0 and serves it in the background.
/// The returned token stops it.
pub async fn start_server() -> (SocketAddr, CancellationToken) {
    let mut vars = HashMap::new();
    vars.insert(
        "PARLEY_BIND_ADDRESS".to_string(),
        "127.0.0.1:0".to_string(),
    );
    vars.insert(
        "PARLEY_ADMIN_PASSWORD".to_string(),
        ADMIN_PASSWORD.to_string(),
    );
    // Minimum cost keeps the hashing in test runs cheap.
    vars.insert("PARLEY_BCRYPT_COST".to_string(), "4".to_string());
    let config = Config::from_vars(&vars).expect("test config");

    let server = Server::bind(config, Arc::new(MemoryStore::new()))
        .await
        .expect("bind test server");
    let addr = server.local_addr().expect("local addr");

    let shutdown = CancellationToken::new();
    tokio::spawn(server.serve(shutdown.clone()));
    (addr, shutdown)
}

/// One scripted client connection.
pub struct TestClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    write: OwnedWriteHalf,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        let (read, write) = stream.into_split();
        Self {
            lines: BufReader::new(read).lines(),
            write,
        }
    }

    pub async fn send(&mut self, line: &str) {
        self.write
            .write_all(format!("{line}\n").as_bytes())
            .await
            .expect("send");
    }

    /// Next line from the server, failing the test after a timeout.
    pub async fn recv(&mut self) -> String {
        tokio::time::timeout(RECV_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for a server line")
            .expect("read")
            .expect("connection closed while waiting for a line")
    }

    /// Receives until a line starting with `prefix` arrives, skipping
    /// unrelated pushes.
    pub async fn recv_until(&mut self, prefix: &str) -> String {
        loop {
            let line = self.recv().await;
            if line.starts_with(prefix) {
                return line;
            }
        }
    }

    /// Registers an account and logs in, consuming the `AUTH_OK` and the
    /// meeting listing. Returns the new user's id.
    pub async fn register_and_login(&mut self, login: &str, name: &str) -> i64 {
        self.send(&format!("REGISTER|{login}|pw-{login}|{name}"))
            .await;
        let ok = self.recv().await;
        let user_id = ok
            .strip_prefix("OK|")
            .unwrap_or_else(|| panic!("unexpected REGISTER reply: {ok}"))
            .parse()
            .expect("user id");
        self.login(login, &format!("pw-{login}")).await;
        user_id
    }

    /// Asserts the server closes the connection. The wait outlives the idle
    /// timeout so paused-clock tests auto-advance into it.
    pub async fn expect_disconnect(&mut self) {
        let line = tokio::time::timeout(Duration::from_secs(3600), self.lines.next_line())
            .await
            .expect("server did not close the connection")
            .expect("read");
        assert!(line.is_none(), "expected EOF, got: {line:?}");
    }

    pub async fn login(&mut self, login: &str, password: &str) {
        self.send(&format!("LOGIN|{login}|{password}")).await;
        let auth = self.recv().await;
        assert!(auth.starts_with("AUTH_OK|"), "unexpected LOGIN reply: {auth}");
        let listing = self.recv().await;
        assert!(
            listing.starts_with("MEETINGS|"),
            "expected listing after login, got: {listing}"
        );
    }
}
