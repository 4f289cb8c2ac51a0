//! End-to-end tests: client -> proxy -> file server over real sockets

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use natproxy::client::ProxyClient;
use natproxy::config::{Config, FileServerConfig, ServerConfig, UpstreamConfig};
use natproxy::fileserver::FileServer;
use natproxy::proxy::TranslationTable;
use natproxy::server::Listener;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

struct Harness {
    proxy_addr: SocketAddr,
    table: TranslationTable,
    _files: TempDir,
}

async fn start_file_server(root: &Path) -> SocketAddr {
    let server = FileServer::bind(&FileServerConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        root: root.to_path_buf(),
    })
    .await
    .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    addr
}

async fn start_proxy(upstream: String) -> (SocketAddr, TranslationTable) {
    let cfg = Config {
        server: ServerConfig {
            listen_addr: "127.0.0.1:0".to_string(),
        },
        upstream: UpstreamConfig {
            addr: upstream,
            connect_timeout_ms: 2000,
        },
    };
    let listener = Listener::bind(&cfg).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let table = listener.table();
    tokio::spawn(listener.run());
    (addr, table)
}

async fn harness(files: Vec<(&str, Vec<u8>)>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    for (name, content) in &files {
        std::fs::write(dir.path().join(name), content).unwrap();
    }

    let upstream = start_file_server(dir.path()).await;
    let (proxy_addr, table) = start_proxy(upstream.to_string()).await;

    Harness {
        proxy_addr,
        table,
        _files: dir,
    }
}

async fn read_exactly(stream: &mut TcpStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut buf))
        .await
        .expect("timed out reading from proxy")
        .unwrap();
    buf
}

async fn wait_until_empty(table: &TranslationTable, client: SocketAddr) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !table.keys_for(client).await.is_empty() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "translation entries for {} were never purged",
            client
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_example_session_byte_for_byte() {
    let h = harness(vec![("a.txt", b"hello".to_vec())]).await;
    let mut stream = TcpStream::connect(h.proxy_addr).await.unwrap();

    stream.write_all(b"LIST\n").await.unwrap();
    assert_eq!(read_exactly(&mut stream, 13).await, b"OK\na.txt\nEND\n");

    stream.write_all(b"DOWNLOAD a.txt\n").await.unwrap();
    assert_eq!(read_exactly(&mut stream, 10).await, b"OK 5\nhello");

    stream.write_all(b"DOWNLOAD missing.txt\n").await.unwrap();
    assert_eq!(read_exactly(&mut stream, 19).await, b"ERR file not found\n");
}

#[tokio::test]
async fn test_list_preserves_upstream_order() {
    let h = harness(vec![
        ("c.log", b"3".to_vec()),
        ("a.txt", b"1".to_vec()),
        ("b.bin", b"2".to_vec()),
    ]).await;
    let mut client = ProxyClient::connect(h.proxy_addr).await.unwrap();

    let names = client.list().await.unwrap();
    assert_eq!(names, vec!["a.txt", "b.bin", "c.log"]);
}

#[tokio::test]
async fn test_list_empty_directory() {
    let h = harness(vec![]).await;
    let mut stream = TcpStream::connect(h.proxy_addr).await.unwrap();

    stream.write_all(b"LIST\n").await.unwrap();
    assert_eq!(read_exactly(&mut stream, 7).await, b"OK\nEND\n");
}

#[tokio::test]
async fn test_download_binary_file_exact_bytes() {
    let content: Vec<u8> = (0..200_000u32).map(|i| (i * 7 % 256) as u8).collect();
    let h = harness(vec![("blob.bin", content.clone())]).await;
    let mut client = ProxyClient::connect(h.proxy_addr).await.unwrap();

    let downloaded = client.download("blob.bin").await.unwrap();
    assert_eq!(downloaded.len(), content.len());
    assert_eq!(downloaded, content);

    // The connection is still usable afterwards
    assert_eq!(client.list().await.unwrap(), vec!["blob.bin"]);
}

#[tokio::test]
async fn test_download_to_writes_file() {
    let h = harness(vec![("a.txt", b"hello".to_vec())]).await;
    let out = tempfile::tempdir().unwrap();
    let dest = out.path().join("nested").join("a.txt");
    let mut client = ProxyClient::connect(h.proxy_addr).await.unwrap();

    let written = client.download_to("a.txt", &dest).await.unwrap();

    assert_eq!(written, 5);
    assert_eq!(std::fs::read(&dest).unwrap(), b"hello");
}

#[tokio::test]
async fn test_missing_file_is_reported_by_client() {
    let h = harness(vec![]).await;
    let mut client = ProxyClient::connect(h.proxy_addr).await.unwrap();

    let err = client.download("missing.txt").await.unwrap_err();
    assert!(err.to_string().contains("ERR file not found"));
}

#[tokio::test]
async fn test_unknown_command_keeps_connection_usable() {
    let h = harness(vec![("a.txt", b"hello".to_vec())]).await;
    let mut client = ProxyClient::connect(h.proxy_addr).await.unwrap();

    let reply = client.command("FOOBAR").await.unwrap();
    assert_eq!(reply.as_deref(), Some("ERR unknown command"));

    assert_eq!(client.list().await.unwrap(), vec!["a.txt"]);
    assert_eq!(client.download("a.txt").await.unwrap(), b"hello");
}

#[tokio::test]
async fn test_blank_lines_are_ignored() {
    let h = harness(vec![("a.txt", b"hello".to_vec())]).await;
    let mut stream = TcpStream::connect(h.proxy_addr).await.unwrap();

    stream.write_all(b"\n   \nLIST\n").await.unwrap();
    assert_eq!(read_exactly(&mut stream, 13).await, b"OK\na.txt\nEND\n");

    // Nothing else was produced for the blank lines
    stream.write_all(b"FOOBAR\n").await.unwrap();
    assert_eq!(read_exactly(&mut stream, 20).await, b"ERR unknown command\n");
}

#[tokio::test]
async fn test_concurrent_downloads_never_cross() {
    let a: Vec<u8> = vec![b'a'; 300_000];
    let b: Vec<u8> = vec![b'b'; 250_000];
    let h = harness(vec![("a.bin", a.clone()), ("b.bin", b.clone())]).await;

    let mut tasks = Vec::new();
    for i in 0..8 {
        let addr = h.proxy_addr;
        let (name, expected) = if i % 2 == 0 {
            ("a.bin", a.clone())
        } else {
            ("b.bin", b.clone())
        };
        tasks.push(tokio::spawn(async move {
            let mut client = ProxyClient::connect(addr).await.unwrap();
            for _ in 0..3 {
                let got = client.download(name).await.unwrap();
                assert_eq!(got.len(), expected.len());
                assert!(got == expected, "{} received foreign bytes", name);
            }
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test]
async fn test_entries_removed_after_each_request() {
    let h = harness(vec![("a.txt", b"hello".to_vec())]).await;
    let mut stream = TcpStream::connect(h.proxy_addr).await.unwrap();
    let local = stream.local_addr().unwrap();

    stream.write_all(b"DOWNLOAD a.txt\n").await.unwrap();
    read_exactly(&mut stream, 10).await;

    wait_until_empty(&h.table, local).await;
}

#[tokio::test]
async fn test_disconnect_mid_download_purges_entries() {
    let big = vec![7u8; 16 * 1024 * 1024];
    let h = harness(vec![("big.bin", big)]).await;

    let mut stream = TcpStream::connect(h.proxy_addr).await.unwrap();
    let local = stream.local_addr().unwrap();
    stream.write_all(b"DOWNLOAD big.bin\n").await.unwrap();

    let header = read_exactly(&mut stream, 11).await;
    assert_eq!(header, b"OK 16777216");
    drop(stream);

    wait_until_empty(&h.table, local).await;
}

#[tokio::test]
async fn test_upstream_unreachable_reports_proxy_error() {
    // Reserve a port, then release it so nothing listens there
    let placeholder = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = placeholder.local_addr().unwrap();
    drop(placeholder);

    let (proxy_addr, table) = start_proxy(dead.to_string()).await;
    let mut client = ProxyClient::connect(proxy_addr).await.unwrap();

    for _ in 0..2 {
        let reply = client.command("LIST").await.unwrap().unwrap();
        assert!(reply.starts_with("ERR proxy error: "), "got {reply}");
    }
    assert!(table.is_empty().await);
}

#[tokio::test]
async fn test_empty_upstream_response() {
    let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = upstream.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let (mut socket, _) = upstream.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let _ = socket.read(&mut buf).await;
            // Close without answering
        }
    });

    let (proxy_addr, _table) = start_proxy(upstream_addr.to_string()).await;
    let mut client = ProxyClient::connect(proxy_addr).await.unwrap();

    let reply = client.command("LIST").await.unwrap();
    assert_eq!(reply.as_deref(), Some("ERR empty response from server"));
}

#[tokio::test]
async fn test_short_upstream_download_relayed_as_is() {
    let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = upstream.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = upstream.accept().await.unwrap();
        let mut buf = [0u8; 64];
        let _ = socket.read(&mut buf).await;
        socket.write_all(b"OK 10\nabc").await.unwrap();
    });

    let (proxy_addr, _table) = start_proxy(upstream_addr.to_string()).await;
    let mut stream = TcpStream::connect(proxy_addr).await.unwrap();
    stream.write_all(b"DOWNLOAD x\n").await.unwrap();

    // The proxy relays what it got and injects nothing after it
    assert_eq!(read_exactly(&mut stream, 9).await, b"OK 10\nabc");
    let mut extra = [0u8; 1];
    let more = tokio::time::timeout(Duration::from_millis(200), stream.read(&mut extra)).await;
    assert!(more.is_err(), "proxy sent bytes after a short payload");
}
