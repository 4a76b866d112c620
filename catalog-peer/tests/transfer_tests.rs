//! Transfer endpoint and requester over loopback TCP.

use std::time::Duration;

use catalog_core::{OverflowPolicy, OwnerLocation};
use catalog_peer::transfer::read_name_frame;
use catalog_peer::{download, TransferEndpoint, TransferError};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

async fn start_endpoint(
    share: &TempDir,
    max_connections: usize,
    overflow: OverflowPolicy,
) -> (u16, CancellationToken) {
    start_endpoint_with_timeout(share, max_connections, overflow, Duration::from_secs(30)).await
}

async fn start_endpoint_with_timeout(
    share: &TempDir,
    max_connections: usize,
    overflow: OverflowPolicy,
    request_timeout: Duration,
) -> (u16, CancellationToken) {
    let endpoint = TransferEndpoint::bind("127.0.0.1:0", share.path(), max_connections, overflow)
        .await
        .expect("bind")
        .with_request_timeout(request_timeout);
    let port = endpoint.local_addr().expect("addr").port();
    let cancel = CancellationToken::new();
    tokio::spawn(endpoint.serve(cancel.clone()));
    (port, cancel)
}

fn location(name: &str, port: u16) -> OwnerLocation {
    OwnerLocation {
        file_name: name.to_string(),
        address: "127.0.0.1".to_string(),
        port,
    }
}

#[tokio::test]
async fn ten_thousand_bytes_arrive_intact() {
    let share = TempDir::new().expect("share");
    let downloads = TempDir::new().expect("downloads");
    let bytes = payload(10_000);
    std::fs::write(share.path().join("data.bin"), &bytes).expect("write");
    let (port, cancel) = start_endpoint(&share, 4, OverflowPolicy::Queue).await;

    let target = downloads.path().join("nested");
    let report = download(&location("data.bin", port), &target, CONNECT_TIMEOUT)
        .await
        .expect("download");

    assert!(report.is_complete());
    assert_eq!(report.declared, 10_000);
    assert_eq!(report.path, target.join("data.bin"));
    assert_eq!(std::fs::read(&report.path).expect("read"), bytes);
    cancel.cancel();
}

#[tokio::test]
async fn existing_download_is_overwritten() {
    let share = TempDir::new().expect("share");
    let downloads = TempDir::new().expect("downloads");
    std::fs::write(share.path().join("a.txt"), b"new").expect("write");
    std::fs::write(downloads.path().join("a.txt"), b"old contents").expect("write");
    let (port, cancel) = start_endpoint(&share, 4, OverflowPolicy::Queue).await;

    download(&location("a.txt", port), downloads.path(), CONNECT_TIMEOUT)
        .await
        .expect("download");
    assert_eq!(
        std::fs::read(downloads.path().join("a.txt")).expect("read"),
        b"new"
    );
    cancel.cancel();
}

#[tokio::test]
async fn responder_closing_early_yields_a_short_report() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let name = read_name_frame(&mut stream).await.expect("name");
        assert_eq!(name, "big.bin");
        stream.write_u64(10_000).await.expect("header");
        stream.write_all(&payload(4_000)).await.expect("body");
        stream.flush().await.expect("flush");
    });

    let downloads = TempDir::new().expect("downloads");
    let report = download(&location("big.bin", port), downloads.path(), CONNECT_TIMEOUT)
        .await
        .expect("short transfer is not an error");

    assert_eq!(report.declared, 10_000);
    assert_eq!(report.received, 4_000);
    assert!(!report.is_complete());
    assert_eq!(std::fs::metadata(&report.path).expect("meta").len(), 4_000);
}

#[tokio::test]
async fn missing_file_reads_as_not_offered() {
    let share = TempDir::new().expect("share");
    let downloads = TempDir::new().expect("downloads");
    let (port, cancel) = start_endpoint(&share, 4, OverflowPolicy::Queue).await;

    let err = download(&location("ghost.txt", port), downloads.path(), CONNECT_TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::NotOffered(ref name) if name == "ghost.txt"));
    assert!(!downloads.path().join("ghost.txt").exists());
    cancel.cancel();
}

#[tokio::test]
async fn path_components_are_refused_before_connecting() {
    let downloads = TempDir::new().expect("downloads");
    let err = download(&location("../escape", 1), downloads.path(), CONNECT_TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::InvalidFileName(_)));
}

#[tokio::test]
async fn reject_policy_turns_away_overflow_connections() {
    let share = TempDir::new().expect("share");
    let downloads = TempDir::new().expect("downloads");
    std::fs::write(share.path().join("a.txt"), b"hello").expect("write");
    let (port, cancel) = start_endpoint(&share, 1, OverflowPolicy::Reject).await;

    // Holds the only slot: connected but never sends a name.
    let holder = TcpStream::connect(("127.0.0.1", port))
        .await
        .expect("connect holder");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let rejected = download(&location("a.txt", port), downloads.path(), CONNECT_TIMEOUT).await;
    assert!(rejected.is_err(), "overflow connection must be refused");

    drop(holder);
    let mut served = None;
    for _ in 0..50 {
        if let Ok(report) =
            download(&location("a.txt", port), downloads.path(), CONNECT_TIMEOUT).await
        {
            served = Some(report);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(served.expect("slot frees after holder leaves").is_complete());
    cancel.cancel();
}

#[tokio::test]
async fn queue_policy_holds_overflow_until_a_slot_frees() {
    let share = TempDir::new().expect("share");
    let downloads = TempDir::new().expect("downloads");
    std::fs::write(share.path().join("a.txt"), b"hello").expect("write");
    let (port, cancel) = start_endpoint(&share, 1, OverflowPolicy::Queue).await;

    let holder = TcpStream::connect(("127.0.0.1", port))
        .await
        .expect("connect holder");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let target = downloads.path().to_path_buf();
    let queued = tokio::spawn(async move {
        download(&location("a.txt", port), &target, CONNECT_TIMEOUT).await
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!queued.is_finished(), "second request waits for the slot");

    drop(holder);
    let report = tokio::time::timeout(Duration::from_secs(5), queued)
        .await
        .expect("queued request completes")
        .expect("join")
        .expect("download");
    assert!(report.is_complete());
    cancel.cancel();
}

#[tokio::test]
async fn idle_requester_loses_its_slot_after_request_timeout() {
    let share = TempDir::new().expect("share");
    let downloads = TempDir::new().expect("downloads");
    std::fs::write(share.path().join("a.txt"), b"hello").expect("write");
    let (port, cancel) = start_endpoint_with_timeout(
        &share,
        1,
        OverflowPolicy::Queue,
        Duration::from_millis(200),
    )
    .await;

    // Connects and never sends a name; stays open for the whole test.
    let mut idle = TcpStream::connect(("127.0.0.1", port))
        .await
        .expect("connect idle");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let report = tokio::time::timeout(
        Duration::from_secs(3),
        download(&location("a.txt", port), downloads.path(), CONNECT_TIMEOUT),
    )
    .await
    .expect("download is not starved by the idle connection")
    .expect("download");
    assert!(report.is_complete());

    let mut buf = [0u8; 1];
    let read = tokio::time::timeout(Duration::from_secs(2), idle.read(&mut buf))
        .await
        .expect("idle connection is closed by the endpoint");
    assert!(matches!(read, Ok(0) | Err(_)));
    cancel.cancel();
}

#[tokio::test]
async fn silent_responder_times_out_waiting_for_header() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let hold = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        tokio::time::sleep(Duration::from_secs(10)).await;
        drop(stream);
    });

    let downloads = TempDir::new().expect("downloads");
    let started = std::time::Instant::now();
    let err = download(
        &location("a.txt", port),
        downloads.path(),
        Duration::from_millis(300),
    )
    .await
    .unwrap_err();

    assert!(
        matches!(err, TransferError::ResponseTimeout { timeout_ms: 300, .. }),
        "got: {err}"
    );
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!downloads.path().join("a.txt").exists());
    hold.abort();
}
