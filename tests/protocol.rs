//! Wire-level behaviour checked against a scripted peer.
//!
//! One side is the real implementation, the other a bare [`Socket`] whose
//! packets are written by hand, so duplicates, gaps, bogus ACKs and corrupt
//! packets can be injected exactly where needed.

use std::time::Duration;

use gbn_transfer::config::{ImpairmentConfig, ReceiverConfig, SenderConfig};
use gbn_transfer::packet::{Kind, Packet, FIN_END_OF_DATA};
use gbn_transfer::socket::Socket;
use gbn_transfer::{fetch, FetchError, ServeError, ServeOutcome, Server};
use tempfile::TempDir;

async fn peer() -> Socket {
    Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap()
}

/// Next packet on `sock`, failing the test after two seconds.
async fn next(sock: &Socket) -> (Packet, std::net::SocketAddr) {
    tokio::time::timeout(Duration::from_secs(2), sock.recv_from())
        .await
        .expect("peer went quiet")
        .expect("recv")
}

/// `true` if nothing arrives on `sock` within `wait`.
async fn silent_for(sock: &Socket, wait: Duration) -> bool {
    tokio::time::timeout(wait, sock.recv_from()).await.is_err()
}

fn corrupted(mut pkt: Packet) -> Packet {
    pkt.corrupt = true;
    pkt
}

// ---------------------------------------------------------------------------
// Receiver side: real `fetch`, scripted sender
// ---------------------------------------------------------------------------

#[tokio::test]
async fn receiver_reacks_duplicates_and_drops_gaps() {
    let sender = peer().await;
    let out = TempDir::new().unwrap();

    let mut cfg = ReceiverConfig::new(
        "127.0.0.1",
        sender.local_addr().port(),
        "abc.txt",
        ImpairmentConfig::default(),
    );
    cfg.output = out.path().join("n_abc.txt");
    cfg.idle_timeout = Some(Duration::from_secs(5));
    cfg.linger = Duration::ZERO;
    let client = tokio::spawn(async move { fetch(&cfg).await });

    let (req, rx) = next(&sender).await;
    assert_eq!(req.kind, Kind::Request);
    assert_eq!(req.file_name(), Some("abc.txt"));

    sender.send_to(&Packet::data(0, b"abc"), rx).await.unwrap();
    let (ack, _) = next(&sender).await;
    assert_eq!((ack.kind, ack.ack), (Kind::Ack, 0));

    // Duplicate of chunk 0: acknowledged again, not written again.
    sender.send_to(&Packet::data(0, b"abc"), rx).await.unwrap();
    let (ack, _) = next(&sender).await;
    assert_eq!((ack.kind, ack.ack), (Kind::Ack, 0));

    // Chunk 2 before chunk 1 is discarded without an ACK.
    sender.send_to(&Packet::data(2, b"ghi"), rx).await.unwrap();
    sender.send_to(&Packet::data(1, b"def"), rx).await.unwrap();
    let (ack, _) = next(&sender).await;
    assert_eq!((ack.kind, ack.ack), (Kind::Ack, 1));

    // A corrupt chunk is discarded silently.
    sender.send_to(&corrupted(Packet::data(2, b"XXX")), rx).await.unwrap();
    assert!(silent_for(&sender, Duration::from_millis(150)).await);

    sender.send_to(&Packet::data(2, b"ghi"), rx).await.unwrap();
    let (ack, _) = next(&sender).await;
    assert_eq!((ack.kind, ack.ack), (Kind::Ack, 2));

    sender.send_to(&Packet::fin(3), rx).await.unwrap();
    let (fin_ack, _) = next(&sender).await;
    assert_eq!((fin_ack.kind, fin_ack.ack), (Kind::Fin, 3));

    let summary = client.await.unwrap().expect("fetch");
    assert_eq!(std::fs::read(&summary.output).unwrap(), b"abcdefghi");
    assert_eq!(summary.stats.chunks_accepted, 3);
    assert_eq!(summary.stats.duplicates, 1);
}

#[tokio::test]
async fn receiver_ignores_packets_from_strangers() {
    let sender = peer().await;
    let stranger = peer().await;
    let out = TempDir::new().unwrap();

    let mut cfg = ReceiverConfig::new(
        "127.0.0.1",
        sender.local_addr().port(),
        "x",
        ImpairmentConfig::default(),
    );
    cfg.output = out.path().join("n_x");
    cfg.idle_timeout = Some(Duration::from_secs(5));
    cfg.linger = Duration::ZERO;
    let client = tokio::spawn(async move { fetch(&cfg).await });

    let (_, rx) = next(&sender).await;
    stranger.send_to(&Packet::data(0, b"evil"), rx).await.unwrap();
    assert!(silent_for(&stranger, Duration::from_millis(150)).await);

    sender.send_to(&Packet::data(0, b"good"), rx).await.unwrap();
    next(&sender).await;
    sender.send_to(&Packet::fin(1), rx).await.unwrap();
    next(&sender).await;

    let summary = client.await.unwrap().expect("fetch");
    assert_eq!(std::fs::read(&summary.output).unwrap(), b"good");
}

/// A lost FIN-ACK is recovered while the receiver lingers.
#[tokio::test]
async fn receiver_answers_retransmitted_fin_while_lingering() {
    let sender = peer().await;
    let out = TempDir::new().unwrap();

    let mut cfg = ReceiverConfig::new(
        "127.0.0.1",
        sender.local_addr().port(),
        "f",
        ImpairmentConfig::default(),
    );
    cfg.output = out.path().join("n_f");
    cfg.linger = Duration::from_millis(500);
    let client = tokio::spawn(async move { fetch(&cfg).await });

    let (_, rx) = next(&sender).await;
    sender.send_to(&Packet::fin(0), rx).await.unwrap();
    let (first, _) = next(&sender).await;
    sender.send_to(&Packet::fin(0), rx).await.unwrap();
    let (second, _) = next(&sender).await;

    assert_eq!(first, second);
    assert_eq!((first.kind, first.ack), (Kind::Fin, 0));
    let summary = client.await.unwrap().expect("fetch");
    assert_eq!(summary.bytes, 0);
    assert_eq!(summary.stats.fin_acks, 2);
}

#[tokio::test]
async fn sender_vanishing_mid_transfer_leaves_no_partial_file() {
    let sender = peer().await;
    let out = TempDir::new().unwrap();

    let mut cfg = ReceiverConfig::new(
        "127.0.0.1",
        sender.local_addr().port(),
        "half.bin",
        ImpairmentConfig::default(),
    );
    cfg.output = out.path().join("n_half.bin");
    cfg.idle_timeout = Some(Duration::from_millis(300));
    let output = cfg.output.clone();
    let client = tokio::spawn(async move { fetch(&cfg).await });

    let (_, rx) = next(&sender).await;
    sender.send_to(&Packet::data(0, b"first half"), rx).await.unwrap();
    let (ack, _) = next(&sender).await;
    assert_eq!((ack.kind, ack.ack), (Kind::Ack, 0));

    let err = client.await.unwrap().unwrap_err();
    assert!(matches!(err, FetchError::IdleTimeout(_)), "got {err}");
    assert!(!output.exists(), "received chunks must not survive a failed fetch");
}

// ---------------------------------------------------------------------------
// Sender side: real `Server`, scripted receiver
// ---------------------------------------------------------------------------

async fn server_for(contents: &[u8], window: usize, chunk_size: usize) -> (TempDir, Server) {
    server_with(contents, |cfg| {
        cfg.window = window;
        cfg.chunk_size = chunk_size;
    })
    .await
}

/// Serve `contents` as `data.bin` with a 200ms round timeout plus `tweak`.
async fn server_with(contents: &[u8], tweak: impl FnOnce(&mut SenderConfig)) -> (TempDir, Server) {
    let root = TempDir::new().unwrap();
    std::fs::write(root.path().join("data.bin"), contents).unwrap();
    let mut cfg = SenderConfig::new("127.0.0.1:0".parse().unwrap(), 4, ImpairmentConfig::default());
    cfg.root = root.path().to_path_buf();
    cfg.round_timeout = Duration::from_millis(200);
    tweak(&mut cfg);
    (root, Server::bind(cfg).await.unwrap())
}

#[tokio::test]
async fn sender_window_only_slides_on_valid_acks() {
    let (_root, mut server) = server_for(&[7u8; 40], 2, 10).await;
    let addr = server.local_addr();
    let task = tokio::spawn(async move { server.serve_one().await });

    let rx = peer().await;
    rx.send_to(&Packet::request("data.bin"), addr).await.unwrap();

    let seqs = |a: &Packet, b: &Packet| (a.seq, b.seq);
    let (d0, _) = next(&rx).await;
    let (d1, _) = next(&rx).await;
    assert_eq!(seqs(&d0, &d1), (0, 1));

    // An ACK for unsent data and a corrupt ACK must not move the window.
    rx.send_to(&Packet::ack(3), addr).await.unwrap();
    rx.send_to(&corrupted(Packet::ack(1)), addr).await.unwrap();
    let (r0, _) = next(&rx).await;
    let (r1, _) = next(&rx).await;
    assert_eq!(seqs(&r0, &r1), (0, 1), "round restarts from the old base");

    rx.send_to(&Packet::ack(0), addr).await.unwrap();
    rx.send_to(&Packet::ack(1), addr).await.unwrap();
    let (d2, _) = next(&rx).await;
    let (d3, _) = next(&rx).await;
    assert_eq!(seqs(&d2, &d3), (2, 3));

    // Stale ACK, then a single cumulative ACK for both outstanding chunks.
    rx.send_to(&Packet::ack(1), addr).await.unwrap();
    rx.send_to(&Packet::ack(3), addr).await.unwrap();
    let (fin, _) = next(&rx).await;
    assert_eq!((fin.kind, fin.seq, fin.ack), (Kind::Fin, 4, FIN_END_OF_DATA));
    rx.send_to(&Packet::fin_ack(4), addr).await.unwrap();

    match task.await.unwrap().unwrap() {
        ServeOutcome::Completed { stats, fin_acked, .. } => {
            assert!(fin_acked);
            assert_eq!(stats.acks_accepted, 3);
            assert_eq!(stats.acks_discarded, 3);
            assert_eq!(stats.timeouts, 1);
            assert_eq!(stats.retransmitted, 2);
        }
        other => panic!("expected completed transfer, got {other:?}"),
    }
}

#[tokio::test]
async fn sender_retransmits_fin_until_acknowledged() {
    let (_root, mut server) = server_for(b"tiny", 4, 1024).await;
    let addr = server.local_addr();
    let task = tokio::spawn(async move { server.serve_one().await });

    let rx = peer().await;
    rx.send_to(&Packet::request("data.bin"), addr).await.unwrap();
    let (data, _) = next(&rx).await;
    assert_eq!(data.payload, b"tiny");
    rx.send_to(&Packet::ack(0), addr).await.unwrap();

    // Ignore the first FIN; a wrong FIN-ACK is not accepted either.
    let (fin, _) = next(&rx).await;
    assert_eq!((fin.kind, fin.seq), (Kind::Fin, 1));
    rx.send_to(&Packet::fin_ack(0), addr).await.unwrap();
    let (again, _) = next(&rx).await;
    assert_eq!(again, fin);
    rx.send_to(&Packet::fin_ack(1), addr).await.unwrap();

    match task.await.unwrap().unwrap() {
        ServeOutcome::Completed { stats, fin_acked, .. } => {
            assert!(fin_acked);
            assert_eq!(stats.fins_sent, 2);
        }
        other => panic!("expected completed transfer, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_file_gets_single_not_found_fin() {
    let (_root, mut server) = server_for(b"", 4, 1024).await;
    let addr = server.local_addr();
    let task = tokio::spawn(async move { server.serve_one().await });

    let rx = peer().await;
    rx.send_to(&Packet::request("absent.bin"), addr).await.unwrap();
    let (pkt, _) = next(&rx).await;
    assert!(pkt.is_not_found());
    assert!(silent_for(&rx, Duration::from_millis(300)).await);

    assert!(matches!(
        task.await.unwrap().unwrap(),
        ServeOutcome::NotFound { ref file_name, .. } if file_name == "absent.bin"
    ));
}

#[tokio::test]
async fn sender_ignores_corrupt_and_non_request_packets_while_idle() {
    let (_root, mut server) = server_for(b"payload", 4, 1024).await;
    let addr = server.local_addr();
    let task = tokio::spawn(async move { server.serve_one().await });

    let rx = peer().await;
    rx.send_to(&corrupted(Packet::request("data.bin")), addr).await.unwrap();
    rx.send_to(&Packet::ack(0), addr).await.unwrap();
    assert!(silent_for(&rx, Duration::from_millis(200)).await);

    rx.send_to(&Packet::request("data.bin"), addr).await.unwrap();
    let (data, _) = next(&rx).await;
    assert_eq!((data.kind, data.seq), (Kind::Data, 0));
    rx.send_to(&Packet::ack(0), addr).await.unwrap();
    next(&rx).await;
    rx.send_to(&Packet::fin_ack(1), addr).await.unwrap();

    assert!(matches!(
        task.await.unwrap().unwrap(),
        ServeOutcome::Completed { fin_acked: true, .. }
    ));
}

#[tokio::test]
async fn sender_gives_up_after_stalled_rounds() {
    let (_root, mut server) = server_with(&[1u8; 30], |cfg| {
        cfg.chunk_size = 10;
        cfg.max_stalled_rounds = Some(2);
    })
    .await;
    let addr = server.local_addr();
    let task = tokio::spawn(async move { server.serve_one().await });

    let rx = peer().await;
    rx.send_to(&Packet::request("data.bin"), addr).await.unwrap();

    // Two full rounds of DATA 0..3, never acknowledged.
    for _ in 0..2 {
        for seq in 0..3 {
            assert_eq!(next(&rx).await.0.seq, seq);
        }
    }

    let err = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("sender kept retrying")
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, ServeError::Stalled { rounds: 2 }), "got {err}");
    assert!(silent_for(&rx, Duration::from_millis(300)).await);
}

#[tokio::test]
async fn sender_releases_session_when_fin_retries_run_out() {
    let (_root, mut server) = server_with(b"bye", |cfg| cfg.fin_retries = 2).await;
    let addr = server.local_addr();
    let task = tokio::spawn(async move { server.serve_one().await });

    let rx = peer().await;
    rx.send_to(&Packet::request("data.bin"), addr).await.unwrap();
    next(&rx).await;
    rx.send_to(&Packet::ack(0), addr).await.unwrap();

    for _ in 0..2 {
        let (fin, _) = next(&rx).await;
        assert_eq!((fin.kind, fin.seq), (Kind::Fin, 1));
    }
    assert!(silent_for(&rx, Duration::from_millis(400)).await, "no third FIN");

    match task.await.unwrap().unwrap() {
        ServeOutcome::Completed { stats, fin_acked, .. } => {
            assert!(!fin_acked);
            assert_eq!(stats.fins_sent, 2);
        }
        other => panic!("expected completed transfer, got {other:?}"),
    }
}

/// An aborted transfer does not take the serve loop down.
#[tokio::test]
async fn serve_loop_survives_an_aborted_transfer() {
    let (_root, mut server) = server_with(b"still here", |cfg| cfg.max_stalled_rounds = Some(1)).await;
    let addr = server.local_addr();
    let task = tokio::spawn(async move { server.run().await });

    // First client asks and then never acknowledges: one stalled round ends it.
    let quitter = peer().await;
    quitter.send_to(&Packet::request("data.bin"), addr).await.unwrap();
    next(&quitter).await;
    tokio::time::sleep(Duration::from_millis(400)).await;

    let rx = peer().await;
    rx.send_to(&Packet::request("data.bin"), addr).await.unwrap();
    let (data, _) = next(&rx).await;
    assert_eq!(data.payload, b"still here");
    rx.send_to(&Packet::ack(0), addr).await.unwrap();
    let (fin, _) = next(&rx).await;
    assert_eq!(fin.kind, Kind::Fin);
    rx.send_to(&Packet::fin_ack(fin.seq), addr).await.unwrap();

    assert!(!task.is_finished());
    task.abort();
}
