//! Integration tests — full streaming lifecycle over a real TCP
//! connection on localhost.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use flut_core::{
    FlutError, MemoryTransport, PixelGrid, Rgba, SessionController, StreamParams, TcpTransport,
    Transport,
};

// ── Helpers ──────────────────────────────────────────────────────

/// Spin up a sink server on an OS-assigned port that accepts one
/// connection and accumulates everything it receives.
async fn sink_server() -> (std::net::SocketAddr, Arc<Mutex<Vec<u8>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 64 * 1024];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => sink.lock().await.extend_from_slice(&buf[..n]),
            }
        }
    });

    (addr, received)
}

fn red_2x2() -> Arc<PixelGrid> {
    Arc::new(PixelGrid::new(2, 2, vec![Rgba::opaque(0xff, 0, 0); 4]).unwrap())
}

fn single_frame_params(grid: Arc<PixelGrid>) -> StreamParams {
    StreamParams {
        grids: vec![grid],
        scale: 1.0,
        origin: (0, 0),
        worker_count: 2,
        chunk_count: 2,
        shuffled: false,
        durations: vec![Duration::from_millis(200)],
    }
}

// ── End-to-end streaming ─────────────────────────────────────────

#[tokio::test]
async fn streams_known_pixels_over_tcp() {
    let (addr, received) = sink_server().await;

    let transport = Arc::new(TcpTransport::connect(addr).await.unwrap());
    let controller = SessionController::new(transport as Arc<dyn Transport>);

    controller.start(&single_frame_params(red_2x2())).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    controller.stop();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let bytes = received.lock().await.clone();
    let text = String::from_utf8(bytes).unwrap();

    assert!(!text.is_empty(), "workers must have streamed something");
    assert!(text.contains("OFFSET 0 0\n"));
    // All four opaque-red pixels of the 2×2 frame appear on the wire.
    for line in [
        "PX 0 0 ff0000\n",
        "PX 1 0 ff0000\n",
        "PX 0 1 ff0000\n",
        "PX 1 1 ff0000\n",
    ] {
        assert!(text.contains(line), "missing {line:?}");
    }
}

#[tokio::test]
async fn retransmits_the_same_frame_continuously() {
    let (addr, received) = sink_server().await;

    let transport = Arc::new(TcpTransport::connect(addr).await.unwrap());
    let controller = SessionController::new(transport as Arc<dyn Transport>);

    let mut params = single_frame_params(red_2x2());
    params.worker_count = 1;
    params.chunk_count = 1;
    controller.start(&params).unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    controller.stop();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let bytes = received.lock().await.clone();
    let text = String::from_utf8(bytes).unwrap();

    // A persistent sender pushes the identical payload over and over.
    let occurrences = text.matches("PX 0 0 ff0000\n").count();
    assert!(
        occurrences > 1,
        "expected redundant retransmission, saw {occurrences} copies"
    );
}

// ── Cancellation ─────────────────────────────────────────────────

#[tokio::test]
async fn stop_silences_workers_within_poll_interval() {
    let transport = Arc::new(MemoryTransport::new());
    let controller = SessionController::new(Arc::clone(&transport) as Arc<dyn Transport>);

    controller.start(&single_frame_params(red_2x2())).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(transport.send_count() > 0);

    controller.stop();

    // Grace period: one poll interval for every worker to observe the
    // bumped generation. After that, the send count must freeze.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let settled = transport.send_count();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.send_count(), settled);
    assert_eq!(controller.status().active_workers, 0);
}

// ── Failure semantics ────────────────────────────────────────────

#[tokio::test]
async fn transport_failures_shrink_the_pool_observably() {
    let transport = Arc::new(MemoryTransport::new());
    let controller = SessionController::new(Arc::clone(&transport) as Arc<dyn Transport>);

    let mut params = single_frame_params(red_2x2());
    params.worker_count = 3;
    params.chunk_count = 3;
    controller.start(&params).unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(controller.status().active_workers, 3);

    transport.set_failing(true);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let status = controller.status();
    assert_eq!(status.active_workers, 0, "every worker hit the failure");
    assert!(status.running, "the session itself stays up until stopped");

    // Recovery is an explicit restart once the transport works again.
    transport.set_failing(false);
    controller.restart(&params).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(controller.status().active_workers, 3);
    controller.stop();
}

// ── Animation ────────────────────────────────────────────────────

#[tokio::test]
async fn two_frame_animation_streams_both_colors() {
    let transport = Arc::new(MemoryTransport::new());
    let controller = SessionController::new(Arc::clone(&transport) as Arc<dyn Transport>);

    let green = Arc::new(PixelGrid::new(2, 2, vec![Rgba::opaque(0, 0xff, 0); 4]).unwrap());
    let params = StreamParams {
        grids: vec![red_2x2(), green],
        scale: 1.0,
        origin: (5, 6),
        worker_count: 1,
        chunk_count: 1,
        shuffled: false,
        durations: vec![Duration::from_millis(100), Duration::from_millis(100)],
    };

    controller.start(&params).unwrap();
    let sequencer = controller.sequencer();

    tokio::time::sleep(Duration::from_millis(30)).await;
    sequencer.advance(Duration::from_millis(100));
    assert_eq!(sequencer.current_index(), 1);
    tokio::time::sleep(Duration::from_millis(30)).await;
    controller.stop();

    let text = String::from_utf8(transport.take_sent().concat()).unwrap();
    assert!(text.contains("OFFSET 5 6\n"));
    assert!(text.contains("ff0000"));
    assert!(text.contains("00ff00"));
}

// ── Validation at the API boundary ───────────────────────────────

#[tokio::test]
async fn invalid_params_never_reach_the_wire() {
    let transport = Arc::new(MemoryTransport::new());
    let controller = SessionController::new(Arc::clone(&transport) as Arc<dyn Transport>);

    let mut params = single_frame_params(red_2x2());
    params.scale = 0.0;
    assert!(matches!(
        controller.start(&params),
        Err(FlutError::InvalidScale(_))
    ));

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(transport.send_count(), 0);
    assert!(!controller.status().running);
}
