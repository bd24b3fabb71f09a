//! End-to-end tests: panel client -> TcpServer -> storage and diagnostic sinks.
//!
//! Every test binds an ephemeral port and an in-memory database.

use chrono::{Duration as ChronoDuration, FixedOffset, Utc};
use siaip_core::{Blacklist, CodeCatalog, CodeCategory, DecodedEvent, DriftWindow};
use siaip_network::{
    PanelClient, PanelClientConfig, PanelClientError, ReceiverContext, TcpServer, TcpServerConfig,
};
use siaip_protocol::{FrameProcessor, LocalZone, PanelFrame, TimestampReconciler};
use siaip_storage::{
    CorrelationPipeline, Database, DiagnosticFormat, DiagnosticSink, Dispatcher, EventReception,
    SqliteEventStore, StorageSink,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const KEY: &[u8] = b"0123456789abcdef";
const BLACKLISTED: &str = "9999";
const ORIGIN: &str = "SiaIP_test";

struct Receiver {
    addr: SocketAddr,
    db: Database,
    events: broadcast::Receiver<Arc<DecodedEvent>>,
}

async fn start_receiver(max_connections: usize) -> Receiver {
    let db = Database::in_memory().await.unwrap();
    let store = Arc::new(SqliteEventStore::new(db.pool().clone()));
    let diagnostic = DiagnosticSink::new(DiagnosticFormat::Json);
    let dispatcher = Dispatcher::new()
        .with_sink(StorageSink::new(CorrelationPipeline::new(store, ORIGIN)))
        .with_diagnostic(diagnostic);
    let events = dispatcher.subscribe().unwrap();

    let processor = FrameProcessor::new(
        KEY,
        Arc::new(CodeCatalog::new([("BA", CodeCategory::Zone)])),
        Arc::new([BLACKLISTED].into_iter().collect::<Blacklist>()),
        TimestampReconciler::new(
            LocalZone::Fixed(FixedOffset::east_opt(0).unwrap()),
            DriftWindow::default(),
        ),
    );

    let config = TcpServerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        max_connections,
        ..TcpServerConfig::default()
    };
    let server = TcpServer::bind(config, ReceiverContext::new(processor, dispatcher))
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());

    Receiver { addr, db, events }
}

async fn connect(addr: SocketAddr) -> PanelClient {
    let mut client = PanelClient::new(PanelClientConfig {
        server_addr: addr,
        timeout: Duration::from_millis(1000),
    });
    client.connect().await.unwrap();
    client
}

fn panel_frame(account: &str, skew_seconds: i64) -> PanelFrame {
    let panel_time = Utc::now() + ChronoDuration::seconds(skew_seconds);
    PanelFrame::new(account)
        .sequence("0042")
        .line("3")
        .signal("NBA012")
        .timestamp(panel_time.naive_utc())
}

/// Wait until the storage sink has written `expected` records.
async fn wait_for_records(db: &Database, expected: i64) -> i64 {
    let mut count = 0;
    for _ in 0..50 {
        count = EventReception::count(db.pool()).await.unwrap();
        if count >= expected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    count
}

#[tokio::test]
async fn test_in_window_frame_is_acknowledged_and_stored() {
    let mut receiver = start_receiver(10).await;
    let mut client = connect(receiver.addr).await;

    let reply = client.exchange(&panel_frame("1234", 0), KEY).await.unwrap();
    assert!(reply.is_ack());
    assert_eq!(reply.body(), "\"ACK\"0042L31234[]");

    assert_eq!(wait_for_records(&receiver.db, 1).await, 1);
    let records = EventReception::find_by_account(receiver.db.pool(), "1234")
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].signal_code.as_deref(), Some("BA"));
    assert_eq!(records[0].zone_number, Some(12));
    assert_eq!(records[0].origin, ORIGIN);
    assert_eq!(records[0].signal_type_id, None);
    assert_eq!(records[0].system_id, None);
    assert_eq!(records[0].zone_id, None);

    let event = receiver.events.recv().await.unwrap();
    assert_eq!(event.sequence, "0042");

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_stale_frame_is_rejected_without_storage() {
    let mut receiver = start_receiver(10).await;
    let mut client = connect(receiver.addr).await;

    let reply = client
        .exchange(&panel_frame("1234", -600), KEY)
        .await
        .unwrap();
    assert!(reply.is_nak());
    assert!(reply.body().starts_with("\"NAK\"0000R0L0[]_"));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(EventReception::count(receiver.db.pool()).await.unwrap(), 0);
    assert!(receiver.events.try_recv().is_err());
}

#[tokio::test]
async fn test_blacklisted_account_gets_no_reply() {
    let mut receiver = start_receiver(10).await;
    let mut client = connect(receiver.addr).await;

    let result = client.exchange(&panel_frame(BLACKLISTED, 0), KEY).await;
    assert!(matches!(result, Err(PanelClientError::ReadTimeout(_))));

    assert_eq!(EventReception::count(receiver.db.pool()).await.unwrap(), 0);
    assert!(receiver.events.try_recv().is_err());

    // The connection stays usable after a dropped frame
    let reply = client.exchange(&panel_frame("1234", 0), KEY).await.unwrap();
    assert!(reply.is_ack());
}

#[tokio::test]
async fn test_undecryptable_frame_gets_no_reply() {
    let receiver = start_receiver(10).await;
    let mut client = connect(receiver.addr).await;

    // Three hex digits cannot be a whole cipher block
    client
        .send_raw(&b"\n00000000\"*SIA-DCS\"0001R0L0#1234[ABC\r"[..])
        .await
        .unwrap();
    assert!(matches!(
        client.recv().await,
        Err(PanelClientError::ReadTimeout(_))
    ));
    assert_eq!(EventReception::count(receiver.db.pool()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_multiple_frames_on_one_connection() {
    let receiver = start_receiver(10).await;
    let mut client = connect(receiver.addr).await;

    for sequence in ["0001", "0002", "0003"] {
        let frame = panel_frame("5678", 0).sequence(sequence);
        let reply = client.exchange(&frame, KEY).await.unwrap();
        assert_eq!(reply.body(), format!("\"ACK\"{sequence}L35678[]"));
    }

    assert_eq!(wait_for_records(&receiver.db, 3).await, 3);
}

#[tokio::test]
async fn test_concurrent_panels() {
    let receiver = start_receiver(10).await;

    let tasks: Vec<_> = ["1001", "1002", "1003", "1004"]
        .into_iter()
        .map(|account| {
            let addr = receiver.addr;
            tokio::spawn(async move {
                let mut client = connect(addr).await;
                let reply = client.exchange(&panel_frame(account, 0), KEY).await.unwrap();
                assert!(reply.body().ends_with(&format!("{account}[]")));
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(wait_for_records(&receiver.db, 4).await, 4);
}

#[tokio::test]
async fn test_connection_over_limit_is_closed() {
    let receiver = start_receiver(1).await;

    let mut first = connect(receiver.addr).await;
    assert!(first.exchange(&panel_frame("1234", 0), KEY).await.unwrap().is_ack());

    let mut second = connect(receiver.addr).await;
    let result = second.exchange(&panel_frame("5678", 0), KEY).await;
    assert!(matches!(
        result,
        Err(PanelClientError::ConnectionLost(_)) | Err(PanelClientError::Io(_)) | Err(PanelClientError::Protocol(_))
    ));

    // The first connection is unaffected
    assert!(first.exchange(&panel_frame("1234", 0), KEY).await.unwrap().is_ack());
}
