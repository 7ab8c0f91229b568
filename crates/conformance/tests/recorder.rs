mod common;

use std::time::Duration;

use common::*;
use conformance::{
    duplex::duplex, run_script, Flow, Perspective, PlayerConfig, RecordedEvent,
    RecordingConnection, TrailingBytes, Transcript,
};
use futures::{future::join, AsyncReadExt, AsyncWriteExt, FutureExt};

#[tokio::test]
async fn test_records_send_receive_send() {
    let (local, mut remote) = duplex();
    let mut conn = RecordingConnection::new(local);

    let session = async {
        conn.write_all(&[0x01, 0x02]).await.unwrap();
        let mut buf = [0u8; 1];
        conn.read_exact(&mut buf).await.unwrap();
        conn.write_all(&[0x04]).await.unwrap();
    };

    let peer = async {
        let mut buf = [0u8; 2];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x01, 0x02]);
        remote.write_all(&[0x03]).await.unwrap();
        let mut buf = [0u8; 1];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x04]);
    };

    join(session, peer).await;

    let events: Vec<_> = conn
        .drain()
        .iter()
        .map(|event| (event.flow(), event.payload().to_vec()))
        .collect();

    assert_eq!(
        events,
        vec![
            (Flow::Sent, vec![0x01, 0x02]),
            (Flow::Received, vec![0x03]),
            (Flow::Sent, vec![0x04]),
        ]
    );
}

/// The peer reads the last write and hangs up before the writer is polled
/// again, which is how every harness run ends.
#[tokio::test]
async fn test_write_consumed_before_peer_drop_is_recorded() {
    let (local, mut remote) = duplex();
    let mut conn = RecordingConnection::new(local);

    {
        let mut write = Box::pin(conn.write_all(&[0x58]));
        assert!((&mut write).now_or_never().is_none());

        let mut buf = [0u8; 1];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x58]);
        drop(remote);

        write.await.unwrap();
    }

    let events = conn.drain();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].flow(), Flow::Sent);
    assert_eq!(events[0].payload(), &[0x58]);
}

#[tokio::test]
async fn test_sequence_and_timestamps_are_monotonic() {
    let (local, mut remote) = duplex();
    let mut conn = RecordingConnection::new(local);

    let session = async {
        for i in 0..4u8 {
            conn.write_all(&[i]).await.unwrap();
        }
    };
    let peer = async {
        let mut buf = [0u8; 4];
        remote.read_exact(&mut buf).await.unwrap();
    };
    join(session, peer).await;

    let events = conn.drain();
    assert_eq!(events.len(), 4);
    for pair in events.windows(2) {
        assert!(pair[0].seq() < pair[1].seq());
        assert!(pair[0].elapsed() <= pair[1].elapsed());
    }
}

#[tokio::test]
async fn test_events_serialize_as_hex() {
    let (local, mut remote) = duplex();
    let mut conn = RecordingConnection::new(local);

    join(
        async { conn.write_all(&[0xca, 0xfe]).await.unwrap() },
        async {
            let mut buf = [0u8; 2];
            remote.read_exact(&mut buf).await.unwrap();
        },
    )
    .await;

    let events = conn.drain();
    let json = serde_json::to_string(&events).unwrap();
    assert!(json.contains("\"cafe\""));
    assert!(json.contains("\"sent\""));

    let decoded: Vec<RecordedEvent> = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, events);
}

/// Records a toy session from the client side, then replays the recording
/// against a fresh client.
#[tokio::test]
async fn test_recorded_session_replays() {
    init_tracing();

    let toy = ToyConfig::default();

    let (client_io, server_io) = duplex();
    let conn = RecordingConnection::new(client_io);
    let log = conn.log();

    let server = tokio::spawn(toy_server(server_io, toy.version));
    toy_client(conn, toy.clone()).await.unwrap();
    let app_data = server.await.unwrap().unwrap();
    assert_eq!(app_data, toy.app_data);

    let transcript = Transcript::from_events(&log.drain(), Perspective::Iut);
    // The hello was written in two pieces but forms a single segment.
    assert_eq!(transcript, session_transcript(&toy));

    let config = PlayerConfig::builder()
        .name("recorded")
        .trailing(TrailingBytes::Reject)
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    run_script(&config, &transcript, |io| toy_client(io, toy))
        .await
        .unwrap();
}

/// Records the server side instead, so the client's bytes show up as
/// received.
#[tokio::test]
async fn test_peer_perspective() {
    let toy = ToyConfig::default();

    let (client_io, server_io) = duplex();
    let conn = RecordingConnection::new(server_io);
    let log = conn.log();

    let client = tokio::spawn(toy_client(client_io, toy.clone()));
    toy_server(conn, toy.version).await.unwrap();
    client.await.unwrap().unwrap();

    let transcript = Transcript::from_events(&log.drain(), Perspective::Peer);
    assert_eq!(transcript, session_transcript(&toy));
}
