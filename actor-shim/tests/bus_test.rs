//! End-to-end test over real TCP sockets: development bus, transport actor,
//! and shim wired together, observed from a second bus client.

use std::time::Duration;

use actor_shim::types::TransportMessage;
use actor_shim::{ActorConfig, ActorShim, Handler, bus, transport};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_test::assert_ok;

async fn recv_frame(rx: &mut tokio::sync::mpsc::Receiver<TransportMessage>) -> TransportMessage {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a bus frame")
        .expect("bus connection closed")
}

#[tokio::test]
async fn request_round_trip_over_bus() {
    let _ = tracing_subscriber::fmt::try_init();

    let listener = assert_ok!(TcpListener::bind(("127.0.0.1", 0)).await);
    let addr = assert_ok!(listener.local_addr());
    tokio::spawn(bus::serve(listener));

    // Actor side: connect, subscribe, and run the shim over the connection.
    let config = ActorConfig::new("example-service").with_hostname("buster");
    let handler = Handler::from_fn(|payload: Value, _request_id| async move {
        Ok(json!({"echo": payload}))
    });
    let filters = vec![
        "REQ/ALL/example-service/#".to_string(),
        "REQ/buster/example-service/#".to_string(),
    ];
    let (actor_tx, actor_rx) =
        assert_ok!(transport::connect("127.0.0.1", addr.port(), &filters).await);
    let (shim, _handle) = ActorShim::new(config, handler, actor_rx, actor_tx);
    tokio::spawn(shim.run());

    // Requester side: a plain bus client watching all responses.
    let response_filter = vec!["RESP/#".to_string()];
    let (requester_tx, mut requester_rx) =
        assert_ok!(transport::connect("127.0.0.1", addr.port(), &response_filter).await);

    // Give the bus a moment to register both clients' subscriptions.
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_ok!(
        requester_tx
            .send(TransportMessage {
                topic: "REQ/ALL/example-service/tid42".to_string(),
                payload: r#"{"message":"hi"}"#.to_string(),
            })
            .await
    );

    let ack = recv_frame(&mut requester_rx).await;
    assert_eq!(ack.topic, "RESP/buster/example-service/tid42/ACK/JSON");
    let envelope: Value = assert_ok!(serde_json::from_str(&ack.payload));
    assert_eq!(envelope["status"], "received");
    assert_eq!(envelope["hostname"], "buster");
    assert_eq!(envelope["request"], json!({"message": "hi"}));

    let ack_symbol = recv_frame(&mut requester_rx).await;
    assert_eq!(ack_symbol.topic, "RESP/buster/example-service/tid42/ACK/SYMBOLIC");
    assert_eq!(ack_symbol.payload, "📥");

    let result = recv_frame(&mut requester_rx).await;
    assert_eq!(result.topic, "RESP/buster/example-service/tid42/RESULT/JSON");
    let envelope: Value = assert_ok!(serde_json::from_str(&result.payload));
    assert_eq!(envelope["status"], "success");
    assert_eq!(envelope["echo"], json!({"message": "hi"}));

    let result_symbol = recv_frame(&mut requester_rx).await;
    assert_eq!(
        result_symbol.topic,
        "RESP/buster/example-service/tid42/RESULT/SYMBOLIC"
    );
    assert_eq!(result_symbol.payload, "✅");
}

#[tokio::test]
async fn bus_only_delivers_to_matching_filters() {
    let _ = tracing_subscriber::fmt::try_init();

    let listener = assert_ok!(TcpListener::bind(("127.0.0.1", 0)).await);
    let addr = assert_ok!(listener.local_addr());
    tokio::spawn(bus::serve(listener));

    let narrow = vec!["REQ/ALL/other-service/#".to_string()];
    let (_narrow_tx, mut narrow_rx) =
        assert_ok!(transport::connect("127.0.0.1", addr.port(), &narrow).await);

    let wide = vec!["REQ/#".to_string()];
    let (wide_tx, mut wide_rx) =
        assert_ok!(transport::connect("127.0.0.1", addr.port(), &wide).await);

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_ok!(
        wide_tx
            .send(TransportMessage {
                topic: "REQ/ALL/example-service".to_string(),
                payload: "{}".to_string(),
            })
            .await
    );

    // The wide subscriber hears its own publish back; the narrow one hears
    // nothing.
    let frame = recv_frame(&mut wide_rx).await;
    assert_eq!(frame.topic, "REQ/ALL/example-service");
    let silent = timeout(Duration::from_millis(200), narrow_rx.recv()).await;
    assert!(silent.is_err(), "unexpected delivery: {silent:?}");
}
