use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use metrics_exporter_prometheus::PrometheusBuilder;
use pepper_client::gateway::RecordingGateway;
use pepper_client::runtime::{DisplayRuntime, LocalControl, Presenter};
use pepper_client::transport::{RelayClient, TransportEvent};
use pepper_core::{Command, InboundEvent, SurfaceOp};
use pepper_relay::{relay_router, ClientRegistry, RelayState};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, connect_async, tungstenite::Message};

async fn spawn_relay() -> (String, ClientRegistry) {
    let registry = ClientRegistry::default();
    let handle = PrometheusBuilder::new().build_recorder().handle();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = relay_router(RelayState::new(registry.clone(), handle));
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("ws://{addr}/ws"), registry)
}

async fn wait_for_clients(registry: &ClientRegistry, count: usize) {
    while registry.active_clients().await != count {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn collecting_sink() -> (
    impl Fn(TransportEvent) + Send + Sync + 'static,
    mpsc::UnboundedReceiver<TransportEvent>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        move |event| {
            let _ = tx.send(event);
        },
        rx,
    )
}

async fn next_status(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> String {
    loop {
        match rx.recv().await {
            Some(TransportEvent::Status(status)) => return status,
            Some(TransportEvent::Inbound(_)) => continue,
            None => panic!("transport sink dropped"),
        }
    }
}

async fn status_until(rx: &mut mpsc::UnboundedReceiver<TransportEvent>, wanted: &str) -> Vec<String> {
    let mut seen = Vec::new();
    loop {
        let status = next_status(rx).await;
        let done = status == wanted;
        seen.push(status);
        if done {
            return seen;
        }
    }
}

#[test_timeout::tokio_timeout_test(15)]
async fn cues_flow_from_controller_to_glasses() {
    let (url, registry) = spawn_relay().await;
    let gateway = RecordingGateway::new();
    let runtime = DisplayRuntime::new(Presenter::prompter(), Arc::new(gateway.clone()))
        .with_relay(RelayClient::new(url.as_str()));
    let handle = runtime.handle();
    let task = tokio::spawn(runtime.run());

    handle.status().wait_for(&format!("Connected to {url}")).await;
    wait_for_clients(&registry, 1).await;
    let (mut controller, _) = connect_async(url.as_str()).await.unwrap();
    wait_for_clients(&registry, 2).await;

    controller
        .send(Message::Text("definitely not json".into()))
        .await
        .unwrap();
    controller
        .send(Message::Text(r#"{"text1":"Opening","text2":"Thank the hosts"}"#.into()))
        .await
        .unwrap();

    let ops = gateway.wait_for_ops(2).await;
    let SurfaceOp::Rebuild(spec) = &ops[1] else {
        panic!("expected rebuild, got {:?}", ops[1]);
    };
    assert_eq!(
        spec.text("line1").map(|r| r.content.as_str()),
        Some("Opening")
    );
    let history = handle.status().history();
    assert!(history.iter().any(|s| s.starts_with("Ignored frame:")));
    assert!(history
        .iter()
        .any(|s| s == r#"Received: {"text1":"Opening","text2":"Thank the hosts"}"#));

    handle.control(LocalControl::DisconnectRelay);
    wait_for_clients(&registry, 1).await;
    handle.shutdown();
    task.await.unwrap();
}

#[test_timeout::tokio_timeout_test(15)]
async fn reconnects_after_the_server_closes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut first = accept_async(stream).await.unwrap();
        first.close(None).await.unwrap();
        while let Some(Ok(_)) = first.next().await {}

        let (stream, _) = listener.accept().await.unwrap();
        let mut second = accept_async(stream).await.unwrap();
        second
            .send(Message::Text(r#"{"command":"timerOn"}"#.into()))
            .await
            .unwrap();
        // Hold the connection until the client goes away.
        while let Some(Ok(_)) = second.next().await {}
    });

    let client = RelayClient::new(url.as_str()).with_reconnect_delay(Duration::from_millis(50));
    let (sink, mut rx) = collecting_sink();
    client.connect(sink);

    assert_eq!(next_status(&mut rx).await, format!("Connecting to {url}..."));
    assert_eq!(next_status(&mut rx).await, format!("Connected to {url}"));
    let seen = status_until(&mut rx, &format!("Reconnecting to {url}...")).await;
    assert!(seen.contains(&"Disconnected".to_string()));
    assert!(seen.contains(&"Reconnecting in 0s...".to_string()));
    assert_eq!(next_status(&mut rx).await, format!("Connected to {url}"));

    let inbound = loop {
        match rx.recv().await {
            Some(TransportEvent::Inbound(event)) => break event,
            Some(TransportEvent::Status(_)) => continue,
            None => panic!("transport sink dropped"),
        }
    };
    assert_eq!(inbound, InboundEvent::Command(Command::TimerOn));

    client.disconnect();
    server.await.unwrap();
}

#[test_timeout::tokio_timeout_test(15)]
async fn connect_failures_keep_retrying() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);

    let client = RelayClient::new(url.as_str()).with_reconnect_delay(Duration::from_millis(20));
    let (sink, mut rx) = collecting_sink();
    client.connect(sink);

    assert_eq!(next_status(&mut rx).await, format!("Connecting to {url}..."));
    for _ in 0..2 {
        assert!(next_status(&mut rx).await.starts_with("Connection failed:"));
        assert_eq!(next_status(&mut rx).await, "Reconnecting in 0s...");
        assert_eq!(next_status(&mut rx).await, format!("Reconnecting to {url}..."));
    }
    assert!(client.is_running());
    client.disconnect();
}

#[test_timeout::tokio_timeout_test(15)]
async fn disconnect_stops_reconnecting() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let client = RelayClient::new(url.as_str()).with_reconnect_delay(Duration::from_millis(20));
    let (sink, mut rx) = collecting_sink();
    client.connect(sink);

    let (stream, _) = listener.accept().await.unwrap();
    let mut server_side = accept_async(stream).await.unwrap();
    status_until(&mut rx, &format!("Connected to {url}")).await;
    assert!(client.is_connected());
    assert!(client.send(r#"{"text1":"a","text2":"b"}"#).is_ok());
    match server_side.next().await {
        Some(Ok(Message::Text(text))) => assert_eq!(text, r#"{"text1":"a","text2":"b"}"#),
        other => panic!("unexpected frame {other:?}"),
    }

    client.disconnect();
    assert!(!client.is_connected());
    // The client closes its side and never dials again.
    while let Some(Ok(message)) = server_side.next().await {
        if message.is_close() {
            break;
        }
    }
    let redial = tokio::time::timeout(Duration::from_millis(300), listener.accept()).await;
    assert!(redial.is_err());

    while let Ok(event) = rx.try_recv() {
        if let TransportEvent::Status(status) = event {
            assert!(!status.starts_with("Reconnecting"), "{status}");
        }
    }
    assert!(client.send("late").is_err());
}

#[test_timeout::tokio_timeout_test(15)]
async fn connect_right_after_disconnect_dials_again() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let client = RelayClient::new(url.as_str()).with_reconnect_delay(Duration::from_millis(20));
    let (sink, mut rx) = collecting_sink();
    client.connect(sink);
    let (stream, _) = listener.accept().await.unwrap();
    let mut first = accept_async(stream).await.unwrap();
    status_until(&mut rx, &format!("Connected to {url}")).await;

    client.disconnect();
    let (sink, mut rx) = collecting_sink();
    client.connect(sink);
    assert!(client.is_running());

    let (stream, _) = tokio::time::timeout(Duration::from_secs(2), listener.accept())
        .await
        .expect("client should dial again")
        .unwrap();
    let mut second = accept_async(stream).await.unwrap();
    status_until(&mut rx, &format!("Connected to {url}")).await;
    second
        .send(Message::Text(r#"{"command":"timerOff"}"#.into()))
        .await
        .unwrap();
    let inbound = loop {
        match rx.recv().await {
            Some(TransportEvent::Inbound(event)) => break event,
            Some(TransportEvent::Status(_)) => continue,
            None => panic!("transport sink dropped"),
        }
    };
    assert_eq!(inbound, InboundEvent::Command(Command::TimerOff));
    assert!(client.send("still open").is_ok());

    // The retired loop only closes its own socket.
    while let Some(Ok(message)) = first.next().await {
        if message.is_close() {
            break;
        }
    }
    assert!(client.is_connected());
    client.disconnect();
}

#[test_timeout::tokio_timeout_test(15)]
async fn handshake_finishing_after_disconnect_delivers_nothing() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let client = RelayClient::new(url.as_str()).with_reconnect_delay(Duration::from_millis(20));
    let (sink, mut rx) = collecting_sink();
    client.connect(sink);
    assert_eq!(next_status(&mut rx).await, format!("Connecting to {url}..."));

    // The TCP connect lands in the backlog; the upgrade is only answered later.
    tokio::time::sleep(Duration::from_millis(100)).await;
    client.disconnect();

    let (stream, _) = listener.accept().await.unwrap();
    if let Ok(mut late) = accept_async(stream).await {
        let _ = late
            .send(Message::Text(r#"{"command":"timerOn"}"#.into()))
            .await;
    }
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(!client.is_connected());
    assert!(!client.is_running());
    while let Ok(event) = rx.try_recv() {
        match event {
            TransportEvent::Status(status) => {
                assert!(!status.starts_with("Connected to"), "{status}")
            }
            TransportEvent::Inbound(event) => panic!("delivered after disconnect: {event:?}"),
        }
    }
    let redial = tokio::time::timeout(Duration::from_millis(200), listener.accept()).await;
    assert!(redial.is_err());
}

#[test_timeout::tokio_timeout_test(15)]
async fn operator_can_reconnect_the_relay() {
    let (url, registry) = spawn_relay().await;
    let gateway = RecordingGateway::new();
    let runtime = DisplayRuntime::new(Presenter::prompter(), Arc::new(gateway.clone()))
        .with_relay(RelayClient::new(url.as_str()));
    let handle = runtime.handle();
    let task = tokio::spawn(runtime.run());

    let connected = format!("Connected to {url}");
    handle.status().wait_for(&connected).await;
    wait_for_clients(&registry, 1).await;

    handle.control(LocalControl::DisconnectRelay);
    handle.status().wait_for("Disconnected").await;
    wait_for_clients(&registry, 0).await;

    handle.control(LocalControl::ConnectRelay);
    while handle.status().count(&connected) < 2 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    wait_for_clients(&registry, 1).await;

    let (mut controller, _) = connect_async(url.as_str()).await.unwrap();
    wait_for_clients(&registry, 2).await;
    controller
        .send(Message::Text(r#"{"command":"timerOn"}"#.into()))
        .await
        .unwrap();
    handle.status().wait_for("Timer visible").await;

    handle.shutdown();
    let presenter = task.await.unwrap();
    assert!(presenter.as_prompter().unwrap().state().timer_visible);
}
