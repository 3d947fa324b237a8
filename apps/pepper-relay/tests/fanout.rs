use std::net::SocketAddr;
use std::time::Duration;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use futures_util::{SinkExt, StreamExt};
use metrics_exporter_prometheus::PrometheusBuilder;
use pepper_relay::{relay_router, ClientRegistry, RelayState};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tower::util::ServiceExt;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_relay(registry: ClientRegistry) -> SocketAddr {
    let handle = PrometheusBuilder::new().build_recorder().handle();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = relay_router(RelayState::new(registry, handle));
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn join(url: &str, registry: &ClientRegistry, expected: usize) -> Client {
    let (client, _) = connect_async(url).await.unwrap();
    while registry.active_clients().await < expected {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    client
}

async fn next_text(client: &mut Client) -> String {
    loop {
        match client.next().await {
            Some(Ok(Message::Text(text))) => return text,
            Some(Ok(_)) => continue,
            other => panic!("unexpected frame {other:?}"),
        }
    }
}

#[test_timeout::tokio_timeout_test(10)]
async fn frames_reach_every_other_client() {
    let registry = ClientRegistry::default();
    let addr = spawn_relay(registry.clone()).await;
    let mut controller = join(&format!("ws://{addr}/"), &registry, 1).await;
    let mut glasses = join(&format!("ws://{addr}/ws"), &registry, 2).await;
    let mut second = join(&format!("ws://{addr}/ws"), &registry, 3).await;

    let cue = r#"{"text1":"Hello","text2":"World"}"#;
    controller.send(Message::Text(cue.to_string())).await.unwrap();
    assert_eq!(next_text(&mut glasses).await, cue);
    assert_eq!(next_text(&mut second).await, cue);

    // The sender never hears its own frame; the next thing it sees is the reply.
    glasses
        .send(Message::Text(r#"{"command":"timerOn"}"#.to_string()))
        .await
        .unwrap();
    assert_eq!(next_text(&mut controller).await, r#"{"command":"timerOn"}"#);

    let stats = registry.stats().await;
    assert_eq!(stats.active_clients, 3);
    assert_eq!(stats.messages_forwarded, 4);
}

#[test_timeout::tokio_timeout_test(10)]
async fn closed_clients_leave_the_registry() {
    let registry = ClientRegistry::default();
    let addr = spawn_relay(registry.clone()).await;
    let url = format!("ws://{addr}/ws");
    let mut a = join(&url, &registry, 1).await;
    let _b = join(&url, &registry, 2).await;

    a.close(None).await.unwrap();
    while registry.active_clients().await != 1 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(registry.stats().await.total_connections, 2);
}

#[test_timeout::tokio_timeout_test]
async fn health_and_stats_endpoints() {
    let registry = ClientRegistry::default();
    let handle = PrometheusBuilder::new().build_recorder().handle();
    let router = relay_router(RelayState::new(registry, handle));

    let response = router
        .clone()
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], br#"{"status":"ok"}"#);

    let response = router
        .oneshot(Request::builder().uri("/debug/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let stats: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(stats["active_clients"], 0);
}
