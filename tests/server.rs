//! Serving over a real socket, including graceful shutdown.

mod common;

use std::time::Duration;

use tokio::net::TcpListener;

use venture_api::{HttpServer, Shutdown};

#[tokio::test]
async fn test_server_serves_until_shutdown() {
    let app = common::app_with(|config| config.rate_limit.sweep_interval_ms = Some(1000));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(app.state.clone());
    let handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { server.run(listener, &shutdown).await })
    };

    let response = reqwest::get(format!("http://{addr}/api/startups/s1"))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok()),
        Some("99")
    );

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();
}
