use std::sync::Arc;
use std::time::Duration;

use morty::MortyProxy;
use morty::config::ProxyConfig;
use morty::core::proxy::client::build_client;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use pingora::proxy::http_proxy_service;
use pingora::server::Server;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Spawns a mock upstream that answers each connection with `handler(path)`.
pub async fn spawn_upstream(handler: fn(&str) -> String) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        loop {
            if let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buf[..n]).into_owned();
                    let path = request
                        .split_whitespace()
                        .nth(1)
                        .unwrap_or("/")
                        .to_string();
                    let response = handler(&path);
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        }
    });

    port
}

/// An HTTP/1.1 response with the given status line, extra headers and body.
pub fn http_response(status: &str, headers: &[(&str, &str)], body: &str) -> String {
    let mut response = format!("HTTP/1.1 {status}\r\nContent-Length: {}\r\n", body.len());
    for (name, value) in headers {
        response.push_str(&format!("{name}: {value}\r\n"));
    }
    response.push_str("Connection: close\r\n\r\n");
    response.push_str(body);
    response
}

pub fn create_test_config() -> ProxyConfig {
    (*morty::test_utils::create_test_config()).clone()
}

/// Boots a proxy instance on an ephemeral port.
pub async fn spawn_proxy(mut config: ProxyConfig) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    config.listen_address = format!("127.0.0.1:{port}");
    let config = Arc::new(config);
    let config_for_thread = config.clone();

    std::thread::spawn(move || {
        let client = build_client(&config_for_thread).unwrap();
        let proxy = MortyProxy::new(config_for_thread.clone(), client);

        let mut server = Server::new(None).unwrap();
        server.bootstrap();
        let mut service = http_proxy_service(&server.configuration, proxy);
        service.add_tcp(&config_for_thread.listen_address);
        server.add_service(service);
        server.run_forever();
    });

    tokio::time::sleep(Duration::from_secs(3)).await;
    port
}

/// Sends a raw HTTP request to the proxy and returns the full response.
pub async fn fetch(proxy_port: u16, request: &str) -> String {
    let mut stream = TcpStream::connect(("127.0.0.1", proxy_port)).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    let _ = stream.read_to_end(&mut response).await;
    String::from_utf8_lossy(&response).into_owned()
}

pub async fn get(proxy_port: u16, path_and_query: &str) -> String {
    fetch(
        proxy_port,
        &format!("GET {path_and_query} HTTP/1.1\r\nHost: 127.0.0.1\r\nConnection: close\r\n\r\n"),
    )
    .await
}

/// Percent-encodes a target URL for use as a query parameter value.
pub fn encode_target(target: &str) -> String {
    utf8_percent_encode(target, NON_ALPHANUMERIC).to_string()
}

/// Case-insensitive containment check, for header assertions.
pub fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack
        .to_ascii_lowercase()
        .contains(&needle.to_ascii_lowercase())
}
