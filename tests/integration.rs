mod common;

use std::sync::OnceLock;

use common::{
    contains_ci, create_test_config, encode_target, fetch, get, http_response, spawn_proxy,
    spawn_upstream,
};
use morty::security::sign;

fn upstream_pages(path: &str) -> String {
    match path {
        "/page" => http_response(
            "200 OK",
            &[("Content-Type", "text/html; charset=utf-8")],
            concat!(
                "<html><head><title>t</title></head><body>",
                "<script>alert(1)</script>",
                "<a href=\"/other\">link</a>ok</body></html>",
            ),
        ),
        "/style.css" => http_response(
            "200 OK",
            &[("Content-Type", "text/css")],
            "body { background: url(./bg.png); }",
        ),
        "/flash" => http_response(
            "200 OK",
            &[("Content-Type", "application/x-shockwave-flash")],
            "FWS...",
        ),
        "/doc.pdf" => http_response(
            "200 OK",
            &[("Content-Type", "application/pdf")],
            "%PDF-1.4",
        ),
        "/moved" => http_response(
            "302 Found",
            &[
                ("Content-Type", "text/html"),
                ("Location", "http://elsewhere.example/new"),
            ],
            "",
        ),
        "/naked" => "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nhi".to_string(),
        _ => http_response("404 Not Found", &[("Content-Type", "text/html")], "gone"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_static_endpoints_and_landing_page() {
    let proxy_port = spawn_proxy(create_test_config()).await;

    let robots = get(proxy_port, "/robots.txt").await;
    assert!(robots.contains("200"));
    assert!(robots.contains("Disallow: /"));

    let favicon = get(proxy_port, "/favicon.ico").await;
    assert!(contains_ci(&favicon, "Content-Type: image/png"));

    let landing = get(proxy_port, "/").await;
    assert!(landing.contains("200"));
    assert!(landing.contains("MortyProxy"));
    assert!(landing.contains("name=\"mortyurl\""));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_html_is_sanitized_end_to_end() {
    let upstream_port = spawn_upstream(upstream_pages).await;
    let proxy_port = spawn_proxy(create_test_config()).await;

    let target = format!("http://127.0.0.1:{upstream_port}/page");
    let response = get(proxy_port, &format!("/?mortyurl={}", encode_target(&target))).await;

    assert!(response.contains("200"), "unexpected response: {response}");
    assert!(contains_ci(&response, "Content-Type: text/html; charset=UTF-8"));
    assert!(!response.to_ascii_lowercase().contains("<script"));
    assert!(!response.contains("alert(1)"));
    assert!(response.contains("ok"));
    // the anchor routes back through the proxy
    assert!(response.contains(&format!(
        "href=\"./?mortyurl=http%3A%2F%2F127.0.0.1%3A{upstream_port}%2Fother\""
    )));
    // body chrome injected exactly once
    assert_eq!(response.matches("id=\"mortyheader\"").count(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_css_is_rewritten() {
    let upstream_port = spawn_upstream(upstream_pages).await;
    let proxy_port = spawn_proxy(create_test_config()).await;

    let target = format!("http://127.0.0.1:{upstream_port}/style.css");
    let response = get(proxy_port, &format!("/?mortyurl={}", encode_target(&target))).await;

    assert!(contains_ci(&response, "Content-Type: text/css; charset=UTF-8"));
    assert!(response.contains(&format!(
        "url(./?mortyurl=http%3A%2F%2F127.0.0.1%3A{upstream_port}%2Fbg.png)"
    )));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_content_type_gating() {
    let upstream_port = spawn_upstream(upstream_pages).await;
    let proxy_port = spawn_proxy(create_test_config()).await;

    // neither allow-list: refused
    let target = format!("http://127.0.0.1:{upstream_port}/flash");
    let response = get(proxy_port, &format!("/?mortyurl={}", encode_target(&target))).await;
    assert!(response.contains("403"));
    assert!(response.contains("forbidden content type"));

    // attachment allow-list: forced download
    let target = format!("http://127.0.0.1:{upstream_port}/doc.pdf");
    let response = get(proxy_port, &format!("/?mortyurl={}", encode_target(&target))).await;
    assert!(response.contains("200"));
    assert!(contains_ci(&response, "Content-Disposition: attachment; fileName=doc.pdf"));

    // no content type at all: refused with 503
    let target = format!("http://127.0.0.1:{upstream_port}/naked");
    let response = get(proxy_port, &format!("/?mortyurl={}", encode_target(&target))).await;
    assert!(response.contains("503"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_redirect_location_is_proxified() {
    let upstream_port = spawn_upstream(upstream_pages).await;
    let proxy_port = spawn_proxy(create_test_config()).await;

    let target = format!("http://127.0.0.1:{upstream_port}/moved");
    let response = get(proxy_port, &format!("/?mortyurl={}", encode_target(&target))).await;

    assert!(response.contains("302"));
    assert!(contains_ci(
        &response,
        "Location: ./?mortyurl=http%3A%2F%2Felsewhere.example%2Fnew"
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_upstream_error_status_is_relayed() {
    let upstream_port = spawn_upstream(upstream_pages).await;
    let proxy_port = spawn_proxy(create_test_config()).await;

    let target = format!("http://127.0.0.1:{upstream_port}/missing");
    let response = get(proxy_port, &format!("/?mortyurl={}", encode_target(&target))).await;
    assert!(response.contains("404"));
    assert!(response.contains("invalid response"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_signature_enforcement() {
    let upstream_port = spawn_upstream(upstream_pages).await;
    let key = b"integration test key".to_vec();
    let mut config = create_test_config();
    config.key = Some(key.clone());
    let proxy_port = spawn_proxy(config).await;

    let target = format!("http://127.0.0.1:{upstream_port}/page");

    // unsigned request is refused before any fetch
    let response = get(proxy_port, &format!("/?mortyurl={}", encode_target(&target))).await;
    assert!(response.contains("403"));
    assert!(response.contains("mortyhash"));

    // tampered signature is refused
    let bad_hash = sign::hash(b"http://other.example/", &key);
    let response = get(
        proxy_port,
        &format!(
            "/?mortyurl={}&mortyhash={bad_hash}",
            encode_target(&target)
        ),
    )
    .await;
    assert!(response.contains("403"));

    // valid signature goes through
    let good_hash = sign::hash(target.as_bytes(), &key);
    let response = get(
        proxy_port,
        &format!(
            "/?mortyurl={}&mortyhash={good_hash}",
            encode_target(&target)
        ),
    )
    .await;
    assert!(response.contains("200"), "unexpected response: {response}");
    assert!(response.contains("ok"));
}

static REDIRECT_PORT: OnceLock<u16> = OnceLock::new();

fn redirect_pages(path: &str) -> String {
    let port = REDIRECT_PORT.get().copied().unwrap_or(0);
    match path {
        "/start" => http_response(
            "302 Found",
            &[("Location", &format!("http://127.0.0.1:{port}/landed"))],
            "",
        ),
        "/loop" => http_response(
            "302 Found",
            &[("Location", &format!("http://127.0.0.1:{port}/loop"))],
            "",
        ),
        "/landed" => http_response(
            "200 OK",
            &[("Content-Type", "text/html; charset=utf-8")],
            "<body>arrived</body>",
        ),
        _ => http_response("404 Not Found", &[], ""),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_get_redirects_are_followed_when_enabled() {
    let upstream_port = spawn_upstream(redirect_pages).await;
    let _ = REDIRECT_PORT.set(upstream_port);
    let mut config = create_test_config();
    config.follow_redirect = true;
    let proxy_port = spawn_proxy(config).await;

    let target = format!("http://127.0.0.1:{upstream_port}/start");
    let response = get(proxy_port, &format!("/?mortyurl={}", encode_target(&target))).await;
    assert!(response.contains("200"), "unexpected response: {response}");
    assert!(response.contains("arrived"));

    let target = format!("http://127.0.0.1:{upstream_port}/loop");
    let response = get(proxy_port, &format!("/?mortyurl={}", encode_target(&target))).await;
    assert!(response.contains("310"));
    assert!(response.contains("Too many redirects"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_post_form_carries_the_target() {
    let upstream_port = spawn_upstream(upstream_pages).await;
    let proxy_port = spawn_proxy(create_test_config()).await;

    let target = format!("http://127.0.0.1:{upstream_port}/page");
    let body = format!("mortyurl={}", encode_target(&target));
    let request = format!(
        "POST / HTTP/1.1\r\nHost: 127.0.0.1\r\n\
         Content-Type: application/x-www-form-urlencoded\r\n\
         Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let response = fetch(proxy_port, &request).await;

    assert!(response.contains("200"), "unexpected response: {response}");
    assert!(!response.to_ascii_lowercase().contains("<script"));
    assert!(response.contains("ok"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_exit_page_for_unsafe_protocols() {
    let proxy_port = spawn_proxy(create_test_config()).await;

    let response = get(
        proxy_port,
        &format!("/?mortyurl={}", encode_target("ftp://archive.example/file")),
    )
    .await;
    assert!(response.contains("403"));
    assert!(response.contains("You are about to exit MortyProxy"));

    let response = get(
        proxy_port,
        &format!("/?mortyurl={}", encode_target("http://hidden.onion/")),
    )
    .await;
    assert!(response.contains("403"));
    assert!(response.contains("You are about to exit MortyProxy"));
}
