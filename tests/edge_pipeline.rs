//! End-to-end tests: mock origin → edge → reqwest.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use edge_optimizer::config::RewriteMode;

mod common;
use common::{cache_marker, client, edge_config, get_until_hit, header, start_edge, start_origin, MockResponse};

const PAGE: &str = concat!(
    "<!DOCTYPE html><html><head><title>Home</title>",
    "<link rel='stylesheet' id='admin-bar-css' href='/wp-includes/css/admin-bar.min.css' />",
    "<style>.a{color:red}</style><style>.b{color:blue}</style>",
    "</head><body><div class='hero'><img src='/hero.jpg'></div>",
    "<img src='/one.jpg'><img src='/two.jpg'><img src='/three.jpg'></body></html>"
);

#[tokio::test]
async fn test_asset_is_cached_with_policy_headers() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let png: Vec<u8> = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0xff];
    let body = png.clone();
    let origin = start_origin(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        MockResponse::new(200, "image/png", body.clone())
    })
    .await;
    let edge = start_edge(edge_config(origin)).await;
    let client = client();
    let url = edge.url("/wp-content/uploads/2024/01/logo.png?ver=2");

    let first = client.get(&url).send().await.unwrap();
    assert_eq!(first.status(), 200);
    assert_eq!(cache_marker(&first), "MISS");
    assert_eq!(
        header(&first, "cache-control").as_deref(),
        Some("public, max-age=31536000, immutable")
    );
    assert_eq!(header(&first, "vary").as_deref(), Some("Accept-Encoding"));
    assert!(header(&first, "expires").is_some());
    assert_eq!(first.bytes().await.unwrap().to_vec(), png);

    let hit = get_until_hit(&client, &url).await;
    assert!(header(&hit, "age").is_some());
    assert_eq!(hit.bytes().await.unwrap().to_vec(), png);

    let before = hits.load(Ordering::SeqCst);
    let again = client.get(&url).send().await.unwrap();
    assert_eq!(cache_marker(&again), "HIT");
    assert_eq!(hits.load(Ordering::SeqCst), before);
}

#[tokio::test]
async fn test_asset_query_string_is_part_of_key() {
    let origin = start_origin(|req| MockResponse::new(200, "text/css", format!("/* {} */", req.path))).await;
    let edge = start_edge(edge_config(origin)).await;
    let client = client();

    get_until_hit(&client, &edge.url("/wp-content/themes/site/style.css?ver=1")).await;
    let other = client
        .get(edge.url("/wp-content/themes/site/style.css?ver=2"))
        .send()
        .await
        .unwrap();
    assert_eq!(cache_marker(&other), "MISS");
    assert_eq!(
        other.text().await.unwrap(),
        "/* /wp-content/themes/site/style.css?ver=2 */"
    );
}

#[tokio::test]
async fn test_html_query_strings_share_one_entry() {
    let origin = start_origin(|_| MockResponse::html(PAGE)).await;
    let edge = start_edge(edge_config(origin)).await;
    let client = client();

    let first = client.get(edge.url("/page?a=1")).send().await.unwrap();
    assert_eq!(cache_marker(&first), "MISS");
    assert_eq!(
        header(&first, "cache-control").as_deref(),
        Some("public, max-age=3600, s-maxage=86400")
    );
    assert_eq!(header(&first, "cdn-cache-control").as_deref(), Some("public, max-age=86400"));
    assert_eq!(header(&first, "x-content-type-options").as_deref(), Some("nosniff"));
    let rewritten = first.text().await.unwrap();

    let hit = get_until_hit(&client, &edge.url("/page?b=2")).await;
    assert_eq!(hit.text().await.unwrap(), rewritten);
}

#[tokio::test]
async fn test_anonymous_html_is_rewritten() {
    let origin = start_origin(|_| MockResponse::html(PAGE)).await;
    let edge = start_edge(edge_config(origin)).await;

    let body = client().get(edge.url("/")).send().await.unwrap().text().await.unwrap();

    assert!(!body.contains("admin-bar.min.css"));
    assert_eq!(body.matches("<style").count(), 1);
    assert!(body.contains(".a{color:red}\n.b{color:blue}"));
    assert!(body.contains("<!-- edge:resource-hints -->"));
    assert!(body.contains(r#"<img src='/hero.jpg' fetchpriority="high" loading="eager">"#));
    assert!(body.contains(r#"<img src='/three.jpg' loading="lazy">"#));
}

#[tokio::test]
async fn test_logged_in_visitor_bypasses_cache() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let origin = start_origin(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        MockResponse::html(PAGE)
    })
    .await;
    let edge = start_edge(edge_config(origin)).await;
    let client = client();

    for _ in 0..3 {
        let response = client
            .get(edge.url("/account/"))
            .header("cookie", "wordpress_logged_in_5f2a=admin%7C1700000000")
            .send()
            .await
            .unwrap();
        assert_eq!(cache_marker(&response), "BYPASS");
        assert_eq!(header(&response, "cache-control").as_deref(), Some("private, no-store"));
        assert!(response.text().await.unwrap().contains("admin-bar.min.css"));
    }
    assert_eq!(hits.load(Ordering::SeqCst), 3);

    // The anonymous entry is built from the anonymous rendering only.
    let anonymous = get_until_hit(&client, &edge.url("/account/")).await;
    assert!(!anonymous.text().await.unwrap().contains("admin-bar.min.css"));
}

#[tokio::test]
async fn test_admin_paths_are_never_cached() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let origin = start_origin(move |req| {
        counter.fetch_add(1, Ordering::SeqCst);
        if req.path.starts_with("/wp-json") {
            MockResponse::new(200, "application/json", r#"{"id":1}"#)
        } else {
            MockResponse::html(PAGE)
        }
    })
    .await;
    let edge = start_edge(edge_config(origin)).await;
    let client = client();

    for path in ["/wp-json/wp/v2/posts", "/wp-admin/", "/wp-login.php"] {
        for _ in 0..2 {
            let response = client.get(edge.url(path)).send().await.unwrap();
            assert_eq!(cache_marker(&response), "BYPASS", "{path}");
            let body = response.text().await.unwrap();
            assert!(!body.contains("edge:resource-hints"), "{path} was rewritten");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(hits.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_non_200_html_passes_through() {
    let origin = start_origin(|_| MockResponse::new(404, "text/html", PAGE)).await;
    let edge = start_edge(edge_config(origin)).await;

    let response = client().get(edge.url("/missing/")).send().await.unwrap();
    assert_eq!(response.status(), 404);
    assert_eq!(cache_marker(&response), "BYPASS");
    assert_eq!(response.text().await.unwrap(), PAGE);
}

#[tokio::test]
async fn test_oversized_chunked_html_is_relayed_unmodified() {
    let filler = "<p>lorem ipsum dolor sit amet</p>".repeat(128);
    let page = PAGE.replace("</body>", &format!("{filler}</body>"));
    let served = page.clone();
    let origin = start_origin(move |_| MockResponse::html(&served).chunked()).await;
    let mut config = edge_config(origin);
    config.cache.max_body_bytes = 1024;
    let edge = start_edge(config).await;

    let client = client();
    for _ in 0..2 {
        let response = client.get(edge.url("/long-read/")).send().await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(cache_marker(&response), "BYPASS");
        assert_eq!(response.text().await.unwrap(), page);
    }
}

#[tokio::test]
async fn test_origin_headers_are_filtered_and_vary_merged() {
    let origin = start_origin(|_| {
        MockResponse::html(PAGE)
            .with_header("Vary", "Accept-Encoding")
            .with_header("Content-Security-Policy", "default-src 'self'")
            .with_header("X-Powered-By", "PHP/8.2")
            .with_header("Link", "<https://example.com/wp-json/>; rel=\"https://api.w.org/\"")
    })
    .await;
    let edge = start_edge(edge_config(origin)).await;

    let response = client().get(edge.url("/")).send().await.unwrap();
    assert_eq!(header(&response, "vary").as_deref(), Some("Accept-Encoding, Cookie"));
    assert_eq!(
        header(&response, "content-security-policy").as_deref(),
        Some("default-src 'self'")
    );
    assert!(header(&response, "x-powered-by").is_none());
    assert!(header(&response, "link").is_none());
}

#[tokio::test]
async fn test_origin_sees_identity_encoding_and_cookies() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    let origin = start_origin(move |req| {
        log.lock().unwrap().push(req.clone());
        MockResponse::html("<html><head></head><body></body></html>")
    })
    .await;
    let edge = start_edge(edge_config(origin)).await;

    client()
        .get(edge.url("/shop/?orderby=price"))
        .header("accept-encoding", "gzip, br")
        .header("cookie", "woocommerce_items_in_cart=1")
        .send()
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].path, "/shop/?orderby=price");
    assert_eq!(seen[0].header("accept-encoding"), Some("identity"));
    assert_eq!(seen[0].header("cookie"), Some("woocommerce_items_in_cart=1"));
}

#[tokio::test]
async fn test_post_is_relayed() {
    let origin = start_origin(|req| {
        MockResponse::new(200, "application/json", format!(r#"{{"method":"{}"}}"#, req.method))
    })
    .await;
    let edge = start_edge(edge_config(origin)).await;

    let response = client()
        .post(edge.url("/wp-admin/admin-ajax.php"))
        .body("action=heartbeat")
        .send()
        .await
        .unwrap();
    assert_eq!(cache_marker(&response), "BYPASS");
    assert_eq!(response.text().await.unwrap(), r#"{"method":"POST"}"#);
}

#[tokio::test]
async fn test_unreachable_origin_is_bad_gateway() {
    // Reserve a port, then free it so nothing listens there.
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let edge = start_edge(edge_config(addr)).await;

    let response = client().get(edge.url("/")).send().await.unwrap();
    assert_eq!(response.status(), 502);
    assert_eq!(cache_marker(&response), "BYPASS");
}

#[tokio::test]
async fn test_reloaded_rules_apply_to_new_requests() {
    let origin = start_origin(|_| MockResponse::html(PAGE)).await;
    let edge = start_edge(edge_config(origin)).await;
    let client = client();

    let before = client.get(edge.url("/r0/")).send().await.unwrap().text().await.unwrap();
    assert!(before.contains("<!-- edge:resource-hints -->"));

    let mut config = edge_config(origin);
    config.rewrite.mode = RewriteMode::Stream;
    edge.config_updates.send(config).unwrap();

    let mut reloaded = false;
    for i in 1..50 {
        let body = client
            .get(edge.url(&format!("/r{i}/")))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        if !body.contains("<!-- edge:resource-hints -->") {
            reloaded = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(reloaded, "stream-only rules never took effect");
}

#[tokio::test]
async fn test_graceful_shutdown_stops_server() {
    let origin = start_origin(|_| MockResponse::html(PAGE)).await;
    let edge = start_edge(edge_config(origin)).await;

    client().get(edge.url("/")).send().await.unwrap();
    edge.shutdown.trigger();

    tokio::time::timeout(Duration::from_secs(5), edge.handle)
        .await
        .expect("server did not stop")
        .unwrap();
}
