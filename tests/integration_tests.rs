//! Integration tests using wiremock to stand in for backend nodes.

use nodehop::{Client, Connection, Error, Host};
use std::time::{Duration, Instant};
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn host_of(server: &MockServer) -> Host {
    Host::parse(&server.uri()).unwrap()
}

fn connection_for(client: &Client, host: &Host) -> Connection {
    client
        .pool()
        .connections()
        .into_iter()
        .find(|c| c.host() == host)
        .expect("host is in the pool")
}

async fn client_for(servers: &[&MockServer]) -> Client {
    let mut builder = Client::builder();
    for server in servers {
        builder = builder.node(server.uri()).unwrap();
    }
    builder.build().unwrap()
}

#[tokio::test]
async fn successful_get_returns_the_body() {
    let node_a = MockServer::start().await;
    let node_b = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/library/_search"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&node_a)
        .await;

    let client = client_for(&[&node_a, &node_b]).await;
    let response = client.get("/library/_search").await.unwrap();

    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(response.text(), "ok");
    assert_eq!(response.attempts, 1);
    assert!(!response.was_retried());
    assert_eq!(response.host, host_of(&node_a));

    let a = connection_for(&client, &host_of(&node_a));
    assert!(a.is_alive());
    assert_eq!(a.dead_count(), 0);
}

#[tokio::test]
async fn requests_round_robin_across_live_nodes() {
    let node_a = MockServer::start().await;
    let node_b = MockServer::start().await;

    for node in [&node_a, &node_b] {
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(node)
            .await;
    }

    let client = client_for(&[&node_a, &node_b]).await;
    client.get("/ping").await.unwrap();
    client.get("/ping").await.unwrap();
    // the .expect(1) on each mock verifies the distribution on drop
}

#[tokio::test]
async fn gateway_error_fails_over_to_the_next_node() {
    let node_a = MockServer::start().await;
    let node_b = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .expect(1)
        .mount(&node_a)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&node_b)
        .await;

    let client = client_for(&[&node_a, &node_b]).await;
    let response = client.get("/library/_search").await.unwrap();

    assert_eq!(response.text(), "ok");
    assert_eq!(response.attempts, 2);
    assert!(response.was_retried());
    assert_eq!(response.host, host_of(&node_b));

    let a = connection_for(&client, &host_of(&node_a));
    assert!(!a.is_alive());
    assert_eq!(a.dead_count(), 1);
    let remaining = a
        .dead_until()
        .unwrap()
        .saturating_duration_since(Instant::now());
    assert!(remaining > Duration::from_secs(50));
    assert!(remaining <= Duration::from_secs(60));

    let b = connection_for(&client, &host_of(&node_b));
    assert!(b.is_alive());
    assert_eq!(b.dead_count(), 0);
}

#[tokio::test]
async fn head_404_is_a_success() {
    let node = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/library/book/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&node)
        .await;

    let client = client_for(&[&node]).await;
    let response = client.head("/library/book/missing").await.unwrap();

    assert_eq!(response.status.as_u16(), 404);
    assert_eq!(response.attempts, 1);
    assert!(connection_for(&client, &host_of(&node)).is_alive());
}

#[tokio::test]
async fn get_404_is_still_an_error() {
    let node = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such index"))
        .mount(&node)
        .await;

    let client = client_for(&[&node]).await;
    match client.get("/missing").await {
        Err(Error::Http { status, body, .. }) => {
            assert_eq!(status.as_u16(), 404);
            assert_eq!(body, "no such index");
        }
        other => panic!("expected Http error, got {other:?}"),
    }
}

#[tokio::test]
async fn terminal_error_stops_the_walk_and_leaves_the_node_alive() {
    let node_a = MockServer::start().await;
    let node_b = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad"))
        .expect(1)
        .mount(&node_a)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&node_b)
        .await;

    let client = client_for(&[&node_a, &node_b]).await;
    let error = client.get("/library/_search").await.unwrap_err();

    match &error {
        Error::Http { status, body, .. } => {
            assert_eq!(status.as_u16(), 400);
            assert_eq!(body, "bad");
        }
        other => panic!("expected Http error, got {other:?}"),
    }
    assert!(error.causes().is_empty());
    assert!(connection_for(&client, &host_of(&node_a)).is_alive());
}

#[tokio::test]
async fn exhausted_pool_surfaces_the_newest_error_with_history() {
    let node_a = MockServer::start().await;
    let node_b = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502).set_body_string("from a"))
        .mount(&node_a)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("from b"))
        .mount(&node_b)
        .await;

    let client = client_for(&[&node_a, &node_b]).await;
    let error = client.get("/library/_search").await.unwrap_err();

    // newest outermost, one earlier attempt in the chain
    assert_eq!(error.status().map(|s| s.as_u16()), Some(503));
    assert_eq!(error.causes().len(), 1);
    assert_eq!(error.causes()[0].status().map(|s| s.as_u16()), Some(502));

    for node in [&node_a, &node_b] {
        let connection = connection_for(&client, &host_of(node));
        assert!(!connection.is_alive());
        assert_eq!(connection.dead_count(), 1);
    }
}

#[tokio::test]
async fn transport_failure_fails_over() {
    let node_b = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&node_b)
        .await;

    // port 1 is unroutable, the connect is refused immediately
    let dead_host = Host::http("127.0.0.1", 1);
    let client = Client::builder()
        .host(dead_host.clone())
        .node(node_b.uri())
        .unwrap()
        .build()
        .unwrap();

    let response = client.get("/ping").await.unwrap();
    assert_eq!(response.text(), "ok");
    assert_eq!(response.attempts, 2);

    let dead = connection_for(&client, &dead_host);
    assert!(!dead.is_alive());
    assert_eq!(dead.dead_count(), 1);
}

#[tokio::test]
async fn single_node_transport_failure_surfaces_as_transport() {
    let dead_host = Host::http("127.0.0.1", 1);
    let client = Client::builder().host(dead_host.clone()).build().unwrap();

    let error = client.get("/ping").await.unwrap_err();
    match &error {
        Error::Transport { host, .. } => assert_eq!(host, &dead_host),
        other => panic!("expected Transport error, got {other:?}"),
    }
    assert!(error.causes().is_empty());
}

#[tokio::test]
async fn retry_budget_cuts_the_walk_short() {
    let node_a = MockServer::start().await;
    let node_b = MockServer::start().await;
    let node_c = MockServer::start().await;

    for node in [&node_a, &node_b] {
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(503)
                    .set_body_string("busy")
                    .set_delay(Duration::from_millis(700)),
            )
            .expect(1)
            .mount(node)
            .await;
    }
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&node_c)
        .await;

    let mut builder = Client::builder();
    for node in [&node_a, &node_b, &node_c] {
        builder = builder.node(node.uri()).unwrap();
    }
    let client = builder
        .max_retry_timeout(Duration::from_millis(1000))
        .build()
        .unwrap();

    // attempt on A takes ~700ms, attempt on B finishes past the 980ms soft
    // deadline, so C is never tried
    let error = client.get("/library/_search").await.unwrap_err();
    match &error {
        Error::RetryTimeout { budget, .. } => {
            assert_eq!(*budget, Duration::from_millis(980));
        }
        other => panic!("expected RetryTimeout, got {other:?}"),
    }
    assert_eq!(error.causes().len(), 2);
    assert!(connection_for(&client, &host_of(&node_c)).is_alive());
}

#[tokio::test]
async fn all_dead_pool_recovers_through_the_last_resort_probe() {
    let node_a = MockServer::start().await;
    let node_b = MockServer::start().await;

    for node in [&node_a, &node_b] {
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(node)
            .await;
    }

    let client = client_for(&[&node_a, &node_b]).await;
    client.get("/ping").await.unwrap_err();

    // both nodes are blacklisted now; nothing is selectable
    assert!(client.pool().connections().iter().all(|c| !c.is_alive()));
    assert!(client.pool().next_connection().is_empty());

    // the cluster comes back
    for node in [&node_a, &node_b] {
        node.reset().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("back"))
            .mount(node)
            .await;
    }

    // node A went dark first, so it is the longest overdue and gets probed
    let response = client.get("/ping").await.unwrap();
    assert_eq!(response.text(), "back");
    assert_eq!(response.attempts, 1);
    assert_eq!(response.host, host_of(&node_a));

    let revived = connection_for(&client, &host_of(&node_a));
    assert!(revived.is_alive());
    assert_eq!(revived.dead_count(), 0);
    assert!(!connection_for(&client, &host_of(&node_b)).is_alive());
}

#[tokio::test]
async fn query_params_are_sent_in_insertion_order() {
    let node = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/library/_search"))
        .and(query_param("q", "title:rust"))
        .and(query_param("size", "10"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&node)
        .await;

    let client = client_for(&[&node]).await;
    let response = client
        .perform_request(
            "GET",
            "/library/_search",
            &[("q", "title:rust"), ("size", "10")],
            None,
        )
        .await
        .unwrap();
    assert_eq!(response.path, "/library/_search?q=title%3Arust&size=10");
}

#[tokio::test]
async fn request_bodies_reach_the_node() {
    let node = MockServer::start().await;
    let doc = r#"{"title":"The Rust Programming Language"}"#;

    Mock::given(method("PUT"))
        .and(path("/library/book/1"))
        .and(body_string(doc))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&node)
        .await;

    let client = client_for(&[&node]).await;
    let response = client.put("/library/book/1", doc).await.unwrap();
    assert_eq!(response.status.as_u16(), 201);
}

#[tokio::test]
async fn default_headers_ride_along_on_every_request() {
    let node = MockServer::start().await;

    Mock::given(method("GET"))
        .and(header("x-opaque-id", "nightly-reindex"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&node)
        .await;

    let client = Client::builder()
        .node(node.uri())
        .unwrap()
        .default_header("x-opaque-id", "nightly-reindex")
        .unwrap()
        .build()
        .unwrap();
    client.get("/ping").await.unwrap();
}

#[tokio::test]
async fn response_json_decodes_typed_payloads() {
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Health {
        status: String,
    }

    let node = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/_cluster/health"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"status":"green"}"#))
        .mount(&node)
        .await;

    let client = client_for(&[&node]).await;
    let response = client.get("/_cluster/health").await.unwrap();
    let health: Health = response.json().unwrap();
    assert_eq!(
        health,
        Health {
            status: "green".to_string()
        }
    );
}

#[tokio::test]
async fn build_errors_never_touch_the_network() {
    let node = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&node)
        .await;

    let client = client_for(&[&node]).await;

    let error = client
        .perform_request("OPTIONS", "/x", &[], None)
        .await
        .unwrap_err();
    assert!(matches!(error, Error::UnsupportedMethod(_)));

    let error = client
        .perform_request("HEAD", "/x", &[], Some("{}".into()))
        .await
        .unwrap_err();
    assert!(matches!(error, Error::UnsupportedOperation(_)));

    let error = client
        .perform_request("GET", "/with space", &[], None)
        .await
        .unwrap_err();
    assert!(matches!(error, Error::InvalidUri(_)));
}
