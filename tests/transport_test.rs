use scanflow::{Error, FuzzableRequest, HttpSettings, HttpTransport, Transport};
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string_contains, header, method, path},
};

fn url(server: &MockServer, route: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), route)).unwrap()
}

#[tokio::test]
async fn get_returns_status_headers_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/index.html"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<html>ok</html>"),
        )
        .mount(&server)
        .await;

    let transport = HttpTransport::new(&HttpSettings::default()).unwrap();
    let response = transport.get(&url(&server, "/index.html")).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body, "<html>ok</html>");
    assert!(response.is_html());
}

#[tokio::test]
async fn configured_headers_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("x-scan", "1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let mut settings = HttpSettings::default();
    settings.headers.insert("X-Scan".to_string(), "1".to_string());
    let transport = HttpTransport::new(&settings).unwrap();
    let response = transport.get(&url(&server, "/")).await.unwrap();

    assert_eq!(response.status, 204);
}

#[tokio::test]
async fn post_sends_form_parameters() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_string_contains("user=admin"))
        .respond_with(ResponseTemplate::new(200).set_body_string("welcome"))
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpTransport::new(&HttpSettings::default()).unwrap();
    let request = FuzzableRequest::post(
        url(&server, "/login"),
        vec![("user".to_string(), "admin".to_string())],
    );
    let response = transport.send(&request).await.unwrap();

    assert_eq!(response.body, "welcome");
}

#[tokio::test]
async fn basic_auth_applies_to_the_credential_origin() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/admin/"))
        .and(header("authorization", "Basic YWRtaW46c2VjcmV0"))
        .respond_with(ResponseTemplate::new(200).set_body_string("dashboard"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/admin/"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let transport = HttpTransport::new(&HttpSettings::default()).unwrap();
    let admin = url(&server, "/admin/");
    assert_eq!(transport.get(&admin).await.unwrap().status, 401);

    transport.set_basic_auth(&admin, "admin", "secret");
    let response = transport.get(&admin).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body, "dashboard");
}

#[tokio::test]
async fn paused_requests_resume() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let transport = Arc::new(HttpTransport::new(&HttpSettings::default()).unwrap());
    transport.pause(true);

    let pending = {
        let transport = Arc::clone(&transport);
        let target = url(&server, "/");
        tokio::spawn(async move { transport.get(&target).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!pending.is_finished());
    assert!(server.received_requests().await.unwrap().is_empty());

    transport.pause(false);
    let response = pending.await.unwrap().unwrap();
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn ended_transport_refuses_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let transport = HttpTransport::new(&HttpSettings::default()).unwrap();
    transport.end();

    let err = transport.get(&url(&server, "/")).await.unwrap_err();
    assert!(matches!(err, Error::ScanStopped));
}

#[tokio::test]
async fn refused_connections_in_a_row_become_fatal() {
    let server = MockServer::start().await;
    let target = url(&server, "/");
    drop(server);

    let settings = HttpSettings {
        max_consecutive_errors: 3,
        ..HttpSettings::default()
    };
    let transport = HttpTransport::new(&settings).unwrap();

    for _ in 0..2 {
        let err = transport.get(&target).await.unwrap_err();
        assert!(matches!(err, Error::HttpRequest(_)));
    }
    let err = transport.get(&target).await.unwrap_err();
    assert!(matches!(err, Error::TransportFatal(_)));
}

#[tokio::test]
async fn a_response_resets_the_failure_count() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    let closed = MockServer::start().await;
    let gone = url(&closed, "/");
    drop(closed);

    let settings = HttpSettings {
        max_consecutive_errors: 2,
        ..HttpSettings::default()
    };
    let transport = HttpTransport::new(&settings).unwrap();

    assert!(matches!(transport.get(&gone).await, Err(Error::HttpRequest(_))));
    assert_eq!(transport.get(&url(&server, "/")).await.unwrap().status, 200);
    assert!(matches!(transport.get(&gone).await, Err(Error::HttpRequest(_))));
    assert!(matches!(transport.get(&gone).await, Err(Error::TransportFatal(_))));
}
