use std::time::Duration;

use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE, HOST};
use http::{Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::time::timeout;

use eureka_mock::config::Config;
use eureka_mock::server::MockEurekaServer;
use eureka_mock::services::registry::{InstanceStatus, ServiceInstance};

struct Reply {
    status: StatusCode,
    content_type: Option<String>,
    body: String,
}

impl Reply {
    fn json(&self) -> Value {
        serde_json::from_str(&self.body).expect("Response body is not JSON")
    }
}

async fn start_server() -> MockEurekaServer {
    MockEurekaServer::start(&Config::default())
        .await
        .expect("Failed to start eureka mock")
}

async fn send_with_accept(
    server: &MockEurekaServer,
    method: Method,
    path: &str,
    body: Option<Value>,
    accept: Option<&str>,
) -> Reply {
    let stream = TcpStream::connect(server.local_addr())
        .await
        .expect("Failed to connect");
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .expect("Handshake failed");
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let mut builder = Request::builder()
        .method(method)
        .uri(format!("{}{}", server.router().base_path(), path))
        .header(HOST, server.local_addr().to_string())
        .header(CONTENT_TYPE, "application/json");
    if let Some(accept) = accept {
        builder = builder.header(ACCEPT, accept);
    }
    let body = body.map(|value| value.to_string()).unwrap_or_default();
    let request = builder.body(Full::new(Bytes::from(body))).unwrap();

    let response = timeout(Duration::from_secs(5), sender.send_request(request))
        .await
        .expect("Timeout waiting for response")
        .expect("Request failed");

    let status = response.status();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();

    Reply {
        status,
        content_type,
        body: String::from_utf8(bytes.to_vec()).unwrap(),
    }
}

async fn send(server: &MockEurekaServer, method: Method, path: &str, body: Option<Value>) -> Reply {
    send_with_accept(server, method, path, body, Some("application/json")).await
}

fn registration(host_name: &str, vip_address: &str) -> Value {
    json!({
        "instance": {
            "hostName": host_name,
            "app": "ignored",
            "vipAddress": vip_address,
            "status": "UP",
            "port": {"$": 8080, "@enabled": "true"},
            "dataCenterInfo": {
                "@class": "com.netflix.appinfo.InstanceInfo$DefaultDataCenterInfo",
                "name": "MyOwn"
            }
        }
    })
}

fn unique(prefix: &str) -> String {
    format!("{prefix}{}", uuid::Uuid::new_v4())
}

#[tokio::test]
async fn test_register_and_await_instance() {
    let server = start_server().await;

    let reply = send(&server, Method::POST, "/apps/my-service", Some(registration("localhost", "my-service"))).await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);
    assert!(reply.body.is_empty());

    let reply = send(&server, Method::GET, "/apps/MY-SERVICE/localhost", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.content_type.as_deref(), Some("application/json"));

    let json = reply.json();
    assert_eq!(json["instance"]["app"], "MY-SERVICE");
    assert_eq!(json["instance"]["instanceId"], "localhost");
    assert_eq!(json["instance"]["hostName"], "localhost");
    assert_eq!(json["instance"]["status"], "UP");

    let reply = send(&server, Method::GET, "/apps/MY-SERVICE/other-host", None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);

    server.stop().await;
}

#[tokio::test]
async fn test_await_registration_fails_first_n_times() {
    let server = start_server().await;
    let instance_id = unique("FailAwaitRegistrationFirstNTimes-2-");

    let mut body = registration("localhost", "await-service");
    body["instance"]["instanceId"] = json!(instance_id);
    let reply = send(&server, Method::POST, "/apps/await-service", Some(body)).await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);

    let path = format!("/apps/AWAIT-SERVICE/{instance_id}");
    let mut statuses = Vec::new();
    for _ in 0..4 {
        let reply = send(&server, Method::GET, &path, None).await;
        // 失败时也返回实例文档
        assert_eq!(reply.json()["instance"]["instanceId"], instance_id.as_str());
        statuses.push(reply.status);
    }

    assert_eq!(
        statuses,
        vec![
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::OK,
            StatusCode::OK,
        ]
    );

    server.stop().await;
}

#[tokio::test]
async fn test_heartbeat_fails_first_n_times() {
    let server = start_server().await;
    let host_name = unique("FailHeartbeat-3-");

    let reply = send(&server, Method::POST, "/apps/beat", Some(registration(&host_name, "beat"))).await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);

    let path = format!("/apps/BEAT/{host_name}");
    for attempt in 0..5 {
        let reply = send(&server, Method::PUT, &path, None).await;
        let expected = if attempt < 3 {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::OK
        };
        assert_eq!(reply.status, expected, "attempt {attempt}");
    }

    let registry = server.registry();
    assert_eq!(registry.heartbeat_count(), 5);
    assert_eq!(registry.heartbeat_failure_count(), 3);
    assert_eq!(
        registry.heartbeat_snapshot("beat", &host_name).unwrap().status,
        InstanceStatus::Up
    );

    let history = registry.heartbeat_history();
    assert_eq!(history.len(), 5);
    assert_eq!(history.iter().filter(|event| !event.is_success()).count(), 3);

    server.stop().await;
}

#[tokio::test]
async fn test_heartbeat_failure_code_from_metadata() {
    let server = start_server().await;
    let host_name = unique("FailHeartbeat-1-");

    let mut body = registration(&host_name, "beat-code");
    body["instance"]["metadata"] = json!({"FailHeartbeatResponseCode": "503"});
    send(&server, Method::POST, "/apps/beat-code", Some(body)).await;

    let path = format!("/apps/BEAT-CODE/{host_name}");
    assert_eq!(
        send(&server, Method::PUT, &path, None).await.status,
        StatusCode::SERVICE_UNAVAILABLE
    );
    assert_eq!(send(&server, Method::PUT, &path, None).await.status, StatusCode::OK);

    server.stop().await;
}

#[tokio::test]
async fn test_registration_uses_forced_status_code() {
    let server = start_server().await;

    let reply = send(
        &server,
        Method::POST,
        "/apps/forced",
        Some(registration("localhost", "RegisterUseResponseStatusCode-501")),
    )
    .await;

    assert_eq!(reply.status, StatusCode::NOT_IMPLEMENTED);
    assert!(server.registry().application("forced").is_none());

    server.stop().await;
}

#[tokio::test]
async fn test_forced_status_code_with_unexpected_field_types() {
    let server = start_server().await;

    let mut body = registration("localhost", "RegisterUseResponseStatusCode-501");
    body["instance"]["metadata"] = json!({"n": 1});
    body["instance"]["port"] = json!("not-a-port");
    let reply = send(&server, Method::POST, "/apps/forced-loose", Some(body)).await;

    assert_eq!(reply.status, StatusCode::NOT_IMPLEMENTED);
    assert!(server.registry().application("forced-loose").is_none());

    server.stop().await;
}

#[tokio::test]
async fn test_invalid_heartbeat_failure_code_keeps_budget() {
    let server = start_server().await;
    let host_name = unique("FailHeartbeat-1-");

    let mut body = registration(&host_name, "beat-boom");
    body["instance"]["metadata"] = json!({"FailHeartbeatResponseCode": "boom"});
    send(&server, Method::POST, "/apps/beat-boom", Some(body)).await;

    let path = format!("/apps/BEAT-BOOM/{host_name}");
    for _ in 0..2 {
        let reply = send(&server, Method::PUT, &path, None).await;
        assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(reply.json()["message"].is_string());
    }

    assert_eq!(server.dispatcher().heartbeat_retries().active_count(), 0);
    assert_eq!(server.registry().heartbeat_count(), 0);

    server.stop().await;
}

#[tokio::test]
async fn test_status_value_is_percent_decoded() {
    let server = start_server().await;
    send(&server, Method::POST, "/apps/encoded", Some(registration("localhost", "encoded"))).await;

    let reply = send(
        &server,
        Method::PUT,
        "/apps/ENCODED/localhost/status?value=OUT%5FOF%5FSERVICE",
        None,
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(
        server.registry().lookup_instance("ENCODED", "localhost").unwrap().status,
        InstanceStatus::OutOfService
    );

    server.stop().await;
}

#[tokio::test]
async fn test_registration_fails_first_n_times() {
    let server = start_server().await;
    let body = registration("localhost", "FailRegistrationFirstNTimes-1");

    let reply = send(&server, Method::POST, "/apps/flaky", Some(body.clone())).await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(server.registry().application("flaky").is_none());

    let reply = send(&server, Method::POST, "/apps/flaky", Some(body)).await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);
    assert!(server.registry().lookup_instance("FLAKY", "localhost").is_some());

    server.stop().await;
}

#[tokio::test]
async fn test_status_change() {
    let server = start_server().await;
    send(&server, Method::POST, "/apps/status-app", Some(registration("localhost", "status-app"))).await;

    let reply = send(&server, Method::PUT, "/apps/STATUS-APP/localhost/status?value=DOWN", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(
        server
            .registry()
            .lookup_instance("STATUS-APP", "localhost")
            .unwrap()
            .status,
        InstanceStatus::Down
    );

    let reply = send(&server, Method::PUT, "/apps/STATUS-APP/localhost/status?value=SLEEPING", None).await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);

    server
        .registry()
        .register_application(ServiceInstance::new("status-fail", "FailStatusChange"));
    let reply = send(&server, Method::PUT, "/apps/STATUS-FAIL/FailStatusChange/status?value=DOWN", None).await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        server
            .registry()
            .lookup_instance("STATUS-FAIL", "FailStatusChange")
            .unwrap()
            .status,
        InstanceStatus::Up
    );

    server.stop().await;
}

#[tokio::test]
async fn test_vip_lookup() {
    let server = start_server().await;
    send(&server, Method::POST, "/apps/svc-a", Some(registration("host-a", "svc-a"))).await;
    send(&server, Method::POST, "/apps/svc-b", Some(registration("host-b", "svc-b"))).await;

    let reply = send(&server, Method::GET, "/vips/svc-a", None).await;
    assert_eq!(reply.status, StatusCode::OK);

    let json = reply.json();
    let apps = json["applications"]["application"].as_array().unwrap();
    assert_eq!(apps.len(), 1);
    assert_eq!(apps[0]["name"], "SVC-A");
    assert_eq!(json["applications"]["apps__hashcode"], "UP_1_");

    let reply = send(&server, Method::GET, "/vips/unknown-vip", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["applications"]["application"], json!([]));

    server.stop().await;
}

#[tokio::test]
async fn test_list_applications() {
    let server = start_server().await;
    send(&server, Method::POST, "/apps/zeta", Some(registration("host-z", "zeta"))).await;
    send(&server, Method::POST, "/apps/alpha", Some(registration("host-a", "alpha"))).await;

    let reply = send(&server, Method::GET, "/apps", None).await;
    assert_eq!(reply.status, StatusCode::OK);

    let json = reply.json();
    let names: Vec<&str> = json["applications"]["application"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|app| app["name"].as_str())
        .collect();
    assert_eq!(names, vec!["ALPHA", "ZETA"]);

    server.stop().await;
}

#[tokio::test]
async fn test_unroutable_request() {
    let server = start_server().await;

    let reply = send(&server, Method::GET, "/unknown/path", None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(
        reply.json()["message"],
        "Request path: /unknown/path not supported by eureka mock."
    );

    server.stop().await;
}

#[tokio::test]
async fn test_unsupported_accept_header() {
    let server = start_server().await;
    send(&server, Method::POST, "/apps/xml-app", Some(registration("localhost", "xml-app"))).await;

    let reply = send_with_accept(
        &server,
        Method::GET,
        "/apps/XML-APP/localhost",
        None,
        Some("application/xml"),
    )
    .await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);

    let reply = send_with_accept(&server, Method::GET, "/apps/XML-APP/localhost", None, None).await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);

    server.stop().await;
}

#[tokio::test]
async fn test_malformed_registration() {
    let server = start_server().await;

    let reply = send(&server, Method::POST, "/apps/broken", Some(json!({"instance": {"vipAddress": "v"}}))).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.json()["message"].is_string());

    server.stop().await;
}

#[tokio::test]
async fn test_unregister() {
    let server = start_server().await;
    send(&server, Method::POST, "/apps/gone", Some(registration("localhost", "gone"))).await;

    let reply = send(&server, Method::DELETE, "/apps/GONE/localhost", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(server.registry().application("gone").is_none());

    let reply = send(&server, Method::GET, "/apps/GONE/localhost", None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);

    let reply = send(&server, Method::DELETE, "/apps/GONE/localhost", None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);

    server.stop().await;
}

#[tokio::test]
async fn test_cleanup_apps_resets_state() {
    let server = start_server().await;
    let host_name = "FailHeartbeat-1-cleanup";
    send(&server, Method::POST, "/apps/reset", Some(registration(host_name, "reset"))).await;

    let path = format!("/apps/RESET/{host_name}");
    assert_eq!(send(&server, Method::PUT, &path, None).await.status, StatusCode::NOT_FOUND);
    assert_eq!(send(&server, Method::PUT, &path, None).await.status, StatusCode::OK);

    server.cleanup_apps();
    assert!(server.registry().applications().is_empty());
    assert_eq!(server.registry().heartbeat_count(), 0);
    assert_eq!(send(&server, Method::GET, &path, None).await.status, StatusCode::NOT_FOUND);

    // 账本也被清空，同一触发值重新生效
    send(&server, Method::POST, "/apps/reset", Some(registration(host_name, "reset"))).await;
    assert_eq!(send(&server, Method::PUT, &path, None).await.status, StatusCode::NOT_FOUND);

    server.stop().await;
}

#[tokio::test]
async fn test_concurrent_heartbeats_share_one_budget() {
    let server = std::sync::Arc::new(start_server().await);
    let host_name = unique("FailHeartbeat-10-");
    send(&server, Method::POST, "/apps/busy", Some(registration(&host_name, "busy"))).await;

    let path = format!("/apps/BUSY/{host_name}");
    let mut handles = Vec::new();
    for _ in 0..4 {
        let server = server.clone();
        let path = path.clone();
        handles.push(tokio::spawn(async move {
            let mut failures = 0;
            for _ in 0..5 {
                if send(&server, Method::PUT, &path, None).await.status == StatusCode::NOT_FOUND {
                    failures += 1;
                }
            }
            failures
        }));
    }

    let mut failures = 0;
    for handle in handles {
        failures += handle.await.unwrap();
    }

    assert_eq!(failures, 10);
    assert_eq!(server.registry().heartbeat_count(), 20);
    assert_eq!(server.registry().heartbeat_failure_count(), 10);

    server.stop().await;
}

#[tokio::test]
async fn test_stop_closes_listener() {
    let server = start_server().await;
    let addr = server.local_addr();
    assert!(server.is_running());
    assert!(server.base_uri().ends_with("/eureka/v2"));

    server.stop().await;
    assert!(!server.is_running());
    assert!(TcpStream::connect(addr).await.is_err());
}
