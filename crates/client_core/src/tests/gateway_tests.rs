use super::*;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap as AxumHeaderMap, Method as AxumMethod, StatusCode},
    response::IntoResponse,
    routing::{any, get},
    Json, Router,
};
use serde_json::{json, Value};
use shared::protocol::ApiResponse;
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Debug, Clone)]
struct Captured {
    method: String,
    path: String,
    headers: AxumHeaderMap,
    body: Vec<u8>,
}

#[derive(Clone, Default)]
struct ServerState {
    captured: Arc<Mutex<Vec<Captured>>>,
}

struct FixedIdentity(Option<Identity>);

#[async_trait]
impl IdentitySource for FixedIdentity {
    async fn current_identity(&self) -> Option<Identity> {
        self.0.clone()
    }
}

async fn capture(
    State(state): State<ServerState>,
    method: AxumMethod,
    uri: axum::http::Uri,
    headers: AxumHeaderMap,
    body: Bytes,
) -> Json<Value> {
    state.captured.lock().await.push(Captured {
        method: method.to_string(),
        path: uri.path().to_string(),
        headers,
        body: body.to_vec(),
    });
    Json(json!({ "code": 200, "data": { "ok": true } }))
}

async fn failing() -> impl IntoResponse {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "code": 500, "message": "boom" })),
    )
}

async fn not_json() -> &'static str {
    "<html>maintenance</html>"
}

async fn spawn_capture_server() -> (String, ServerState) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = ServerState::default();
    let app = Router::new()
        .route("/api/echo", any(capture))
        .route("/prefix/api/echo", any(capture))
        .route("/api/failing", get(failing))
        .route("/api/html", get(not_json))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), state)
}

fn gateway(base_url: &str, identity: Option<Identity>) -> RequestGateway {
    RequestGateway::new(base_url, Arc::new(FixedIdentity(identity))).expect("gateway")
}

fn header<'a>(captured: &'a Captured, name: &str) -> Option<&'a str> {
    captured
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
}

#[tokio::test]
async fn attaches_identity_headers_to_every_request() {
    let (base_url, state) = spawn_capture_server().await;
    let identity = Identity::new("u1", "a@b.com", "admin");
    let gateway = gateway(&base_url, Some(identity.clone()));

    let _: Value = gateway.get("/api/echo").await.expect("get");
    let _: Value = gateway
        .post("/api/echo", &json!({ "name": "x" }))
        .await
        .expect("post");

    let captured = state.captured.lock().await;
    assert_eq!(captured.len(), 2);
    for request in captured.iter() {
        assert_eq!(header(request, "x-user-id"), Some("u1"));
        assert_eq!(header(request, "x-user-email"), Some("a@b.com"));
        assert_eq!(header(request, "x-user-role"), Some("admin"));
        let info = header(request, "x-user-info").expect("user info header");
        assert_eq!(info, serde_json::to_string(&identity).expect("json"));
        assert_eq!(header(request, "content-type"), Some("application/json"));
    }
}

#[tokio::test]
async fn omits_identity_headers_without_identity() {
    let (base_url, state) = spawn_capture_server().await;
    let gateway = gateway(&base_url, None);

    let _: Value = gateway.get("/api/echo").await.expect("get");

    let captured = state.captured.lock().await;
    let request = &captured[0];
    assert!(header(request, "x-user-info").is_none());
    assert!(header(request, "x-user-id").is_none());
    assert_eq!(header(request, "content-type"), Some("application/json"));
}

#[tokio::test]
async fn get_never_carries_a_body() {
    let (base_url, state) = spawn_capture_server().await;
    let gateway = gateway(&base_url, None);

    let request = ApiRequest::get("/api/echo")
        .json(&json!({ "ignored": true }))
        .expect("encode");
    let _: Value = gateway.send(request).await.expect("get");

    let captured = state.captured.lock().await;
    assert_eq!(captured[0].method, "GET");
    assert!(captured[0].body.is_empty());
}

#[tokio::test]
async fn non_get_verbs_send_json_body() {
    let (base_url, state) = spawn_capture_server().await;
    let gateway = gateway(&base_url, None);

    let _: Value = gateway
        .patch("/api/echo", &json!({ "manualStatus": "accepted" }))
        .await
        .expect("patch");
    let _: Value = gateway.delete("/api/echo").await.expect("delete");

    let captured = state.captured.lock().await;
    assert_eq!(captured[0].method, "PATCH");
    let body: Value = serde_json::from_slice(&captured[0].body).expect("json body");
    assert_eq!(body, json!({ "manualStatus": "accepted" }));
    assert_eq!(captured[1].method, "DELETE");
    assert!(captured[1].body.is_empty());
}

#[tokio::test]
async fn extra_headers_override_content_type() {
    let (base_url, state) = spawn_capture_server().await;
    let gateway = gateway(&base_url, None);

    let request = ApiRequest::put("/api/echo")
        .json(&json!({ "a": 1 }))
        .expect("encode")
        .header("Content-Type", "application/merge-patch+json")
        .header("X-Trace", "abc");
    let _: Value = gateway.send(request).await.expect("put");

    let captured = state.captured.lock().await;
    assert_eq!(
        header(&captured[0], "content-type"),
        Some("application/merge-patch+json")
    );
    assert_eq!(header(&captured[0], "x-trace"), Some("abc"));
}

#[tokio::test]
async fn base_url_path_prefix_is_preserved() {
    let (base_url, state) = spawn_capture_server().await;
    let gateway = gateway(&format!("{base_url}/prefix/"), None);

    let _: Value = gateway.get("/api/echo").await.expect("get");

    let captured = state.captured.lock().await;
    assert_eq!(captured[0].path, "/prefix/api/echo");
}

#[tokio::test]
async fn absolute_endpoint_bypasses_base_url() {
    let (base_url, state) = spawn_capture_server().await;
    let gateway = gateway("http://127.0.0.1:9/unused", None);

    let _: Value = gateway
        .get(&format!("{base_url}/api/echo"))
        .await
        .expect("get");

    assert_eq!(state.captured.lock().await.len(), 1);
}

#[tokio::test]
async fn error_status_body_is_still_parsed() {
    let (base_url, _state) = spawn_capture_server().await;
    let gateway = gateway(&base_url, None);

    let response: ApiResponse<Value> = gateway.get("/api/failing").await.expect("parsed");
    assert_eq!(response.code, 500);
    assert_eq!(response.message.as_deref(), Some("boom"));
}

#[tokio::test]
async fn non_json_body_is_a_decode_error() {
    let (base_url, _state) = spawn_capture_server().await;
    let gateway = gateway(&base_url, None);

    let err = gateway
        .get::<Value>("/api/html")
        .await
        .expect_err("html is not json");
    assert!(matches!(err, GatewayError::Decode { status: 200, .. }));
}

#[tokio::test]
async fn connection_failure_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let gateway = gateway(&format!("http://{addr}"), None);
    let err = gateway
        .get::<Value>("/api/echo")
        .await
        .expect_err("nothing listening");
    assert!(matches!(
        err,
        GatewayError::Transport {
            method: Method::Get,
            ..
        }
    ));
}

#[test]
fn relative_endpoint_without_slash_is_rejected() {
    let gateway = gateway("http://localhost:8080", None);
    assert!(matches!(
        gateway.resolve("api/users"),
        Err(GatewayError::InvalidEndpoint(_))
    ));
    assert_eq!(
        gateway.resolve("/api/users").expect("resolve").as_str(),
        "http://localhost:8080/api/users"
    );
}

#[test]
fn base_url_must_be_http() {
    let err = RequestGateway::new("ftp://example.com", Arc::new(Anonymous))
        .err()
        .expect("ftp rejected");
    assert!(matches!(err, GatewayError::InvalidBaseUrl { .. }));
}

#[test]
fn identity_headers_skip_absent_fields() {
    let identity = Identity {
        id: Some("u2".into()),
        email: None,
        role: Some("annotator".into()),
    };
    let headers = identity_headers(&identity).expect("headers");
    let value = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    assert_eq!(value(USER_ID_HEADER), Some("u2"));
    assert_eq!(value(USER_ROLE_HEADER), Some("annotator"));
    assert!(value(USER_EMAIL_HEADER).is_none());
    assert_eq!(
        value(USER_INFO_HEADER),
        Some(r#"{"id":"u2","role":"annotator"}"#)
    );
}

#[test]
fn method_parses_case_insensitively() {
    assert_eq!("patch".parse::<Method>().expect("patch"), Method::Patch);
    assert!("TRACE".parse::<Method>().is_err());
}
