use super::*;
use axum::{
    extract::{Path, RawQuery, State},
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde_json::json;
use tokio::{net::TcpListener, sync::Mutex};

use crate::gateway::Anonymous;

#[derive(Clone, Default)]
struct Backend {
    users: Arc<Mutex<Vec<User>>>,
    query_strings: Arc<Mutex<Vec<Option<String>>>>,
    status_patches: Arc<Mutex<Vec<(String, Value)>>>,
}

async fn login(Json(body): Json<Value>) -> Json<Value> {
    if body["email"] == "admin@example.com" && body["password"] == "secret" {
        Json(json!({
            "code": 200,
            "data": { "id": "u1", "email": "admin@example.com", "role": "admin" }
        }))
    } else {
        Json(json!({ "code": 401, "message": "invalid credentials" }))
    }
}

async fn list_users(State(backend): State<Backend>) -> Json<Value> {
    let users = backend.users.lock().await.clone();
    Json(json!({ "code": 200, "data": users }))
}

async fn create_user(State(backend): State<Backend>, Json(body): Json<Value>) -> Json<Value> {
    let mut users = backend.users.lock().await;
    let user = User {
        id: UserId(format!("u{}", users.len() + 2)),
        email: body["email"].as_str().unwrap_or_default().to_string(),
        role: body["role"].as_str().unwrap_or_default().to_string(),
        created_at: None,
    };
    users.push(user.clone());
    Json(json!({ "code": 200, "data": user }))
}

async fn delete_user(State(backend): State<Backend>, Path(id): Path<String>) -> Json<Value> {
    let mut users = backend.users.lock().await;
    let before = users.len();
    users.retain(|user| user.id.0 != id);
    if users.len() == before {
        Json(json!({ "code": 404, "message": format!("user {id} not found") }))
    } else {
        Json(json!({ "code": 200 }))
    }
}

async fn list_scenes() -> Json<Value> {
    Json(json!({
        "code": 200,
        "data": [
            { "level2": "trend", "level3": ["growth", "decline"] },
            { "level2": "opportunity", "level3": ["market"] }
        ]
    }))
}

async fn list_queries(State(backend): State<Backend>, RawQuery(raw): RawQuery) -> Json<Value> {
    backend.query_strings.lock().await.push(raw.clone());
    let page = raw
        .as_deref()
        .unwrap_or_default()
        .split('&')
        .find_map(|pair| pair.strip_prefix("page="))
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(1);
    let items = if page <= 2 {
        vec![json!({
            "id": format!("q{page}"),
            "text": format!("query {page}"),
            "queryTypeCode": "trend-growth-1",
            "filterStatus": "passed"
        })]
    } else {
        Vec::new()
    };
    Json(json!({ "code": 200, "data": { "items": items, "total": 2 } }))
}

async fn patch_status(
    State(backend): State<Backend>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    backend.status_patches.lock().await.push((id, body));
    Json(json!({ "code": 200 }))
}

async fn generate(Json(body): Json<Value>) -> Json<Value> {
    Json(json!({
        "code": 200,
        "data": { "taskId": "gen-1", "accepted": body["count"] }
    }))
}

async fn spawn_backend() -> (Arc<AdminApi>, Backend) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let backend = Backend::default();
    backend.users.lock().await.push(User {
        id: UserId::from("u1"),
        email: "admin@example.com".into(),
        role: "admin".into(),
        created_at: None,
    });
    let app = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/users", get(list_users).post(create_user))
        .route("/api/users/:id", delete(delete_user))
        .route("/api/scenes", get(list_scenes))
        .route("/api/queries", get(list_queries))
        .route("/api/queries/:id/status", patch(patch_status))
        .route("/api/queries/generate", post(generate))
        .with_state(backend.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let gateway =
        RequestGateway::new(&format!("http://{addr}"), Arc::new(Anonymous)).expect("gateway");
    (Arc::new(AdminApi::new(Arc::new(gateway))), backend)
}

#[tokio::test]
async fn login_returns_identity_on_success() {
    let (api, _) = spawn_backend().await;
    let identity = api.login("admin@example.com", "secret").await.expect("login");
    assert_eq!(identity, Identity::new("u1", "admin@example.com", "admin"));
}

#[tokio::test]
async fn login_surfaces_application_code() {
    let (api, _) = spawn_backend().await;
    let err = api
        .login("admin@example.com", "wrong")
        .await
        .expect_err("rejected");
    assert_eq!(err.code, ErrorCode::Application(401));
    assert_eq!(err.message, "invalid credentials");
}

#[tokio::test]
async fn login_requires_credentials_before_sending() {
    let (api, _) = spawn_backend().await;
    let err = api.login("  ", "").await.expect_err("validation");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn user_crud_round_trip() {
    let (api, backend) = spawn_backend().await;

    let created = api
        .create_user(&CreateUserRequest {
            email: "annotator@example.com".into(),
            password: "pw".into(),
            role: "annotator".into(),
        })
        .await
        .expect("create");
    assert_eq!(created.role, "annotator");
    assert_eq!(api.list_users().await.expect("list").len(), 2);

    api.delete_user(&created.id).await.expect("delete");
    assert_eq!(backend.users.lock().await.len(), 1);

    let err = api
        .delete_user(&created.id)
        .await
        .expect_err("already deleted");
    assert_eq!(err.code, ErrorCode::Application(404));
}

#[tokio::test]
async fn invalid_user_is_rejected_locally() {
    let (api, backend) = spawn_backend().await;
    let err = api
        .create_user(&CreateUserRequest {
            email: "no-at-sign".into(),
            password: "pw".into(),
            role: "admin".into(),
        })
        .await
        .expect_err("invalid email");
    assert_eq!(err.code, ErrorCode::Validation);
    assert_eq!(backend.users.lock().await.len(), 1);
}

#[tokio::test]
async fn list_queries_encodes_filter() {
    let (api, backend) = spawn_backend().await;
    let filter = QueryFilter {
        query_type_code: Some("trend growth".into()),
        manual_status: Some(ManualStatus::Pending),
        ..QueryFilter::default()
    };
    let page = api.list_queries(&filter).await.expect("queries");
    assert_eq!(page.total, 2);

    let raw = backend.query_strings.lock().await[0].clone();
    assert_eq!(
        raw.as_deref(),
        Some("queryTypeCode=trend+growth&manualStatus=pending")
    );
}

#[tokio::test]
async fn list_all_queries_walks_pages() {
    let (api, _) = spawn_backend().await;
    let rows = api
        .list_all_queries(&QueryFilter {
            page_size: Some(1),
            ..QueryFilter::default()
        })
        .await
        .expect("all queries");
    let ids: Vec<_> = rows.iter().map(|q| q.id.0.as_str()).collect();
    assert_eq!(ids, vec!["q1", "q2"]);
}

#[tokio::test]
async fn list_all_queries_from_later_page_stops_at_total() {
    let (api, backend) = spawn_backend().await;
    let rows = api
        .list_all_queries(&QueryFilter {
            page: Some(2),
            page_size: Some(1),
            ..QueryFilter::default()
        })
        .await
        .expect("remaining queries");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id.0, "q2");

    let requests = backend.query_strings.lock().await;
    assert_eq!(requests.as_slice(), &[Some("page=2&pageSize=1".to_string())]);
}

#[tokio::test]
async fn ids_with_spaces_reach_the_backend_unchanged() {
    let (api, backend) = spawn_backend().await;
    api.set_query_status(&QueryId::from("q 7+1"), ManualStatus::Accepted)
        .await
        .expect("patch");

    let patches = backend.status_patches.lock().await;
    assert_eq!(patches[0].0, "q 7+1");
}

#[test]
fn path_segments_are_percent_encoded() {
    assert_eq!(segment("a b"), "a%20b");
    assert_eq!(segment("a+b"), "a%2Bb");
    assert_eq!(segment("x/y"), "x%2Fy");
    assert_eq!(segment("u-1_2.3"), "u-1_2.3");
}

#[tokio::test]
async fn manual_confirmation_patches_status() {
    let (api, backend) = spawn_backend().await;
    api.set_query_status(&QueryId::from("q7"), ManualStatus::Rejected)
        .await
        .expect("patch");

    let patches = backend.status_patches.lock().await;
    assert_eq!(patches[0].0, "q7");
    assert_eq!(patches[0].1, json!({ "manualStatus": "rejected" }));
}

#[tokio::test]
async fn scenes_and_generation() {
    let (api, _) = spawn_backend().await;
    let scenes = api.list_scenes().await.expect("scenes");
    assert_eq!(scenes.len(), 2);
    assert_eq!(scenes[0].level3, vec!["growth", "decline"]);

    let response = api
        .generate_queries(&GenerateQueriesRequest {
            query_type_code: "trend-growth-1".into(),
            count: 25,
        })
        .await
        .expect("generate");
    assert_eq!(response.accepted, 25);
    assert_eq!(response.task_id.as_deref(), Some("gen-1"));
}

#[test]
fn endpoint_errors_map_to_validation_code() {
    let err = ApiError::from(GatewayError::InvalidEndpoint("users".into()));
    assert_eq!(err.code, ErrorCode::Validation);
}
