//! In-process mock of the Merit API v2.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};

use merit_rs::{AppCredentials, Merit, MeritConfig, Org};

pub const APP_ID: &str = "app-id";
pub const APP_SECRET: &str = "app-secret";
pub const ORG_ID: &str = "org-1";
/// `Basic base64("app-id:app-secret")`
const BASIC_AUTH: &str = "Basic YXBwLWlkOmFwcC1zZWNyZXQ=";
const TOTAL_MERITS: usize = 5;
const MERITS_PAGE_SIZE: usize = 2;

#[derive(Default)]
pub struct MockState {
    pub token_requests: AtomicUsize,
    current_token: Mutex<Option<String>>,
    /// Answer the next Bearer call with 401.
    pub reject_next: AtomicBool,
    pub merit_queries: Mutex<Vec<HashMap<String, String>>>,
    pub link_requests: Mutex<Vec<Value>>,
    pub posted: Mutex<Vec<(String, Value)>>,
}

pub struct MockServer {
    pub base_url: String,
    pub state: Arc<MockState>,
}

impl MockServer {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = build_app(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}/v2", addr),
            state,
        }
    }

    pub fn config(&self) -> MeritConfig {
        MeritConfig {
            base_url: Some(self.base_url.clone()),
            ..Default::default()
        }
    }

    pub fn merit(&self) -> Merit {
        Merit::with_config(AppCredentials::new(APP_ID, APP_SECRET), self.config()).unwrap()
    }

    pub fn org(&self) -> Org {
        self.merit().org(ORG_ID)
    }

    pub fn token_requests(&self) -> usize {
        self.state.token_requests.load(Ordering::SeqCst)
    }
}

fn build_app(state: Arc<MockState>) -> Router {
    Router::new()
        .route("/v2/request_linkapp_url", post(link_app))
        .route("/v2/org_id", get(org_id))
        .route("/v2/orgs/:org_id/access", post(access))
        .route("/v2/orgs/:org_id", get(org_info))
        .route("/v2/orgs/:org_id/merittemplates", get(templates))
        .route("/v2/orgs/:org_id/merits", get(merits))
        .route("/v2/merittemplates/:template_id", get(template))
        .route("/v2/fields/:field_id", get(field))
        .route("/v2/merits/propose", post(propose))
        .route("/v2/merits/send", post(send))
        .route("/v2/merits/:merit_id", post(edit))
        .route("/v2/merits/:merit_id/revoke", post(revoke))
        .route("/v2/merits/:merit_id/transfer", post(transfer))
        .route(
            "/v2/uuidTranslation/merit/:merit_id/email/:email",
            post(translate),
        )
        .with_state(state)
}

fn has_basic_auth(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some(BASIC_AUTH)
}

/// Checks the Bearer token, honouring `reject_next`.
fn check_bearer(state: &MockState, headers: &HeaderMap) -> Result<(), Response> {
    if state.reject_next.swap(false, Ordering::SeqCst) {
        return Err((StatusCode::UNAUTHORIZED, "token expired").into_response());
    }
    let expected = state
        .current_token
        .lock()
        .unwrap()
        .as_ref()
        .map(|t| format!("Bearer {}", t));
    let got = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    if expected.is_some() && got == expected {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "bad token").into_response())
    }
}

async fn link_app(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !has_basic_auth(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    state.link_requests.lock().unwrap().push(body);
    Json(json!({
        "request_linkapp_url": "https://app.merits.com/link-app/?token=5aa5a3992bfa4e0006c47cdf",
        "expiration": "2019-01-31T18:48:51.000Z"
    }))
    .into_response()
}

async fn org_id(headers: HeaderMap, Query(params): Query<HashMap<String, String>>) -> Response {
    if !has_basic_auth(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match params.get("org_id_token").map(String::as_str) {
        Some("good-token") => Json(json!({ "orgId": ORG_ID })).into_response(),
        Some("no-org") => Json(json!({})).into_response(),
        _ => (StatusCode::BAD_REQUEST, "invalid org_id_token").into_response(),
    }
}

async fn access(
    State(state): State<Arc<MockState>>,
    Path(_org_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !has_basic_auth(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let n = state.token_requests.fetch_add(1, Ordering::SeqCst) + 1;
    let token = format!("token-{}", n);
    *state.current_token.lock().unwrap() = Some(token.clone());
    Json(json!({ "orgAccessToken": token })).into_response()
}

async fn org_info(
    State(state): State<Arc<MockState>>,
    Path(org_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = check_bearer(&state, &headers) {
        return resp;
    }
    if org_id == "org-without-id" {
        return Json(json!({ "title": "Nameless" })).into_response();
    }
    Json(json!({
        "id": org_id,
        "title": "Millbrae CERT",
        "description": "This is an example Org",
        "website": "http://www.example.com",
        "logoUrl": "https://images.sig.ma/5c4f598f774d570006465f9e?rect=0,0,150,150",
        "createdAt": "2019-01-01"
    }))
    .into_response()
}

async fn templates(
    State(state): State<Arc<MockState>>,
    Path(_org_id): Path<String>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Err(resp) = check_bearer(&state, &headers) {
        return resp;
    }
    assert_eq!(params.get("limit").map(String::as_str), Some("100"));
    Json(json!({
        "merittemplates": [
            { "id": "t1", "title": "Volunteer" },
            { "id": "t2", "title": "Instructor" }
        ]
    }))
    .into_response()
}

async fn template(
    State(state): State<Arc<MockState>>,
    Path(template_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = check_bearer(&state, &headers) {
        return resp;
    }
    Json(json!({
        "id": template_id,
        "title": "Volunteer",
        "enabledFieldSettings": [
            { "fieldId": "f3", "required": true },
            { "fieldId": "f1" },
            { "fieldId": "f2" }
        ]
    }))
    .into_response()
}

async fn field(
    State(state): State<Arc<MockState>>,
    Path(field_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = check_bearer(&state, &headers) {
        return resp;
    }
    if field_id == "missing" {
        return (StatusCode::NOT_FOUND, "field not found").into_response();
    }
    Json(json!({
        "id": field_id,
        "name": format!("Field {}", field_id),
        "fieldType": "ShortText"
    }))
    .into_response()
}

async fn merits(
    State(state): State<Arc<MockState>>,
    Path(_org_id): Path<String>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Err(resp) = check_bearer(&state, &headers) {
        return resp;
    }
    state.merit_queries.lock().unwrap().push(params.clone());

    let start = params
        .get("starting_after")
        .and_then(|c| c.strip_prefix("cursor-"))
        .and_then(|i| i.parse::<usize>().ok())
        .map(|i| i + 1)
        .unwrap_or(0);
    let end = (start + MERITS_PAGE_SIZE).min(TOTAL_MERITS);
    let page: Vec<Value> = (start..end)
        .map(|i| {
            json!({
                "id": format!("m{}", i),
                "status": "Accepted",
                "merittemplateId": "t1",
                "recipient": { "email": format!("member{}@example.com", i) }
            })
        })
        .collect();

    Json(json!({
        "merits": page,
        "pageInfo": { "hasNextPage": end < TOTAL_MERITS },
        "paging": { "cursors": { "after": format!("cursor-{}", end - 1) } }
    }))
    .into_response()
}

fn record_post(state: &MockState, headers: &HeaderMap, key: String, body: Value) -> Option<Response> {
    if let Err(resp) = check_bearer(state, headers) {
        return Some(resp);
    }
    state.posted.lock().unwrap().push((key, body));
    None
}

async fn propose(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(resp) = record_post(&state, &headers, "propose".into(), body) {
        return resp;
    }
    Json(json!({ "id": "proposed-1" })).into_response()
}

async fn send(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(resp) = record_post(&state, &headers, "send".into(), body) {
        return resp;
    }
    Json(json!({ "id": "sent-1" })).into_response()
}

async fn edit(
    State(state): State<Arc<MockState>>,
    Path(merit_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(resp) = record_post(&state, &headers, format!("edit:{}", merit_id), body) {
        return resp;
    }
    // Merit answers edits with an empty 200
    StatusCode::OK.into_response()
}

async fn revoke(
    State(state): State<Arc<MockState>>,
    Path(merit_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(resp) = record_post(&state, &headers, format!("revoke:{}", merit_id), body) {
        return resp;
    }
    if merit_id == "already-revoked" {
        return (StatusCode::CONFLICT, "merit already revoked").into_response();
    }
    Json(json!({ "status": "Revoked" })).into_response()
}

async fn transfer(
    State(state): State<Arc<MockState>>,
    Path(merit_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(resp) = record_post(&state, &headers, format!("transfer:{}", merit_id), body) {
        return resp;
    }
    Json(json!({ "newMerit": { "id": format!("{}-transferred", merit_id) } })).into_response()
}

async fn translate(
    State(state): State<Arc<MockState>>,
    Path((merit_id, email)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let key = format!("translate:{}", merit_id);
    if let Some(resp) = record_post(&state, &headers, key, json!({ "email": email })) {
        return resp;
    }
    Json(json!({
        "translationUrl": format!("https://app.merits.com/qr/{}/{}", merit_id, email)
    }))
    .into_response()
}
