//! End-to-end tests through the axum router.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use portico_core::{now_millis, Manifest};
use portico_crypto::{generate_session_id, SessionKey};
use portico_server::maintenance::Maintenance;
use portico_server::registry::callback;
use portico_server::{create_router, AppBuilder, AppState, Config, Plugin, PluginContext};
use portico_store::Store;
use portico_testkit::{handshake_body, open_envelope, seal_request, test_keys, SiteBuilder};

// ─────────────────────────────────────────────────────────────────────────────
// Harness
// ─────────────────────────────────────────────────────────────────────────────

struct Tools;

impl Plugin for Tools {
    fn name(&self) -> &str {
        "tools"
    }

    fn mount(&self, ctx: &mut PluginContext<'_>) -> anyhow::Result<()> {
        ctx.portal("echo", callback(|ctx| async move { Ok(ctx.args().clone()) }));
        ctx.portal(
            "whoami",
            callback(|ctx| async move { Ok(json!({ "user_id": ctx.user_id() })) }),
        );
        ctx.portal(
            "slow",
            callback(|_| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(Value::Null)
            }),
        );
        Ok(())
    }
}

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    _site: SiteBuilder,
}

fn site() -> SiteBuilder {
    SiteBuilder::new()
        .page("home", "home page", "page:\n  template: index.html\n")
        .static_file("home", "app.css", "body { margin: 0 }")
        .page("admin_dash", "admin dash", "page:\n  template: index.html\n")
        .access(
            "admin_dash",
            "access:\n  login_required: true\n  roles_allowed: admin\n",
        )
        .page("user_dash", "user dash", "page:\n  template: index.html\n")
        .access(
            "user_dash",
            "access:\n  login_required: true\n  roles_allowed: [user, admin]\n",
        )
        .page("staff", "staff", "page:\n  template: index.html\n")
        .access("staff", "access:\n  roles_allowed: staff\n")
        .page("404", "custom not found", "page:\n  template: index.html\n")
        .page("broken", "x", "page:\n  template: missing.html\n")
}

fn manifest() -> Manifest {
    Manifest::from_json(
        &json!({
            "server": {
                "base_url": "https://portico.test",
                "routes": {
                    "/": "home",
                    "/dash": ["admin_dash", "user_dash"],
                    "/welcome": ["user_dash", "home"],
                    "/staff": "staff",
                    "/broken": "broken"
                }
            },
            "auth": { "mode": "password", "login_url": "/login" },
            "plugins": { "tools": {} }
        })
        .to_string(),
    )
    .unwrap()
}

async fn app_with(site: SiteBuilder, api_timeout: Duration) -> TestApp {
    let mut config = Config::for_site(site.root());
    config.api_timeout = api_timeout;
    let state = AppBuilder::new(config)
        .with_manifest(manifest())
        .with_keys(test_keys().clone())
        .with_plugin(Arc::new(Tools))
        .build()
        .await
        .unwrap();
    TestApp {
        router: create_router(state.clone()),
        state,
        _site: site,
    }
}

async fn app() -> TestApp {
    app_with(site(), Duration::from_secs(10)).await
}

async fn send(app: &TestApp, request: Request<Body>) -> Response<Body> {
    app.router.clone().oneshot(request).await.unwrap()
}

async fn post(app: &TestApp, path: &str, cookie: Option<&str>, body: &Value) -> Response<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    send(app, builder.body(Body::from(body.to_string())).unwrap()).await
}

async fn get(app: &TestApp, path: &str, cookie: Option<&str>) -> Response<Body> {
    let mut builder = Request::builder().method("GET").uri(path);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    send(app, builder.body(Body::empty()).unwrap()).await
}

async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

fn set_cookie(response: &Response<Body>) -> String {
    response.headers()[header::SET_COOKIE]
        .to_str()
        .unwrap()
        .to_string()
}

/// A client that completed the handshake.
struct Client {
    key: SessionKey,
    cookie: String,
}

async fn handshake(app: &TestApp, cookie: Option<&str>) -> Client {
    let key = SessionKey::generate();
    let response = post(app, "/api", cookie, &handshake_body(test_keys(), &key)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let set = set_cookie(&response);
    let cookie = set.split(';').next().unwrap().to_string();
    let reply = open_envelope(&key, &body_json(response).await);
    assert_eq!(reply["info"], "com_ok");
    assert_eq!(format!("session_id={}", reply["session"].as_str().unwrap()), cookie);

    Client { key, cookie }
}

async fn call(app: &TestApp, client: &Client, path: &str, request: Value) -> (StatusCode, Value) {
    let response = post(app, path, Some(&client.cookie), &seal_request(&client.key, &request)).await;
    let status = response.status();
    (status, open_envelope(&client.key, &body_json(response).await))
}

async fn login(app: &TestApp, client: &Client, username: &str) {
    let (_, reply) = call(
        app,
        client,
        "/api/auth",
        json!({"info": "signup", "username": username, "password": "s3cret"}),
    )
    .await;
    assert_eq!(reply["status"], "success");
    let (_, reply) = call(
        app,
        client,
        "/api/auth",
        json!({"info": "authorize", "username": username, "password": "s3cret"}),
    )
    .await;
    assert_eq!(reply["status"], "success");
}

// ─────────────────────────────────────────────────────────────────────────────
// Handshake and channel
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_handshake_sets_session_cookie() {
    let app = app().await;
    let key = SessionKey::generate();
    let response = post(&app, "/api", None, &handshake_body(test_keys(), &key)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = set_cookie(&response);
    assert!(cookie.starts_with("session_id="));
    assert!(cookie.ends_with("; Max-Age=3600; Path=/; HttpOnly; Secure; SameSite=Lax"));
}

#[tokio::test]
async fn test_handshake_adopts_unknown_well_formed_cookie() {
    let app = app().await;
    let id = generate_session_id();
    let cookie = format!("session_id={}", id.as_str());
    let key = SessionKey::generate();

    let response = post(&app, "/api", Some(&cookie), &handshake_body(test_keys(), &key)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookie(&response).starts_with(&format!("{};", cookie)));

    let reply = open_envelope(&key, &body_json(response).await);
    assert_eq!(reply["session"], id.as_str());

    let stored = app.state.store.get_session(&id).await.unwrap().unwrap();
    assert_eq!(stored.key, key);
}

#[tokio::test]
async fn test_handshake_garbage_is_400() {
    let app = app().await;
    let response = post(&app, "/api", None, &json!({"data": "AAAA"})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await, json!({"error": "handshake_failed"}));
}

#[tokio::test]
async fn test_signup_authorize_and_bad_password() {
    let app = app().await;
    let client = handshake(&app, None).await;

    let (status, reply) = call(
        &app,
        &client,
        "/api/auth",
        json!({"info": "request_data", "data": "auth_params"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply, json!({"info": "auth_params", "data": {"AUTH_MODE": "password"}}));

    let (_, reply) = call(
        &app,
        &client,
        "/api/auth",
        json!({"info": "signup", "username": "ada", "password": "pw"}),
    )
    .await;
    assert_eq!(
        reply,
        json!({"status": "success", "message": "User registered successfully."})
    );

    let (status, reply) = call(
        &app,
        &client,
        "/api_auth",
        json!({"info": "authorize", "username": "ada", "password": "nope"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        reply,
        json!({"status": "error", "message": "Invalid username or password."})
    );

    let (_, reply) = call(
        &app,
        &client,
        "/api/auth",
        json!({"info": "authorize", "username": "ada", "password": "pw"}),
    )
    .await;
    assert_eq!(
        reply,
        json!({"status": "success", "token": "ada", "message": "Authorization successful."})
    );

    let (_, reply) = call(&app, &client, "/api/data", json!({"name": "whoami"})).await;
    assert_eq!(reply["status"], "success");
    assert!(reply["result"]["user_id"].is_i64());
}

#[tokio::test]
async fn test_invalid_session_is_403_and_clears_cookie() {
    let app = app().await;
    let key = SessionKey::generate();

    for cookie in [None, Some("session_id=doesnotexist")] {
        let response = post(&app, "/api/auth", cookie, &seal_request(&key, &json!({}))).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let cleared = set_cookie(&response);
        assert!(cleared.starts_with("session_id=;"));
        assert!(cleared.contains("Max-Age=0"));
        assert_eq!(body_json(response).await, json!({"error": "invalid_session"}));
    }
}

#[tokio::test]
async fn test_rotation_keeps_session_and_retires_old_key() {
    let app = app().await;
    let first = handshake(&app, None).await;
    login(&app, &first, "grace").await;

    let second = handshake(&app, Some(&first.cookie)).await;
    assert_eq!(second.cookie, first.cookie);

    let response = post(
        &app,
        "/api/data",
        Some(&first.cookie),
        &seal_request(&first.key, &json!({"name": "echo"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await, json!({"error": "invalid_envelope"}));

    let (_, reply) = call(&app, &second, "/api/data", json!({"name": "whoami"})).await;
    assert!(reply["result"]["user_id"].is_i64(), "login survives rotation");
}

#[tokio::test]
async fn test_unknown_api_and_wrong_method() {
    let app = app().await;
    let client = handshake(&app, None).await;

    let (status, reply) = call(&app, &client, "/api/nope", json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(reply, json!({"error": "unknown_api"}));

    for path in ["/api", "/api/auth", "/api_auth"] {
        let response = get(&app, path, Some(&client.cookie)).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{}", path);
    }
}

#[tokio::test]
async fn test_data_api_and_double_encoded_payload() {
    let app = app().await;
    let client = handshake(&app, None).await;

    let inner = json!({"name": "echo", "args": {"n": 1}}).to_string();
    let (status, reply) = call(&app, &client, "/api/data", Value::String(inner)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply, json!({"status": "success", "result": {"n": 1}}));

    let (_, reply) = call(&app, &client, "/api/data", json!({"name": "nope"})).await;
    assert_eq!(reply["status"], "error");
}

#[tokio::test]
async fn test_slow_call_times_out() {
    let app = app_with(site(), Duration::from_millis(100)).await;
    let client = handshake(&app, None).await;

    let response = post(
        &app,
        "/api/data",
        Some(&client.cookie),
        &seal_request(&client.key, &json!({"name": "slow"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body_json(response).await, json!({"error": "timeout"}));
}

#[tokio::test]
async fn test_idle_sessions_expire() {
    let app = app().await;
    let client = handshake(&app, None).await;

    let maintenance = Maintenance::new(
        app.state.store.clone(),
        app.state.files.clone(),
        app.state.config.session_idle_ttl,
    );
    let idle_ms = app.state.config.session_idle_ttl.as_millis() as i64;
    let sweep = maintenance.run_once(now_millis() + idle_ms + 1_000).await;
    assert_eq!(sweep.sessions, 1);

    let response = post(
        &app,
        "/api/auth",
        Some(&client.cookie),
        &seal_request(&client.key, &json!({"info": "logout"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

// ─────────────────────────────────────────────────────────────────────────────
// Pages and assets
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_open_page() {
    let app = app().await;
    let response = get(&app, "/", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "home page");
}

#[tokio::test]
async fn test_login_redirect_then_role_fall_through() {
    let app = app().await;

    let response = get(&app, "/dash", None).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], "/login");

    let client = handshake(&app, None).await;
    login(&app, &client, "lin").await;

    let response = get(&app, "/dash", Some(&client.cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "user dash");
}

#[tokio::test]
async fn test_later_open_candidate_beats_login_redirect() {
    let app = app().await;

    let response = get(&app, "/welcome", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "home page");

    let client = handshake(&app, None).await;
    login(&app, &client, "ada").await;
    let response = get(&app, "/welcome", Some(&client.cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "user dash");
}

#[tokio::test]
async fn test_not_found_pages() {
    let app = app().await;

    let response = get(&app, "/nowhere", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(response).await, "custom not found");

    // Role denial without login_required falls through to 404.
    let response = get(&app, "/staff", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let bare = app_with(
        SiteBuilder::new().page("home", "h", "page:\n  template: index.html\n"),
        Duration::from_secs(10),
    )
    .await;
    let response = get(&bare, "/nowhere", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(response).await, "404 Not Found");
}

#[tokio::test]
async fn test_page_build_failure_is_500() {
    let app = app().await;
    let response = get(&app, "/broken", None).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_assets() {
    let app = app().await;

    let response = get(&app, "/static_home/app.css", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/css; charset=utf-8");
    assert_eq!(body_text(response).await, "body { margin: 0 }");

    let response = get(&app, "/utils_tools.js", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("export async function handshake"));

    for path in ["/static_home/../secret", "/static_home/missing.css", "/plugin_view/nope", "/utils_"] {
        let response = get(&app, path, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", path);
    }
}

#[tokio::test]
async fn test_hosted_plugin_file() {
    let app = app().await;
    std::fs::create_dir_all(app.state.files.cache_dir()).unwrap();
    let (id, path) = app
        .state
        .files
        .create("tools", "report.txt", Duration::from_secs(60))
        .unwrap();
    std::fs::write(&path, "numbers").unwrap();
    app.state.files.host(&id, Some("Report.txt")).unwrap();

    let response = get(&app, &format!("/plugin_download/{}", id), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("Report.txt"));
    assert_eq!(body_text(response).await, "numbers");

    let response = get(&app, &format!("/plugin_edit/{}", id), None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
