/// Router-level tests driving the full middleware stack with `oneshot`
use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{header, Request, StatusCode},
    Router,
};
use find_connections::{
    auth::tokens::TokenService,
    config::ServerConfig,
    context::AppContext,
    db,
    graph::{PersonGraph, SqliteGraph},
    object_store::{DiskObjectStore, ObjectStore},
    server::build_router,
    validation::antivirus::UnconfiguredScanner,
};
use serde_json::{json, Value};
use std::{net::SocketAddr, sync::Arc};
use tempfile::TempDir;
use tower::ServiceExt;

const ADMIN_EMAIL: &str = "admin@example.com";
const ADMIN_PASSWORD: &str = "AdminPass1";
const BOUNDARY: &str = "fc-test-boundary";
const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

struct TestApp {
    _dir: TempDir,
    router: Router,
}

async fn test_app() -> TestApp {
    test_app_with(|_| {}).await
}

async fn test_app_with(configure: impl FnOnce(&mut ServerConfig)) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ServerConfig::for_testing(dir.path().to_path_buf());
    configure(&mut config);

    let pool = db::memory_pool().await.unwrap();
    db::run_migrations(&pool).await.unwrap();

    let tokens = Arc::new(TokenService::new(&config.authentication.jwt_secret));
    let graph: Arc<dyn PersonGraph> = Arc::new(SqliteGraph::new(pool.clone()));
    let objects: Arc<dyn ObjectStore> = Arc::new(DiskObjectStore::new(
        dir.path().join("objects"),
        &config.service.public_url,
        tokens.clone(),
    ));

    let ctx = AppContext::from_parts(
        config,
        pool,
        tokens,
        graph,
        objects,
        Arc::new(UnconfiguredScanner::new(true)),
    )
    .unwrap();
    ctx.accounts
        .bootstrap_admin(ADMIN_EMAIL, ADMIN_PASSWORD)
        .await
        .unwrap();

    TestApp {
        _dir: dir,
        router: build_router(ctx),
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<String>, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let cookies = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, cookies, body.to_vec())
    }

    async fn get(&self, uri: &str, cookie: Option<&str>) -> (StatusCode, Vec<String>, Vec<u8>) {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    async fn post_json(
        &self,
        uri: &str,
        body: Value,
        headers: &[(&str, &str)],
    ) -> (StatusCode, Vec<String>, Vec<u8>) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    async fn post_form(
        &self,
        uri: &str,
        fields: &[(&str, &str)],
        file: Option<(&str, &[u8])>,
        headers: &[(&str, &str)],
    ) -> (StatusCode, Vec<String>, Vec<u8>) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            );
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.send(builder.body(Body::from(multipart_body(fields, file))).unwrap())
            .await
    }

    /// Login as if from TCP peer `peer`, with no proxy in between unless
    /// `headers` adds forwarding headers
    async fn login_from(
        &self,
        peer: &str,
        email: &str,
        password: &str,
        headers: &[(&str, &str)],
    ) -> StatusCode {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/users/login")
            .header(header::CONTENT_TYPE, "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let mut request = builder
            .body(Body::from(
                json!({ "Email": email, "Password": password }).to_string(),
            ))
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::new(peer.parse().unwrap(), 50000)));

        self.send(request).await.0
    }

    async fn register(&self, name: &str, email: &str, password: &str) {
        let (status, _, _) = self
            .post_json(
                "/api/users/register",
                json!({
                    "Name": name,
                    "FamilyName": "Tester",
                    "Email": email,
                    "Password": password
                }),
                &[],
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    async fn admin_cookie(&self) -> String {
        let (status, cookies, _) = self
            .get(
                &format!(
                    "/api/admin/admin-login?email={}&password={}",
                    ADMIN_EMAIL, ADMIN_PASSWORD
                ),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        cookie_pair(&cookies, "admin-token")
    }

    async fn user_cookie(&self) -> String {
        let (status, _, _) = self
            .post_json(
                "/api/users/register",
                json!({
                    "Name": "Ana",
                    "FamilyName": "Smith",
                    "Email": "ana@example.com",
                    "Password": "Secret123"
                }),
                &[],
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, cookies, _) = self
            .post_json(
                "/api/users/login",
                json!({ "Email": "ana@example.com", "Password": "Secret123" }),
                &[],
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        cookie_pair(&cookies, "auth-token")
    }
}

fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: image/jpeg\r\n\r\n",
                BOUNDARY, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// `name=value` from the Set-Cookie header for `name`
fn cookie_pair(cookies: &[String], name: &str) -> String {
    cookies
        .iter()
        .find(|c| c.starts_with(&format!("{}=", name)))
        .and_then(|c| c.split(';').next())
        .map(str::to_string)
        .unwrap_or_else(|| panic!("no {} cookie in {:?}", name, cookies))
}

fn json_body(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn test_unconnected_people_give_empty_list() {
    let app = test_app().await;

    let (status, _, body) = app
        .get("/api/general/connections?name1=Ana%20Smith&name2=Bob%20Lee", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body), json!([]));
}

#[tokio::test]
async fn test_missing_names_rejected() {
    let app = test_app().await;

    let (status, _, body) = app.get("/api/general/connections?name1=Ana%20Smith", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["code"], "MISSING_REQUIRED_FIELDS");
}

#[tokio::test]
async fn test_suggestions_are_cacheable() {
    let app = test_app().await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/general/suggestions?query=ana")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CACHE_CONTROL],
        "public, max-age=60, stale-while-revalidate=30"
    );
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(json_body(&body), json!({ "suggestions": [] }));
}

#[tokio::test]
async fn test_login_sets_http_only_cookie() {
    let app = test_app().await;
    app.user_cookie().await;

    let (status, cookies, body) = app
        .post_json(
            "/api/users/login",
            json!({ "Email": "ana@example.com", "Password": "Secret123" }),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["message"], "Login successful");

    let cookie = cookies.iter().find(|c| c.starts_with("auth-token=")).unwrap();
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Strict"));
    assert!(cookie.contains("Path=/"));
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized() {
    let app = test_app().await;
    app.user_cookie().await;

    let (status, cookies, _) = app
        .post_json(
            "/api/users/login",
            json!({ "Email": "ana@example.com", "Password": "Wrong1234" }),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(cookies.is_empty());
}

#[tokio::test]
async fn test_user_info_requires_session() {
    let app = test_app().await;

    let (status, _, _) = app.get("/api/users/user-info", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let cookie = app.user_cookie().await;
    let (status, _, body) = app.get("/api/users/verify-user", Some(&cookie)).await;
    assert_eq!(status, StatusCode::OK);

    let info = json_body(&body);
    assert_eq!(info["Email"], "ana@example.com");
    assert_eq!(info["isConfirmed"], false);
    assert_eq!(info["uploadCount"], 0);
    assert!(info.get("Password").is_none());
}

#[tokio::test]
async fn test_change_password_needs_csrf() {
    let app = test_app().await;
    let session = app.user_cookie().await;
    let request = json!({ "currentPassword": "Secret123", "newPassword": "Newer1234" });

    let (status, _, _) = app
        .post_json(
            "/api/users/change-password",
            request.clone(),
            &[("cookie", session.as_str())],
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, cookies, body) = app.get("/api/users/csrf-token", Some(&session)).await;
    assert_eq!(status, StatusCode::OK);
    let token = json_body(&body)["csrfToken"].as_str().unwrap().to_string();
    let both = format!("{}; {}", session, cookie_pair(&cookies, "csrf-token"));

    let (status, _, _) = app
        .post_json(
            "/api/users/change-password",
            request.clone(),
            &[("cookie", both.as_str()), ("x-csrf-token", "forged")],
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, _) = app
        .post_json(
            "/api/users/change-password",
            request,
            &[("cookie", both.as_str()), ("x-csrf-token", token.as_str())],
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = app
        .post_json(
            "/api/users/login",
            json!({ "Email": "ana@example.com", "Password": "Newer1234" }),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_admin_routes_check_role() {
    let app = test_app().await;

    let (status, _, _) = app.get("/api/admin/verify-session", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let user = app.user_cookie().await;
    let (status, _, _) = app.get("/api/admin/verify-session", Some(&user)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A user token presented in the admin cookie has the wrong role
    let user_token = user.trim_start_matches("auth-token=");
    let (status, _, _) = app
        .get(
            "/api/admin/verify-session",
            Some(&format!("admin-token={}", user_token)),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = app.admin_cookie().await;
    let (status, _, body) = app.get("/api/admin/verify-session", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json_body(&body),
        json!({ "message": "Authenticated", "email": ADMIN_EMAIL })
    );
}

#[tokio::test]
async fn test_admin_login_bad_password() {
    let app = test_app().await;

    let (status, cookies, _) = app
        .get(
            &format!("/api/admin/admin-login?email={}&password=nope", ADMIN_EMAIL),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(cookies.is_empty());

    let (status, _, _) = app.get("/api/admin/admin-login", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_upload_then_lookup_and_fetch_image() {
    let app = test_app().await;
    let admin = app.admin_cookie().await;

    let (status, _, body) = app
        .post_form(
            "/api/admin/admin-upload",
            &[
                ("firstPersonFullName", "Ana Smith"),
                ("secondPersonFullName", "Bob Lee"),
            ],
            Some(("photo.jpg", JPEG)),
            &[("cookie", admin.as_str())],
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json_body(&body)["imageUrl"]
        .as_str()
        .unwrap()
        .contains("Ana%20Smith_Bob%20Lee.jpg"));

    // Same pair in the other order is a duplicate
    let (status, _, _) = app
        .post_form(
            "/api/admin/admin-upload",
            &[
                ("firstPersonFullName", "Bob Lee"),
                ("secondPersonFullName", "Ana Smith"),
            ],
            Some(("photo.jpg", JPEG)),
            &[("cookie", admin.as_str())],
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _, body) = app
        .get("/api/general/connections?name1=Ana%20Smith&name2=Bob%20Lee", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let paths = json_body(&body);
    assert_eq!(paths.as_array().unwrap().len(), 1);
    assert_eq!(paths[0]["segments"].as_array().unwrap().len(), 1);

    let signed = paths[0]["imageUrls"][0].as_str().unwrap();
    let local = signed.trim_start_matches("http://localhost:3000");
    let (status, _, bytes) = app.get(local, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, JPEG);

    // Without the token the image is not served
    let unsigned = local.split('?').next().unwrap();
    let (status, _, _) = app.get(unsigned, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_upload_missing_fields() {
    let app = test_app().await;
    let admin = app.admin_cookie().await;

    let (status, _, body) = app
        .post_form(
            "/api/admin/admin-upload",
            &[("firstPersonFullName", "Ana Smith")],
            None,
            &[("cookie", admin.as_str())],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(&body)["details"]["fields"],
        json!(["firstPersonFullName", "secondPersonFullName", "file"])
    );
}

#[tokio::test]
async fn test_delete_node_cascades() {
    let app = test_app().await;
    let admin = app.admin_cookie().await;

    for (first, second) in [("Ana Smith", "Bob Lee"), ("Bob Lee", "Cat Jones")] {
        let (status, _, _) = app
            .post_form(
                "/api/admin/admin-upload",
                &[("firstPersonFullName", first), ("secondPersonFullName", second)],
                Some(("photo.jpg", JPEG)),
                &[("cookie", admin.as_str())],
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, _, body) = app
        .post_json(
            "/api/admin/delete-node",
            json!({ "fullName": "Bob Lee" }),
            &[("cookie", admin.as_str())],
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["deletedImages"], 2);

    let (status, _, body) = app
        .get("/api/general/connections?name1=Ana%20Smith&name2=Cat%20Jones", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body), json!([]));
}

#[tokio::test]
async fn test_anonymous_upload_reports_allowance() {
    let app = test_app().await;

    let (status, _, body) = app
        .post_form(
            "/api/general/upload-temp",
            &[],
            Some(("party.jpg", JPEG)),
            &[("x-forwarded-for", "203.0.113.7")],
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let receipt = json_body(&body);
    assert_eq!(receipt["key"], "party.jpg");
    assert_eq!(receipt["uploadsToday"], 1);
    assert_eq!(receipt["remainingUploads"], 9);

    let (status, _, _) = app
        .post_form("/api/general/upload-temp", &[("note", "no file")], None, &[])
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_and_metrics() {
    let app = test_app().await;

    let (status, _, body) = app.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["status"], "ok");
    assert_eq!(json_body(&body)["version"], "test");

    let (status, _, body) = app.get("/health/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["status"], "healthy");
    assert_eq!(json_body(&body)["version"], "test");

    let (status, _, body) = app.get("/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().contains("http_requests_total"));
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let app = test_app().await;

    let (status, _, body) = app.get("/api/nowhere", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json_body(&body)["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_unknown_route_is_rate_limited() {
    let app = test_app_with(|config| {
        config.rate_limit.enabled = true;
        config.rate_limit.requests_per_second = 1;
        config.rate_limit.burst = 1;
    })
    .await;

    let (status, _, _) = app.get("/api/nowhere", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, body) = app.get("/api/nowhere", None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json_body(&body)["code"], "RATE_LIMITED");
}

#[tokio::test]
async fn test_headerless_clients_are_banned_separately() {
    let app = test_app().await;
    app.register("Ana", "ana@example.com", "Secret123").await;
    app.register("Bob", "bob@example.com", "Secret456").await;

    for _ in 0..4 {
        let status = app
            .login_from("198.51.100.1", "ana@example.com", "Wrong1234", &[])
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let status = app
        .login_from("198.51.100.1", "ana@example.com", "Wrong1234", &[])
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    // Another client with no forwarding headers is unaffected
    let status = app
        .login_from("198.51.100.2", "bob@example.com", "Secret456", &[])
        .await;
    assert_eq!(status, StatusCode::OK);

    let status = app
        .login_from("198.51.100.1", "bob@example.com", "Secret456", &[])
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_rotating_forwarded_for_does_not_escape_ban() {
    let app = test_app().await;
    app.register("Ana", "ana@example.com", "Secret123").await;

    for i in 1..=5 {
        let forwarded = format!("203.0.113.{}", i);
        app.login_from(
            "198.51.100.1",
            "ana@example.com",
            "Wrong1234",
            &[("x-forwarded-for", forwarded.as_str())],
        )
        .await;
    }

    let status = app
        .login_from(
            "198.51.100.1",
            "ana@example.com",
            "Secret123",
            &[("x-forwarded-for", "203.0.113.99")],
        )
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_forwarded_for_honoured_behind_trusted_proxy() {
    let app = test_app_with(|config| config.service.trust_proxy_headers = true).await;
    app.register("Ana", "ana@example.com", "Secret123").await;

    for _ in 0..5 {
        app.login_from(
            "10.0.0.1",
            "ana@example.com",
            "Wrong1234",
            &[("x-forwarded-for", "203.0.113.1")],
        )
        .await;
    }

    // Same proxy, different client behind it
    let status = app
        .login_from(
            "10.0.0.1",
            "ana@example.com",
            "Secret123",
            &[("x-forwarded-for", "203.0.113.2")],
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let status = app
        .login_from(
            "10.0.0.1",
            "ana@example.com",
            "Secret123",
            &[("x-forwarded-for", "203.0.113.1")],
        )
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_bad_bodies_use_error_envelope() {
    let app = test_app().await;

    let (status, _, body) = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/users/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["code"], "VALIDATION_ERROR");

    let session = app.user_cookie().await;
    let (status, _, body) = app
        .post_json(
            "/api/users/set-notification",
            json!({ "enabled": "yes" }),
            &[("cookie", session.as_str())],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["code"], "VALIDATION_ERROR");

    // JSON sent where a multipart form is expected
    let (status, _, body) = app
        .post_json("/api/general/upload-temp", json!({}), &[])
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["code"], "VALIDATION_ERROR");
}
