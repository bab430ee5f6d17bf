use crate::handlers;
use crate::middleware;
use crate::AppState;
use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub fn create_router(state: Arc<AppState>) -> Router {
    let authenticated = Router::new()
        .route("/users/me", get(handlers::users::me))
        .route("/users/me/email", post(handlers::users::change_email))
        .route("/users/me/password", post(handlers::users::change_password))
        .route(
            "/logs",
            get(handlers::logs::list_logs).delete(handlers::logs::delete_logs),
        )
        .route_layer(from_fn_with_state(state.clone(), middleware::require_auth));

    let api = Router::new()
        .route("/auth/sign-up", post(handlers::auth::sign_up))
        .route("/auth/sign-in", post(handlers::auth::sign_in))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/verify-email", post(handlers::auth::verify_email))
        .route(
            "/auth/resend-verification",
            post(handlers::auth::resend_verification),
        )
        .route(
            "/auth/reset-password-request",
            post(handlers::auth::request_password_reset),
        )
        .route("/auth/reset-password", post(handlers::auth::reset_password))
        .route("/auth/check-username", get(handlers::auth::check_username))
        .merge(authenticated);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .nest("/api/v1", api)
        .layer(from_fn_with_state(state.clone(), middleware::log_failures))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookies::SESSION_COOKIE;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use ticketing_auth::mocks::RecordingMailer;
    use ticketing_auth::{
        AuthService, EmailComposer, EmailQueue, EmailQueueConfig, HashParams, PasswordHasher,
    };
    use ticketing_cache::mocks::MemorySessionCache;
    use ticketing_database::mocks::{MemoryAuthStore, MemoryLogStore};
    use ticketing_logging::{LogPipelineConfig, LogService};
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        state: Arc<AppState>,
        store: MemoryAuthStore,
        logs: MemoryLogStore,
    }

    fn test_app() -> TestApp {
        let store = MemoryAuthStore::with_guest_role();
        let logs = MemoryLogStore::new();
        let log_service = LogService::start(Arc::new(logs.clone()), LogPipelineConfig::default());
        let email = EmailQueue::start(
            EmailQueueConfig::default(),
            Arc::new(RecordingMailer::new()),
            Arc::new(EmailComposer::default()),
            Some(log_service.sink()),
        );
        let auth = AuthService::new(
            Arc::new(store.clone()),
            Arc::new(MemorySessionCache::new()),
            email,
        )
        .with_hasher(PasswordHasher::new(HashParams {
            memory_kib: 256,
            iterations: 1,
            parallelism: 1,
            output_len: 32,
        }));

        let state = Arc::new(AppState {
            auth,
            log_sink: log_service.sink(),
            logs: log_service,
        });

        TestApp {
            router: create_router(state.clone()),
            state,
            store,
            logs,
        }
    }

    async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Vec<String>, Value) {
        let response = app.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let cookies = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok().map(str::to_string))
            .collect();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, cookies, json)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn signed_in_cookie(app: &TestApp) -> String {
        let (status, _, body) = send(
            app,
            post_json(
                "/api/v1/auth/sign-up",
                json!({
                    "username": "event_fan",
                    "email": "fan@example.com",
                    "password": "correct-horse",
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "success");

        let user_id: uuid::Uuid = serde_json::from_value(body["data"]["user_id"].clone()).unwrap();
        let code = app
            .store
            .security_of(user_id)
            .and_then(|s| s.email_verification_token)
            .unwrap();
        let (status, _, _) = send(
            app,
            post_json(
                "/api/v1/auth/verify-email",
                json!({ "user_id": user_id, "code": code }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, cookies, _) = send(
            app,
            post_json(
                "/api/v1/auth/sign-in",
                json!({ "identifier": "event_fan", "password": "correct-horse" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cookies.len(), 2);

        let session = cookies
            .iter()
            .find(|c| c.starts_with(SESSION_COOKIE))
            .unwrap();
        session.split(';').next().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app();
        let (status, _, body) = send(
            &app,
            Request::get("/health").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let app = test_app();
        let cookie = signed_in_cookie(&app).await;

        let me = || {
            Request::get("/api/v1/users/me")
                .header(header::COOKIE, cookie.as_str())
                .body(Body::empty())
                .unwrap()
        };

        let (status, _, body) = send(&app, me()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["username"], "event_fan");

        let (status, cookies, _) = send(
            &app,
            Request::post("/api/v1/auth/logout")
                .header(header::COOKIE, cookie.as_str())
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(cookies.iter().all(|c| c.contains("Max-Age=0")));

        let (status, _, body) = send(&app, me()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status"], "failed");
    }

    #[tokio::test]
    async fn test_logout_without_session_still_clears_cookies() {
        let app = test_app();
        let (status, cookies, _) = send(
            &app,
            Request::post("/api/v1/auth/logout").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(cookies.len(), 2);
    }

    #[tokio::test]
    async fn test_wrong_password_is_unauthorized_and_logged() {
        let app = test_app();
        signed_in_cookie(&app).await;

        let (status, _, body) = send(
            &app,
            post_json(
                "/api/v1/auth/sign-in",
                json!({ "identifier": "event_fan", "password": "wrong-password" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status"], "failed");

        app.state.logs.shutdown().await;
        let rows = app.logs.records();
        let row = rows
            .iter()
            .find(|r| r.message == "Invalid credentials")
            .expect("failure was not logged");
        assert_eq!(row.route.as_deref(), Some("/api/v1/auth/sign-in"));
        assert_eq!(row.status_code, Some(401));
        assert_eq!(row.method.as_deref(), Some("POST"));

        // Attributed to the sign-in handler, not the logging middleware.
        assert_eq!(row.file.as_deref(), Some("src/handlers/auth.rs"));
        let stack = row.stack.as_deref().unwrap_or_default();
        assert!(stack.contains("handlers/auth.rs"));
        assert!(!stack.contains("request_log.rs"));
    }

    #[tokio::test]
    async fn test_logs_require_session_and_filter() {
        let app = test_app();
        let (status, _, _) = send(
            &app,
            Request::get("/api/v1/logs").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let cookie = signed_in_cookie(&app).await;

        let (status, _, body) = send(
            &app,
            Request::delete("/api/v1/logs")
                .header(header::COOKIE, cookie.as_str())
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "failed");

        let (status, _, body) = send(
            &app,
            Request::get("/api/v1/logs?level=error&limit=5")
                .header(header::COOKIE, cookie.as_str())
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"].is_array());
    }

    #[tokio::test]
    async fn test_locked_account_returns_423() {
        let app = test_app();
        signed_in_cookie(&app).await;

        let mut last = StatusCode::OK;
        for _ in 0..5 {
            let (status, _, _) = send(
                &app,
                post_json(
                    "/api/v1/auth/sign-in",
                    json!({ "identifier": "event_fan", "password": "wrong-password" }),
                ),
            )
            .await;
            last = status;
        }
        assert_eq!(last, StatusCode::LOCKED);
    }
}
