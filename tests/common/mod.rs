//! Shared helpers for HTTP-level tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::http::HeaderValue;
use axum_test::TestServer;
use serde_json::{json, Value};
use usermgmt::{
    app::build_app,
    clock::ManualClock,
    config::{AppConfig, Environment, JwtConfig},
    notify::ResetNotifier,
    state::AppState,
    users::{memory::InMemoryUserRepo, repo_types::User},
};

/// Captures reset tokens instead of delivering them.
#[derive(Default, Clone)]
pub struct CapturingNotifier {
    pub sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl CapturingNotifier {
    /// Last token sent to `email`.
    pub fn token_for(&self, email: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(e, _)| e == email)
            .map(|(_, t)| t.clone())
    }
}

impl ResetNotifier for CapturingNotifier {
    fn send_password_reset(&self, user: &User, raw_token: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((user.email.clone(), raw_token.to_string()));
        Ok(())
    }
}

pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub clock: Arc<ManualClock>,
    pub notifier: CapturingNotifier,
}

pub fn create_test_app_with(expose_reset_token: bool) -> TestApp {
    let clock = Arc::new(ManualClock::starting_now());
    let notifier = CapturingNotifier::default();
    let config = AppConfig {
        env: Environment::Development,
        database_url: None,
        jwt: JwtConfig {
            secret: "integration-secret".into(),
            issuer: "usermgmt".into(),
            audience: "usermgmt-users".into(),
        },
        expose_reset_token,
        admin: None,
    };
    let state = AppState::from_parts(
        config,
        Arc::new(InMemoryUserRepo::with_clock(clock.clone())),
        clock.clone(),
        Arc::new(notifier.clone()),
    );
    let server = TestServer::new(build_app(state.clone())).expect("Failed to create test server");
    TestApp {
        server,
        state,
        clock,
        notifier,
    }
}

pub fn create_test_app() -> TestApp {
    create_test_app_with(false)
}

pub fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {token}")).unwrap()
}

/// Signs up and returns `(token, user id)`.
pub async fn signup(server: &TestServer, name: &str, email: &str, password: &str) -> (String, String) {
    let response = server
        .post("/api/auth/signup")
        .json(&json!({ "name": name, "email": email, "password": password }))
        .await;
    assert_eq!(response.status_code(), 201);
    let body: Value = response.json();
    (
        body["data"]["token"].as_str().unwrap().to_string(),
        body["data"]["user"]["id"].as_str().unwrap().to_string(),
    )
}

pub async fn login(server: &TestServer, email: &str, password: &str) -> u16 {
    server
        .post("/api/auth/login")
        .json(&json!({ "email": email, "password": password }))
        .await
        .status_code()
        .as_u16()
}

/// Seeds an admin straight through the service layer and logs in.
pub async fn admin_token(app: &TestApp) -> String {
    let seed = usermgmt::config::AdminSeed {
        name: "Admin User".into(),
        email: "admin@example.com".into(),
        password: "admin123".into(),
    };
    usermgmt::users::services::seed_admin(&app.state, &seed)
        .await
        .unwrap();
    let response = app
        .server
        .post("/api/auth/login")
        .json(&json!({ "email": "admin@example.com", "password": "admin123" }))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    body["data"]["token"].as_str().unwrap().to_string()
}
