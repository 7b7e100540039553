use usermgmt::{app, auth::services::prepare_login, state::AppState, users::services::seed_admin};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "usermgmt=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let state = AppState::init().await?;
    prepare_login().await;

    if let Some(seed) = state.config.admin.clone() {
        if let Err(e) = seed_admin(&state, &seed).await {
            tracing::error!(error = %e, "failed to seed admin account");
        }
    }

    app::serve(app::build_app(state)).await
}
