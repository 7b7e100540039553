use std::sync::Arc;

use crate::auth::jwt::JwtKeys;
use crate::clock::{Clock, ManualClock, SystemClock};
use crate::config::{AppConfig, Environment, JwtConfig};
use crate::db;
use crate::notify::{LogResetNotifier, ResetNotifier};
use crate::users::{memory::InMemoryUserRepo, repo::PgUserRepo, repo::UserRepo};

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserRepo>,
    pub config: Arc<AppConfig>,
    pub jwt: Arc<JwtKeys>,
    pub clock: Arc<dyn Clock>,
    pub notifier: Arc<dyn ResetNotifier>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;
        let pool = db::connect(config.database_url()?).await?;
        db::migrate(&pool).await?;

        Ok(Self::from_parts(
            config,
            Arc::new(PgUserRepo::new(pool)),
            Arc::new(SystemClock),
            Arc::new(LogResetNotifier),
        ))
    }

    pub fn from_parts(
        config: AppConfig,
        users: Arc<dyn UserRepo>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn ResetNotifier>,
    ) -> Self {
        let jwt = Arc::new(JwtKeys::new(&config.jwt));
        Self {
            users,
            config: Arc::new(config),
            jwt,
            clock,
            notifier,
        }
    }

    /// In-memory store, fixed secret and a manual clock. Returns the clock
    /// so tests can move time forward.
    pub fn for_tests() -> (Self, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let config = AppConfig {
            env: Environment::Development,
            database_url: None,
            jwt: JwtConfig {
                secret: "test-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
            },
            expose_reset_token: false,
            admin: None,
        };
        let state = Self::from_parts(
            config,
            Arc::new(InMemoryUserRepo::with_clock(clock.clone())),
            clock.clone(),
            Arc::new(LogResetNotifier),
        );
        (state, clock)
    }
}
