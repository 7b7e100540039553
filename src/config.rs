use anyhow::{bail, Context};
use rand::RngCore;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn parse(v: &str) -> Self {
        match v.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}

/// Account seeded with the admin role at startup.
#[derive(Clone, Deserialize)]
pub struct AdminSeed {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for AdminSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminSeed")
            .field("name", &self.name)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub env: Environment,
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    /// Echo raw reset tokens in the forgot-password response. Local
    /// development only.
    pub expose_reset_token: bool,
    pub admin: Option<AdminSeed>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(var: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = var("APP_ENV")
            .map(|v| Environment::parse(&v))
            .unwrap_or(Environment::Development);

        let secret = match var("JWT_SECRET").filter(|s| !s.trim().is_empty()) {
            Some(s) => s,
            None if env == Environment::Production => {
                bail!("JWT_SECRET must be set when APP_ENV=production")
            }
            None => {
                tracing::warn!(
                    "JWT_SECRET not set; using a random per-process secret. \
                     Sessions will not survive a restart and this must not be used in production"
                );
                generate_secret()
            }
        };

        let jwt = JwtConfig {
            secret,
            issuer: var("JWT_ISSUER").unwrap_or_else(|| "usermgmt".into()),
            audience: var("JWT_AUDIENCE").unwrap_or_else(|| "usermgmt-users".into()),
        };

        let expose_reset_token = var("EXPOSE_RESET_TOKEN")
            .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
            .unwrap_or(false);
        if expose_reset_token {
            if env == Environment::Production {
                bail!("EXPOSE_RESET_TOKEN cannot be enabled when APP_ENV=production");
            }
            tracing::warn!("EXPOSE_RESET_TOKEN is on; reset tokens are returned in API responses");
        }

        let admin = match (var("ADMIN_EMAIL"), var("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminSeed {
                name: var("ADMIN_NAME").unwrap_or_else(|| "Admin User".into()),
                email,
                password,
            }),
            (None, None) => None,
            _ => bail!("ADMIN_EMAIL and ADMIN_PASSWORD must be set together"),
        };

        Ok(Self {
            env,
            database_url: var("DATABASE_URL"),
            jwt,
            expose_reset_token,
            admin,
        })
    }

    pub fn database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set")
    }
}

fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
