//! Out-of-band delivery of password reset tokens.

use crate::users::repo_types::User;

pub trait ResetNotifier: Send + Sync {
    /// Deliver `raw_token` to the owner of `user.email`.
    fn send_password_reset(&self, user: &User, raw_token: &str) -> anyhow::Result<()>;
}

/// Writes the token to the log instead of mailing it. Local development only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogResetNotifier;

impl ResetNotifier for LogResetNotifier {
    fn send_password_reset(&self, user: &User, raw_token: &str) -> anyhow::Result<()> {
        tracing::warn!(
            user_id = %user.id,
            email = %user.email,
            reset_token = %raw_token,
            "password reset requested (token logged, no mail transport configured)"
        );
        Ok(())
    }
}
