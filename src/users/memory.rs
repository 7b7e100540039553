//! In-memory credential store, used by tests and database-less local runs.

use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::repo::{StoreError, StoreResult, UserRepo};
use super::repo_types::{NewUser, User, UserPatch};
use crate::clock::{Clock, SystemClock};

pub struct InMemoryUserRepo {
    // insertion order; list() relies on it to break created_at ties
    users: RwLock<Vec<User>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryUserRepo {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl InMemoryUserRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timestamps records from `clock` instead of the wall clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            users: RwLock::new(Vec::new()),
            clock,
        }
    }
}

fn email_taken(users: &[User], email: &str, except: Option<Uuid>) -> bool {
    users
        .iter()
        .any(|u| Some(u.id) != except && u.email.eq_ignore_ascii_case(email))
}

#[async_trait]
impl UserRepo for InMemoryUserRepo {
    async fn insert(&self, new: NewUser) -> StoreResult<User> {
        let mut users = self.users.write().await;
        if email_taken(&users, &new.email, None) {
            return Err(StoreError::DuplicateEmail);
        }
        let now = self.clock.now();
        let user = User {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            password_hash: new.password_hash,
            role: new.role,
            avatar: None,
            reset_token: None,
            reset_token_expiry: None,
            created_at: now,
            updated_at: now,
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.users.read().await.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn list(&self) -> StoreResult<Vec<User>> {
        let mut out: Vec<User> = self.users.read().await.iter().rev().cloned().collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn update(&self, id: Uuid, patch: UserPatch) -> StoreResult<Option<User>> {
        let mut users = self.users.write().await;
        if let Some(email) = &patch.email {
            if email_taken(&users, email, Some(id)) {
                return Err(StoreError::DuplicateEmail);
            }
        }
        let Some(user) = users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(swap) = &patch.password {
            if user.password_hash != swap.expected_hash {
                return Ok(None);
            }
        }

        if let Some(name) = patch.name {
            user.name = name;
        }
        if let Some(email) = patch.email {
            user.email = email;
        }
        if let Some(role) = patch.role {
            user.role = role;
        }
        if let Some(avatar) = patch.avatar {
            user.avatar = avatar;
        }
        if let Some(swap) = patch.password {
            user.password_hash = swap.new_hash;
            user.reset_token = None;
            user.reset_token_expiry = None;
        }
        user.updated_at = self.clock.now();
        Ok(Some(user.clone()))
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> StoreResult<bool> {
        let mut users = self.users.write().await;
        let Some(user) = users.iter_mut().find(|u| u.id == id) else {
            return Ok(false);
        };
        user.reset_token = Some(token_hash.to_string());
        user.reset_token_expiry = Some(expires_at);
        user.updated_at = self.clock.now();
        Ok(true)
    }

    async fn find_by_reset_token(&self, token_hash: &str) -> StoreResult<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .iter()
            .find(|u| u.reset_token.as_deref() == Some(token_hash))
            .cloned())
    }

    async fn consume_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
        new_password_hash: &str,
    ) -> StoreResult<Option<User>> {
        let mut users = self.users.write().await;
        let found = users.iter_mut().find(|u| {
            u.reset_token.as_deref() == Some(token_hash)
                && u.reset_token_expiry.is_some_and(|exp| exp > now)
        });
        let Some(user) = found else {
            return Ok(None);
        };
        user.password_hash = new_password_hash.to_string();
        user.reset_token = None;
        user.reset_token_expiry = None;
        user.updated_at = self.clock.now();
        Ok(Some(user.clone()))
    }

    async fn delete(&self, id: Uuid, expected_hash: Option<&str>) -> StoreResult<Option<User>> {
        let mut users = self.users.write().await;
        let Some(pos) = users.iter().position(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(expected) = expected_hash {
            if users[pos].password_hash != expected {
                return Ok(None);
            }
        }
        Ok(Some(users.remove(pos)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::users::repo_types::{PasswordSwap, Role};
    use time::macros::datetime;
    use time::Duration;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Ann".into(),
            email: email.into(),
            password_hash: "hash-1".into(),
            role: Role::User,
        }
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_email_any_case() {
        let repo = InMemoryUserRepo::new();
        repo.insert(new_user("ann@x.com")).await.expect("insert");
        let err = repo.insert(new_user("ANN@x.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
    }

    #[tokio::test]
    async fn update_rechecks_email_uniqueness() {
        let repo = InMemoryUserRepo::new();
        let ann = repo.insert(new_user("ann@x.com")).await.unwrap();
        repo.insert(new_user("bob@x.com")).await.unwrap();

        let patch = UserPatch {
            email: Some("bob@x.com".into()),
            ..Default::default()
        };
        assert!(matches!(
            repo.update(ann.id, patch).await,
            Err(StoreError::DuplicateEmail)
        ));

        // keeping one's own email is not a conflict
        let patch = UserPatch {
            email: Some("ann@x.com".into()),
            name: Some("Annie".into()),
            ..Default::default()
        };
        let updated = repo.update(ann.id, patch).await.unwrap().expect("user");
        assert_eq!(updated.name, "Annie");
    }

    #[tokio::test]
    async fn password_swap_requires_matching_hash() {
        let repo = InMemoryUserRepo::new();
        let ann = repo.insert(new_user("ann@x.com")).await.unwrap();
        repo.set_reset_token(ann.id, "tok", repo.clock.now() + Duration::minutes(10))
            .await
            .unwrap();

        let stale = UserPatch {
            password: Some(PasswordSwap {
                expected_hash: "not-the-hash".into(),
                new_hash: "hash-2".into(),
            }),
            ..Default::default()
        };
        assert!(repo.update(ann.id, stale).await.unwrap().is_none());

        let fresh = UserPatch {
            password: Some(PasswordSwap {
                expected_hash: "hash-1".into(),
                new_hash: "hash-2".into(),
            }),
            ..Default::default()
        };
        let updated = repo.update(ann.id, fresh).await.unwrap().expect("user");
        assert_eq!(updated.password_hash, "hash-2");
        assert!(updated.reset_token.is_none());
        assert!(updated.reset_token_expiry.is_none());
    }

    #[tokio::test]
    async fn reset_token_consumed_at_most_once() {
        let repo = InMemoryUserRepo::new();
        let ann = repo.insert(new_user("ann@x.com")).await.unwrap();
        let now = repo.clock.now();
        repo.set_reset_token(ann.id, "tok", now + Duration::minutes(10))
            .await
            .unwrap();

        let first = repo.consume_reset_token("tok", now, "hash-2").await.unwrap();
        assert!(first.is_some());
        let second = repo.consume_reset_token("tok", now, "hash-3").await.unwrap();
        assert!(second.is_none());

        let stored = repo.find_by_id(ann.id).await.unwrap().unwrap();
        assert_eq!(stored.password_hash, "hash-2");
    }

    #[tokio::test]
    async fn expired_reset_token_is_ignored() {
        let repo = InMemoryUserRepo::new();
        let ann = repo.insert(new_user("ann@x.com")).await.unwrap();
        let now = repo.clock.now();
        repo.set_reset_token(ann.id, "tok", now + Duration::minutes(10))
            .await
            .unwrap();

        let later = now + Duration::minutes(10);
        assert!(repo
            .consume_reset_token("tok", later, "hash-2")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn conditional_delete() {
        let repo = InMemoryUserRepo::new();
        let ann = repo.insert(new_user("ann@x.com")).await.unwrap();
        assert!(repo.delete(ann.id, Some("wrong")).await.unwrap().is_none());
        assert!(repo.delete(ann.id, Some("hash-1")).await.unwrap().is_some());
        assert!(repo.find_by_id(ann.id).await.unwrap().is_none());
        assert!(repo.delete(ann.id, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn timestamps_follow_injected_clock() {
        let clock = Arc::new(ManualClock::new(datetime!(2024-03-01 09:00 UTC)));
        let repo = InMemoryUserRepo::with_clock(clock.clone());
        let older = repo.insert(new_user("a@x.com")).await.unwrap();
        assert_eq!(older.created_at, datetime!(2024-03-01 09:00 UTC));

        clock.advance(Duration::minutes(5));
        let newer = repo.insert(new_user("b@x.com")).await.unwrap();
        let patch = UserPatch {
            name: Some("Annie".into()),
            ..Default::default()
        };
        let renamed = repo.update(older.id, patch).await.unwrap().unwrap();
        assert_eq!(renamed.created_at, datetime!(2024-03-01 09:00 UTC));
        assert_eq!(renamed.updated_at, datetime!(2024-03-01 09:05 UTC));

        let ids: Vec<Uuid> = repo.list().await.unwrap().into_iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let repo = InMemoryUserRepo::new();
        repo.insert(new_user("a@x.com")).await.unwrap();
        repo.insert(new_user("b@x.com")).await.unwrap();
        repo.insert(new_user("c@x.com")).await.unwrap();
        let emails: Vec<String> = repo.list().await.unwrap().into_iter().map(|u| u.email).collect();
        assert_eq!(emails, vec!["c@x.com", "b@x.com", "a@x.com"]);
    }
}
