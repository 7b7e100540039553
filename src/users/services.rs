use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        extractors::AdminUser,
        services::{parse_email, register},
    },
    config::AdminSeed,
    error::{ApiError, ApiResult},
    state::AppState,
    users::{
        dto::{CreateUserRequest, PublicUser, UpdateUserRequest},
        repo_types::{Role, User, UserPatch},
    },
};

const USER_NOT_FOUND: &str = "User not found";

fn parse_role(raw: &str) -> ApiResult<Role> {
    raw.trim().parse::<Role>().map_err(ApiError::Validation)
}

pub async fn list_users(state: &AppState, _admin: &AdminUser) -> ApiResult<Vec<PublicUser>> {
    let users = state.users.list().await?;
    Ok(users.into_iter().map(PublicUser::from).collect())
}

pub async fn get_user(state: &AppState, _admin: &AdminUser, id: Uuid) -> ApiResult<PublicUser> {
    state
        .users
        .find_by_id(id)
        .await?
        .map(PublicUser::from)
        .ok_or(ApiError::NotFound(USER_NOT_FOUND))
}

pub async fn create_user(
    state: &AppState,
    admin: &AdminUser,
    req: CreateUserRequest,
) -> ApiResult<PublicUser> {
    let role = match req.role.as_deref().filter(|r| !r.trim().is_empty()) {
        Some(r) => parse_role(r)?,
        None => Role::User,
    };
    let user = register(state, &req.name, &req.email, &req.password, role).await?;
    info!(admin_id = %admin.user().id, user_id = %user.id, %role, "user created by admin");
    Ok(user.into())
}

/// Changes name, email or role of any account. An admin may rename
/// themselves here but may not change their own role.
pub async fn update_user(
    state: &AppState,
    admin: &AdminUser,
    id: Uuid,
    req: UpdateUserRequest,
) -> ApiResult<PublicUser> {
    let name = req.name.filter(|n| !n.trim().is_empty());
    let email = req.email.filter(|e| !e.trim().is_empty());
    let role = req.role.filter(|r| !r.trim().is_empty());
    if name.is_none() && email.is_none() && role.is_none() {
        return Err(ApiError::validation(
            "At least one field (name, email, or role) is required for update",
        ));
    }

    let target = state
        .users
        .find_by_id(id)
        .await?
        .ok_or(ApiError::NotFound(USER_NOT_FOUND))?;

    let mut patch = UserPatch {
        name: name.map(|n| n.trim().to_string()),
        ..Default::default()
    };

    if let Some(role) = role {
        let role = parse_role(&role)?;
        if role != target.role {
            if target.id == admin.user().id {
                warn!(admin_id = %target.id, "admin tried to change own role");
                return Err(ApiError::Authorization("Admins cannot change their own role"));
            }
            patch.role = Some(role);
        }
    }

    if let Some(email) = email {
        let email = parse_email(&email)?;
        if email != target.email {
            if let Some(other) = state.users.find_by_email(&email).await? {
                if other.id != target.id {
                    return Err(ApiError::email_taken());
                }
            }
            patch.email = Some(email);
        }
    }

    if patch.is_empty() {
        return Ok(target.into());
    }

    let updated = state
        .users
        .update(target.id, patch)
        .await?
        .ok_or(ApiError::NotFound(USER_NOT_FOUND))?;
    info!(admin_id = %admin.user().id, user_id = %updated.id, role = %updated.role, "user updated by admin");
    Ok(updated.into())
}

/// Permanent delete. Admins remove their own account through the
/// password-confirmed profile path, not here.
pub async fn delete_user(state: &AppState, admin: &AdminUser, id: Uuid) -> ApiResult<PublicUser> {
    if id == admin.user().id {
        warn!(admin_id = %id, "admin tried to delete own account via admin path");
        return Err(ApiError::Authorization(
            "Admins cannot delete their own account here",
        ));
    }
    let deleted = state
        .users
        .delete(id, None)
        .await?
        .ok_or(ApiError::NotFound(USER_NOT_FOUND))?;
    info!(admin_id = %admin.user().id, user_id = %deleted.id, "user deleted by admin");
    Ok(deleted.into())
}

/// Makes sure the configured bootstrap account exists and is an admin.
/// Runs at startup, outside any request, so there is no caller to check.
pub async fn seed_admin(state: &AppState, seed: &AdminSeed) -> ApiResult<User> {
    let email = parse_email(&seed.email)?;
    if let Some(existing) = state.users.find_by_email(&email).await? {
        if existing.is_admin() {
            info!(user_id = %existing.id, "admin account already present");
            return Ok(existing);
        }
        let patch = UserPatch {
            role: Some(Role::Admin),
            ..Default::default()
        };
        let promoted = state
            .users
            .update(existing.id, patch)
            .await?
            .ok_or(ApiError::NotFound(USER_NOT_FOUND))?;
        info!(user_id = %promoted.id, "existing account promoted to admin");
        return Ok(promoted);
    }

    match register(state, &seed.name, &email, &seed.password, Role::Admin).await {
        Ok(user) => {
            info!(user_id = %user.id, email = %user.email, "admin account created");
            Ok(user)
        }
        // created concurrently by another instance
        Err(ApiError::Conflict(_)) => state
            .users
            .find_by_email(&email)
            .await?
            .ok_or(ApiError::NotFound(USER_NOT_FOUND)),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::auth::{
        dto::SignupRequest,
        extractors::{authenticate, require_admin, CurrentUser},
        services::signup,
    };

    fn seed() -> AdminSeed {
        AdminSeed {
            name: "Admin User".into(),
            email: "admin@x.com".into(),
            password: "admin123".into(),
        }
    }

    async fn caller_for(state: &AppState, user: &User) -> CurrentUser {
        let token = state.jwt.sign(user.id, state.clock.now()).unwrap();
        authenticate(state, Some(&token)).await.unwrap()
    }

    async fn admin(state: &AppState) -> AdminUser {
        let user = seed_admin(state, &seed()).await.unwrap();
        require_admin(caller_for(state, &user).await).unwrap()
    }

    async fn plain_user(state: &AppState, email: &str) -> User {
        let res = signup(
            state,
            SignupRequest {
                name: "Ann".into(),
                email: email.into(),
                password: "secret1".into(),
            },
        )
        .await
        .unwrap();
        state.users.find_by_id(res.user.id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn seed_admin_creates_then_is_idempotent() {
        let (state, _) = AppState::for_tests();
        let first = seed_admin(&state, &seed()).await.unwrap();
        assert_eq!(first.role, Role::Admin);
        let second = seed_admin(&state, &seed()).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(state.users.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn seed_admin_promotes_existing_account() {
        let (state, _) = AppState::for_tests();
        let ann = plain_user(&state, "admin@x.com").await;
        let promoted = seed_admin(&state, &seed()).await.unwrap();
        assert_eq!(promoted.id, ann.id);
        assert_eq!(promoted.role, Role::Admin);
    }

    #[tokio::test]
    async fn non_admin_never_reaches_admin_operations() {
        let (state, _) = AppState::for_tests();
        let ann = plain_user(&state, "ann@x.com").await;
        let caller = caller_for(&state, &ann).await;
        assert!(matches!(require_admin(caller), Err(ApiError::Authorization(_))));
    }

    #[tokio::test]
    async fn create_list_get() {
        let (state, _) = AppState::for_tests();
        let admin = admin(&state).await;

        let created = create_user(
            &state,
            &admin,
            CreateUserRequest {
                name: "Bob".into(),
                email: "Bob@X.com".into(),
                password: "secret1".into(),
                role: Some("admin".into()),
            },
        )
        .await
        .unwrap();
        assert_eq!(created.email, "bob@x.com");
        assert_eq!(created.role, Role::Admin);

        let default_role = create_user(
            &state,
            &admin,
            CreateUserRequest {
                name: "Cat".into(),
                email: "cat@x.com".into(),
                password: "secret1".into(),
                role: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(default_role.role, Role::User);

        let listed = list_users(&state, &admin).await.unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].id, default_role.id);

        assert_eq!(get_user(&state, &admin, created.id).await.unwrap(), created);
        assert!(matches!(
            get_user(&state, &admin, Uuid::new_v4()).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn create_rejects_bad_role_and_duplicates() {
        let (state, _) = AppState::for_tests();
        let admin = admin(&state).await;

        let bad_role = create_user(
            &state,
            &admin,
            CreateUserRequest {
                name: "Bob".into(),
                email: "bob@x.com".into(),
                password: "secret1".into(),
                role: Some("superuser".into()),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(bad_role, ApiError::Validation(_)));

        let dup = create_user(
            &state,
            &admin,
            CreateUserRequest {
                name: "Other".into(),
                email: "ADMIN@x.com".into(),
                password: "secret1".into(),
                role: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(dup, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_changes_role_and_rechecks_email() {
        let (state, _) = AppState::for_tests();
        let admin = admin(&state).await;
        let ann = plain_user(&state, "ann@x.com").await;
        plain_user(&state, "bob@x.com").await;

        let updated = update_user(
            &state,
            &admin,
            ann.id,
            UpdateUserRequest {
                role: Some("admin".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.role, Role::Admin);

        let err = update_user(
            &state,
            &admin,
            ann.id,
            UpdateUserRequest {
                email: Some("bob@x.com".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));

        let err = update_user(&state, &admin, ann.id, UpdateUserRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let err = update_user(
            &state,
            &admin,
            Uuid::new_v4(),
            UpdateUserRequest {
                name: Some("Ghost".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn admin_cannot_change_own_role_or_delete_self() {
        let (state, _) = AppState::for_tests();
        let admin = admin(&state).await;
        let my_id = admin.user().id;

        let err = update_user(
            &state,
            &admin,
            my_id,
            UpdateUserRequest {
                role: Some("user".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Authorization(_)));

        // renaming oneself is fine
        let renamed = update_user(
            &state,
            &admin,
            my_id,
            UpdateUserRequest {
                name: Some("Root".into()),
                role: Some("admin".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(renamed.name, "Root");

        let err = delete_user(&state, &admin, my_id).await.unwrap_err();
        assert!(matches!(err, ApiError::Authorization(_)));
        assert!(state.users.find_by_id(my_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_is_permanent() {
        let (state, _) = AppState::for_tests();
        let admin = admin(&state).await;
        let ann = plain_user(&state, "ann@x.com").await;
        let token = state.jwt.sign(ann.id, state.clock.now()).unwrap();

        let deleted = delete_user(&state, &admin, ann.id).await.unwrap();
        assert_eq!(deleted.id, ann.id);
        assert!(matches!(
            delete_user(&state, &admin, ann.id).await,
            Err(ApiError::NotFound(_))
        ));
        // structurally valid token, but the subject is gone
        assert!(authenticate(&state, Some(&token)).await.is_err());
    }
}
