//! Profile and admin procedure tests: role gating, pagination correctness,
//! profile/password flows, status toggling, and the owner-identity upsert.

use std::sync::Arc;

use anyhow::Result;

use doorman::error::AppError;
use doorman::identity::{resolve_identity, RequestContext, SessionManager};
use doorman::procedures::{
    ChangePasswordInput, ListInput, LoginInput, Procedures, SignupInput, UpdateProfileInput,
    UpsertExternalInput,
};
use doorman::storage::memory::MemoryUserStore;
use doorman::storage::{NewUser, Role, Status, User, UserStore};

fn procs_with_owner(owner: Option<&str>) -> (Procedures, Arc<MemoryUserStore>) {
    let store = Arc::new(MemoryUserStore::new());
    let p = Procedures::new(store.clone(), SessionManager::default(), owner.map(|s| s.to_string()));
    (p, store)
}

fn procs() -> (Procedures, Arc<MemoryUserStore>) {
    procs_with_owner(None)
}

fn seed_user(store: &MemoryUserStore, email: &str, role: Role) -> User {
    store
        .insert(NewUser {
            identity: format!("seed:{}", email),
            email: email.to_string(),
            name: Some("Seeded".to_string()),
            password_hash: None,
            login_method: Some("email".to_string()),
            role,
            status: Status::Active,
        })
        .expect("seed insert")
}

fn ctx_for(user: User) -> RequestContext {
    RequestContext::for_user(user)
}

#[tokio::test]
async fn protected_procedures_require_identity() -> Result<()> {
    let (p, _store) = procs();
    let anon = RequestContext::anonymous();

    let err = p.profile(&anon).await.unwrap_err();
    assert!(matches!(err, AppError::Unauthenticated { .. }));
    let err = p
        .update_profile(&anon, UpdateProfileInput { name: "A".into(), email: "a@b.com".into() })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthenticated { .. }));
    let err = p
        .change_password(
            &anon,
            ChangePasswordInput { current_password: "x".into(), new_password: "SecurePass123!".into() },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthenticated { .. }));
    let err = p.list(&anon, ListInput::default()).await.unwrap_err();
    assert!(matches!(err, AppError::Unauthenticated { .. }));
    Ok(())
}

#[tokio::test]
async fn admin_procedures_are_forbidden_for_regular_users() -> Result<()> {
    let (p, store) = procs();
    let user = seed_user(&store, "user@example.com", Role::User);
    let ctx = ctx_for(user);

    // regardless of input validity
    let err = p.list(&ctx, ListInput { page: Some(1), limit: Some(10) }).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden { .. }));
    let err = p.activate(&ctx, 1).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden { .. }));
    let err = p.deactivate(&ctx, 0).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden { .. }), "role gate runs before input checks");
    Ok(())
}

#[tokio::test]
async fn list_paginates_with_stable_id_order() -> Result<()> {
    let (p, store) = procs();
    let admin = seed_user(&store, "admin@example.com", Role::Admin);
    for i in 1..25 {
        seed_user(&store, &format!("user{}@example.com", i), Role::User);
    }
    let ctx = ctx_for(admin);

    // 25 users total: page 2 of 10 covers ids 11..=20
    let out = p.list(&ctx, ListInput { page: Some(2), limit: Some(10) }).await?;
    assert_eq!(out.total, 25);
    assert_eq!(out.page, 2);
    assert_eq!(out.limit, 10);
    assert_eq!(out.pages, 3);
    assert_eq!(out.users.len(), 10);
    assert_eq!(out.users.first().map(|u| u.id), Some(11));
    assert_eq!(out.users.last().map(|u| u.id), Some(20));

    let last = p.list(&ctx, ListInput { page: Some(3), limit: Some(10) }).await?;
    assert_eq!(last.users.len(), 5);

    // repeated call returns the same page absent writes
    let again = p.list(&ctx, ListInput { page: Some(2), limit: Some(10) }).await?;
    assert_eq!(again.users, out.users);
    Ok(())
}

#[tokio::test]
async fn list_defaults_and_rejects_non_positive_input() -> Result<()> {
    let (p, store) = procs();
    let admin = seed_user(&store, "admin@example.com", Role::Admin);
    let ctx = ctx_for(admin);

    let out = p.list(&ctx, ListInput::default()).await?;
    assert_eq!(out.page, 1);
    assert_eq!(out.limit, 10);
    assert_eq!(out.total, 1);
    assert_eq!(out.pages, 1);

    let err = p.list(&ctx, ListInput { page: Some(0), limit: None }).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidArgument { .. }));
    let err = p.list(&ctx, ListInput { page: None, limit: Some(0) }).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidArgument { .. }));
    Ok(())
}

#[tokio::test]
async fn activate_and_deactivate_toggle_status() -> Result<()> {
    let (p, store) = procs();
    let admin = seed_user(&store, "admin@example.com", Role::Admin);
    let target = seed_user(&store, "user@example.com", Role::User);
    let ctx = ctx_for(admin);

    let ack = p.deactivate(&ctx, target.id).await?;
    assert!(ack.success);
    assert_eq!(store.find_by_id(target.id)?.unwrap().status, Status::Inactive);

    let ack = p.activate(&ctx, target.id).await?;
    assert!(ack.success);
    assert_eq!(store.find_by_id(target.id)?.unwrap().status, Status::Active);

    // no-op safe: activating an already-active user still succeeds
    let ack = p.activate(&ctx, target.id).await?;
    assert!(ack.success);

    let err = p.activate(&ctx, 0).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidArgument { .. }));
    let err = p.activate(&ctx, -3).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidArgument { .. }));
    Ok(())
}

#[tokio::test]
async fn deactivated_user_loses_access_on_next_request() -> Result<()> {
    let (p, store) = procs();
    let admin = seed_user(&store, "admin@example.com", Role::Admin);
    p.signup(SignupInput {
        name: "John".into(),
        email: "john@example.com".into(),
        password: "SecurePass123!".into(),
    })
    .await?;
    let out = p
        .login(LoginInput { email: "john@example.com".into(), password: "SecurePass123!".into() })
        .await?;

    let ctx = resolve_identity(store.as_ref(), p.sessions(), Some(&out.token));
    assert!(ctx.user.is_some());

    p.deactivate(&ctx_for(admin), out.user.id).await?;

    // the live session token now resolves to anonymous; no explicit
    // revocation was needed
    let ctx = resolve_identity(store.as_ref(), p.sessions(), Some(&out.token));
    assert!(ctx.user.is_none());
    Ok(())
}

#[tokio::test]
async fn update_profile_enforces_email_uniqueness_across_other_users() -> Result<()> {
    let (p, store) = procs();
    let alice = seed_user(&store, "alice@example.com", Role::User);
    seed_user(&store, "bob@example.com", Role::User);

    // taking bob's email conflicts
    let err = p
        .update_profile(
            &ctx_for(alice.clone()),
            UpdateProfileInput { name: "Alice".into(), email: "bob@example.com".into() },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict { .. }));
    assert_eq!(err.message(), "Email already in use");

    // keeping her own email is fine and needs no uniqueness probe
    let updated = p
        .update_profile(
            &ctx_for(alice.clone()),
            UpdateProfileInput { name: "Alice Cooper".into(), email: "alice@example.com".into() },
        )
        .await?;
    assert_eq!(updated.name.as_deref(), Some("Alice Cooper"));
    assert_eq!(updated.email, "alice@example.com");

    // and a genuinely new email is persisted
    let updated = p
        .update_profile(
            &ctx_for(alice),
            UpdateProfileInput { name: "Alice Cooper".into(), email: "alice.c@example.com".into() },
        )
        .await?;
    assert_eq!(updated.email, "alice.c@example.com");
    Ok(())
}

#[tokio::test]
async fn update_profile_validates_input() -> Result<()> {
    let (p, store) = procs();
    let alice = seed_user(&store, "alice@example.com", Role::User);

    let err = p
        .update_profile(&ctx_for(alice.clone()), UpdateProfileInput { name: "".into(), email: "alice@example.com".into() })
        .await
        .unwrap_err();
    assert_eq!(err.message(), "Name is required");

    let err = p
        .update_profile(&ctx_for(alice), UpdateProfileInput { name: "Alice".into(), email: "nope".into() })
        .await
        .unwrap_err();
    assert_eq!(err.message(), "Invalid email format");
    Ok(())
}

#[tokio::test]
async fn change_password_verifies_current_and_enforces_strength() -> Result<()> {
    let (p, store) = procs();
    p.signup(SignupInput {
        name: "John".into(),
        email: "john@example.com".into(),
        password: "SecurePass123!".into(),
    })
    .await?;
    let john = store.find_by_email("john@example.com")?.unwrap();

    let err = p
        .change_password(
            &ctx_for(john.clone()),
            ChangePasswordInput { current_password: "WrongPass123!".into(), new_password: "NewSecure456!".into() },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthenticated { .. }));
    assert_eq!(err.message(), "Current password is incorrect");

    let err = p
        .change_password(
            &ctx_for(john.clone()),
            ChangePasswordInput { current_password: "SecurePass123!".into(), new_password: "weak".into() },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidArgument { .. }));

    let ack = p
        .change_password(
            &ctx_for(john),
            ChangePasswordInput { current_password: "SecurePass123!".into(), new_password: "NewSecure456!".into() },
        )
        .await?;
    assert!(ack.success);

    // the old password no longer logs in, the new one does
    let err = p
        .login(LoginInput { email: "john@example.com".into(), password: "SecurePass123!".into() })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthenticated { .. }));
    p.login(LoginInput { email: "john@example.com".into(), password: "NewSecure456!".into() })
        .await?;
    Ok(())
}

#[tokio::test]
async fn upsert_external_promotes_only_the_owner_identity() -> Result<()> {
    let (p, _store) = procs_with_owner(Some("oid_owner"));

    let owner = p
        .upsert_external(UpsertExternalInput {
            identity: "oid_owner".into(),
            email: "owner@example.com".into(),
            name: Some("Owner".into()),
            login_method: Some("oauth".into()),
        })
        .await?;
    assert_eq!(owner.role, Role::Admin);
    assert_eq!(owner.status, Status::Active);

    let other = p
        .upsert_external(UpsertExternalInput {
            identity: "oid_other".into(),
            email: "other@example.com".into(),
            name: None,
            login_method: Some("oauth".into()),
        })
        .await?;
    assert_eq!(other.role, Role::User);
    Ok(())
}

#[tokio::test]
async fn upsert_external_is_idempotent_on_identity() -> Result<()> {
    let (p, store) = procs();
    let first = p
        .upsert_external(UpsertExternalInput {
            identity: "oid_1".into(),
            email: "ext@example.com".into(),
            name: Some("Ext".into()),
            login_method: Some("oauth".into()),
        })
        .await?;
    let second = p
        .upsert_external(UpsertExternalInput {
            identity: "oid_1".into(),
            email: "ext.new@example.com".into(),
            name: None,
            login_method: None,
        })
        .await?;
    assert_eq!(second.id, first.id);
    assert_eq!(second.email, "ext.new@example.com");
    // absent fields keep their stored values
    assert_eq!(second.name.as_deref(), Some("Ext"));
    assert_eq!(store.count()?, 1);

    let err = p
        .upsert_external(UpsertExternalInput {
            identity: "".into(),
            email: "x@example.com".into(),
            name: None,
            login_method: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidArgument { .. }));
    Ok(())
}

#[tokio::test]
async fn no_success_payload_carries_a_password() -> Result<()> {
    let (p, store) = procs();
    let admin = seed_user(&store, "admin@example.com", Role::Admin);
    let created = p
        .signup(SignupInput {
            name: "John".into(),
            email: "john@example.com".into(),
            password: "SecurePass123!".into(),
        })
        .await?;

    // the serialized forms of every success payload are password-free
    let as_json = serde_json::to_value(&created)?;
    assert!(as_json.get("password").is_none());
    assert!(as_json.get("password_hash").is_none());

    let out = p
        .login(LoginInput { email: "john@example.com".into(), password: "SecurePass123!".into() })
        .await?;
    let as_json = serde_json::to_value(&out.user)?;
    assert!(as_json.get("password_hash").is_none());

    let listed = p.list(&ctx_for(admin), ListInput::default()).await?;
    for u in serde_json::to_value(&listed.users)?.as_array().unwrap() {
        assert!(u.get("password").is_none());
        assert!(u.get("password_hash").is_none());
    }
    Ok(())
}
