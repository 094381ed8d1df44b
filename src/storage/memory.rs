//! In-memory user store. Same contract as the parquet backend, held in a
//! `RwLock`-guarded vec. Used by the procedure tests and handy for demos.

use parking_lot::RwLock;

use super::{apply_patch, apply_upsert, now_ms, NewUser, Role, Status, StoreError, StoreResult, UpsertUser, User, UserPatch, UserStore};

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    next_id: i64,
}

#[derive(Default)]
pub struct MemoryUserStore {
    inner: RwLock<Inner>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserStore for MemoryUserStore {
    fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let inner = self.inner.read();
        Ok(inner.users.iter().find(|u| u.email.eq_ignore_ascii_case(email)).cloned())
    }

    fn find_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        let inner = self.inner.read();
        Ok(inner.users.iter().find(|u| u.id == id).cloned())
    }

    fn find_by_identity(&self, identity: &str) -> StoreResult<Option<User>> {
        let inner = self.inner.read();
        Ok(inner.users.iter().find(|u| u.identity == identity).cloned())
    }

    fn insert(&self, user: NewUser) -> StoreResult<User> {
        let mut inner = self.inner.write();
        if inner.users.iter().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(StoreError::DuplicateEmail);
        }
        if inner.users.iter().any(|u| u.identity == user.identity) {
            return Err(StoreError::DuplicateIdentity);
        }
        let now = now_ms();
        inner.next_id += 1;
        let created = User {
            id: inner.next_id,
            identity: user.identity,
            email: user.email,
            name: user.name,
            password_hash: user.password_hash,
            login_method: user.login_method,
            role: user.role,
            status: user.status,
            created_at: now,
            updated_at: now,
            last_signed_in: now,
        };
        inner.users.push(created.clone());
        Ok(created)
    }

    fn upsert_by_identity(&self, up: UpsertUser) -> StoreResult<User> {
        let mut inner = self.inner.write();
        let now = now_ms();
        if let Some(pos) = inner.users.iter().position(|u| u.identity == up.identity) {
            if inner
                .users
                .iter()
                .enumerate()
                .any(|(i, u)| i != pos && u.email.eq_ignore_ascii_case(&up.email))
            {
                return Err(StoreError::DuplicateEmail);
            }
            apply_upsert(&mut inner.users[pos], &up, now);
            return Ok(inner.users[pos].clone());
        }
        if inner.users.iter().any(|u| u.email.eq_ignore_ascii_case(&up.email)) {
            return Err(StoreError::DuplicateEmail);
        }
        inner.next_id += 1;
        let created = User {
            id: inner.next_id,
            identity: up.identity.clone(),
            email: up.email.clone(),
            name: up.name.clone(),
            password_hash: None,
            login_method: up.login_method.clone(),
            role: up.role.unwrap_or(Role::User),
            status: Status::Active,
            created_at: now,
            updated_at: now,
            last_signed_in: up.last_signed_in.unwrap_or(now),
        };
        inner.users.push(created.clone());
        Ok(created)
    }

    fn update_fields(&self, id: i64, patch: UserPatch) -> StoreResult<User> {
        let mut inner = self.inner.write();
        let pos = inner.users.iter().position(|u| u.id == id).ok_or(StoreError::NotFound)?;
        if let Some(email) = &patch.email {
            if inner
                .users
                .iter()
                .enumerate()
                .any(|(i, u)| i != pos && u.email.eq_ignore_ascii_case(email))
            {
                return Err(StoreError::DuplicateEmail);
            }
        }
        apply_patch(&mut inner.users[pos], patch, now_ms());
        Ok(inner.users[pos].clone())
    }

    fn list_page(&self, limit: usize, offset: usize) -> StoreResult<Vec<User>> {
        let inner = self.inner.read();
        let mut users = inner.users.clone();
        users.sort_by_key(|u| u.id);
        Ok(users.into_iter().skip(offset).take(limit).collect())
    }

    fn count(&self) -> StoreResult<usize> {
        let inner = self.inner.read();
        Ok(inner.users.len())
    }
}
