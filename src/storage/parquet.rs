//! Parquet-backed user store. The whole table lives in a single
//! `user.parquet` file under the data root and every mutation is a
//! read-modify-write of that file under one mutex, which is what makes the
//! duplicate checks atomic.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use polars::prelude::*;

use super::{apply_patch, apply_upsert, now_ms, NewUser, Role, Status, StoreError, StoreResult, UpsertUser, User, UserPatch, UserStore};

pub struct ParquetUserStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ParquetUserStore {
    pub fn new<P: AsRef<Path>>(data_root: P) -> Result<Self> {
        let root = data_root.as_ref();
        std::fs::create_dir_all(root)
            .with_context(|| format!("Failed to create or access data root: {}", root.display()))?;
        Ok(Self { path: root.join("user.parquet"), lock: Mutex::new(()) })
    }

    fn load_table(&self) -> Result<Vec<User>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = std::fs::File::open(&self.path)?;
        let df = ParquetReader::new(file).finish()?;
        let mut users = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            users.push(User {
                id: i64_at(&df, "id", i)?,
                identity: str_at(&df, "identity", i)?,
                email: str_at(&df, "email", i)?,
                name: opt_str_at(&df, "name", i)?,
                password_hash: opt_str_at(&df, "password_hash", i)?,
                login_method: opt_str_at(&df, "login_method", i)?,
                role: Role::parse(&str_at(&df, "role", i)?)
                    .ok_or_else(|| anyhow!("invalid role value in user table at row {}", i))?,
                status: Status::parse(&str_at(&df, "status", i)?)
                    .ok_or_else(|| anyhow!("invalid status value in user table at row {}", i))?,
                created_at: ts_at(&df, "created_at", i)?,
                updated_at: ts_at(&df, "updated_at", i)?,
                last_signed_in: ts_at(&df, "last_signed_in", i)?,
            });
        }
        users.sort_by_key(|u| u.id);
        Ok(users)
    }

    fn save_table(&self, users: &[User]) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).ok();
        }
        let ids: Vec<i64> = users.iter().map(|u| u.id).collect();
        let identities: Vec<String> = users.iter().map(|u| u.identity.clone()).collect();
        let emails: Vec<String> = users.iter().map(|u| u.email.clone()).collect();
        let names: Vec<Option<String>> = users.iter().map(|u| u.name.clone()).collect();
        let hashes: Vec<Option<String>> = users.iter().map(|u| u.password_hash.clone()).collect();
        let methods: Vec<Option<String>> = users.iter().map(|u| u.login_method.clone()).collect();
        let roles: Vec<String> = users.iter().map(|u| u.role.as_str().to_string()).collect();
        let statuses: Vec<String> = users.iter().map(|u| u.status.as_str().to_string()).collect();
        let created: Vec<i64> = users.iter().map(|u| u.created_at.timestamp_millis()).collect();
        let updated: Vec<i64> = users.iter().map(|u| u.updated_at.timestamp_millis()).collect();
        let signed_in: Vec<i64> = users.iter().map(|u| u.last_signed_in.timestamp_millis()).collect();

        let mut df = DataFrame::new(vec![
            Series::new("id".into(), ids).into(),
            Series::new("identity".into(), identities).into(),
            Series::new("email".into(), emails).into(),
            Series::new("name".into(), names).into(),
            Series::new("password_hash".into(), hashes).into(),
            Series::new("login_method".into(), methods).into(),
            Series::new("role".into(), roles).into(),
            Series::new("status".into(), statuses).into(),
            Series::new("created_at".into(), created).into(),
            Series::new("updated_at".into(), updated).into(),
            Series::new("last_signed_in".into(), signed_in).into(),
        ])?;
        let mut f = std::fs::File::create(&self.path)?;
        ParquetWriter::new(&mut f).finish(&mut df)?;
        Ok(())
    }
}

fn i64_at(df: &DataFrame, col: &str, i: usize) -> Result<i64> {
    df.column(col)?
        .i64()?
        .get(i)
        .ok_or_else(|| anyhow!("null value in column {} at row {}", col, i))
}

fn str_at(df: &DataFrame, col: &str, i: usize) -> Result<String> {
    match df.column(col)?.get(i)? {
        AnyValue::String(s) => Ok(s.to_string()),
        AnyValue::StringOwned(s) => Ok(s.to_string()),
        other => Err(anyhow!("unexpected value in column {}: {:?}", col, other)),
    }
}

fn opt_str_at(df: &DataFrame, col: &str, i: usize) -> Result<Option<String>> {
    match df.column(col)?.get(i)? {
        AnyValue::String(s) => Ok(Some(s.to_string())),
        AnyValue::StringOwned(s) => Ok(Some(s.to_string())),
        AnyValue::Null => Ok(None),
        other => Err(anyhow!("unexpected value in column {}: {:?}", col, other)),
    }
}

fn ts_at(df: &DataFrame, col: &str, i: usize) -> Result<DateTime<Utc>> {
    let ms = i64_at(df, col, i)?;
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| anyhow!("invalid timestamp in column {} at row {}", col, i))
}

impl UserStore for ParquetUserStore {
    fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let _guard = self.lock.lock();
        let users = self.load_table()?;
        Ok(users.into_iter().find(|u| u.email.eq_ignore_ascii_case(email)))
    }

    fn find_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        let _guard = self.lock.lock();
        let users = self.load_table()?;
        Ok(users.into_iter().find(|u| u.id == id))
    }

    fn find_by_identity(&self, identity: &str) -> StoreResult<Option<User>> {
        let _guard = self.lock.lock();
        let users = self.load_table()?;
        Ok(users.into_iter().find(|u| u.identity == identity))
    }

    fn insert(&self, user: NewUser) -> StoreResult<User> {
        let _guard = self.lock.lock();
        let mut users = self.load_table()?;
        if users.iter().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(StoreError::DuplicateEmail);
        }
        if users.iter().any(|u| u.identity == user.identity) {
            return Err(StoreError::DuplicateIdentity);
        }
        let now = now_ms();
        let id = users.iter().map(|u| u.id).max().unwrap_or(0) + 1;
        let created = User {
            id,
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
        users.push(created.clone());
        self.save_table(&users)?;
        Ok(created)
    }

    fn upsert_by_identity(&self, up: UpsertUser) -> StoreResult<User> {
        let _guard = self.lock.lock();
        let mut users = self.load_table()?;
        let now = now_ms();
        if let Some(pos) = users.iter().position(|u| u.identity == up.identity) {
            if users
                .iter()
                .enumerate()
                .any(|(i, u)| i != pos && u.email.eq_ignore_ascii_case(&up.email))
            {
                return Err(StoreError::DuplicateEmail);
            }
            apply_upsert(&mut users[pos], &up, now);
            let updated = users[pos].clone();
            self.save_table(&users)?;
            return Ok(updated);
        }
        if users.iter().any(|u| u.email.eq_ignore_ascii_case(&up.email)) {
            return Err(StoreError::DuplicateEmail);
        }
        let id = users.iter().map(|u| u.id).max().unwrap_or(0) + 1;
        let created = User {
            id,
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
        users.push(created.clone());
        self.save_table(&users)?;
        Ok(created)
    }

    fn update_fields(&self, id: i64, patch: UserPatch) -> StoreResult<User> {
        let _guard = self.lock.lock();
        let mut users = self.load_table()?;
        let pos = users.iter().position(|u| u.id == id).ok_or(StoreError::NotFound)?;
        if let Some(email) = &patch.email {
            if users
                .iter()
                .enumerate()
                .any(|(i, u)| i != pos && u.email.eq_ignore_ascii_case(email))
            {
                return Err(StoreError::DuplicateEmail);
            }
        }
        apply_patch(&mut users[pos], patch, now_ms());
        let updated = users[pos].clone();
        self.save_table(&users)?;
        Ok(updated)
    }

    fn list_page(&self, limit: usize, offset: usize) -> StoreResult<Vec<User>> {
        let _guard = self.lock.lock();
        let users = self.load_table()?;
        Ok(users.into_iter().skip(offset).take(limit).collect())
    }

    fn count(&self) -> StoreResult<usize> {
        let _guard = self.lock.lock();
        Ok(self.load_table()?.len())
    }
}
