//! SQLite store for exported Bitbucket permissions.
//!
//! Three flat tables: `user`, `repo` and `permission` (joining the two by
//! uuid). Users and repositories are inserted once per uuid; every grant
//! becomes one `permission` row. All values are bound as parameters.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use thiserror::Error;
use tracing::{debug, info};

use crate::bitbucket::PermissionRecord;

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS user (
        uuid TEXT,
        display_name TEXT,
        nickname TEXT,
        account_id TEXT
    )",
    "CREATE TABLE IF NOT EXISTS repo (
        uuid TEXT,
        name TEXT,
        full_name TEXT
    )",
    "CREATE TABLE IF NOT EXISTS permission (
        user_id TEXT,
        repo_id TEXT,
        permission TEXT
    )",
];

#[derive(Debug, Error)]
pub enum PermissionsDbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Rows written by one [`load_permissions`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub users: usize,
    pub repos: usize,
    pub permissions: usize,
}

impl fmt::Display for LoadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "users={} repos={} permissions={}",
            self.users, self.repos, self.permissions
        )
    }
}

/// Opens (creating if needed) the database file at `path` and makes sure the
/// tables exist.
pub async fn open_permissions_db(path: &Path) -> Result<SqlitePool, PermissionsDbError> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await?;
    for statement in SCHEMA {
        sqlx::query(statement).execute(&pool).await?;
    }
    info!(db = %path.display(), "Permissions database ready");
    Ok(pool)
}

/// Writes `records` in one transaction.
pub async fn load_permissions(
    pool: &SqlitePool,
    records: &[PermissionRecord],
) -> Result<LoadSummary, PermissionsDbError> {
    let mut tx = pool.begin().await?;
    let mut summary = LoadSummary::default();
    let mut seen_users = HashSet::new();
    let mut seen_repos = HashSet::new();

    for record in records {
        let user = &record.user;
        let user_key = user.uuid.clone().unwrap_or_else(|| user.display_name.clone());
        if seen_users.insert(user_key) {
            sqlx::query(
                "INSERT INTO user (uuid, display_name, nickname, account_id) VALUES (?, ?, ?, ?)",
            )
            .bind(user.uuid.as_deref())
            .bind(user.display_name.as_str())
            .bind(user.nickname.as_deref())
            .bind(user.account_id.as_deref())
            .execute(&mut *tx)
            .await?;
            summary.users += 1;
        }

        if let Some(repo) = &record.repository {
            let repo_key = repo
                .uuid
                .clone()
                .or_else(|| repo.full_name.clone())
                .unwrap_or_else(|| repo.name.clone());
            if seen_repos.insert(repo_key) {
                sqlx::query("INSERT INTO repo (uuid, name, full_name) VALUES (?, ?, ?)")
                    .bind(repo.uuid.as_deref())
                    .bind(repo.name.as_str())
                    .bind(repo.full_name.as_deref())
                    .execute(&mut *tx)
                    .await?;
                summary.repos += 1;
            }
        }

        sqlx::query("INSERT INTO permission (user_id, repo_id, permission) VALUES (?, ?, ?)")
            .bind(user.uuid.as_deref())
            .bind(record.repository.as_ref().and_then(|r| r.uuid.as_deref()))
            .bind(record.permission.as_str())
            .execute(&mut *tx)
            .await?;
        summary.permissions += 1;
    }

    tx.commit().await?;
    debug!(%summary, "Permissions loaded");
    Ok(summary)
}
