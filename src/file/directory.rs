//! Directory types and repository for skyvault.
//!
//! Every directory carries an aggregate `size` covering all confirmed files
//! beneath it. The repository never touches `size` directly except through
//! [`DirectoryRepository::add_size`] and [`DirectoryRepository::set_size`],
//! which the quota ledger drives.

use sqlx::SqliteExecutor;

use crate::db::DbPool;
use crate::{Result, VaultError};

const DIRECTORY_COLUMNS: &str = "id, name, parent_id, owner_id, size, created_at";

/// A directory in a user's tree.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Directory {
    /// Unique directory ID.
    pub id: i64,
    /// Directory name.
    pub name: String,
    /// Parent directory ID (None only for roots).
    pub parent_id: Option<i64>,
    /// Owning user.
    pub owner_id: i64,
    /// Aggregate size of confirmed files beneath this directory.
    pub size: i64,
    /// When the directory was created.
    pub created_at: String,
}

impl Directory {
    /// Check if this is a root directory.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Data for creating a new directory.
#[derive(Debug, Clone)]
pub struct NewDirectory {
    /// Directory name.
    pub name: String,
    /// Parent directory ID.
    pub parent_id: i64,
    /// Owning user.
    pub owner_id: i64,
}

impl NewDirectory {
    /// Create a new NewDirectory.
    pub fn new(name: impl Into<String>, parent_id: i64, owner_id: i64) -> Self {
        Self {
            name: name.into(),
            parent_id,
            owner_id,
        }
    }
}

/// Repository for directory operations.
pub struct DirectoryRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> DirectoryRepository<'a> {
    /// Create a new DirectoryRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a new directory with size 0.
    pub async fn create(&self, dir: &NewDirectory) -> Result<Directory> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO directories (name, parent_id, owner_id, size)
             VALUES (?, ?, ?, 0) RETURNING id",
        )
        .bind(&dir.name)
        .bind(dir.parent_id)
        .bind(dir.owner_id)
        .fetch_one(self.pool)
        .await?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| VaultError::NotFound("directory".to_string()))
    }

    /// Get a directory by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Directory>> {
        let dir = sqlx::query_as::<_, Directory>(&format!(
            "SELECT {DIRECTORY_COLUMNS} FROM directories WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(dir)
    }

    /// Get a directory by ID only if it belongs to `owner_id`.
    pub async fn get_owned(&self, id: i64, owner_id: i64) -> Result<Option<Directory>> {
        let dir = sqlx::query_as::<_, Directory>(&format!(
            "SELECT {DIRECTORY_COLUMNS} FROM directories WHERE id = ? AND owner_id = ?"
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(dir)
    }

    /// Get the root directory of a user.
    pub async fn get_root(&self, owner_id: i64) -> Result<Option<Directory>> {
        let dir = sqlx::query_as::<_, Directory>(&format!(
            "SELECT {DIRECTORY_COLUMNS} FROM directories
             WHERE owner_id = ? AND parent_id IS NULL
             ORDER BY id LIMIT 1"
        ))
        .bind(owner_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(dir)
    }

    /// List direct child directories.
    pub async fn list_children(&self, parent_id: i64) -> Result<Vec<Directory>> {
        let dirs = sqlx::query_as::<_, Directory>(&format!(
            "SELECT {DIRECTORY_COLUMNS} FROM directories WHERE parent_id = ? ORDER BY name, id"
        ))
        .bind(parent_id)
        .fetch_all(self.pool)
        .await?;

        Ok(dirs)
    }

    /// List IDs of direct child directories.
    pub async fn child_ids(&self, parent_id: i64) -> Result<Vec<i64>> {
        Self::fetch_child_ids(self.pool, parent_id).await
    }

    /// [`child_ids`](Self::child_ids) on an arbitrary executor.
    pub async fn fetch_child_ids<'e, E>(executor: E, parent_id: i64) -> Result<Vec<i64>>
    where
        E: SqliteExecutor<'e>,
    {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM directories WHERE parent_id = ? ORDER BY id",
        )
        .bind(parent_id)
        .fetch_all(executor)
        .await?;

        Ok(ids)
    }

    /// Current aggregate size of a directory, or None if it does not exist.
    pub async fn fetch_size<'e, E>(executor: E, id: i64) -> Result<Option<i64>>
    where
        E: SqliteExecutor<'e>,
    {
        let size = sqlx::query_scalar::<_, i64>("SELECT size FROM directories WHERE id = ?")
            .bind(id)
            .fetch_optional(executor)
            .await?;

        Ok(size)
    }

    /// List every directory owned by a user.
    pub async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<Directory>> {
        let dirs = sqlx::query_as::<_, Directory>(&format!(
            "SELECT {DIRECTORY_COLUMNS} FROM directories WHERE owner_id = ? ORDER BY id"
        ))
        .bind(owner_id)
        .fetch_all(self.pool)
        .await?;

        Ok(dirs)
    }

    /// Rename a directory. Returns the updated directory, or None if not found.
    pub async fn rename(&self, id: i64, name: &str) -> Result<Option<Directory>> {
        let result = sqlx::query("UPDATE directories SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_by_id(id).await
    }

    /// Atomically add `delta` to a directory's size.
    ///
    /// Returns `Some(parent_id)` of the updated directory, or `None` when no
    /// such directory exists.
    pub async fn add_size(&self, id: i64, delta: i64) -> Result<Option<Option<i64>>> {
        add_size(self.pool, id, delta).await
    }

    /// Overwrite a directory's stored size.
    pub async fn set_size<'e, E>(executor: E, id: i64, size: i64) -> Result<bool>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query("UPDATE directories SET size = ? WHERE id = ?")
            .bind(size)
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

async fn add_size<'e, E>(executor: E, id: i64, delta: i64) -> Result<Option<Option<i64>>>
where
    E: SqliteExecutor<'e>,
{
    let parent = sqlx::query_scalar::<_, Option<i64>>(
        "UPDATE directories SET size = size + ? WHERE id = ? RETURNING parent_id",
    )
    .bind(delta)
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(parent)
}
