//! File record types and repository for skyvault.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, SqliteConnection, SqliteExecutor};

use super::storage::object_key;
use crate::db::DbPool;
use crate::{Result, VaultError};

const FILE_COLUMNS: &str =
    "id, name, extension, parent_id, owner_id, size, content_type, is_uploading, created_at";

/// Bind-parameter limit per bulk statement.
const BULK_CHUNK: usize = 500;

/// A file record in a user's tree.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct FileRecord {
    /// Unique file ID.
    pub id: i64,
    /// Display name, including the extension.
    pub name: String,
    /// Extension with its leading dot, or empty.
    pub extension: String,
    /// Parent directory ID.
    pub parent_id: i64,
    /// Owning user.
    pub owner_id: i64,
    /// Size in bytes (declared until confirmed).
    pub size: i64,
    /// MIME type supplied or guessed at initiate time.
    pub content_type: String,
    /// True until the upload has been verified against the object store.
    pub is_uploading: bool,
    /// When the record was created.
    pub created_at: String,
}

impl FileRecord {
    /// Storage object key for this file.
    pub fn object_key(&self) -> String {
        object_key(self.id, &self.extension)
    }
}

/// Minimal view of a file used when tearing down a subtree.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FileKey {
    /// File ID.
    pub id: i64,
    /// Extension with its leading dot, or empty.
    pub extension: String,
}

impl FileKey {
    /// Storage object key for this file.
    pub fn object_key(&self) -> String {
        object_key(self.id, &self.extension)
    }
}

/// Data for creating a new file record.
#[derive(Debug, Clone)]
pub struct NewFile {
    /// Display name.
    pub name: String,
    /// Extension derived from the name.
    pub extension: String,
    /// Parent directory ID.
    pub parent_id: i64,
    /// Owning user.
    pub owner_id: i64,
    /// Declared size in bytes.
    pub size: i64,
    /// MIME type.
    pub content_type: String,
}

impl NewFile {
    /// Create a new NewFile. The extension is taken from `name`.
    pub fn new(name: impl Into<String>, parent_id: i64, owner_id: i64, size: i64) -> Self {
        let name = name.into();
        Self {
            extension: extension_of(&name).to_string(),
            name,
            parent_id,
            owner_id,
            size,
            content_type: "application/octet-stream".to_string(),
        }
    }

    /// Set the content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }
}

/// Extension of a file name, including the leading dot.
///
/// Dot-files such as `.bashrc` have no extension.
pub fn extension_of(name: &str) -> &str {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match base.rfind('.') {
        Some(0) | None => "",
        Some(idx) => &base[idx..],
    }
}

/// Repository for file record operations.
pub struct FileRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> FileRepository<'a> {
    /// Create a new FileRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a file record in the uploading state.
    pub async fn create(&self, file: &NewFile) -> Result<FileRecord> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO files (name, extension, parent_id, owner_id, size, content_type, is_uploading)
             VALUES (?, ?, ?, ?, ?, ?, 1) RETURNING id",
        )
        .bind(&file.name)
        .bind(&file.extension)
        .bind(file.parent_id)
        .bind(file.owner_id)
        .bind(file.size)
        .bind(&file.content_type)
        .fetch_one(self.pool)
        .await?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| VaultError::NotFound("file".to_string()))
    }

    /// Get a file by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<FileRecord>> {
        let file = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(file)
    }

    /// Get a file by ID only if it belongs to `owner_id`.
    pub async fn get_owned(&self, id: i64, owner_id: i64) -> Result<Option<FileRecord>> {
        let file = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE id = ? AND owner_id = ?"
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(file)
    }

    /// List confirmed files directly inside a directory.
    pub async fn list_confirmed_by_parent(&self, parent_id: i64) -> Result<Vec<FileRecord>> {
        let files = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files
             WHERE parent_id = ? AND is_uploading = 0 ORDER BY name, id"
        ))
        .bind(parent_id)
        .fetch_all(self.pool)
        .await?;

        Ok(files)
    }

    /// List every file directly inside a directory as object keys,
    /// including files still uploading.
    pub async fn list_keys_by_parent(&self, parent_id: i64) -> Result<Vec<FileKey>> {
        Self::fetch_keys_by_parent(self.pool, parent_id).await
    }

    /// [`list_keys_by_parent`](Self::list_keys_by_parent) on an arbitrary
    /// executor.
    pub async fn fetch_keys_by_parent<'e, E>(executor: E, parent_id: i64) -> Result<Vec<FileKey>>
    where
        E: SqliteExecutor<'e>,
    {
        let keys = sqlx::query_as::<_, FileKey>(
            "SELECT id, extension FROM files WHERE parent_id = ? ORDER BY id",
        )
        .bind(parent_id)
        .fetch_all(executor)
        .await?;

        Ok(keys)
    }

    /// Sum of confirmed file sizes per parent directory for one owner.
    pub async fn confirmed_totals_by_parent(&self, owner_id: i64) -> Result<Vec<(i64, i64)>> {
        let totals = sqlx::query_as::<_, (i64, i64)>(
            "SELECT parent_id, COALESCE(SUM(size), 0) FROM files
             WHERE owner_id = ? AND is_uploading = 0 GROUP BY parent_id",
        )
        .bind(owner_id)
        .fetch_all(self.pool)
        .await?;

        Ok(totals)
    }

    /// List uploads created before `cutoff` that never completed.
    pub async fn list_stale_uploading(&self, cutoff: DateTime<Utc>) -> Result<Vec<FileRecord>> {
        let files = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files
             WHERE is_uploading = 1 AND created_at < ? ORDER BY id"
        ))
        .bind(cutoff.format("%Y-%m-%d %H:%M:%S").to_string())
        .fetch_all(self.pool)
        .await?;

        Ok(files)
    }

    /// Rename a file. Returns the updated file, or None if not found.
    pub async fn rename(&self, id: i64, name: &str) -> Result<Option<FileRecord>> {
        let result = sqlx::query("UPDATE files SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_by_id(id).await
    }

    /// Flip an uploading file to confirmed.
    ///
    /// Returns false if the file is gone or was already confirmed, so only
    /// one caller ever wins the transition.
    pub async fn confirm(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE files SET is_uploading = 0 WHERE id = ? AND is_uploading = 1")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Delete a file record that is still uploading.
    ///
    /// Returns false if the file is gone or has been confirmed meanwhile.
    pub async fn delete_uploading(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM files WHERE id = ? AND is_uploading = 1")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a file record.
    ///
    /// Returns `(is_uploading, size)` as they were at deletion time, or None
    /// if the record did not exist.
    pub async fn delete(&self, id: i64) -> Result<Option<(bool, i64)>> {
        let row = sqlx::query_as::<_, (bool, i64)>(
            "DELETE FROM files WHERE id = ? RETURNING is_uploading, size",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row)
    }

    /// Delete many file records by ID on `conn`. Returns the number of rows
    /// removed.
    pub async fn delete_many(conn: &mut SqliteConnection, ids: &[i64]) -> Result<u64> {
        delete_by_ids(conn, "files", ids).await
    }
}

/// Delete rows by ID from `table`, chunking the IN-list.
pub(crate) async fn delete_by_ids(
    conn: &mut SqliteConnection,
    table: &str,
    ids: &[i64],
) -> Result<u64> {
    let mut removed = 0;
    for chunk in ids.chunks(BULK_CHUNK) {
        let mut query: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new(format!("DELETE FROM {table} WHERE id IN ("));
        let mut separated = query.separated(", ");
        for id in chunk {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        removed += query.build().execute(&mut *conn).await?.rows_affected();
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewUser, UserRepository};
    use crate::Database;

    async fn setup() -> (Database, i64, i64) {
        let db = Database::open_in_memory().await.unwrap();
        let user = UserRepository::new(db.pool())
            .create_with_root(&NewUser::new("Ann", "ann@example.com", 1000))
            .await
            .unwrap();
        let root = user.root_dir_id.unwrap();
        (db, user.id, root)
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("report.pdf"), ".pdf");
        assert_eq!(extension_of("archive.tar.gz"), ".gz");
        assert_eq!(extension_of("README"), "");
        assert_eq!(extension_of(".bashrc"), "");
        assert_eq!(extension_of("dir/notes.txt"), ".txt");
        assert_eq!(extension_of("trailing."), ".");
    }

    #[test]
    fn test_new_file() {
        let file = NewFile::new("cat.png", 1, 2, 300).with_content_type("image/png");
        assert_eq!(file.extension, ".png");
        assert_eq!(file.content_type, "image/png");
        assert_eq!(file.size, 300);
    }

    #[tokio::test]
    async fn test_create_starts_uploading() {
        let (db, owner, root) = setup().await;
        let repo = FileRepository::new(db.pool());

        let file = repo.create(&NewFile::new("a.txt", root, owner, 10)).await.unwrap();
        assert!(file.is_uploading);
        assert_eq!(file.extension, ".txt");
        assert_eq!(file.object_key(), format!("{}.txt", file.id));

        assert!(repo.get_owned(file.id, owner).await.unwrap().is_some());
        assert!(repo.get_owned(file.id, owner + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_confirm_only_once() {
        let (db, owner, root) = setup().await;
        let repo = FileRepository::new(db.pool());
        let file = repo.create(&NewFile::new("a.txt", root, owner, 10)).await.unwrap();

        assert!(repo.confirm(file.id).await.unwrap());
        assert!(!repo.confirm(file.id).await.unwrap());
        assert!(!repo.get_by_id(file.id).await.unwrap().unwrap().is_uploading);
        assert!(!repo.delete_uploading(file.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_listing_hides_uploading() {
        let (db, owner, root) = setup().await;
        let repo = FileRepository::new(db.pool());

        let done = repo.create(&NewFile::new("b.txt", root, owner, 10)).await.unwrap();
        repo.confirm(done.id).await.unwrap();
        repo.create(&NewFile::new("a.txt", root, owner, 20)).await.unwrap();

        let listed = repo.list_confirmed_by_parent(root).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, done.id);

        assert_eq!(repo.list_keys_by_parent(root).await.unwrap().len(), 2);
        assert_eq!(
            repo.confirmed_totals_by_parent(owner).await.unwrap(),
            vec![(root, 10)]
        );
    }

    #[tokio::test]
    async fn test_delete_reports_state() {
        let (db, owner, root) = setup().await;
        let repo = FileRepository::new(db.pool());
        let file = repo.create(&NewFile::new("a.txt", root, owner, 10)).await.unwrap();
        repo.confirm(file.id).await.unwrap();

        assert_eq!(repo.delete(file.id).await.unwrap(), Some((false, 10)));
        assert_eq!(repo.delete(file.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_many_chunks() {
        let (db, owner, root) = setup().await;
        let repo = FileRepository::new(db.pool());

        let mut ids = Vec::new();
        for i in 0..(BULK_CHUNK + 3) {
            let file = repo
                .create(&NewFile::new(format!("f{i}.bin"), root, owner, 1))
                .await
                .unwrap();
            ids.push(file.id);
        }

        let mut conn = db.pool().acquire().await.unwrap();
        let removed = FileRepository::delete_many(&mut conn, &ids).await.unwrap();
        drop(conn);
        assert_eq!(removed as usize, ids.len());
        assert!(repo.list_keys_by_parent(root).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_stale_uploading() {
        let (db, owner, root) = setup().await;
        let repo = FileRepository::new(db.pool());

        let old = repo.create(&NewFile::new("old.bin", root, owner, 1)).await.unwrap();
        repo.create(&NewFile::new("new.bin", root, owner, 1)).await.unwrap();
        sqlx::query("UPDATE files SET created_at = '2000-01-01 00:00:00' WHERE id = ?")
            .bind(old.id)
            .execute(db.pool())
            .await
            .unwrap();

        let stale = repo
            .list_stale_uploading(Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, old.id);
    }

    #[tokio::test]
    async fn test_rename() {
        let (db, owner, root) = setup().await;
        let repo = FileRepository::new(db.pool());
        let file = repo.create(&NewFile::new("a.txt", root, owner, 10)).await.unwrap();

        let renamed = repo.rename(file.id, "b.txt").await.unwrap().unwrap();
        assert_eq!(renamed.name, "b.txt");
        assert_eq!(renamed.extension, ".txt");
        assert!(repo.rename(9999, "x").await.unwrap().is_none());
    }
}
