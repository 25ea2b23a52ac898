//! Quota ledger for skyvault.
//!
//! Directory sizes are maintained incrementally: every confirmed upload or
//! deletion walks the ancestor chain once, applying an atomic `size + delta`
//! to each directory in turn. Concurrent walks over the same directories
//! never lose updates because no read-modify-write happens in process.
//!
//! A walk that stops partway leaves the lower part of the chain updated and
//! the upper part stale. That is reported as
//! [`VaultError::ConsistencyFault`] and repaired with
//! [`QuotaLedger::reconcile_tree`].

use std::collections::{HashMap, VecDeque};

use tracing::{error, info, warn};

use super::directory::DirectoryRepository;
use super::metadata::FileRepository;
use crate::{Database, Result, VaultError};

/// Upper bound on chain length, guarding against parent cycles.
const MAX_CHAIN_LENGTH: usize = 4096;

/// A directory whose stored size disagrees with its recomputed size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeDiscrepancy {
    /// Directory ID.
    pub dir_id: i64,
    /// Size currently stored.
    pub stored: i64,
    /// Size recomputed from confirmed files.
    pub expected: i64,
}

/// Aggregate-size bookkeeping over directory trees.
pub struct QuotaLedger<'a> {
    db: &'a Database,
}

impl<'a> QuotaLedger<'a> {
    /// Create a new QuotaLedger.
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Add `delta` to `start_dir_id` and every ancestor up to the root.
    ///
    /// Each write is persisted before moving to the parent. Returns the
    /// number of directories updated.
    pub async fn propagate_size_delta(&self, start_dir_id: i64, delta: i64) -> Result<usize> {
        let repo = DirectoryRepository::new(self.db.pool());
        let mut current = Some(start_dir_id);
        let mut applied = 0;

        while let Some(dir_id) = current {
            if applied >= MAX_CHAIN_LENGTH {
                return Err(self.fault(start_dir_id, dir_id, applied, delta, "ancestor chain too long"));
            }

            match repo.add_size(dir_id, delta).await {
                Ok(Some(parent_id)) => {
                    applied += 1;
                    current = parent_id;
                }
                Ok(None) => {
                    return Err(self.fault(start_dir_id, dir_id, applied, delta, "directory missing"));
                }
                Err(e) => {
                    return Err(self.fault(start_dir_id, dir_id, applied, delta, &e.to_string()));
                }
            }
        }

        Ok(applied)
    }

    fn fault(
        &self,
        start_dir_id: i64,
        failed_dir_id: i64,
        applied: usize,
        delta: i64,
        reason: &str,
    ) -> VaultError {
        error!(
            start_dir_id,
            failed_dir_id,
            applied,
            delta,
            reason,
            "Size propagation stopped partway; tree needs reconciliation"
        );
        VaultError::ConsistencyFault {
            start_dir_id,
            failed_dir_id,
            applied,
            delta,
            reason: reason.to_string(),
        }
    }

    /// Bytes the user may still store: `max_storage_bytes - root.size`.
    pub async fn remaining_space(&self, user_id: i64) -> Result<i64> {
        let remaining: Option<i64> = sqlx::query_scalar(
            "SELECT u.max_storage_bytes - d.size
             FROM users u JOIN directories d ON d.id = u.root_dir_id
             WHERE u.id = ? AND u.deleted = 0",
        )
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await?;

        remaining.ok_or_else(|| VaultError::NotFound("user".to_string()))
    }

    /// Reject `size` if it exceeds the user's remaining space.
    ///
    /// Returns the remaining space on success.
    pub async fn ensure_capacity(&self, user_id: i64, size: i64) -> Result<i64> {
        let remaining = self.remaining_space(user_id).await?;
        if size > remaining {
            info!(user_id, requested = size, remaining, "Rejected upload: insufficient storage");
            return Err(VaultError::InsufficientStorage {
                requested: size,
                remaining,
            });
        }
        Ok(remaining)
    }

    /// Recompute every directory size under `root_dir_id` from confirmed
    /// files and report the directories whose stored size differs.
    pub async fn audit_tree(&self, root_dir_id: i64) -> Result<Vec<SizeDiscrepancy>> {
        let dirs = DirectoryRepository::new(self.db.pool());
        let root = dirs
            .get_by_id(root_dir_id)
            .await?
            .ok_or_else(|| VaultError::NotFound("directory".to_string()))?;

        let all = dirs.list_by_owner(root.owner_id).await?;
        let mut stored = HashMap::with_capacity(all.len());
        let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
        for dir in &all {
            stored.insert(dir.id, dir.size);
            if let Some(parent_id) = dir.parent_id {
                children.entry(parent_id).or_default().push(dir.id);
            }
        }

        let file_totals: HashMap<i64, i64> = FileRepository::new(self.db.pool())
            .confirmed_totals_by_parent(root.owner_id)
            .await?
            .into_iter()
            .collect();

        // Breadth-first order puts every parent before its children.
        let mut order = Vec::new();
        let mut queue = VecDeque::from([root.id]);
        while let Some(dir_id) = queue.pop_front() {
            order.push(dir_id);
            if let Some(kids) = children.get(&dir_id) {
                queue.extend(kids.iter().copied());
            }
        }

        let mut expected: HashMap<i64, i64> = HashMap::with_capacity(order.len());
        for dir_id in order.iter().rev() {
            let own = file_totals.get(dir_id).copied().unwrap_or(0);
            let nested: i64 = children
                .get(dir_id)
                .map(|kids| kids.iter().map(|k| expected.get(k).copied().unwrap_or(0)).sum())
                .unwrap_or(0);
            expected.insert(*dir_id, own + nested);
        }

        let discrepancies = order
            .iter()
            .filter_map(|dir_id| {
                let stored = stored.get(dir_id).copied().unwrap_or(0);
                let expected = expected.get(dir_id).copied().unwrap_or(0);
                (stored != expected).then_some(SizeDiscrepancy {
                    dir_id: *dir_id,
                    stored,
                    expected,
                })
            })
            .collect();

        Ok(discrepancies)
    }

    /// Rewrite stored sizes under `root_dir_id` to their recomputed values.
    ///
    /// Returns the directories that were corrected.
    pub async fn reconcile_tree(&self, root_dir_id: i64) -> Result<Vec<SizeDiscrepancy>> {
        let discrepancies = self.audit_tree(root_dir_id).await?;
        if discrepancies.is_empty() {
            return Ok(discrepancies);
        }

        let mut tx = self.db.begin().await?;
        for d in &discrepancies {
            warn!(
                dir_id = d.dir_id,
                stored = d.stored,
                expected = d.expected,
                "Correcting directory size"
            );
            DirectoryRepository::set_size(&mut *tx, d.dir_id, d.expected).await?;
        }
        tx.commit().await?;

        info!(root_dir_id, corrected = discrepancies.len(), "Reconciled directory tree");
        Ok(discrepancies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewUser, UserRepository};
    use crate::file::{NewDirectory, NewFile};

    async fn setup(max: i64) -> (Database, i64, i64) {
        let db = Database::open_in_memory().await.unwrap();
        let user = UserRepository::new(db.pool())
            .create_with_root(&NewUser::new("Ann", "ann@example.com", max))
            .await
            .unwrap();
        let root = user.root_dir_id.unwrap();
        (db, user.id, root)
    }

    async fn size_of(db: &Database, dir_id: i64) -> i64 {
        DirectoryRepository::new(db.pool())
            .get_by_id(dir_id)
            .await
            .unwrap()
            .unwrap()
            .size
    }

    #[tokio::test]
    async fn test_propagate_walks_to_root() {
        let (db, owner, root) = setup(1000).await;
        let dirs = DirectoryRepository::new(db.pool());
        let a = dirs.create(&NewDirectory::new("a", root, owner)).await.unwrap();
        let b = dirs.create(&NewDirectory::new("b", a.id, owner)).await.unwrap();

        let ledger = QuotaLedger::new(&db);
        assert_eq!(ledger.propagate_size_delta(b.id, 40).await.unwrap(), 3);
        assert_eq!(size_of(&db, b.id).await, 40);
        assert_eq!(size_of(&db, a.id).await, 40);
        assert_eq!(size_of(&db, root).await, 40);

        ledger.propagate_size_delta(a.id, -15).await.unwrap();
        assert_eq!(size_of(&db, b.id).await, 40);
        assert_eq!(size_of(&db, a.id).await, 25);
        assert_eq!(size_of(&db, root).await, 25);
    }

    #[tokio::test]
    async fn test_propagate_missing_start_is_fault() {
        let (db, _owner, _root) = setup(1000).await;
        let ledger = QuotaLedger::new(&db);

        let err = ledger.propagate_size_delta(9999, 5).await.unwrap_err();
        match err {
            VaultError::ConsistencyFault {
                failed_dir_id,
                applied,
                ..
            } => {
                assert_eq!(failed_dir_id, 9999);
                assert_eq!(applied, 0);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_remaining_space_and_capacity() {
        let (db, owner, root) = setup(1000).await;
        let ledger = QuotaLedger::new(&db);

        assert_eq!(ledger.remaining_space(owner).await.unwrap(), 1000);
        ledger.propagate_size_delta(root, 600).await.unwrap();
        assert_eq!(ledger.remaining_space(owner).await.unwrap(), 400);

        assert_eq!(ledger.ensure_capacity(owner, 400).await.unwrap(), 400);
        let err = ledger.ensure_capacity(owner, 401).await.unwrap_err();
        assert!(matches!(
            err,
            VaultError::InsufficientStorage {
                requested: 401,
                remaining: 400
            }
        ));

        assert!(matches!(
            ledger.remaining_space(9999).await,
            Err(VaultError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_audit_and_reconcile() {
        let (db, owner, root) = setup(1000).await;
        let dirs = DirectoryRepository::new(db.pool());
        let files = FileRepository::new(db.pool());
        let a = dirs.create(&NewDirectory::new("a", root, owner)).await.unwrap();

        let f = files.create(&NewFile::new("x.bin", a.id, owner, 70)).await.unwrap();
        files.confirm(f.id).await.unwrap();
        files.create(&NewFile::new("pending.bin", a.id, owner, 500)).await.unwrap();

        let ledger = QuotaLedger::new(&db);
        let found = ledger.audit_tree(root).await.unwrap();
        assert_eq!(
            found,
            vec![
                SizeDiscrepancy { dir_id: root, stored: 0, expected: 70 },
                SizeDiscrepancy { dir_id: a.id, stored: 0, expected: 70 },
            ]
        );

        let fixed = ledger.reconcile_tree(root).await.unwrap();
        assert_eq!(fixed.len(), 2);
        assert!(ledger.audit_tree(root).await.unwrap().is_empty());
        assert_eq!(size_of(&db, root).await, 70);
    }
}
