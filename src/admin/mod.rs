//! Administration module for skyvault.
//!
//! Access is controlled by role:
//! - Manager: list users, force logout
//! - Admin: everything above plus account deletion

mod user;

pub use user::{UserAdminService, UserListEntry, UserSummary};

use crate::db::User;
use crate::{Result, VaultError};

/// Refuse operations an actor may not perform on their own account.
pub fn ensure_not_self(actor: &User, target_id: i64) -> Result<()> {
    if actor.id == target_id {
        return Err(VaultError::Permission(
            "this operation cannot be performed on your own account".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Role;

    #[test]
    fn test_ensure_not_self() {
        let actor = User {
            id: 7,
            name: "Admin".to_string(),
            email: "admin@example.com".to_string(),
            password: None,
            picture: String::new(),
            role: Role::Admin,
            max_storage_bytes: 0,
            root_dir_id: None,
            deleted: false,
            created_at: String::new(),
        };
        assert!(ensure_not_self(&actor, 8).is_ok());
        assert!(matches!(
            ensure_not_self(&actor, 7),
            Err(VaultError::Permission(_))
        ));
    }
}
