// SPDX-FileCopyrightText: 2026 The Depot Authors
// SPDX-License-Identifier: MIT

//! Accounts, repositories and blob visibility.
//!
//! Users, organizations, teams and repositories are owned by the host
//! application. The registry only sees them through [`AccountDirectory`] and
//! [`RepositoryDirectory`].

use depot_store_db::RegistryDb;
use tracing::trace;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountKind {
    User,
    Organization,
}

/// Who may see an account and what it owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    Public,
    /// Visible to every signed-in user
    Limited,
    Private,
}

/// Permission level, ordered from no access to full ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccessMode {
    None,
    Read,
    Write,
    Admin,
    Owner,
}

/// A user or organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub kind: AccountKind,
    pub visibility: Visibility,
    pub is_admin: bool,
}

impl Account {
    pub const GHOST_ID: i64 = -1;

    /// Placeholder for an account that has been deleted.
    pub fn ghost() -> Self {
        Account {
            id: Self::GHOST_ID,
            name: "Ghost".to_owned(),
            kind: AccountKind::User,
            visibility: Visibility::Public,
            is_admin: false,
        }
    }

    pub fn is_ghost(&self) -> bool {
        self.id == Self::GHOST_ID
    }

    pub fn is_organization(&self) -> bool {
        self.kind == AccountKind::Organization
    }
}

/// A repository a service can be linked to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub is_private: bool,
}

/// Account and team lookups provided by the host application.
pub trait AccountDirectory {
    /// `Ok(None)` when the account does not exist.
    fn get_account(&self, id: i64) -> Result<Option<Account>>;

    /// Highest team authorization `user_id` holds in organization `org_id`.
    fn max_team_authorization(&self, org_id: i64, user_id: i64) -> Result<AccessMode>;

    /// Highest access to the services unit granted by any of the user's
    /// teams in organization `org_id`.
    fn max_team_services_access(&self, org_id: i64, user_id: i64) -> Result<AccessMode>;
}

pub trait RepositoryDirectory {
    /// `Ok(None)` when the repository does not exist.
    fn get_repository(&self, id: i64) -> Result<Option<Repository>>;
}

/// Whether `user` may download the blob.
///
/// Admins always may. Anyone else needs at least one referencing owner that
/// is the user, is public or limited, or is an organization where one of
/// the user's teams grants read access.
pub fn is_blob_accessible_for(
    db: &RegistryDb,
    accounts: &dyn AccountDirectory,
    blob_id: i64,
    user: &Account,
) -> Result<bool> {
    if user.is_admin {
        return Ok(true);
    }

    for owner_id in db.owners_referencing_blob(blob_id)? {
        if owner_id == user.id {
            return Ok(true);
        }
        let Some(owner) = accounts.get_account(owner_id)? else {
            trace!(blob_id, owner_id, "skipping blob owner without account");
            continue;
        };
        if matches!(owner.visibility, Visibility::Public | Visibility::Limited) {
            return Ok(true);
        }
        if owner.is_organization()
            && (accounts.max_team_authorization(owner.id, user.id)? >= AccessMode::Read
                || accounts.max_team_services_access(owner.id, user.id)? >= AccessMode::Read)
        {
            return Ok(true);
        }
    }

    Ok(false)
}
