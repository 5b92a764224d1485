// SPDX-FileCopyrightText: 2026 The Depot Authors
// SPDX-License-Identifier: MIT

//! In-memory account and repository directories for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;

use depot_store_core::{
    AccessMode, Account, AccountDirectory, AccountKind, Repository, RepositoryDirectory,
    Result, Visibility,
};

#[derive(Default)]
pub struct Directory {
    pub accounts: HashMap<i64, Account>,
    pub repositories: HashMap<i64, Repository>,
    pub team_access: HashMap<(i64, i64), AccessMode>,
}

impl Directory {
    pub fn with_account(mut self, account: Account) -> Self {
        self.accounts.insert(account.id, account);
        self
    }

    pub fn with_repository(mut self, repository: Repository) -> Self {
        self.repositories.insert(repository.id, repository);
        self
    }
}

impl AccountDirectory for Directory {
    fn get_account(&self, id: i64) -> Result<Option<Account>> {
        Ok(self.accounts.get(&id).cloned())
    }

    fn max_team_authorization(&self, org_id: i64, user_id: i64) -> Result<AccessMode> {
        Ok(self
            .team_access
            .get(&(org_id, user_id))
            .copied()
            .unwrap_or(AccessMode::None))
    }

    fn max_team_services_access(&self, _org_id: i64, _user_id: i64) -> Result<AccessMode> {
        Ok(AccessMode::None)
    }
}

impl RepositoryDirectory for Directory {
    fn get_repository(&self, id: i64) -> Result<Option<Repository>> {
        Ok(self.repositories.get(&id).cloned())
    }
}

pub fn user(id: i64, name: &str, visibility: Visibility) -> Account {
    Account {
        id,
        name: name.to_owned(),
        kind: AccountKind::User,
        visibility,
        is_admin: false,
    }
}

pub fn organization(id: i64, name: &str, visibility: Visibility) -> Account {
    Account {
        kind: AccountKind::Organization,
        ..user(id, name, visibility)
    }
}
