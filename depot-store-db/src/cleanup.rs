// SPDX-FileCopyrightText: 2026 The Depot Authors
// SPDX-License-Identifier: MIT

//! Per-owner, per-type retention rules.
//!
//! Rules are stored with their patterns as plain text. The compiled
//! matchers exist only on the loaded value: [`ServiceCleanupRule::compile_patterns`]
//! builds them once and keeps them for the lifetime of that value, and
//! [`ServiceCleanupRule::recompile_patterns`] is the explicit refresh after a
//! pattern was edited.

use std::borrow::Cow;
use std::time::SystemTime;

use regex::Regex;
use rusqlite::{Row, params};
use tracing::debug;

use crate::connection::RegistryDb;
use crate::error::{Entity, Error, OptionalRow, Result, is_unique_violation};
use crate::types::{ServiceType, system_time_to_unix, unix_to_system_time};

#[derive(Debug, Clone)]
struct CompiledMatchers {
    keep: Option<Regex>,
    remove: Option<Regex>,
}

/// A retention policy for the services of one owner and type.
#[derive(Debug, Clone)]
pub struct ServiceCleanupRule {
    pub id: i64,
    pub enabled: bool,
    pub owner_id: i64,
    pub service_type: ServiceType,
    /// Always keep this many of the newest versions
    pub keep_count: u32,
    /// Versions matching this are always kept
    pub keep_pattern: String,
    /// Versions older than this many days may be removed, `0` disables
    pub remove_days: u32,
    /// Versions matching this may be removed
    pub remove_pattern: String,
    /// Match patterns against `name/version` instead of `version`
    pub match_full_name: bool,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
    matchers: Option<CompiledMatchers>,
}

/// Wrap a pattern body so it is case-insensitive and must match the whole input.
fn compile_anchored(field: &'static str, pattern: &str) -> Result<Option<Regex>> {
    if pattern.is_empty() {
        return Ok(None);
    }
    Regex::new(&format!("(?i)^(?:{pattern})$"))
        .map(Some)
        .map_err(|source| Error::InvalidPattern { field, source })
}

impl ServiceCleanupRule {
    /// A disabled rule with no criteria.
    pub fn new(owner_id: i64, service_type: ServiceType) -> Self {
        let now = SystemTime::now();
        Self {
            id: 0,
            enabled: false,
            owner_id,
            service_type,
            keep_count: 0,
            keep_pattern: String::new(),
            remove_days: 0,
            remove_pattern: String::new(),
            match_full_name: false,
            created_at: now,
            updated_at: now,
            matchers: None,
        }
    }

    /// Compile both patterns unless they were compiled already.
    pub fn compile_patterns(&mut self) -> Result<()> {
        if self.matchers.is_some() {
            return Ok(());
        }
        let keep = compile_anchored("keep_pattern", &self.keep_pattern)?;
        let remove = compile_anchored("remove_pattern", &self.remove_pattern)?;
        self.matchers = Some(CompiledMatchers { keep, remove });
        Ok(())
    }

    /// Drop cached matchers and compile the current patterns.
    pub fn recompile_patterns(&mut self) -> Result<()> {
        self.matchers = None;
        self.compile_patterns()
    }

    pub fn is_compiled(&self) -> bool {
        self.matchers.is_some()
    }

    /// Compiled keep matcher, `None` if uncompiled or the pattern is empty.
    pub fn keep_matcher(&self) -> Option<&Regex> {
        self.matchers.as_ref().and_then(|m| m.keep.as_ref())
    }

    /// Compiled remove matcher, `None` if uncompiled or the pattern is empty.
    pub fn remove_matcher(&self) -> Option<&Regex> {
        self.matchers.as_ref().and_then(|m| m.remove.as_ref())
    }

    /// The string patterns are matched against for a version.
    pub fn match_target<'a>(&self, lower_name: &str, lower_version: &'a str) -> Cow<'a, str> {
        if self.match_full_name {
            Cow::Owned(format!("{lower_name}/{lower_version}"))
        } else {
            Cow::Borrowed(lower_version)
        }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(ServiceCleanupRule {
            id: row.get(0)?,
            enabled: row.get(1)?,
            owner_id: row.get(2)?,
            service_type: row.get(3)?,
            keep_count: row.get(4)?,
            keep_pattern: row.get(5)?,
            remove_days: row.get(6)?,
            remove_pattern: row.get(7)?,
            match_full_name: row.get(8)?,
            created_at: unix_to_system_time(row.get(9)?),
            updated_at: unix_to_system_time(row.get(10)?),
            matchers: None,
        })
    }
}

const RULE_COLUMNS: &str = "id, enabled, owner_id, type, keep_count, keep_pattern, remove_days, \
                            remove_pattern, match_full_name, created_unix, updated_unix";

fn map_rule_conflict(e: rusqlite::Error) -> Error {
    if is_unique_violation(&e) {
        Error::AlreadyExists(Entity::CleanupRule)
    } else {
        e.into()
    }
}

impl RegistryDb {
    /// Store a new rule, filling in its id and timestamps.
    ///
    /// Fails with [`Error::InvalidPattern`] if a pattern does not compile,
    /// and with [`Error::AlreadyExists`] if the owner already has a rule
    /// for the type.
    pub fn insert_cleanup_rule(&self, rule: &mut ServiceCleanupRule) -> Result<()> {
        rule.recompile_patterns()?;
        let now = SystemTime::now();
        self.conn
            .execute(
                r#"
                INSERT INTO service_cleanup_rule
                    (enabled, owner_id, type, keep_count, keep_pattern, remove_days,
                     remove_pattern, match_full_name, created_unix, updated_unix)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
                "#,
                params![
                    rule.enabled,
                    rule.owner_id,
                    rule.service_type,
                    rule.keep_count,
                    rule.keep_pattern,
                    rule.remove_days,
                    rule.remove_pattern,
                    rule.match_full_name,
                    system_time_to_unix(now),
                ],
            )
            .map_err(map_rule_conflict)?;

        rule.id = self.conn.last_insert_rowid();
        rule.created_at = now;
        rule.updated_at = now;
        debug!(rule_id = rule.id, owner_id = rule.owner_id, "inserted cleanup rule");
        Ok(())
    }

    pub fn get_cleanup_rule_by_id(&self, rule_id: i64) -> Result<ServiceCleanupRule> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {RULE_COLUMNS} FROM service_cleanup_rule WHERE id = ?1"
        ))?;
        stmt.query_row(params![rule_id], ServiceCleanupRule::from_row)
            .or_not_exist(Entity::CleanupRule)
    }

    /// Write every column of the rule back, bumping `updated_at`.
    ///
    /// The patterns are recompiled first; an invalid one leaves the stored
    /// rule untouched.
    pub fn update_cleanup_rule(&self, rule: &mut ServiceCleanupRule) -> Result<()> {
        rule.recompile_patterns()?;
        let now = SystemTime::now();
        let rows = self
            .conn
            .execute(
                r#"
                UPDATE service_cleanup_rule
                SET enabled = ?2, owner_id = ?3, type = ?4, keep_count = ?5, keep_pattern = ?6,
                    remove_days = ?7, remove_pattern = ?8, match_full_name = ?9, updated_unix = ?10
                WHERE id = ?1
                "#,
                params![
                    rule.id,
                    rule.enabled,
                    rule.owner_id,
                    rule.service_type,
                    rule.keep_count,
                    rule.keep_pattern,
                    rule.remove_days,
                    rule.remove_pattern,
                    rule.match_full_name,
                    system_time_to_unix(now),
                ],
            )
            .map_err(map_rule_conflict)?;
        if rows == 0 {
            return Err(Error::NotExist(Entity::CleanupRule));
        }
        rule.updated_at = now;
        Ok(())
    }

    pub fn get_cleanup_rules_by_owner(&self, owner_id: i64) -> Result<Vec<ServiceCleanupRule>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {RULE_COLUMNS} FROM service_cleanup_rule WHERE owner_id = ?1 ORDER BY type"
        ))?;
        let rows = stmt.query_map(params![owner_id], ServiceCleanupRule::from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn delete_cleanup_rule_by_id(&self, rule_id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM service_cleanup_rule WHERE id = ?1", params![rule_id])?;
        Ok(rows > 0)
    }

    pub fn has_owner_cleanup_rule_for_type(
        &self,
        owner_id: i64,
        service_type: ServiceType,
    ) -> Result<bool> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT 1 FROM service_cleanup_rule WHERE owner_id = ?1 AND type = ?2 LIMIT 1",
        )?;
        Ok(stmt.exists(params![owner_id, service_type])?)
    }

    /// Every enabled rule, uncompiled.
    pub fn enabled_cleanup_rules(&self) -> Result<Vec<ServiceCleanupRule>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {RULE_COLUMNS} FROM service_cleanup_rule WHERE enabled = 1 ORDER BY id"
        ))?;
        let rows = stmt.query_map([], ServiceCleanupRule::from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }
}
