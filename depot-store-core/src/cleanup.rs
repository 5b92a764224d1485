// SPDX-FileCopyrightText: 2026 The Depot Authors
// SPDX-License-Identifier: MIT

//! Applying retention rules.
//!
//! A version is removed only when at least one remove criterion selects it
//! and no keep criterion protects it. A rule with neither `remove_days` nor
//! `remove_pattern` set never removes anything.

use std::time::{Duration, SystemTime};

use depot_store_db::{
    PropertyType, RegistryDb, Service, ServiceCleanupRule, ServiceVersion,
};
use tracing::{debug, info, warn};

use crate::error::Result;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// A rule with compiled matchers, evaluated against a fixed point in time.
#[derive(Debug, Clone)]
pub struct CleanupPolicy {
    rule: ServiceCleanupRule,
    remove_before: Option<SystemTime>,
}

impl CleanupPolicy {
    pub fn new(mut rule: ServiceCleanupRule, now: SystemTime) -> Result<Self> {
        rule.compile_patterns()?;
        let remove_before = if rule.remove_days > 0 {
            // A cutoff before the epoch selects nothing.
            Some(
                now.checked_sub(Duration::from_secs(
                    u64::from(rule.remove_days) * SECONDS_PER_DAY,
                ))
                .unwrap_or(SystemTime::UNIX_EPOCH),
            )
        } else {
            None
        };
        Ok(Self {
            rule,
            remove_before,
        })
    }

    pub fn rule(&self) -> &ServiceCleanupRule {
        &self.rule
    }

    fn is_kept(&self, service: &Service, version: &ServiceVersion, index: usize) -> bool {
        if index < self.rule.keep_count as usize {
            return true;
        }
        self.rule.keep_matcher().is_some_and(|keep| {
            keep.is_match(&self.rule.match_target(&service.lower_name, &version.lower_version))
        })
    }

    fn is_removable(&self, service: &Service, version: &ServiceVersion) -> bool {
        if self
            .remove_before
            .is_some_and(|cutoff| version.created_at < cutoff)
        {
            return true;
        }
        self.rule.remove_matcher().is_some_and(|remove| {
            remove.is_match(&self.rule.match_target(&service.lower_name, &version.lower_version))
        })
    }

    /// Pick the versions to remove. `versions` must be ordered newest
    /// first; internal versions are never selected and do not count
    /// towards `keep_count`.
    pub fn select<'a>(
        &self,
        service: &Service,
        versions: &'a [ServiceVersion],
    ) -> Vec<&'a ServiceVersion> {
        versions
            .iter()
            .filter(|v| !v.is_internal)
            .enumerate()
            .filter(|(index, version)| {
                !self.is_kept(service, version, *index) && self.is_removable(service, version)
            })
            .map(|(_, version)| version)
            .collect()
    }
}

/// What a cleanup run removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub rules_evaluated: usize,
    /// Enabled rules whose patterns no longer compile
    pub rules_skipped: Vec<i64>,
    pub versions_removed: usize,
    pub files_removed: usize,
    pub services_removed: usize,
}

/// Versions `rule` would remove right now, grouped by service.
pub fn preview_cleanup(
    db: &RegistryDb,
    rule: &ServiceCleanupRule,
    now: SystemTime,
) -> Result<Vec<(Service, Vec<ServiceVersion>)>> {
    let policy = CleanupPolicy::new(rule.clone(), now)?;
    let mut preview = Vec::new();
    for service in db.get_services_by_type(rule.owner_id, rule.service_type)? {
        let versions = db.get_versions_by_service(service.id)?;
        let selected: Vec<ServiceVersion> =
            policy.select(&service, &versions).into_iter().cloned().collect();
        if !selected.is_empty() {
            preview.push((service, selected));
        }
    }
    Ok(preview)
}

/// Delete a service and its properties. The caller checked it has no versions.
pub(crate) fn delete_service_and_properties(db: &RegistryDb, service_id: i64) -> Result<()> {
    db.transaction(|db| {
        db.delete_all_properties(PropertyType::Service, service_id)?;
        db.delete_service_by_id(service_id)?;
        Ok(())
    })
}

fn apply_policy(db: &RegistryDb, policy: &CleanupPolicy, report: &mut CleanupReport) -> Result<()> {
    let rule = policy.rule();
    for service in db.get_services_by_type(rule.owner_id, rule.service_type)? {
        let versions = db.get_versions_by_service(service.id)?;
        let selected = policy.select(&service, &versions);
        if selected.is_empty() {
            continue;
        }

        for version in selected {
            let files = db.remove_version_and_references(version.id)?;
            debug!(
                service = %service.lower_name,
                version = %version.lower_version,
                files = files.len(),
                "cleanup removed version"
            );
            report.versions_removed += 1;
            report.files_removed += files.len();
        }

        if db.get_versions_by_service(service.id)?.is_empty() {
            delete_service_and_properties(db, service.id)?;
            report.services_removed += 1;
        }
    }
    Ok(())
}

/// Evaluate every enabled rule and delete what it selects.
///
/// A stored rule whose patterns fail to compile removes nothing; its id is
/// listed in [`CleanupReport::rules_skipped`] so the owner can be told.
///
/// Blobs left unreferenced are not touched; the garbage collector removes
/// them after their grace period.
pub fn run_cleanup(db: &RegistryDb, now: SystemTime) -> Result<CleanupReport> {
    let mut report = CleanupReport::default();
    for rule in db.enabled_cleanup_rules()? {
        let rule_id = rule.id;
        let policy = match CleanupPolicy::new(rule, now) {
            Ok(policy) => policy,
            Err(e) => {
                warn!(rule_id, "skipping cleanup rule: {e}");
                report.rules_skipped.push(rule_id);
                continue;
            }
        };
        apply_policy(db, &policy, &mut report)?;
        report.rules_evaluated += 1;
    }

    info!(
        rules = report.rules_evaluated,
        skipped = report.rules_skipped.len(),
        versions = report.versions_removed,
        files = report.files_removed,
        services = report.services_removed,
        "cleanup finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use depot_store_db::{NewService, NewVersion, ServiceType};
    use rstest::rstest;

    use super::*;

    fn days_ago(now: SystemTime, days: u64) -> SystemTime {
        now - Duration::from_secs(days * SECONDS_PER_DAY)
    }

    fn service(db: &RegistryDb, name: &str) -> Service {
        db.try_insert_service(&NewService {
            owner_id: 1,
            repo_id: 0,
            service_type: ServiceType::AwsLambda,
            name: name.into(),
            semver_compatible: true,
            is_internal: false,
        })
        .unwrap()
        .into_inner()
    }

    fn version(db: &RegistryDb, service: &Service, v: &str, created_at: SystemTime) -> ServiceVersion {
        db.get_or_insert_version(&NewVersion {
            service_id: service.id,
            version: v.into(),
            created_at,
            ..Default::default()
        })
        .unwrap()
        .into_inner()
    }

    fn rule() -> ServiceCleanupRule {
        let mut rule = ServiceCleanupRule::new(1, ServiceType::AwsLambda);
        rule.enabled = true;
        rule
    }

    fn selected(policy: &CleanupPolicy, service: &Service, versions: &[ServiceVersion]) -> Vec<String> {
        policy
            .select(service, versions)
            .into_iter()
            .map(|v| v.version.clone())
            .collect()
    }

    #[test]
    fn rule_without_remove_criteria_removes_nothing() {
        let now = SystemTime::now();
        let db = RegistryDb::open_memory().unwrap();
        let svc = service(&db, "fn");
        version(&db, &svc, "1.0.0", days_ago(now, 400));
        let versions = db.get_versions_by_service(svc.id).unwrap();

        let policy = CleanupPolicy::new(rule(), now).unwrap();
        assert!(policy.select(&svc, &versions).is_empty());
    }

    #[rstest]
    #[case::keep_none(0, vec!["3", "2", "1"])]
    #[case::keep_newest(1, vec!["2", "1"])]
    #[case::keep_all(5, vec![])]
    fn keep_count_protects_newest(#[case] keep_count: u32, #[case] expected: Vec<&str>) {
        let now = SystemTime::now();
        let db = RegistryDb::open_memory().unwrap();
        let svc = service(&db, "fn");
        version(&db, &svc, "1", days_ago(now, 30));
        version(&db, &svc, "2", days_ago(now, 20));
        version(&db, &svc, "3", days_ago(now, 10));
        let versions = db.get_versions_by_service(svc.id).unwrap();

        let mut rule = rule();
        rule.keep_count = keep_count;
        rule.remove_days = 1;
        let policy = CleanupPolicy::new(rule, now).unwrap();
        assert_eq!(selected(&policy, &svc, &versions), expected);
    }

    #[test]
    fn age_or_pattern_selects() {
        let now = SystemTime::now();
        let db = RegistryDb::open_memory().unwrap();
        let svc = service(&db, "fn");
        version(&db, &svc, "1.0.0", days_ago(now, 40));
        version(&db, &svc, "2.0.0-beta", days_ago(now, 1));
        version(&db, &svc, "2.0.0", now);
        let versions = db.get_versions_by_service(svc.id).unwrap();

        let mut rule = rule();
        rule.remove_days = 30;
        rule.remove_pattern = r".*-beta".into();
        let policy = CleanupPolicy::new(rule, now).unwrap();
        assert_eq!(selected(&policy, &svc, &versions), vec!["2.0.0-beta", "1.0.0"]);
    }

    #[test]
    fn keep_pattern_beats_remove() {
        let now = SystemTime::now();
        let db = RegistryDb::open_memory().unwrap();
        let svc = service(&db, "fn");
        version(&db, &svc, "1.0.0", days_ago(now, 40));
        version(&db, &svc, "1.1.0", days_ago(now, 40));
        let versions = db.get_versions_by_service(svc.id).unwrap();

        let mut rule = rule();
        rule.remove_days = 30;
        rule.keep_pattern = r"1\.0\..*".into();
        let policy = CleanupPolicy::new(rule, now).unwrap();
        assert_eq!(selected(&policy, &svc, &versions), vec!["1.1.0"]);
    }

    #[test]
    fn full_name_matching() {
        let now = SystemTime::now();
        let db = RegistryDb::open_memory().unwrap();
        let a = service(&db, "Alpha");
        let b = service(&db, "beta");
        version(&db, &a, "1", now);
        version(&db, &b, "1", now);

        let mut rule = rule();
        rule.remove_pattern = "alpha/.*".into();
        rule.match_full_name = true;
        let policy = CleanupPolicy::new(rule, now).unwrap();
        assert_eq!(
            selected(&policy, &a, &db.get_versions_by_service(a.id).unwrap()),
            vec!["1"]
        );
        assert!(
            selected(&policy, &b, &db.get_versions_by_service(b.id).unwrap()).is_empty()
        );
    }

    #[test]
    fn internal_versions_are_ignored() {
        let now = SystemTime::now();
        let db = RegistryDb::open_memory().unwrap();
        let svc = service(&db, "fn");
        version(&db, &svc, "1", days_ago(now, 40));
        db.get_or_insert_version(&NewVersion {
            service_id: svc.id,
            version: "internal".into(),
            created_at: days_ago(now, 1),
            is_internal: true,
            ..Default::default()
        })
        .unwrap();
        let versions = db.get_versions_by_service(svc.id).unwrap();

        let mut rule = rule();
        rule.keep_count = 1;
        rule.remove_pattern = ".*".into();
        let policy = CleanupPolicy::new(rule, now).unwrap();
        // The internal version neither gets removed nor uses up the keep slot.
        assert!(policy.select(&svc, &versions).is_empty());
    }

    #[test]
    fn run_cleanup_removes_versions_and_empty_services() {
        let now = SystemTime::now();
        let db = RegistryDb::open_memory().unwrap();
        let doomed = service(&db, "doomed");
        let survivor = service(&db, "survivor");
        version(&db, &doomed, "1", days_ago(now, 40));
        version(&db, &survivor, "1", days_ago(now, 40));
        version(&db, &survivor, "2", now);
        db.insert_property(PropertyType::Service, doomed.id, "k", "v")
            .unwrap();

        let mut enabled = rule();
        enabled.remove_days = 30;
        db.insert_cleanup_rule(&mut enabled).unwrap();

        assert_eq!(preview_cleanup(&db, &enabled, now).unwrap().len(), 2);

        let report = run_cleanup(&db, now).unwrap();
        assert_eq!(
            report,
            CleanupReport {
                rules_evaluated: 1,
                rules_skipped: Vec::new(),
                versions_removed: 2,
                files_removed: 0,
                services_removed: 1,
            }
        );
        assert!(db.get_service_by_id(doomed.id).unwrap_err().is_not_exist());
        assert!(
            db.get_properties(PropertyType::Service, doomed.id)
                .unwrap()
                .0
                .is_empty()
        );
        let left = db.get_versions_by_service(survivor.id).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].version, "2");

        // Nothing left to do on a second pass.
        let again = run_cleanup(&db, now).unwrap();
        assert_eq!(again.versions_removed, 0);
    }

    #[test]
    fn disabled_rules_do_not_run() {
        let now = SystemTime::now();
        let db = RegistryDb::open_memory().unwrap();
        let svc = service(&db, "fn");
        version(&db, &svc, "1", days_ago(now, 40));

        let mut disabled = rule();
        disabled.enabled = false;
        disabled.remove_days = 1;
        db.insert_cleanup_rule(&mut disabled).unwrap();

        assert_eq!(run_cleanup(&db, now).unwrap(), CleanupReport::default());
        assert_eq!(db.get_versions_by_service(svc.id).unwrap().len(), 1);
    }

    #[test]
    fn stored_rule_with_broken_pattern_is_reported() {
        let now = SystemTime::now();
        let db = RegistryDb::open_memory().unwrap();
        let svc = service(&db, "fn");
        version(&db, &svc, "v1", days_ago(now, 40));

        let mut broken = rule();
        broken.remove_days = 1;
        db.insert_cleanup_rule(&mut broken).unwrap();
        // A rule stored by an older release, before patterns were validated.
        db.connection()
            .execute(
                "UPDATE service_cleanup_rule SET remove_pattern = 'v(1' WHERE id = ?1",
                [broken.id],
            )
            .unwrap();

        let report = run_cleanup(&db, now).unwrap();
        assert_eq!(report.rules_evaluated, 0);
        assert_eq!(report.rules_skipped, vec![broken.id]);
        assert_eq!(report.versions_removed, 0);
        assert_eq!(db.get_versions_by_service(svc.id).unwrap().len(), 1);
    }

    #[test]
    fn broken_pattern_is_refused_on_save() {
        let db = RegistryDb::open_memory().unwrap();
        let mut broken = rule();
        broken.keep_pattern = "[".into();
        let err = db.insert_cleanup_rule(&mut broken).unwrap_err();
        assert!(matches!(
            err,
            depot_store_db::Error::InvalidPattern { field: "keep_pattern", .. }
        ));
        assert!(run_cleanup(&db, SystemTime::now()).unwrap().rules_skipped.is_empty());
    }
}
