/*============================================================
  Synavera Project: Syn-Mirror
  Module: synmirror::select
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Filter index records by package name and reduce them to
    the newest record per name.

  Security / Safety Notes:
    Pure computation over in-memory records.

  Dependencies:
    crate::version for ordering.

  Operational Scope:
    Resolves the desired set of a mirror run.

  Revision History:
    2026-10-18 COD  Authored latest-version selector.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Malformed versions skipped and reported, never fatal
    - No shared state; every call builds its own map
============================================================*/

use std::collections::{BTreeMap, HashSet};

use crate::package::PackageRecord;
use crate::version::{Version, VersionError};

/// Result of reducing records to one per package name.
#[derive(Debug, Default)]
pub struct Selection {
    chosen: BTreeMap<String, (Version, PackageRecord)>,
    skipped: Vec<(PackageRecord, VersionError)>,
}

impl Selection {
    /// Chosen records, ordered by package name.
    pub fn into_records(self) -> Vec<PackageRecord> {
        self.chosen.into_values().map(|(_, record)| record).collect()
    }

    /// Records dropped because their version failed to parse.
    pub fn skipped(&self) -> &[(PackageRecord, VersionError)] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.chosen.len()
    }

    fn offer(&mut self, record: PackageRecord) {
        let version = match Version::parse(&record.version) {
            Ok(version) => version,
            Err(err) => {
                self.skipped.push((record, err));
                return;
            }
        };
        match self.chosen.get_mut(&record.name) {
            Some((best, current)) => {
                if version > *best {
                    *best = version;
                    *current = record;
                }
            }
            None => {
                self.chosen.insert(record.name.clone(), (version, record));
            }
        }
    }
}

/// Keep records whose name is in `names`; an empty filter keeps everything.
pub fn filter_by_name(records: Vec<PackageRecord>, names: &[String]) -> Vec<PackageRecord> {
    if names.is_empty() {
        return records;
    }
    let wanted: HashSet<&str> = names.iter().map(String::as_str).collect();
    records
        .into_iter()
        .filter(|record| wanted.contains(record.name.as_str()))
        .collect()
}

/// Reduce to the greatest version per name. Ties keep the first record seen.
pub fn select_latest(records: impl IntoIterator<Item = PackageRecord>) -> Selection {
    let mut selection = Selection::default();
    for record in records {
        selection.offer(record);
    }
    selection
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, version: &str) -> PackageRecord {
        PackageRecord::new(name, version, "x86_64")
    }

    fn chosen<'a>(selection: &'a Selection, name: &str) -> &'a PackageRecord {
        &selection.chosen[name].1
    }

    #[test]
    fn picks_greatest_version_per_name() {
        let selection = select_latest(vec![
            record("curl", "8.1.0"),
            record("wget", "1.21.0"),
            record("curl", "8.2.0"),
            record("curl", "8.1.9"),
        ]);
        assert_eq!(selection.len(), 2);
        assert_eq!(chosen(&selection, "curl").version, "8.2.0");
        assert_eq!(chosen(&selection, "wget").version, "1.21.0");
        assert!(selection.skipped().is_empty());
    }

    #[test]
    fn revision_decides_between_equal_upstream_versions() {
        let selection = select_latest(vec![record("foo", "1.0-r2"), record("foo", "1.0-r1")]);
        let names: Vec<String> = selection
            .into_records()
            .iter()
            .map(PackageRecord::filename)
            .collect();
        assert_eq!(names, vec!["foo-1.0-r2.apk"]);
    }

    #[test]
    fn equal_rank_keeps_first_seen() {
        let selection = select_latest(vec![record("foo", "1.0"), record("foo", "1.0.0")]);
        assert_eq!(chosen(&selection, "foo").version, "1.0");
    }

    #[test]
    fn malformed_versions_are_skipped_not_fatal() {
        let selection = select_latest(vec![
            record("bar", "not-a-version"),
            record("bar", "2.0"),
            record("baz", "1.0_bogus"),
            record("bar", "1.9"),
        ]);
        assert_eq!(selection.len(), 1);
        assert_eq!(chosen(&selection, "bar").version, "2.0");
        let skipped: Vec<&str> = selection
            .skipped()
            .iter()
            .map(|(record, _)| record.version.as_str())
            .collect();
        assert_eq!(skipped, vec!["not-a-version", "1.0_bogus"]);
    }

    #[test]
    fn filter_keeps_named_records_only() {
        let records = vec![
            record("curl", "8.1.0"),
            record("curl", "8.2.0"),
            record("wget", "1.21.0"),
        ];
        let filtered = filter_by_name(records.clone(), &["curl".to_string()]);
        assert_eq!(filtered.len(), 2);
        assert!(filtered.iter().all(|r| r.name == "curl"));

        assert_eq!(filter_by_name(records.clone(), &[]), records);
        assert!(filter_by_name(records, &["zsh".to_string()]).is_empty());
    }
}
