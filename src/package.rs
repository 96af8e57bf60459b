/*============================================================
  Synavera Project: Syn-Mirror
  Module: synmirror::package
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Shared record describing one artifact entry of an apk
    index, as parsed from APKINDEX or from an artifact.

  Security / Safety Notes:
    Pure data container; no I/O performed in this module.

  Dependencies:
    serde for JSON listings.

  Operational Scope:
    Passed between the index codec, selector, fetcher and
    synchronizer; emitted verbatim by `ls --json`.

  Revision History:
    2026-10-18 COD  Introduced shared PackageRecord type.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Clear data contracts between modules
    - Serializable structures for listing output
============================================================*/

use std::path::{Component, Path};

use serde::Serialize;

/// Suffix shared by every artifact filename.
pub const ARTIFACT_EXTENSION: &str = ".apk";

/// One package entry. Immutable once parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    pub arch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installed_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintainer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub provides: Vec<String>,
}

impl PackageRecord {
    #[cfg(test)]
    pub fn new(name: impl Into<String>, version: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            arch: arch.into(),
            ..Self::default()
        }
    }

    /// `<name>-<version>.apk`; relative path and identity key on disk.
    pub fn filename(&self) -> String {
        format!("{}-{}{ARTIFACT_EXTENSION}", self.name, self.version)
    }

    /// Whether `filename()` names a single entry inside its directory.
    ///
    /// Index data is remote input; anything with separators or `..` is
    /// refused before it can be joined onto a local path.
    pub fn has_plain_filename(&self) -> bool {
        let filename = self.filename();
        if filename.contains(&['/', '\\'][..]) || filename.contains("..") {
            return false;
        }
        let mut components = Path::new(&filename).components();
        matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        )
    }
}
