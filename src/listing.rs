/*============================================================
  Synavera Project: Syn-Mirror
  Module: synmirror::listing
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Render index records for `syn-mirror ls` and dry runs as
    filenames, full locations, or JSON lines.

  Security / Safety Notes:
    Writes to the supplied writer only.

  Dependencies:
    serde_json for newline-delimited records.

  Operational Scope:
    Presentation layer over parsed records.

  Revision History:
    2026-10-18 COD  Authored listing renderer.
  ------------------------------------------------------------
  SSE Principles Observed:
    - One record per line, stable across formats
============================================================*/

use std::io::Write;

use crate::error::{MirrorError, Result};
use crate::package::PackageRecord;

/// Mutually exclusive listing styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFormat {
    Filename,
    /// Base directory or URL joined with the filename.
    Full,
    Json,
}

impl ListFormat {
    pub fn from_flags(full: bool, json: bool) -> Self {
        if json {
            ListFormat::Json
        } else if full {
            ListFormat::Full
        } else {
            ListFormat::Filename
        }
    }
}

pub fn write_listing<W: Write>(
    out: &mut W,
    records: &[PackageRecord],
    base: &str,
    format: ListFormat,
) -> Result<()> {
    let base = base.trim_end_matches('/');
    for record in records {
        match format {
            ListFormat::Filename => writeln!(out, "{}", record.filename())?,
            ListFormat::Full => writeln!(out, "{base}/{}", record.filename())?,
            ListFormat::Json => {
                serde_json::to_writer(&mut *out, record).map_err(|err| {
                    MirrorError::Serialization(format!("Encoding {}: {err}", record.name))
                })?;
                writeln!(out)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<PackageRecord> {
        vec![
            PackageRecord::new("curl", "8.2.0", "x86_64"),
            PackageRecord::new("wget", "1.21.0", "x86_64"),
        ]
    }

    fn render(format: ListFormat) -> String {
        let mut out = Vec::new();
        write_listing(&mut out, &sample(), "https://packages.wolfi.dev/os/x86_64/", format).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn filename_listing() {
        assert_eq!(render(ListFormat::Filename), "curl-8.2.0.apk\nwget-1.21.0.apk\n");
    }

    #[test]
    fn full_listing_joins_base() {
        assert_eq!(
            render(ListFormat::Full),
            "https://packages.wolfi.dev/os/x86_64/curl-8.2.0.apk\nhttps://packages.wolfi.dev/os/x86_64/wget-1.21.0.apk\n"
        );
    }

    #[test]
    fn json_listing_is_one_object_per_line() {
        let rendered = render(ListFormat::Json);
        let lines: Vec<serde_json::Value> = rendered
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["name"], "curl");
        assert_eq!(lines[1]["version"], "1.21.0");
    }

    #[test]
    fn json_wins_over_full() {
        assert_eq!(ListFormat::from_flags(true, true), ListFormat::Json);
        assert_eq!(ListFormat::from_flags(true, false), ListFormat::Full);
        assert_eq!(ListFormat::from_flags(false, false), ListFormat::Filename);
    }
}
