/*============================================================
  Synavera Project: Syn-Mirror
  Module: synmirror::apkindex
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Read and write APKINDEX.tar.gz archives and extract the
    .PKGINFO control data from downloaded apk artifacts.

  Security / Safety Notes:
    Archives are only read into memory; no member is ever
    extracted to disk.

  Dependencies:
    flate2 and tar for the gzip/tar container, sha1 and
    base64 for the apk `Q1` control checksum.

  Operational Scope:
    Loads the remote index for a run and rebuilds the local
    index from the artifacts present on disk.

  Revision History:
    2026-10-18 COD  Authored index codec.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Deterministic output for identical record sets
    - Structured parsing with clear failure modes
============================================================*/

use std::io::{self, Read};
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::bufread::GzDecoder;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha1::{Digest, Sha1};
use tar::{Archive, Builder, Header};
use thiserror::Error;

use crate::package::PackageRecord;

/// File name of the index inside each architecture directory.
pub const INDEX_FILENAME: &str = "APKINDEX.tar.gz";

const INDEX_MEMBER: &str = "APKINDEX";
const DESCRIPTION_MEMBER: &str = "DESCRIPTION";
const PKGINFO_MEMBER: &str = ".PKGINFO";

/// Failures while decoding or encoding index data.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Index archive unreadable: {0}")]
    Archive(#[source] io::Error),
    #[error("Index archive has no {0} member")]
    MissingMember(&'static str),
    #[error("Index entry ending at line {line} lacks field {field}")]
    MissingField { field: char, line: usize },
    #[error("Index field {key} has invalid value `{value}`")]
    InvalidField { key: String, value: String },
    #[error("Artifact {} unreadable: {source}", .path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Artifact {} has no usable .PKGINFO: {reason}", .path.display())]
    ArtifactMetadata { path: PathBuf, reason: String },
}

/// Decode an APKINDEX.tar.gz (optionally prefixed by a signature segment).
pub fn parse_index(bytes: &[u8]) -> Result<Vec<PackageRecord>, IndexError> {
    let text = read_member(bytes, INDEX_MEMBER)
        .map_err(IndexError::Archive)?
        .ok_or(IndexError::MissingMember(INDEX_MEMBER))?;
    parse_index_text(&text)
}

/// Parse the plain-text APKINDEX body: blank-line separated `K:value` blocks.
pub fn parse_index_text(text: &str) -> Result<Vec<PackageRecord>, IndexError> {
    let mut records = Vec::new();
    let mut current = PackageRecord::default();
    let mut dirty = false;

    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            if dirty {
                records.push(finish_entry(std::mem::take(&mut current), idx)?);
                dirty = false;
            }
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        dirty = true;
        match key {
            "P" => current.name = value.to_string(),
            "V" => current.version = value.to_string(),
            "A" => current.arch = value.to_string(),
            "S" => current.size = Some(parse_number(key, value)?),
            "I" => current.installed_size = Some(parse_number(key, value)?),
            "t" => current.build_time = Some(parse_number(key, value)?),
            "T" => current.description = Some(value.to_string()),
            "U" => current.url = Some(value.to_string()),
            "L" => current.license = Some(value.to_string()),
            "o" => current.origin = Some(value.to_string()),
            "m" => current.maintainer = Some(value.to_string()),
            "c" => current.commit = Some(value.to_string()),
            "C" => current.checksum = Some(value.to_string()),
            "D" => current.dependencies = split_list(value),
            "p" => current.provides = split_list(value),
            _ => {}
        }
    }
    if dirty {
        records.push(finish_entry(current, text.lines().count())?);
    }
    Ok(records)
}

/// Encode records as APKINDEX.tar.gz, sorted by filename.
pub fn write_index(records: &[PackageRecord]) -> Result<Vec<u8>, IndexError> {
    let mut sorted: Vec<&PackageRecord> = records.iter().collect();
    sorted.sort_by_key(|record| record.filename());
    let body = render_index_text(&sorted);

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);
    append_member(&mut builder, DESCRIPTION_MEMBER, b"syn-mirror\n").map_err(IndexError::Archive)?;
    append_member(&mut builder, INDEX_MEMBER, body.as_bytes()).map_err(IndexError::Archive)?;
    builder
        .into_inner()
        .and_then(GzEncoder::finish)
        .map_err(IndexError::Archive)
}

/// Read the `.PKGINFO` of an artifact on disk into a record.
///
/// `size` is the file length and `checksum` the `Q1` digest of the gzip
/// member carrying `.PKGINFO`, as apk clients expect in `C:`.
pub fn read_artifact(path: &Path) -> Result<PackageRecord, IndexError> {
    let artifact_err = |source| IndexError::Artifact {
        path: path.to_path_buf(),
        source,
    };
    let bytes = std::fs::read(path).map_err(artifact_err)?;

    for segment in gzip_members(&bytes).map_err(artifact_err)? {
        let Some(pkginfo) = read_member(segment, PKGINFO_MEMBER).map_err(artifact_err)? else {
            continue;
        };
        let mut record =
            parse_pkginfo(&pkginfo).map_err(|reason| IndexError::ArtifactMetadata {
                path: path.to_path_buf(),
                reason,
            })?;
        record.size = Some(bytes.len() as u64);
        record.checksum = Some(control_checksum(segment));
        return Ok(record);
    }
    Err(IndexError::ArtifactMetadata {
        path: path.to_path_buf(),
        reason: "member missing".into(),
    })
}

/// Split concatenated gzip streams into their raw members.
fn gzip_members(bytes: &[u8]) -> io::Result<Vec<&[u8]>> {
    let mut members = Vec::new();
    let mut rest = bytes;
    while !rest.is_empty() {
        let mut decoder = GzDecoder::new(rest);
        io::copy(&mut decoder, &mut io::sink())?;
        let remaining = decoder.into_inner();
        let used = rest.len() - remaining.len();
        if used == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "gzip member consumed no input",
            ));
        }
        members.push(&rest[..used]);
        rest = remaining;
    }
    Ok(members)
}

fn control_checksum(segment: &[u8]) -> String {
    format!("Q1{}", STANDARD.encode(Sha1::digest(segment)))
}

fn parse_pkginfo(text: &str) -> Result<PackageRecord, String> {
    let mut record = PackageRecord::default();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once(" = ") else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "pkgname" => record.name = value.to_string(),
            "pkgver" => record.version = value.to_string(),
            "arch" => record.arch = value.to_string(),
            "pkgdesc" => record.description = Some(value.to_string()),
            "url" => record.url = Some(value.to_string()),
            "license" => record.license = Some(value.to_string()),
            "origin" => record.origin = Some(value.to_string()),
            "maintainer" => record.maintainer = Some(value.to_string()),
            "commit" => record.commit = Some(value.to_string()),
            "size" => {
                record.installed_size =
                    Some(value.parse().map_err(|_| format!("invalid size `{value}`"))?)
            }
            "builddate" => {
                record.build_time =
                    Some(value.parse().map_err(|_| format!("invalid builddate `{value}`"))?)
            }
            "depend" => record.dependencies.push(value.to_string()),
            "provides" => record.provides.push(value.to_string()),
            _ => {}
        }
    }
    if record.name.is_empty() {
        return Err("pkgname missing".into());
    }
    if record.version.is_empty() {
        return Err("pkgver missing".into());
    }
    Ok(record)
}

fn render_index_text(records: &[&PackageRecord]) -> String {
    let mut out = String::new();
    for record in records {
        let mut field = |key: char, value: &str| {
            out.push(key);
            out.push(':');
            out.push_str(value);
            out.push('\n');
        };
        if let Some(checksum) = &record.checksum {
            field('C', checksum);
        }
        field('P', &record.name);
        field('V', &record.version);
        field('A', &record.arch);
        if let Some(size) = record.size {
            field('S', &size.to_string());
        }
        if let Some(size) = record.installed_size {
            field('I', &size.to_string());
        }
        if let Some(value) = &record.description {
            field('T', value);
        }
        if let Some(value) = &record.url {
            field('U', value);
        }
        if let Some(value) = &record.license {
            field('L', value);
        }
        if let Some(value) = &record.origin {
            field('o', value);
        }
        if let Some(value) = &record.maintainer {
            field('m', value);
        }
        if let Some(time) = record.build_time {
            field('t', &time.to_string());
        }
        if let Some(value) = &record.commit {
            field('c', value);
        }
        if !record.dependencies.is_empty() {
            field('D', &record.dependencies.join(" "));
        }
        if !record.provides.is_empty() {
            field('p', &record.provides.join(" "));
        }
        out.push('\n');
    }
    out
}

fn finish_entry(record: PackageRecord, line: usize) -> Result<PackageRecord, IndexError> {
    if record.name.is_empty() {
        return Err(IndexError::MissingField { field: 'P', line });
    }
    if record.version.is_empty() {
        return Err(IndexError::MissingField { field: 'V', line });
    }
    Ok(record)
}

fn parse_number(key: &str, value: &str) -> Result<u64, IndexError> {
    value.parse().map_err(|_| IndexError::InvalidField {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn split_list(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}

/// Scan gzip-concatenated tar segments for `member` and return its text.
fn read_member<R: Read>(reader: R, member: &str) -> io::Result<Option<String>> {
    let mut archive = Archive::new(MultiGzDecoder::new(reader));
    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.path()?.as_ref() == Path::new(member) {
            let mut text = String::new();
            entry.read_to_string(&mut text)?;
            return Ok(Some(text));
        }
    }
    Ok(None)
}

fn append_member<W: io::Write>(builder: &mut Builder<W>, name: &str, data: &[u8]) -> io::Result<()> {
    let mut header = Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    builder.append_data(&mut header, name, data)
}

/// Build a minimal artifact whose control segment carries `.PKGINFO`.
#[cfg(test)]
pub(crate) fn fake_artifact(name: &str, version: &str, arch: &str) -> Vec<u8> {
    let pkginfo = format!(
        "# Generated by tests\npkgname = {name}\npkgver = {version}\narch = {arch}\nsize = 1024\npkgdesc = {name} test package\ndepend = so:libc.so.6\n"
    );
    let mut builder = Builder::new(GzEncoder::new(Vec::new(), Compression::fast()));
    append_member(&mut builder, PKGINFO_MEMBER, pkginfo.as_bytes()).unwrap();
    append_member(&mut builder, "usr/bin/placeholder", name.as_bytes()).unwrap();
    builder.into_inner().unwrap().finish().unwrap()
}
