/*============================================================
  Synavera Project: Syn-Mirror
  Module: synmirror::logger
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Provide structured, append-only logging for mirror runs,
    shared across concurrent fetch tasks.

  Security / Safety Notes:
    Callers never pass credentials to the logger; source
    identifiers are logged as hosts, paths and object keys.

  Dependencies:
    std::sync::Mutex, chrono for stamps, sha2 for digests.

  Operational Scope:
    Used by every runtime component to emit RFC-3339 UTC
    stamped entries and seal the session log with a digest.

  Revision History:
    2026-10-18 COD  Adapted session logger for Syn-Mirror.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Append-only logging with UTC timestamps
    - Deterministic formatting for auditability
    - Graceful error propagation on I/O failures
============================================================*/

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use sha2::{Digest, Sha256};

use crate::error::{MirrorError, Result};

/// Structured log level for Syn-Mirror events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Debug,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Debug => "DEBUG",
        }
    }

    fn always_visible(self) -> bool {
        matches!(self, LogLevel::Warn | LogLevel::Error)
    }
}

struct LogFile {
    writer: BufWriter<File>,
    path: PathBuf,
}

/// Shared logger; wrap in `Arc` to hand to fetch tasks.
pub struct Logger {
    file: Option<Mutex<LogFile>>,
    verbose: bool,
}

impl Logger {
    /// Build a logger that writes to stderr and optionally to a file.
    pub fn new(path: Option<PathBuf>, verbose: bool) -> Result<Self> {
        let file = match path {
            Some(path) => Some(Mutex::new(open_log_file(path)?)),
            None => None,
        };
        Ok(Self { file, verbose })
    }

    /// Stderr-only logger that stays quiet unless something goes wrong.
    #[cfg(test)]
    pub fn quiet() -> Self {
        Self {
            file: None,
            verbose: false,
        }
    }

    /// Emit a log entry with the given level, code, and message.
    pub fn log<S: AsRef<str>>(&self, level: LogLevel, code: &str, message: S) {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let payload = format!(
            "{timestamp} [{}] [{code}] {}",
            level.as_str(),
            message.as_ref()
        );

        if self.verbose || level.always_visible() {
            eprintln!("{payload}");
        }

        let Some(file) = &self.file else {
            return;
        };
        let Ok(mut guard) = file.lock() else {
            return;
        };
        let written = writeln!(guard.writer, "{payload}").and_then(|_| guard.writer.flush());
        if let Err(err) = written {
            eprintln!(
                "{timestamp} [{}] [LOGGER] Failed to append to {}: {err}",
                LogLevel::Error.as_str(),
                guard.path.display()
            );
        }
    }

    /// Convenience wrapper for `INFO` level events.
    pub fn info<S: AsRef<str>>(&self, code: &str, message: S) {
        self.log(LogLevel::Info, code, message);
    }

    /// Convenience wrapper for `WARN` level events.
    pub fn warn<S: AsRef<str>>(&self, code: &str, message: S) {
        self.log(LogLevel::Warn, code, message);
    }

    /// Convenience wrapper for `ERROR` level events.
    pub fn error<S: AsRef<str>>(&self, code: &str, message: S) {
        self.log(LogLevel::Error, code, message);
    }

    /// Convenience wrapper for `DEBUG` level events.
    pub fn debug<S: AsRef<str>>(&self, code: &str, message: S) {
        self.log(LogLevel::Debug, code, message);
    }

    /// Return the path backing this logger, if any.
    pub fn path(&self) -> Option<PathBuf> {
        let file = self.file.as_ref()?;
        let guard = file.lock().ok()?;
        Some(guard.path.clone())
    }

    /// Seal the session log with a SHA-256 digest written to `<log>.hash`.
    pub fn finalize(&self) -> Result<Option<PathBuf>> {
        let Some(path) = self.path() else {
            return Ok(None);
        };
        let data = std::fs::read(&path).map_err(|err| {
            MirrorError::Filesystem(format!(
                "Failed to read log for hashing {}: {err}",
                path.display()
            ))
        })?;
        let digest = Sha256::digest(&data);
        let hash_path = digest_path(&path);
        let line = format!(
            "{digest:x}  {}\n",
            path.file_name().unwrap_or_default().to_string_lossy()
        );
        std::fs::write(&hash_path, line).map_err(|err| {
            MirrorError::Filesystem(format!(
                "Failed to write hash file {}: {err}",
                hash_path.display()
            ))
        })?;
        Ok(Some(hash_path))
    }
}

fn open_log_file(path: PathBuf) -> Result<LogFile> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| {
            MirrorError::Filesystem(format!(
                "Failed to create log directory {}: {err}",
                parent.display()
            ))
        })?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|err| {
            MirrorError::Filesystem(format!(
                "Failed to open log file {}: {err}",
                path.display()
            ))
        })?;
    Ok(LogFile {
        writer: BufWriter::new(file),
        path,
    })
}

fn digest_path(path: &Path) -> PathBuf {
    let mut hash_os = path.as_os_str().to_os_string();
    hash_os.push(".hash");
    PathBuf::from(hash_os)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_appended_and_sealed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("mirror.log");
        let logger = Logger::new(Some(path.clone()), false).unwrap();
        logger.info("INIT", "first");
        logger.debug("FETCH", "second");

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("[INFO] [INIT] first"));
        assert!(lines[1].ends_with("[DEBUG] [FETCH] second"));

        let hash_path = logger.finalize().unwrap().unwrap();
        let sealed = std::fs::read_to_string(hash_path).unwrap();
        let expected = format!("{:x}  mirror.log\n", Sha256::digest(contents.as_bytes()));
        assert_eq!(sealed, expected);
    }

    #[test]
    fn quiet_logger_has_nothing_to_seal() {
        let logger = Logger::quiet();
        logger.info("INIT", "ignored");
        assert!(logger.finalize().unwrap().is_none());
    }
}
