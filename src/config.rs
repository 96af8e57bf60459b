/*============================================================
  Synavera Project: Syn-Mirror
  Module: synmirror::config
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Load operator configuration, resolve repository aliases
    and HTTP credentials for mirror runs.

  Security / Safety Notes:
    Credentials are accepted from the CLI or HTTP_AUTH and are
    redacted from Debug output.

  Dependencies:
    serde + toml for the config file, dirs for default paths.

  Operational Scope:
    Read once at start-up by the binary entry point.

  Revision History:
    2026-10-18 COD  Authored configuration layer.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Explicit defaults, explicit failure on malformed input
    - Secrets never logged
============================================================*/

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{MirrorError, Result};

/// Environment variable consulted when no `--auth` is given.
pub const AUTH_ENV: &str = "HTTP_AUTH";
/// Object-storage credentials are only read from the environment.
pub const BUCKET_ACCESS_KEY_ENV: &str = "SYNMIRROR_BUCKET_ACCESS_KEY";
pub const BUCKET_SECRET_KEY_ENV: &str = "SYNMIRROR_BUCKET_SECRET_KEY";

const DEFAULT_REPO_ALIAS: &str = "wolfi";
const BUILTIN_REPOSITORIES: &[(&str, &str)] = &[("wolfi", "https://packages.wolfi.dev/os")];

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub mirror: MirrorSection,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
    pub bucket: BucketConfig,
    /// Extra aliases; entries here shadow the built-in ones.
    pub repositories: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MirrorSection {
    pub out_dir: PathBuf,
    pub default_repo: String,
    pub arches: Vec<String>,
    /// Cap on in-flight fetches per run; unset means unbounded.
    pub max_parallel_fetches: Option<usize>,
}

impl Default for MirrorSection {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("packages"),
            default_repo: DEFAULT_REPO_ALIAS.to_string(),
            arches: vec!["x86_64".to_string(), "aarch64".to_string()],
            max_parallel_fetches: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Seconds.
    pub timeout: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: 300,
            user_agent: format!("Syn-Mirror/{} (linux)", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BucketConfig {
    pub endpoint: Option<String>,
    pub region: String,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: "auto".to_string(),
        }
    }
}

impl MirrorConfig {
    /// Load from `path`, or from the default location when `None`.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load_from_optional_path(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => match default_config_path() {
                Some(path) if path.exists() => Self::load(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            MirrorError::Config(format!("Failed to read {}: {err}", path.display()))
        })?;
        Self::from_toml(&raw)
            .map_err(|err| MirrorError::Config(format!("{}: {err}", path.display())))
    }

    pub fn from_toml(raw: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.logging.log_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("syn-mirror")
                .join("logs")
        })
    }

    /// Turn an alias or URL into a repository base URL without trailing slash.
    pub fn resolve_repository(&self, alias_or_url: &str) -> Result<String> {
        if let Some(url) = self.repositories.get(alias_or_url) {
            return Ok(url.trim_end_matches('/').to_string());
        }
        if let Some((_, url)) = BUILTIN_REPOSITORIES
            .iter()
            .find(|(alias, _)| *alias == alias_or_url)
        {
            return Ok(url.to_string());
        }
        if alias_or_url.starts_with("http://") || alias_or_url.starts_with("https://") {
            return Ok(alias_or_url.trim_end_matches('/').to_string());
        }
        Err(MirrorError::Config(format!(
            "Unknown repository alias `{alias_or_url}`"
        )))
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("syn-mirror").join("config.toml"))
}

/// Basic-auth credential from `basic:<domain>:<user>:<password>`.
#[derive(Clone, PartialEq, Eq)]
pub struct HttpAuth {
    /// Reserved for per-host credential maps; not used for matching yet.
    pub domain: String,
    pub username: String,
    pub password: String,
}

impl HttpAuth {
    pub fn parse(raw: &str) -> Result<Self> {
        let fields: Vec<&str> = raw.splitn(4, ':').collect();
        let [scheme, domain, username, password] = fields.as_slice() else {
            return Err(MirrorError::Config(format!(
                "HTTP auth must have 4 colon-separated fields, got {}",
                fields.len()
            )));
        };
        if *scheme != "basic" {
            return Err(MirrorError::Config(format!(
                "Unsupported HTTP auth scheme `{scheme}`"
            )));
        }
        Ok(Self {
            domain: domain.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    /// Explicit value wins; otherwise fall back to the environment value.
    pub fn resolve(explicit: Option<&str>, from_env: Option<String>) -> Result<Option<Self>> {
        match explicit.map(str::to_string).or(from_env) {
            Some(raw) if !raw.is_empty() => Self::parse(&raw).map(Some),
            _ => Ok(None),
        }
    }
}

impl fmt::Debug for HttpAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpAuth")
            .field("domain", &self.domain)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
