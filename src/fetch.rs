/*============================================================
  Synavera Project: Syn-Mirror
  Module: synmirror::fetch
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Retrieve index bytes and artifact streams from HTTP, the
    local filesystem, or an object-storage bucket, and land
    artifacts on disk without exposing partial files.

  Security / Safety Notes:
    Basic-auth credentials are attached per request and never
    included in error messages. Writes go to `<dest>.part`
    and are renamed into place only on success.

  Dependencies:
    reqwest for HTTP, opendal for S3-compatible buckets,
    tokio-util to adapt response bodies into readers.

  Operational Scope:
    Called by the synchronizer once per desired artifact and
    once per run for the remote index.

  Revision History:
    2026-10-18 COD  Implemented multi-source fetcher.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Source dispatch centralised in one enum
    - No retries; callers own retry policy
    - Idempotent: present destinations are never refetched
============================================================*/

use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use futures::TryStreamExt;
use opendal::services::S3;
use opendal::Operator;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;
use urlencoding::encode;

use crate::apkindex::INDEX_FILENAME;
use crate::config::{BucketConfig, HttpAuth, HttpConfig, BUCKET_ACCESS_KEY_ENV, BUCKET_SECRET_KEY_ENV};
use crate::error::{MirrorError, Result};

/// Readable artifact body, independent of where it came from.
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

/// Failures retrieving or landing a single index or artifact.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("GET {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("GET {url}: status {status}")]
    Status { url: String, status: u16 },
    #[error("{}: not found", .path.display())]
    NotFound { path: PathBuf },
    #[error("Reading {}: {source}", .path.display())]
    Local {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Reading standard input: {0}")]
    Stdin(#[source] io::Error),
    #[error("Bucket object {bucket}/{key}: {source}")]
    Backend {
        bucket: String,
        key: String,
        #[source]
        source: opendal::Error,
    },
    #[error("Transferring into {}: {source}", .path.display())]
    Transfer {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Build the shared HTTP client for a session.
pub fn http_client(config: &HttpConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout))
        .user_agent(config.user_agent.as_str())
        .build()
        .map_err(|err| MirrorError::Network(format!("Failed to build HTTP client: {err}")))
}

async fn http_get(
    client: &reqwest::Client,
    url: &str,
    auth: Option<&HttpAuth>,
) -> std::result::Result<reqwest::Response, FetchError> {
    let mut request = client.get(url);
    if let Some(auth) = auth {
        request = request.basic_auth(&auth.username, Some(&auth.password));
    }
    let response = request.send().await.map_err(|source| FetchError::Request {
        url: url.to_string(),
        source,
    })?;
    let status = response.status().as_u16();
    if status >= 400 {
        return Err(FetchError::Status {
            url: url.to_string(),
            status,
        });
    }
    Ok(response)
}

/// Where the index of a run comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexSource {
    Stdin,
    Local(PathBuf),
    Http(String),
}

impl IndexSource {
    /// `-` is stdin, `http(s)://` is a URL, anything else a path.
    pub fn parse(raw: &str) -> Self {
        if raw == "-" {
            IndexSource::Stdin
        } else if raw.starts_with("http://") || raw.starts_with("https://") {
            IndexSource::Http(raw.to_string())
        } else {
            IndexSource::Local(PathBuf::from(raw))
        }
    }

    /// Index URL of `arch` under a repository base URL.
    pub fn for_repository(base_url: &str, arch: &str) -> Self {
        IndexSource::Http(format!(
            "{}/{arch}/{INDEX_FILENAME}",
            base_url.trim_end_matches('/')
        ))
    }

    /// Directory or URL that artifact filenames are relative to.
    pub fn base(&self) -> String {
        match self {
            IndexSource::Stdin => ".".to_string(),
            IndexSource::Local(path) => path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .map(|parent| parent.display().to_string())
                .unwrap_or_else(|| ".".to_string()),
            IndexSource::Http(url) => match url.rsplit_once('/') {
                Some((dir, _)) => dir.to_string(),
                None => url.clone(),
            },
        }
    }

    pub async fn load(
        &self,
        client: &reqwest::Client,
        auth: Option<&HttpAuth>,
    ) -> std::result::Result<Vec<u8>, FetchError> {
        match self {
            IndexSource::Stdin => {
                let mut bytes = Vec::new();
                tokio::io::stdin()
                    .read_to_end(&mut bytes)
                    .await
                    .map_err(FetchError::Stdin)?;
                Ok(bytes)
            }
            IndexSource::Local(path) => tokio::fs::read(path)
                .await
                .map_err(|err| local_error(path, err)),
            IndexSource::Http(url) => {
                let response = http_get(client, url, auth).await?;
                let bytes = response.bytes().await.map_err(|source| FetchError::Request {
                    url: url.clone(),
                    source,
                })?;
                Ok(bytes.to_vec())
            }
        }
    }
}

/// Where artifacts of a run are fetched from.
#[derive(Clone)]
pub enum ArtifactSource {
    /// `<base_url>/<filename>`; `base_url` already includes the arch.
    Http {
        client: reqwest::Client,
        base_url: String,
        auth: Option<HttpAuth>,
    },
    Local {
        root: PathBuf,
    },
    Bucket {
        operator: Operator,
        bucket: String,
        prefix: String,
    },
}

impl std::fmt::Debug for ArtifactSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactSource::Http { base_url, .. } => write!(f, "Http({base_url})"),
            ArtifactSource::Local { root } => write!(f, "Local({})", root.display()),
            ArtifactSource::Bucket { bucket, prefix, .. } => write!(f, "Bucket({bucket}/{prefix})"),
        }
    }
}

impl ArtifactSource {
    /// S3-compatible bucket from `bucket-name/key-prefix`.
    pub fn s3(path: &str, config: &BucketConfig) -> Result<Self> {
        let (bucket, prefix) = path.split_once('/').unwrap_or((path, ""));
        if bucket.is_empty() {
            return Err(MirrorError::Config(format!(
                "Bucket path `{path}` lacks a bucket name"
            )));
        }
        let mut builder = S3::default();
        builder.bucket(bucket);
        builder.region(&config.region);
        if let Some(endpoint) = &config.endpoint {
            builder.endpoint(endpoint);
        }
        if let Ok(access_key) = std::env::var(BUCKET_ACCESS_KEY_ENV) {
            builder.access_key_id(&access_key);
        }
        if let Ok(secret_key) = std::env::var(BUCKET_SECRET_KEY_ENV) {
            builder.secret_access_key(&secret_key);
        }
        let operator = Operator::new(builder)
            .map_err(|err| MirrorError::Config(format!("Bucket `{bucket}`: {err}")))?
            .finish();
        Ok(Self::with_operator(operator, bucket, prefix))
    }

    pub fn with_operator(operator: Operator, bucket: &str, prefix: &str) -> Self {
        ArtifactSource::Bucket {
            operator,
            bucket: bucket.to_string(),
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    /// Same source, scoped one directory deeper (per architecture).
    pub fn scoped(&self, segment: &str) -> Self {
        match self {
            ArtifactSource::Http {
                client,
                base_url,
                auth,
            } => ArtifactSource::Http {
                client: client.clone(),
                base_url: format!("{}/{segment}", base_url.trim_end_matches('/')),
                auth: auth.clone(),
            },
            ArtifactSource::Local { root } => ArtifactSource::Local {
                root: root.join(segment),
            },
            ArtifactSource::Bucket {
                operator,
                bucket,
                prefix,
            } => ArtifactSource::Bucket {
                operator: operator.clone(),
                bucket: bucket.clone(),
                prefix: object_key(prefix, segment),
            },
        }
    }

    /// Human-readable location of `filename`, free of credentials.
    pub fn locate(&self, filename: &str) -> String {
        match self {
            ArtifactSource::Http { base_url, .. } => format!("{base_url}/{}", encode(filename)),
            ArtifactSource::Local { root } => root.join(filename).display().to_string(),
            ArtifactSource::Bucket { bucket, prefix, .. } => {
                format!("{bucket}/{}", object_key(prefix, filename))
            }
        }
    }

    /// Open `filename` for reading.
    pub async fn open(&self, filename: &str) -> std::result::Result<ByteStream, FetchError> {
        match self {
            ArtifactSource::Http { client, auth, .. } => {
                let url = self.locate(filename);
                let response = http_get(client, &url, auth.as_ref()).await?;
                let body = response.bytes_stream().map_err(io::Error::other);
                Ok(Box::pin(StreamReader::new(body)))
            }
            ArtifactSource::Local { root } => {
                let path = root.join(filename);
                let file = tokio::fs::File::open(&path)
                    .await
                    .map_err(|err| local_error(&path, err))?;
                Ok(Box::pin(file))
            }
            ArtifactSource::Bucket {
                operator,
                bucket,
                prefix,
            } => {
                let key = object_key(prefix, filename);
                let reader = operator
                    .reader(&key)
                    .await
                    .map_err(|source| FetchError::Backend {
                        bucket: bucket.clone(),
                        key: key.clone(),
                        source,
                    })?;
                Ok(Box::pin(reader))
            }
        }
    }
}

/// What happened to one destination path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Fetched { bytes: u64 },
    Skipped,
}

/// Land `filename` at `dest` unless it is already there.
pub async fn fetch_to(
    source: &ArtifactSource,
    filename: &str,
    dest: &Path,
) -> std::result::Result<FetchOutcome, FetchError> {
    if tokio::fs::try_exists(dest).await.unwrap_or(false) {
        return Ok(FetchOutcome::Skipped);
    }
    let mut reader = source.open(filename).await?;
    let partial = partial_path(dest);
    match write_partial(&mut reader, &partial).await {
        Ok(bytes) => {
            tokio::fs::rename(&partial, dest)
                .await
                .map_err(|source| FetchError::Transfer {
                    path: dest.to_path_buf(),
                    source,
                })?;
            Ok(FetchOutcome::Fetched { bytes })
        }
        Err(source) => {
            let _ = tokio::fs::remove_file(&partial).await;
            Err(FetchError::Transfer {
                path: dest.to_path_buf(),
                source,
            })
        }
    }
}

async fn write_partial(reader: &mut ByteStream, partial: &Path) -> io::Result<u64> {
    let mut file = tokio::fs::File::create(partial).await?;
    let bytes = tokio::io::copy(reader, &mut file).await?;
    file.flush().await?;
    file.sync_all().await?;
    Ok(bytes)
}

/// `<dest>.part`; never matches the artifact extension.
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

fn object_key(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

fn local_error(path: &Path, err: io::Error) -> FetchError {
    if err.kind() == io::ErrorKind::NotFound {
        FetchError::NotFound {
            path: path.to_path_buf(),
        }
    } else {
        FetchError::Local {
            path: path.to_path_buf(),
            source: err,
        }
    }
}
