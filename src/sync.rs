/*============================================================
  Synavera Project: Syn-Mirror
  Module: synmirror::sync
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Drive one mirror run per architecture: load the remote
    index, resolve the desired set, fetch missing artifacts
    concurrently, then rebuild the local index from disk.

  Security / Safety Notes:
    Writes only below the operator-chosen output directory;
    existing artifacts are never overwritten.

  Dependencies:
    tokio JoinSet + Semaphore for fan-out, tokio-util
    CancellationToken for first-error-wins signalling.

  Operational Scope:
    Invoked by `syn-mirror cp`; one instance per requested
    architecture, runs may proceed side by side.

  Revision History:
    2026-10-18 COD  Authored mirror synchronizer.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Disk is the source of truth for the rebuilt index
    - No partial index published after a failed fetch
    - Idempotent reruns over a populated directory
============================================================*/

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::apkindex::{self, INDEX_FILENAME};
use crate::config::HttpAuth;
use crate::error::{MirrorError, Result};
use crate::fetch::{fetch_to, partial_path, ArtifactSource, FetchError, FetchOutcome, IndexSource};
use crate::logger::Logger;
use crate::package::{PackageRecord, ARTIFACT_EXTENSION};
use crate::select::{filter_by_name, select_latest};

/// What the operator asked for; shared by every architecture.
#[derive(Debug, Clone)]
pub struct MirrorRequest {
    /// Empty means every package in the index.
    pub packages: Vec<String>,
    pub latest: bool,
    pub out_dir: PathBuf,
    /// Upper bound on in-flight fetches; `None` leaves it to the runtime.
    pub max_parallel: Option<usize>,
}

impl MirrorRequest {
    fn filter_label(&self) -> String {
        if self.packages.is_empty() {
            "*".to_string()
        } else {
            self.packages.join(",")
        }
    }
}

/// One architecture to mirror and where its bytes come from.
#[derive(Debug, Clone)]
pub struct ArchTarget {
    pub arch: String,
    pub index: IndexSource,
    pub source: ArtifactSource,
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub arch: String,
    pub desired: usize,
    pub fetched: usize,
    pub bytes: u64,
    pub skipped: usize,
    pub indexed: usize,
    pub index_path: PathBuf,
}

#[derive(Debug, Default)]
struct FetchTally {
    fetched: usize,
    bytes: u64,
    skipped: usize,
}

enum UnitOutcome {
    Done(FetchOutcome),
    Abandoned,
}

struct FetchUnit {
    source: ArtifactSource,
    filename: String,
    dest: PathBuf,
    arch: String,
}

impl FetchUnit {
    async fn execute(
        self,
        cancel: CancellationToken,
        limiter: Option<Arc<Semaphore>>,
        logger: Arc<Logger>,
    ) -> Result<UnitOutcome> {
        let _permit = match limiter {
            Some(semaphore) => Some(
                semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| MirrorError::Runtime("Fetch semaphore closed".into()))?,
            ),
            None => None,
        };
        // Work not yet started when a sibling failed is abandoned.
        if cancel.is_cancelled() {
            return Ok(UnitOutcome::Abandoned);
        }
        match fetch_to(&self.source, &self.filename, &self.dest).await {
            Ok(outcome) => {
                logger.debug(
                    "FETCH",
                    format!("[{}] {}: {outcome:?}", self.arch, self.filename),
                );
                Ok(UnitOutcome::Done(outcome))
            }
            Err(err) => {
                cancel.cancel();
                Err(err.into())
            }
        }
    }
}

/// Orchestrates mirror runs; cheap to share across architectures.
pub struct Synchronizer {
    client: reqwest::Client,
    auth: Option<HttpAuth>,
    logger: Arc<Logger>,
}

impl Synchronizer {
    pub fn new(client: reqwest::Client, auth: Option<HttpAuth>, logger: Arc<Logger>) -> Self {
        Self {
            client,
            auth,
            logger,
        }
    }

    /// Load the index of `target` and reduce it to the desired records.
    ///
    /// Fails with `NoPackagesFound` before touching the filesystem.
    pub async fn resolve(
        &self,
        request: &MirrorRequest,
        target: &ArchTarget,
    ) -> Result<Vec<PackageRecord>> {
        let bytes = target.index.load(&self.client, self.auth.as_ref()).await?;
        let records = apkindex::parse_index(&bytes)?;
        self.logger.info(
            "INDEX",
            format!("[{}] Loaded {} records", target.arch, records.len()),
        );

        let filtered = filter_by_name(records, &request.packages);
        let candidates = if request.latest {
            let selection = select_latest(filtered);
            self.logger.debug(
                "SELECT",
                format!("[{}] {} packages after latest selection", target.arch, selection.len()),
            );
            for (record, err) in selection.skipped() {
                self.logger.warn(
                    "VERSION",
                    format!("[{}] Skipping {}: {err}", target.arch, record.filename()),
                );
            }
            selection.into_records()
        } else {
            filtered
        };

        let mut by_filename: BTreeMap<String, PackageRecord> = BTreeMap::new();
        for record in candidates {
            if !record.has_plain_filename() {
                self.logger.warn(
                    "INDEX",
                    format!(
                        "[{}] Skipping {:?}: not a plain file name",
                        target.arch,
                        record.filename()
                    ),
                );
                continue;
            }
            by_filename.entry(record.filename()).or_insert(record);
        }
        if by_filename.is_empty() {
            return Err(MirrorError::NoPackagesFound {
                arch: target.arch.clone(),
                filter: request.filter_label(),
            });
        }
        Ok(by_filename.into_values().collect())
    }

    /// Full load, resolve, fetch, rebuild cycle for one architecture.
    pub async fn run(&self, request: &MirrorRequest, target: &ArchTarget) -> Result<RunReport> {
        let desired = self.resolve(request, target).await?;
        let arch_dir = request.out_dir.join(&target.arch);
        tokio::fs::create_dir_all(&arch_dir).await.map_err(|err| {
            MirrorError::Filesystem(format!(
                "Failed to create {}: {err}",
                arch_dir.display()
            ))
        })?;

        self.logger.info(
            "FETCH",
            format!(
                "[{}] {} artifacts desired from {:?}",
                target.arch,
                desired.len(),
                target.source
            ),
        );
        let tally = self.fetch_all(request, target, &desired, &arch_dir).await?;

        let dir = arch_dir.clone();
        let logger = Arc::clone(&self.logger);
        let (indexed, index_path) = tokio::task::spawn_blocking(move || rebuild_index(&dir, &logger))
            .await
            .map_err(|err| MirrorError::Runtime(format!("Rebuild task failed: {err}")))??;

        self.logger.info(
            "INDEX",
            format!(
                "[{}] Wrote {} with {indexed} records (fetched={} skipped={})",
                target.arch,
                index_path.display(),
                tally.fetched,
                tally.skipped
            ),
        );
        Ok(RunReport {
            arch: target.arch.clone(),
            desired: desired.len(),
            fetched: tally.fetched,
            bytes: tally.bytes,
            skipped: tally.skipped,
            indexed,
            index_path,
        })
    }

    async fn fetch_all(
        &self,
        request: &MirrorRequest,
        target: &ArchTarget,
        desired: &[PackageRecord],
        arch_dir: &Path,
    ) -> Result<FetchTally> {
        let cancel = CancellationToken::new();
        let limiter = request
            .max_parallel
            .map(|limit| Arc::new(Semaphore::new(limit.max(1))));
        let mut tasks = JoinSet::new();

        for record in desired {
            let filename = record.filename();
            let unit = FetchUnit {
                dest: arch_dir.join(&filename),
                filename,
                source: target.source.clone(),
                arch: target.arch.clone(),
            };
            tasks.spawn(unit.execute(
                cancel.clone(),
                limiter.clone(),
                Arc::clone(&self.logger),
            ));
        }

        let mut tally = FetchTally::default();
        let mut first_error: Option<MirrorError> = None;
        while let Some(joined) = tasks.join_next().await {
            let unit = joined
                .map_err(|err| MirrorError::Runtime(format!("Fetch task failed: {err}")))
                .and_then(|result| result);
            match unit {
                Ok(UnitOutcome::Done(FetchOutcome::Fetched { bytes })) => {
                    tally.fetched += 1;
                    tally.bytes += bytes;
                }
                Ok(UnitOutcome::Done(FetchOutcome::Skipped)) => tally.skipped += 1,
                Ok(UnitOutcome::Abandoned) => {}
                Err(err) => {
                    cancel.cancel();
                    self.logger.error("FETCH", format!("[{}] {err}", target.arch));
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(tally),
        }
    }
}

/// Run every target side by side; all runs finish, the first error is returned.
pub async fn mirror_all(
    sync: &Synchronizer,
    request: &MirrorRequest,
    targets: &[ArchTarget],
) -> Result<Vec<RunReport>> {
    let results = join_all(targets.iter().map(|target| sync.run(request, target))).await;
    let mut reports = Vec::with_capacity(results.len());
    let mut first_error = None;
    for result in results {
        match result {
            Ok(report) => reports.push(report),
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(reports),
    }
}

/// Records for every readable artifact under `dir` whose control data
/// matches its file name, ordered by file name.
pub fn scan_artifacts(dir: &Path, logger: &Logger) -> Result<Vec<PackageRecord>> {
    let entries = std::fs::read_dir(dir).map_err(|err| {
        MirrorError::Filesystem(format!("Failed to scan {}: {err}", dir.display()))
    })?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if name.ends_with(ARTIFACT_EXTENSION) && entry.file_type()?.is_file() {
            names.push(name);
        }
    }
    names.sort();

    // The file on disk is the identity; its control data must agree.
    let mut records = Vec::with_capacity(names.len());
    for name in names {
        let path = dir.join(&name);
        match apkindex::read_artifact(&path) {
            Ok(record) if record.filename() == name => records.push(record),
            Ok(record) => logger.warn(
                "ARTIFACT",
                format!(
                    "Skipping {}: control data describes {}",
                    path.display(),
                    record.filename()
                ),
            ),
            Err(err) => logger.warn("ARTIFACT", format!("Skipping unreadable artifact: {err}")),
        }
    }
    Ok(records)
}

/// Rescan `dir` and atomically replace its index. Returns record count and path.
pub fn rebuild_index(dir: &Path, logger: &Logger) -> Result<(usize, PathBuf)> {
    let records = scan_artifacts(dir, logger)?;
    let bytes = apkindex::write_index(&records)?;
    let index_path = dir.join(INDEX_FILENAME);
    let staging = partial_path(&index_path);
    std::fs::write(&staging, bytes)
        .and_then(|_| std::fs::rename(&staging, &index_path))
        .map_err(|source| {
            let _ = std::fs::remove_file(&staging);
            MirrorError::Fetch(FetchError::Transfer {
                path: index_path.clone(),
                source,
            })
        })?;
    Ok((records.len(), index_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apkindex::fake_artifact;
    use mockito::{Matcher, Mock, Server, ServerGuard};

    struct Fixture {
        server: ServerGuard,
        out: tempfile::TempDir,
        _index: Mock,
    }

    impl Fixture {
        async fn with_index(entries: &[(&str, &str)]) -> Self {
            let mut server = Server::new_async().await;
            let records: Vec<PackageRecord> = entries
                .iter()
                .map(|(name, version)| PackageRecord::new(*name, *version, "x86_64"))
                .collect();
            let index = server
                .mock("GET", "/os/x86_64/APKINDEX.tar.gz")
                .with_status(200)
                .with_body(apkindex::write_index(&records).unwrap())
                .create_async()
                .await;
            Self {
                server,
                out: tempfile::tempdir().unwrap(),
                _index: index,
            }
        }

        async fn artifact(&mut self, name: &str, version: &str, hits: usize) -> Mock {
            self.server
                .mock("GET", format!("/os/x86_64/{name}-{version}.apk").as_str())
                .with_status(200)
                .with_body(fake_artifact(name, version, "x86_64"))
                .expect(hits)
                .create_async()
                .await
        }

        fn target(&self) -> ArchTarget {
            let base = format!("{}/os", self.server.url());
            ArchTarget {
                arch: "x86_64".into(),
                index: IndexSource::for_repository(&base, "x86_64"),
                source: ArtifactSource::Http {
                    client: reqwest::Client::new(),
                    base_url: base,
                    auth: None,
                }
                .scoped("x86_64"),
            }
        }

        fn request(&self, packages: &[&str], latest: bool) -> MirrorRequest {
            MirrorRequest {
                packages: packages.iter().map(|p| p.to_string()).collect(),
                latest,
                out_dir: self.out.path().to_path_buf(),
                max_parallel: None,
            }
        }

        fn arch_dir(&self) -> PathBuf {
            self.out.path().join("x86_64")
        }

        fn local_index(&self) -> Vec<PackageRecord> {
            let bytes = std::fs::read(self.arch_dir().join(INDEX_FILENAME)).unwrap();
            apkindex::parse_index(&bytes).unwrap()
        }
    }

    fn synchronizer() -> Synchronizer {
        Synchronizer::new(reqwest::Client::new(), None, Arc::new(Logger::quiet()))
    }

    fn filenames(records: &[PackageRecord]) -> Vec<String> {
        records.iter().map(PackageRecord::filename).collect()
    }

    #[tokio::test]
    async fn latest_of_named_package_only() {
        let mut fx =
            Fixture::with_index(&[("curl", "8.1.0"), ("curl", "8.2.0"), ("wget", "1.21.0")]).await;
        let new_curl = fx.artifact("curl", "8.2.0", 1).await;
        let old_curl = fx.artifact("curl", "8.1.0", 0).await;
        let wget = fx.artifact("wget", "1.21.0", 0).await;

        let report = synchronizer()
            .run(&fx.request(&["curl"], true), &fx.target())
            .await
            .unwrap();

        assert_eq!(report.desired, 1);
        assert_eq!(report.fetched, 1);
        assert_eq!(filenames(&fx.local_index()), vec!["curl-8.2.0.apk"]);
        new_curl.assert_async().await;
        old_curl.assert_async().await;
        wget.assert_async().await;
    }

    #[tokio::test]
    async fn revision_selects_newest_build() {
        let mut fx = Fixture::with_index(&[("foo", "1.0-r1"), ("foo", "1.0-r2")]).await;
        let r1 = fx.artifact("foo", "1.0-r1", 0).await;
        let r2 = fx.artifact("foo", "1.0-r2", 1).await;

        let sync = synchronizer();
        let request = fx.request(&[], true);
        let desired = sync.resolve(&request, &fx.target()).await.unwrap();
        assert_eq!(filenames(&desired), vec!["foo-1.0-r2.apk"]);

        sync.run(&request, &fx.target()).await.unwrap();
        r1.assert_async().await;
        r2.assert_async().await;
    }

    #[tokio::test]
    async fn unmatched_filter_fails_without_creating_directories() {
        let fx = Fixture::with_index(&[("curl", "8.2.0")]).await;
        let err = synchronizer()
            .run(&fx.request(&["zsh"], true), &fx.target())
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::NoPackagesFound { ref filter, .. } if filter == "zsh"));
        assert!(!fx.arch_dir().exists());
    }

    #[tokio::test]
    async fn present_artifact_is_not_fetched_but_indexed() {
        let mut fx = Fixture::with_index(&[("bar", "2.0")]).await;
        let bar = fx.artifact("bar", "2.0", 0).await;
        std::fs::create_dir_all(fx.arch_dir()).unwrap();
        std::fs::write(
            fx.arch_dir().join("bar-2.0.apk"),
            fake_artifact("bar", "2.0", "x86_64"),
        )
        .unwrap();

        let report = synchronizer()
            .run(&fx.request(&["bar"], false), &fx.target())
            .await
            .unwrap();

        assert_eq!((report.fetched, report.skipped, report.indexed), (0, 1, 1));
        assert_eq!(filenames(&fx.local_index()), vec!["bar-2.0.apk"]);
        bar.assert_async().await;
    }

    #[tokio::test]
    async fn second_run_fetches_nothing_and_reproduces_index() {
        let mut fx = Fixture::with_index(&[("curl", "8.2.0"), ("wget", "1.21.0")]).await;
        let curl = fx.artifact("curl", "8.2.0", 1).await;
        let wget = fx.artifact("wget", "1.21.0", 1).await;
        let sync = synchronizer();
        let request = fx.request(&[], false);

        let first = sync.run(&request, &fx.target()).await.unwrap();
        let first_index = std::fs::read(&first.index_path).unwrap();
        let second = sync.run(&request, &fx.target()).await.unwrap();
        let second_index = std::fs::read(&second.index_path).unwrap();

        assert_eq!(first.fetched, 2);
        assert_eq!((second.fetched, second.skipped), (0, 2));
        assert_eq!(first_index, second_index);
        curl.assert_async().await;
        wget.assert_async().await;
    }

    #[tokio::test]
    async fn rebuild_counts_fetched_plus_leftovers() {
        let mut fx = Fixture::with_index(&[("curl", "8.2.0"), ("wget", "1.21.0")]).await;
        let _curl = fx.artifact("curl", "8.2.0", 1).await;
        let _wget = fx.artifact("wget", "1.21.0", 1).await;
        std::fs::create_dir_all(fx.arch_dir()).unwrap();
        std::fs::write(
            fx.arch_dir().join("legacy-0.9.apk"),
            fake_artifact("legacy", "0.9", "x86_64"),
        )
        .unwrap();
        std::fs::write(fx.arch_dir().join("README"), b"not an artifact").unwrap();
        std::fs::write(fx.arch_dir().join("broken-1.0.apk"), b"garbage").unwrap();

        let report = synchronizer()
            .run(&fx.request(&[], true), &fx.target())
            .await
            .unwrap();

        assert_eq!(report.indexed, 3);
        assert_eq!(
            filenames(&fx.local_index()),
            vec!["curl-8.2.0.apk", "legacy-0.9.apk", "wget-1.21.0.apk"]
        );
    }

    #[tokio::test]
    async fn fetch_failure_publishes_no_index() {
        let mut fx = Fixture::with_index(&[("curl", "8.2.0"), ("wget", "1.21.0")]).await;
        let _curl = fx.artifact("curl", "8.2.0", 1).await;
        let _wget = fx
            .server
            .mock("GET", "/os/x86_64/wget-1.21.0.apk")
            .with_status(500)
            .create_async()
            .await;

        let err = synchronizer()
            .run(&fx.request(&[], false), &fx.target())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            MirrorError::Fetch(FetchError::Status { status: 500, .. })
        ));
        assert!(!fx.arch_dir().join(INDEX_FILENAME).exists());
    }

    #[tokio::test]
    async fn queued_fetches_are_abandoned_after_a_failure() {
        let mut fx = Fixture::with_index(&[("a", "1"), ("b", "1"), ("c", "1")]).await;
        let failing = fx
            .server
            .mock("GET", "/os/x86_64/a-1.apk")
            .with_status(500)
            .expect(1)
            .create_async()
            .await;
        let b = fx.artifact("b", "1", 0).await;
        let c = fx.artifact("c", "1", 0).await;
        let mut request = fx.request(&[], false);
        request.max_parallel = Some(1);

        let err = synchronizer().run(&request, &fx.target()).await.unwrap_err();

        assert!(matches!(
            err,
            MirrorError::Fetch(FetchError::Status { status: 500, .. })
        ));
        failing.assert_async().await;
        b.assert_async().await;
        c.assert_async().await;
        assert!(!fx.arch_dir().join("b-1.apk").exists());
        assert!(!fx.arch_dir().join(INDEX_FILENAME).exists());
    }

    #[tokio::test]
    async fn index_names_cannot_escape_the_output_directory() {
        let mut fx = Fixture::with_index(&[("../../evil", "1"), ("curl", "8.2.0")]).await;
        let curl = fx.artifact("curl", "8.2.0", 1).await;
        let evil = fx
            .server
            .mock("GET", Matcher::Regex("evil".into()))
            .with_status(200)
            .with_body(fake_artifact("evil", "1", "x86_64"))
            .expect(0)
            .create_async()
            .await;
        let mut request = fx.request(&[], false);
        request.out_dir = fx.out.path().join("mirror").join("out");

        let sync = synchronizer();
        let desired = sync.resolve(&request, &fx.target()).await.unwrap();
        assert_eq!(filenames(&desired), vec!["curl-8.2.0.apk"]);

        let report = sync.run(&request, &fx.target()).await.unwrap();
        assert_eq!((report.desired, report.fetched, report.indexed), (1, 1, 1));
        assert!(!fx.out.path().join("mirror").join("evil-1.apk").exists());
        assert!(!fx.out.path().join("evil-1.apk").exists());
        curl.assert_async().await;
        evil.assert_async().await;
    }

    #[test]
    fn rebuild_skips_artifacts_whose_control_data_disagrees() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("foo-1.0.apk"),
            fake_artifact("foo", "1.0-r0", "x86_64"),
        )
        .unwrap();
        std::fs::write(
            dir.path().join("bar-2.0.apk"),
            fake_artifact("bar", "2.0", "x86_64"),
        )
        .unwrap();

        let (indexed, index_path) = rebuild_index(dir.path(), &Logger::quiet()).unwrap();
        let records = apkindex::parse_index(&std::fs::read(index_path).unwrap()).unwrap();

        assert_eq!(indexed, 1);
        assert_eq!(filenames(&records), vec!["bar-2.0.apk"]);
    }

    #[tokio::test]
    async fn bounded_fan_out_still_fetches_everything() {
        let mut fx = Fixture::with_index(&[("a", "1"), ("b", "1"), ("c", "1")]).await;
        let mut mocks = Vec::new();
        for name in ["a", "b", "c"] {
            mocks.push(fx.artifact(name, "1", 1).await);
        }
        let mut request = fx.request(&[], false);
        request.max_parallel = Some(1);

        let report = synchronizer().run(&request, &fx.target()).await.unwrap();
        assert_eq!((report.fetched, report.indexed), (3, 3));
        for mock in mocks {
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn unreachable_index_is_fatal() {
        let out = tempfile::tempdir().unwrap();
        let target = ArchTarget {
            arch: "x86_64".into(),
            index: IndexSource::Local(out.path().join("missing").join(INDEX_FILENAME)),
            source: ArtifactSource::Local {
                root: out.path().to_path_buf(),
            },
        };
        let request = MirrorRequest {
            packages: Vec::new(),
            latest: false,
            out_dir: out.path().join("mirror"),
            max_parallel: None,
        };

        let results = mirror_all(&synchronizer(), &request, &[target]).await;
        assert!(matches!(
            results,
            Err(MirrorError::Fetch(FetchError::NotFound { .. }))
        ));
    }
}
