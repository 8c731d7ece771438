//! In-memory stand-ins for the archive, converter and document store
//!
//! Each fake records what it was asked to do so tests can assert on call
//! counts and ordering.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use dcm2pdf::convert::{ConversionError, ConversionStage, Converter};
use dcm2pdf::fetch::{FetchError, FetchStage, RemoteArchive, RemoteSession};
use dcm2pdf::persist::{ArtifactStore, PersistenceError};
use dcm2pdf::{BatchItem, BatchOrchestrator};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,dcm2pdf=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// The three-study manifest used throughout
pub fn manifest() -> Vec<BatchItem> {
    vec![
        BatchItem::new("a/1.src", "ACC1"),
        BatchItem::new("a/2.src", "ACC2"),
        BatchItem::new("a/3.src", "ACC3"),
    ]
}

#[derive(Default)]
pub struct ArchiveLog {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub downloads: Mutex<Vec<String>>,
}

impl ArchiveLog {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Serves `remote path -> bytes`; paths in `broken` fail mid-transfer
pub struct FakeArchive {
    pub files: HashMap<String, Vec<u8>>,
    pub broken: HashSet<String>,
    pub log: Arc<ArchiveLog>,
}

impl FakeArchive {
    /// Every manifest entry present under `/archive`, none broken
    pub fn with_manifest(items: &[BatchItem]) -> Self {
        let files = items
            .iter()
            .map(|item| {
                (
                    format!("/archive/{}", item.remote_locator),
                    format!("DICM {}", item.identifier).into_bytes(),
                )
            })
            .collect();

        Self {
            files,
            broken: HashSet::new(),
            log: Arc::new(ArchiveLog::default()),
        }
    }

    pub fn breaking(mut self, remote_path: &str) -> Self {
        self.broken.insert(remote_path.to_string());
        self
    }
}

struct FakeSession {
    files: HashMap<String, Vec<u8>>,
    broken: HashSet<String>,
    log: Arc<ArchiveLog>,
}

#[async_trait]
impl RemoteArchive for FakeArchive {
    async fn open_session(&self) -> Result<Box<dyn RemoteSession>, FetchError> {
        self.log.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            files: self.files.clone(),
            broken: self.broken.clone(),
            log: self.log.clone(),
        }))
    }
}

#[async_trait]
impl RemoteSession for FakeSession {
    async fn download(&mut self, remote_path: &str, local_path: &Path) -> Result<u64, FetchError> {
        self.log.downloads.lock().unwrap().push(remote_path.to_string());

        let bytes = self
            .files
            .get(remote_path)
            .ok_or_else(|| FetchError::Transfer(format!("No such file: {}", remote_path)))?;

        if self.broken.contains(remote_path) {
            std::fs::write(local_path, &bytes[..bytes.len() / 2])?;
            return Err(FetchError::Transfer("network error: connection reset".into()));
        }

        std::fs::write(local_path, bytes)?;
        Ok(bytes.len() as u64)
    }

    async fn close(self: Box<Self>) -> Result<(), FetchError> {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Writes `%PDF-` plus the source bytes; sources whose stem is in `reject`
/// fail like a converter exiting non-zero
#[derive(Default)]
pub struct FakeConverter {
    pub reject: HashSet<String>,
    pub calls: Mutex<Vec<PathBuf>>,
}

impl FakeConverter {
    pub fn rejecting(identifier: &str) -> Self {
        Self {
            reject: [identifier.to_string()].into_iter().collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Converter for FakeConverter {
    async fn convert(&self, source: &Path, destination: &Path) -> Result<(), ConversionError> {
        self.calls.lock().unwrap().push(source.to_path_buf());

        let stem = source.file_stem().unwrap().to_string_lossy().into_owned();
        if self.reject.contains(&stem) {
            return Err(ConversionError::Exit {
                code: Some(1),
                stderr: format!("cannot parse {}", stem),
            });
        }

        let mut pdf = b"%PDF-".to_vec();
        pdf.extend(std::fs::read(source)?);
        std::fs::write(destination, pdf)?;
        Ok(())
    }
}

/// Rows kept in insertion order
#[derive(Default)]
pub struct MemoryStore {
    pub rows: Mutex<Vec<(String, String)>>,
}

impl MemoryStore {
    pub fn filenames(&self) -> Vec<String> {
        self.rows.lock().unwrap().iter().map(|(f, _)| f.clone()).collect()
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn persist(&self, filename: &str, encoded_content: &str) -> Result<(), PersistenceError> {
        self.rows
            .lock()
            .unwrap()
            .push((filename.to_string(), encoded_content.to_string()));
        Ok(())
    }
}

/// A wired pipeline rooted in a temp directory
pub struct Harness {
    pub dir: tempfile::TempDir,
    pub archive_log: Arc<ArchiveLog>,
    pub converter: Arc<FakeConverter>,
    pub store: Arc<MemoryStore>,
    pub orchestrator: BatchOrchestrator,
}

impl Harness {
    pub fn new(items: Vec<BatchItem>, archive: FakeArchive, converter: FakeConverter) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let archive_log = archive.log.clone();
        let converter = Arc::new(converter);
        let store = Arc::new(MemoryStore::default());

        let fetch = FetchStage::new(Arc::new(archive), "/archive", dir.path().join("downloads"), "dcm").unwrap();
        let convert = ConversionStage::new(
            converter.clone(),
            store.clone(),
            dir.path().join("pdfs"),
            "dcm",
            "pdf",
        )
        .unwrap();

        Self {
            dir,
            archive_log,
            converter,
            store,
            orchestrator: BatchOrchestrator::new(Arc::new(items), fetch, convert),
        }
    }

    pub fn staging(&self) -> PathBuf {
        self.dir.path().join("downloads")
    }

    pub fn output(&self) -> PathBuf {
        self.dir.path().join("pdfs")
    }
}
