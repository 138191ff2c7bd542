//! Result sink
//!
//! Collects the terminal outcome of every request. Successful payloads are
//! kept in memory or written one file per URL; requests and failures are
//! kept on the side so the fetcher can update the failure store.

use crate::state::{FetchFailure, FetchOutcome, FetchRequest, Payload, PayloadKind};
use crate::Result;
use sha2::{Digest, Sha256};
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Where successful payloads go
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SinkMode {
    /// Keep decoded payloads and return them
    #[default]
    Memory,
    /// Write each payload to `dir` and return the file paths
    Files { dir: PathBuf },
}

/// A payload kept in memory together with the URL it came from
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPayload {
    pub url: String,
    pub payload: Payload,
}

/// Successful results of a run
///
/// The length is however many URLs succeeded, which can be lower than the
/// number requested.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResults {
    Payloads(Vec<FetchedPayload>),
    Files(Vec<PathBuf>),
}

impl FetchResults {
    pub fn len(&self) -> usize {
        match self {
            Self::Payloads(payloads) => payloads.len(),
            Self::Files(paths) => paths.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn payloads(&self) -> Option<&[FetchedPayload]> {
        match self {
            Self::Payloads(payloads) => Some(payloads),
            Self::Files(_) => None,
        }
    }

    pub fn files(&self) -> Option<&[PathBuf]> {
        match self {
            Self::Payloads(_) => None,
            Self::Files(paths) => Some(paths),
        }
    }
}

/// Everything the sink gathered during a run
#[derive(Debug)]
pub struct SinkContents {
    pub results: FetchResults,
    pub succeeded: Vec<FetchRequest>,
    pub failures: Vec<FetchFailure>,
}

#[derive(Debug, Default)]
struct SinkBuffer {
    payloads: Vec<FetchedPayload>,
    files: Vec<PathBuf>,
    succeeded: Vec<FetchRequest>,
    failures: Vec<FetchFailure>,
}

#[derive(Debug)]
pub struct ResultSink {
    mode: SinkMode,
    buffer: Mutex<SinkBuffer>,
}

impl ResultSink {
    pub fn new(mode: SinkMode) -> Self {
        Self {
            mode,
            buffer: Mutex::new(SinkBuffer::default()),
        }
    }

    /// Accepts the terminal outcome of one request
    ///
    /// In file mode the payload is written before the outcome is recorded;
    /// a write error is returned to the caller.
    pub async fn collect(&self, outcome: FetchOutcome) -> Result<()> {
        match outcome {
            FetchOutcome::Success { request, payload } => match &self.mode {
                SinkMode::Memory => {
                    let mut buffer = self.lock();
                    buffer.payloads.push(FetchedPayload {
                        url: request.url.clone(),
                        payload,
                    });
                    buffer.succeeded.push(request);
                }
                SinkMode::Files { dir } => {
                    let path = write_payload(dir, &request.url, &payload).await?;
                    let mut buffer = self.lock();
                    buffer.files.push(path);
                    buffer.succeeded.push(request);
                }
            },
            FetchOutcome::Failure(failure) => {
                self.lock().failures.push(failure);
            }
        }
        Ok(())
    }

    /// Takes everything collected so far
    ///
    /// Failed outcomes are not part of `results`.
    pub fn finalize(&self) -> SinkContents {
        let mut buffer = self.lock();
        let results = match self.mode {
            SinkMode::Memory => FetchResults::Payloads(mem::take(&mut buffer.payloads)),
            SinkMode::Files { .. } => FetchResults::Files(mem::take(&mut buffer.files)),
        };

        SinkContents {
            results,
            succeeded: mem::take(&mut buffer.succeeded),
            failures: mem::take(&mut buffer.failures),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SinkBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Content-addressed file name of a URL: `<sha256 hex>.<ext>`
///
/// The same URL always maps to the same file, so reruns overwrite instead
/// of duplicating.
pub fn payload_file_name(url: &str, kind: PayloadKind) -> String {
    let digest = Sha256::digest(url.as_bytes());
    format!("{}.{}", hex::encode(digest), kind.extension())
}

async fn write_payload(dir: &Path, url: &str, payload: &Payload) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;

    let path = dir.join(payload_file_name(url, payload.kind()));
    let bytes = match payload {
        Payload::Json(value) => serde_json::to_vec(value)?,
        Payload::Html(page) => page.html.as_bytes().to_vec(),
    };
    tokio::fs::write(&path, bytes).await?;

    tracing::debug!("Wrote {} to {}", url, path.display());
    Ok(path)
}
