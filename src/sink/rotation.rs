//! Size-based log rotation with timestamped names and gzip compression

use crate::{RelayError, Result};
use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::ffi::OsString;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, error, info};

/// Timestamp format used in rotated file names
pub const ROTATION_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Default extension retained across the rotation rename
pub const DEFAULT_EXTENSION: &str = ".jsonl";

/// Size bookkeeping for one active log file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationState {
    /// Active file path
    pub path: PathBuf,
    /// Bytes currently in the active file
    pub size: u64,
    /// Size at which the active file is rotated; 0 disables rotation
    pub threshold: u64,
    /// Compressed archives produced by this writer, oldest first
    pub rotated: Vec<PathBuf>,
}

/// Lifecycle of a [`RotatingFileWriter`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriterState {
    /// Accepting appends
    Open,
    /// In the middle of a rotation
    Rotating,
    /// A rotation failed; appends are refused until [`RotatingFileWriter::recover`]
    Failed(String),
    /// Closed by the owner
    Closed,
}

// Where an interrupted rotation has to resume.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Stage {
    Rename,
    Compress(PathBuf),
    Reopen,
}

/// Append-only log file that rotates once it reaches a size threshold.
///
/// On rotation the active file is renamed to
/// `<name-without-ext>.<YYYY-MM-DD_HH-MM-SS>[.<n>]<ext>`, gzip-compressed into a
/// `.gz` sibling, the uncompressed copy is removed and a fresh file is opened
/// at the original path. Archives are never pruned.
///
/// The writer is not internally synchronised; callers share it behind a mutex.
pub struct RotatingFileWriter {
    state: RotationState,
    extension: String,
    file: Option<BufWriter<File>>,
    status: WriterState,
    stage: Option<Stage>,
}

impl RotatingFileWriter {
    /// Open (or create) the active file in append mode
    pub async fn open(
        path: impl Into<PathBuf>,
        threshold: u64,
        extension: impl Into<String>,
    ) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let (file, size) = open_append(&path).await?;
        debug!(path = %path.display(), size, threshold, "Opened log file");

        Ok(Self {
            state: RotationState {
                path,
                size,
                threshold,
                rotated: Vec::new(),
            },
            extension: extension.into(),
            file: Some(file),
            status: WriterState::Open,
            stage: None,
        })
    }

    /// Current rotation bookkeeping
    pub fn state(&self) -> &RotationState {
        &self.state
    }

    /// Current lifecycle state
    pub fn status(&self) -> &WriterState {
        &self.status
    }

    /// Active file path
    pub fn path(&self) -> &Path {
        &self.state.path
    }

    /// Append one line, rotating afterwards if the threshold was reached.
    ///
    /// A missing trailing newline is added. Rotation errors are returned to the
    /// caller and leave the writer in [`WriterState::Failed`].
    pub async fn append(&mut self, line: &str) -> Result<()> {
        self.ensure_writable()?;

        let file = self.file.as_mut().ok_or_else(|| RelayError::SinkFailed {
            path: self.state.path.clone(),
            reason: "active file is not open".to_string(),
        })?;

        match write_line(file, line).await {
            Ok(written) => self.state.size += written,
            Err(e) => {
                self.resync_after_write_error(&e).await;
                return Err(e.into());
            }
        }

        if self.should_rotate() {
            self.rotate().await?;
        }
        Ok(())
    }

    /// Rotate the active file now, returning the compressed archive path
    pub async fn rotate(&mut self) -> Result<PathBuf> {
        self.ensure_writable()?;
        self.stage = Some(Stage::Rename);
        self.resume_rotation().await
    }

    /// Finish an interrupted rotation and reopen the active file.
    ///
    /// Does nothing on a healthy writer. Returns the archive path when a
    /// rotation was completed.
    pub async fn recover(&mut self) -> Result<Option<PathBuf>> {
        match self.status {
            WriterState::Open => return Ok(None),
            WriterState::Closed => return Err(self.refused("writer is closed")),
            WriterState::Failed(_) | WriterState::Rotating => {}
        }

        if self.stage.is_none() {
            self.stage = Some(Stage::Reopen);
        }
        let archive = self.resume_rotation().await?;
        info!(path = %self.state.path.display(), "Log file writer recovered");
        Ok(Some(archive).filter(|p| !p.as_os_str().is_empty()))
    }

    /// Flush and close the active file; later appends are refused
    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.shutdown().await?;
        }
        self.status = WriterState::Closed;
        Ok(())
    }

    // A partial write leaves an unknown number of bytes on disk and possibly
    // more in the buffer. Reopen so buffered bytes are discarded and the size
    // matches the file again.
    async fn resync_after_write_error(&mut self, cause: &io::Error) {
        self.file = None;
        match open_append(&self.state.path).await {
            Ok((file, size)) => {
                self.file = Some(file);
                self.state.size = size;
            }
            Err(e) => {
                error!(
                    path = %self.state.path.display(),
                    write_error = %cause,
                    error = %e,
                    "Could not reopen log file after failed write"
                );
                self.status = WriterState::Failed(e.to_string());
            }
        }
    }

    fn should_rotate(&self) -> bool {
        self.state.threshold > 0 && self.state.size >= self.state.threshold
    }

    fn ensure_writable(&self) -> Result<()> {
        match &self.status {
            WriterState::Open => Ok(()),
            WriterState::Failed(reason) => Err(self.refused(&format!("rotation failed: {}", reason))),
            WriterState::Rotating => Err(self.refused("rotation was interrupted")),
            WriterState::Closed => Err(self.refused("writer is closed")),
        }
    }

    fn refused(&self, reason: &str) -> RelayError {
        RelayError::SinkFailed {
            path: self.state.path.clone(),
            reason: reason.to_string(),
        }
    }

    async fn resume_rotation(&mut self) -> Result<PathBuf> {
        self.status = WriterState::Rotating;
        match self.run_stages().await {
            Ok(archive) => {
                self.status = WriterState::Open;
                Ok(archive)
            }
            Err(source) => {
                error!(
                    path = %self.state.path.display(),
                    error = %source,
                    "Log rotation failed, refusing further writes"
                );
                self.status = WriterState::Failed(source.to_string());
                Err(RelayError::RotationFailure {
                    path: self.state.path.clone(),
                    source,
                })
            }
        }
    }

    // Each stage records the next one before doing work, so a failure leaves
    // `self.stage` pointing at the step to retry.
    async fn run_stages(&mut self) -> io::Result<PathBuf> {
        let mut archive = PathBuf::new();

        while let Some(stage) = self.stage.clone() {
            match stage {
                Stage::Rename => {
                    if let Some(mut file) = self.file.take() {
                        file.flush().await?;
                        file.shutdown().await?;
                    }
                    let target = self.rotated_name(Utc::now()).await?;
                    fs::rename(&self.state.path, &target).await?;
                    debug!(from = %self.state.path.display(), to = %target.display(), "Renamed log file");
                    self.stage = Some(Stage::Compress(target));
                }
                Stage::Compress(source) => {
                    let gz = tokio::task::spawn_blocking(move || compress_file(&source))
                        .await
                        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;
                    info!(archive = %gz.display(), "Compressed rotated log file");
                    self.state.rotated.push(gz.clone());
                    archive = gz;
                    self.stage = Some(Stage::Reopen);
                }
                Stage::Reopen => {
                    let (file, size) = open_append(&self.state.path).await?;
                    self.file = Some(file);
                    self.state.size = size;
                    self.stage = None;
                }
            }
        }

        Ok(archive)
    }

    async fn rotated_name(&self, now: DateTime<Utc>) -> io::Result<PathBuf> {
        let stamp = now.format(ROTATION_TIMESTAMP_FORMAT).to_string();
        let base = self.base_name();
        let parent = self.state.path.parent().unwrap_or_else(|| Path::new(""));

        let mut counter = 0u32;
        loop {
            let name = if counter == 0 {
                format!("{}.{}{}", base, stamp, self.extension)
            } else {
                format!("{}.{}.{}{}", base, stamp, counter, self.extension)
            };
            let candidate = parent.join(name);
            let taken = fs::try_exists(&candidate).await?
                || fs::try_exists(gz_path(&candidate)).await?;
            if !taken {
                return Ok(candidate);
            }
            counter += 1;
        }
    }

    fn base_name(&self) -> String {
        let name = self
            .state
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if self.extension.is_empty() {
            return name;
        }
        match name.strip_suffix(self.extension.as_str()) {
            Some(stem) => stem.to_string(),
            None => name,
        }
    }
}

async fn write_line(file: &mut BufWriter<File>, line: &str) -> io::Result<u64> {
    file.write_all(line.as_bytes()).await?;
    let mut written = line.len() as u64;
    if !line.ends_with('\n') {
        file.write_all(b"\n").await?;
        written += 1;
    }
    file.flush().await?;
    Ok(written)
}

async fn open_append(path: &Path) -> io::Result<(BufWriter<File>, u64)> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    let size = file.metadata().await?.len();
    Ok((BufWriter::new(file), size))
}

fn gz_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".gz");
    PathBuf::from(name)
}

/// Gzip `source` into `<source>.gz` and remove `source` once the archive is complete
pub fn compress_file(source: &Path) -> io::Result<PathBuf> {
    let target = gz_path(source);

    let mut input = std::fs::File::open(source)?;
    let output = std::io::BufWriter::new(std::fs::File::create(&target)?);
    let mut encoder = GzEncoder::new(output, Compression::default());
    io::copy(&mut input, &mut encoder)?;

    let mut output = encoder.finish()?;
    output.flush()?;
    output.get_ref().sync_all()?;

    std::fs::remove_file(source)?;
    Ok(target)
}
