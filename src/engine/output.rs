//! Crash-safe output files
//!
//! Every output of a run is staged as a temporary sibling of its destination
//! before any input is read, so an unusable output directory fails the run
//! up front. At the end all contents are written and fsynced first, and only
//! then renamed over their destinations. A failure while writing leaves every
//! previous file untouched; temporaries are removed when dropped.

use super::errors::{ProbeStatError, Result};
use super::report::{retry_file_text, ReportDocument};
use super::retry::RetrySet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Temporary file reserved next to its final destination
#[derive(Debug)]
pub struct StagedFile {
    dest: PathBuf,
    tmp: NamedTempFile,
}

impl StagedFile {
    pub fn create(dest: &Path) -> Result<Self> {
        let dir = parent_dir(dest);
        let tmp = NamedTempFile::new_in(dir).map_err(|e| ProbeStatError::io(dir, e))?;
        debug!(dest = %dest.display(), tmp = %tmp.path().display(), "Staged output");
        Ok(Self {
            dest: dest.to_path_buf(),
            tmp,
        })
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Write and fsync the contents without publishing them
    fn fill(&mut self, contents: &[u8]) -> Result<()> {
        let tmp = &mut self.tmp;
        tmp.write_all(contents)
            .and_then(|_| tmp.flush())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| ProbeStatError::io(tmp.path(), e))
    }

    /// Rename over the destination
    fn publish(self) -> Result<PathBuf> {
        let dest = self.dest;
        self.tmp
            .persist(&dest)
            .map_err(|e| ProbeStatError::io(&dest, e.error))?;
        Ok(dest)
    }
}

#[cfg(unix)]
fn sync_directory(dir: &Path) -> Result<()> {
    std::fs::File::open(dir)
        .and_then(|handle| handle.sync_all())
        .map_err(|e| ProbeStatError::io(dir, e))
}

#[cfg(not(unix))]
fn sync_directory(_dir: &Path) -> Result<()> {
    Ok(())
}

/// Write and fsync every staged file, then rename them all
///
/// Nothing is renamed unless every write succeeded.
fn publish_all(files: Vec<(StagedFile, Vec<u8>)>) -> Result<()> {
    let mut filled = Vec::with_capacity(files.len());
    for (mut file, contents) in files {
        file.fill(&contents)?;
        filled.push(file);
    }

    let mut dirs: Vec<PathBuf> = Vec::new();
    for file in filled {
        let dest = file.publish()?;
        let dir = parent_dir(&dest).to_path_buf();
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
    for dir in &dirs {
        sync_directory(dir)?;
    }
    Ok(())
}

/// Atomically replace `path` with `contents`
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    publish_all(vec![(StagedFile::create(path)?, contents.to_vec())])
}

/// Destinations for one run: retry file, AS summary, optional JSON report
#[derive(Debug)]
pub struct RunOutputs {
    retry: StagedFile,
    as_summary: StagedFile,
    report_json: Option<StagedFile>,
}

impl RunOutputs {
    /// Reserve every destination; fails if any directory is unusable
    pub fn stage(retry: &Path, as_summary: &Path, report_json: Option<&Path>) -> Result<Self> {
        Ok(Self {
            retry: StagedFile::create(retry)?,
            as_summary: StagedFile::create(as_summary)?,
            report_json: report_json.map(StagedFile::create).transpose()?,
        })
    }

    /// Render and publish all outputs together
    pub fn commit(self, retries: &RetrySet, report: &ReportDocument) -> Result<()> {
        let retry_path = self.retry.dest().to_path_buf();
        let summary_path = self.as_summary.dest().to_path_buf();
        let json_path = self.report_json.as_ref().map(|f| f.dest().to_path_buf());

        let mut files = vec![
            (self.retry, retry_file_text(retries).into_bytes()),
            (self.as_summary, report.to_as_summary_text().into_bytes()),
        ];
        if let Some(json_file) = self.report_json {
            let mut json = serde_json::to_vec_pretty(report)?;
            json.push(b'\n');
            files.push((json_file, json));
        }

        publish_all(files)?;

        info!(path = %retry_path.display(), keys = retries.len(), "Wrote retry file");
        info!(
            path = %summary_path.display(),
            buckets = report.as_buckets.len(),
            unknown = report.unknown_asn_ips.len(),
            "Wrote AS summary"
        );
        if let Some(path) = json_path {
            info!(path = %path.display(), "Wrote JSON report");
        }
        Ok(())
    }
}
