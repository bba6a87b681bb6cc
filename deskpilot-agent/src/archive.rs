//! Per-run screenshot archive.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use deskpilot_core::FrameArchive;

/// Writes `step001.png`, `step002.png`, … into `<folder>/run_YYYYMMDD_HHMMSS/`.
///
/// The run directory is created up front so a bad dump folder is reported
/// at startup rather than on the first iteration.
#[derive(Debug)]
pub struct DumpArchive {
    run_dir: PathBuf,
    written: u64,
}

impl DumpArchive {
    /// Create a run directory stamped with the current local time.
    pub fn create(folder: &Path) -> std::io::Result<Self> {
        Self::create_at(folder, Local::now())
    }

    pub fn create_at(folder: &Path, started: DateTime<Local>) -> std::io::Result<Self> {
        let run_dir = folder.join(started.format("run_%Y%m%d_%H%M%S").to_string());
        std::fs::create_dir_all(&run_dir)?;
        tracing::info!("archiving screenshots to {}", run_dir.display());
        Ok(Self {
            run_dir,
            written: 0,
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Screenshots stored so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn path_for(&self, step: u64) -> PathBuf {
        self.run_dir.join(format!("step{step:03}.png"))
    }
}

impl FrameArchive for DumpArchive {
    fn store(&mut self, step: u64, png: &[u8]) -> std::io::Result<()> {
        let path = self.path_for(step);
        std::fs::write(&path, png)?;
        self.written += 1;
        tracing::debug!(step, bytes = png.len(), "stored {}", path.display());
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
