pub mod native;
pub mod rsync;

use crate::error::Result;
use crate::path::SyncPath;
use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use native::NativeEngine;
pub use rsync::RsyncEngine;

/// One flag understood by every engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOption {
    /// Recurse and preserve attributes (mtime, permissions, links)
    Archive,
    /// List every transferred or deleted entry
    Verbose,
    /// Remove destination entries that are absent from the source
    Delete,
    /// Report what would change without touching the filesystem
    DryRun,
    /// Leave matching entries alone on both sides
    Exclude(String),
}

/// Ordered option list shared by both directional passes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionSet {
    options: Vec<EngineOption>,
}

impl OptionSet {
    /// Archive + verbose + delete, then dry-run when requested, then excludes
    pub fn new(dry_run: bool, exclude: &[String]) -> Self {
        let mut options = vec![
            EngineOption::Archive,
            EngineOption::Verbose,
            EngineOption::Delete,
        ];
        if dry_run {
            options.push(EngineOption::DryRun);
        }
        options.extend(exclude.iter().cloned().map(EngineOption::Exclude));
        Self { options }
    }

    pub fn iter(&self) -> impl Iterator<Item = &EngineOption> {
        self.options.iter()
    }

    pub fn contains(&self, option: &EngineOption) -> bool {
        self.options.contains(option)
    }

    pub fn is_dry_run(&self) -> bool {
        self.contains(&EngineOption::DryRun)
    }

    pub fn excludes(&self) -> impl Iterator<Item = &str> {
        self.options.iter().filter_map(|option| match option {
            EngineOption::Exclude(pattern) => Some(pattern.as_str()),
            _ => None,
        })
    }
}

/// Outcome of one directional pass
///
/// A failed sync is a normal result, not an error: `success` is false and
/// the engine's diagnostics are kept verbatim in `stderr`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResult {
    pub success: bool,
    /// None when the engine was killed by a signal or never started
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl SyncResult {
    pub fn from_exit(exit_code: Option<i32>, stdout: String, stderr: String) -> Self {
        Self {
            success: exit_code == Some(0),
            exit_code,
            stdout,
            stderr,
        }
    }

    /// The engine exists but could not be started (e.g. permission denied)
    pub fn launch_failure(message: String) -> Self {
        Self {
            success: false,
            exit_code: None,
            stdout: String::new(),
            stderr: message,
        }
    }
}

/// Tree-mirroring capability used for each directional pass
///
/// Implementations copy changed content from `source` into `destination`
/// according to `options` and must not reformat either path. `Err` is
/// reserved for conditions that are not sync failures; an engine that is
/// missing from the host returns `SyncError::EngineUnavailable`.
#[async_trait]
pub trait TransferEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Check that the engine can run at all, before any pass starts
    async fn preflight(&self) -> Result<()> {
        Ok(())
    }

    async fn invoke(
        &self,
        source: &SyncPath,
        destination: &SyncPath,
        options: &OptionSet,
    ) -> Result<SyncResult>;
}

/// Which engine performs the directional passes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// External rsync binary (default)
    #[default]
    Rsync,
    /// Built-in copy-and-prune mirror
    Native,
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineKind::Rsync => write!(f, "rsync"),
            EngineKind::Native => write!(f, "native"),
        }
    }
}

/// Build the engine for `kind`
pub fn build(kind: EngineKind, rsync_path: Option<&Path>) -> Box<dyn TransferEngine> {
    match kind {
        EngineKind::Rsync => Box::new(RsyncEngine::new(rsync_path)),
        EngineKind::Native => Box::new(NativeEngine::new()),
    }
}
