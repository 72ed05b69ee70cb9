use super::{EngineOption, OptionSet, SyncResult, TransferEngine};
use crate::error::{Result, SyncError};
use crate::path::SyncPath;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

/// rsync's "partial transfer due to error" exit code
const PARTIAL_TRANSFER: i32 = 23;

/// Built-in copy-and-prune engine; always available
///
/// Scans both sides, deletes what the source no longer has, then creates or
/// updates whatever differs by size or mtime.
pub struct NativeEngine;

impl NativeEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NativeEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransferEngine for NativeEngine {
    fn name(&self) -> &str {
        "native"
    }

    async fn invoke(
        &self,
        source: &SyncPath,
        destination: &SyncPath,
        options: &OptionSet,
    ) -> Result<SyncResult> {
        let source = source.path().to_path_buf();
        let destination = destination.path().to_path_buf();
        let options = options.clone();

        let outcome = tokio::task::spawn_blocking(move || {
            run_mirror(&source, &destination, &options)
        })
        .await
        .map_err(|e| SyncError::Io(std::io::Error::other(e.to_string())))??;

        tracing::debug!("Native pass finished with {} changes", outcome.stats.changes());

        let result = outcome.into_result();
        for line in result.stdout.lines().filter(|l| !l.is_empty()) {
            tracing::info!(target: "twoway::engine", "{}", line);
        }
        Ok(result)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    File,
    Dir,
    Symlink,
}

#[derive(Debug, Clone)]
struct Entry {
    path: PathBuf,
    kind: EntryKind,
    size: u64,
    modified: SystemTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncAction {
    /// Skip - entry unchanged
    Skip,
    /// Create - missing in destination
    Create,
    /// Update - present but differs (content, mtime or type)
    Update,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MirrorStats {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub bytes: u64,
}

impl MirrorStats {
    pub fn changes(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

/// Everything one pass did (or would do), plus the error that stopped it
#[derive(Debug)]
pub struct MirrorOutcome {
    pub stats: MirrorStats,
    pub listing: Vec<String>,
    pub error: Option<SyncError>,
    verbose: bool,
    dry_run: bool,
}

impl MirrorOutcome {
    fn into_result(self) -> SyncResult {
        let stdout = if self.verbose { self.render() } else { String::new() };
        match self.error {
            None => SyncResult::from_exit(Some(0), stdout, String::new()),
            Some(e) => SyncResult::from_exit(Some(PARTIAL_TRANSFER), stdout, e.to_string()),
        }
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.listing {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(&format!(
            "\ncreated {}, updated {}, deleted {}, {} copied{}\n",
            self.stats.created,
            self.stats.updated,
            self.stats.deleted,
            format_bytes(self.stats.bytes),
            if self.dry_run { " (DRY RUN)" } else { "" }
        ));
        out
    }
}

struct ExcludeRule {
    pattern: glob::Pattern,
    dir_only: bool,
    whole_path: bool,
}

/// rsync-style exclude patterns
///
/// `name` matches the last path component, `dir/name` or `/name` matches the
/// path relative to the tree root, and a trailing `/` restricts the rule to
/// directories.
struct Excludes {
    rules: Vec<ExcludeRule>,
}

impl Excludes {
    fn new<'a>(patterns: impl Iterator<Item = &'a str>) -> Result<Self> {
        let mut rules = Vec::new();
        for raw in patterns {
            let (body, dir_only) = match raw.strip_suffix('/') {
                Some(body) => (body, true),
                None => (raw, false),
            };
            let whole_path = body.contains('/');
            let body = body.trim_start_matches('/');
            let pattern = glob::Pattern::new(body).map_err(|e| SyncError::InvalidPattern {
                pattern: raw.to_string(),
                message: e.to_string(),
            })?;
            rules.push(ExcludeRule {
                pattern,
                dir_only,
                whole_path,
            });
        }
        Ok(Self { rules })
    }

    fn is_excluded(&self, relative: &Path, is_dir: bool) -> bool {
        self.rules.iter().any(|rule| {
            if rule.dir_only && !is_dir {
                return false;
            }
            if rule.whole_path {
                rule.pattern.matches_path(relative)
            } else {
                relative
                    .file_name()
                    .map(|name| rule.pattern.matches(&name.to_string_lossy()))
                    .unwrap_or(false)
            }
        })
    }
}

/// Validate exclude patterns up front
pub fn check_excludes(patterns: &[String]) -> Result<()> {
    Excludes::new(patterns.iter().map(String::as_str)).map(|_| ())
}

/// Scan `root` into a map keyed by path relative to `root`
///
/// Parents sort before their children, so iterating the map in order visits
/// directories before their contents.
fn scan(root: &Path, excludes: &Excludes) -> Result<BTreeMap<PathBuf, Entry>> {
    let mut entries = BTreeMap::new();

    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| match entry.path().strip_prefix(root) {
            Ok(relative) => !excludes.is_excluded(relative, entry.file_type().is_dir()),
            Err(_) => true,
        });

    for result in walker {
        let entry = result.map_err(|e| {
            let path = e
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| root.to_path_buf());
            SyncError::ReadDirError {
                path,
                source: e.into(),
            }
        })?;

        let path = entry.path().to_path_buf();
        let metadata = entry.metadata().map_err(|e| SyncError::ReadDirError {
            path: path.clone(),
            source: e.into(),
        })?;

        let Ok(relative) = path.strip_prefix(root).map(Path::to_path_buf) else {
            continue;
        };

        let file_type = entry.file_type();
        let kind = if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Dir
        } else {
            EntryKind::File
        };

        entries.insert(
            relative,
            Entry {
                kind,
                size: metadata.len(),
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                path,
            },
        );
    }

    Ok(entries)
}

struct Mirror<'a> {
    dest_root: &'a Path,
    dry_run: bool,
    delete: bool,
    archive: bool,
    /// mtime tolerance in seconds (to handle filesystem granularity)
    mtime_tolerance: u64,
    stats: MirrorStats,
    listing: Vec<String>,
    /// (source, destination) directories whose permissions are applied last
    dir_permissions: Vec<(PathBuf, PathBuf)>,
}

impl Mirror<'_> {
    fn run(&mut self, source_root: &Path, excludes: &Excludes) -> Result<()> {
        let source = scan(source_root, excludes)?;
        let dest = if self.dest_root.exists() {
            scan(self.dest_root, excludes)?
        } else {
            if !self.dry_run {
                fs::create_dir_all(self.dest_root).map_err(|e| SyncError::CopyError {
                    path: self.dest_root.to_path_buf(),
                    source: e,
                })?;
            }
            BTreeMap::new()
        };

        if self.delete {
            self.delete_extraneous(&source, &dest)?;
        }

        for (relative, entry) in &source {
            let existing = dest.get(relative);
            let action = self.plan(entry, existing);
            self.apply(relative, entry, existing, action)?;
        }

        // Deepest first, after every child is in place, so a read-only
        // directory doesn't block its own contents
        for (source_dir, dest_dir) in self.dir_permissions.iter().rev() {
            copy_permissions(source_dir, dest_dir)?;
        }

        Ok(())
    }

    fn plan(&self, source: &Entry, existing: Option<&Entry>) -> SyncAction {
        let Some(dest) = existing else {
            return SyncAction::Create;
        };
        if dest.kind != source.kind {
            return SyncAction::Update;
        }
        match source.kind {
            EntryKind::Dir => SyncAction::Skip,
            EntryKind::File => {
                if source.size != dest.size || !self.mtime_matches(&source.modified, &dest.modified)
                {
                    SyncAction::Update
                } else {
                    SyncAction::Skip
                }
            }
            EntryKind::Symlink => {
                if fs::read_link(&source.path).ok() != fs::read_link(&dest.path).ok() {
                    SyncAction::Update
                } else {
                    SyncAction::Skip
                }
            }
        }
    }

    fn mtime_matches(&self, source_mtime: &SystemTime, dest_mtime: &SystemTime) -> bool {
        match source_mtime.duration_since(*dest_mtime) {
            Ok(duration) => duration.as_secs() <= self.mtime_tolerance,
            Err(e) => e.duration().as_secs() <= self.mtime_tolerance,
        }
    }

    fn delete_extraneous(
        &mut self,
        source: &BTreeMap<PathBuf, Entry>,
        dest: &BTreeMap<PathBuf, Entry>,
    ) -> Result<()> {
        let mut removed_dirs: Vec<&Path> = Vec::new();

        for (relative, entry) in dest {
            if source.contains_key(relative) {
                continue;
            }
            if removed_dirs.iter().any(|dir| relative.starts_with(dir)) {
                continue;
            }

            self.listing
                .push(format!("deleting {}", display_relative(relative, entry.kind)));
            self.stats.deleted += 1;
            if entry.kind == EntryKind::Dir {
                removed_dirs.push(relative);
            }

            if !self.dry_run {
                remove_entry(&entry.path, entry.kind)?;
            }
        }

        Ok(())
    }

    fn apply(
        &mut self,
        relative: &Path,
        source: &Entry,
        existing: Option<&Entry>,
        action: SyncAction,
    ) -> Result<()> {
        match action {
            SyncAction::Skip => return Ok(()),
            SyncAction::Create => self.stats.created += 1,
            SyncAction::Update => self.stats.updated += 1,
        }
        if source.kind == EntryKind::File {
            self.stats.bytes += source.size;
        }
        self.listing.push(display_relative(relative, source.kind));

        if self.dry_run {
            return Ok(());
        }

        let dest_path = self.dest_root.join(relative);
        if let Some(dest) = existing {
            if dest.kind != source.kind {
                remove_entry(&dest.path, dest.kind)?;
            }
        }

        match source.kind {
            EntryKind::Dir => {
                fs::create_dir_all(&dest_path).map_err(|e| SyncError::CopyError {
                    path: dest_path.clone(),
                    source: e,
                })?;
                if self.archive {
                    self.dir_permissions.push((source.path.clone(), dest_path));
                }
            }
            EntryKind::File => self.copy_file(&source.path, &dest_path)?,
            EntryKind::Symlink => {
                if existing.map(|d| d.kind) == Some(EntryKind::Symlink) {
                    remove_entry(&dest_path, EntryKind::Symlink)?;
                }
                copy_symlink(&source.path, &dest_path)?;
            }
        }

        Ok(())
    }

    fn copy_file(&self, source: &Path, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| SyncError::CopyError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        // Copy beside the target and rename over it, so a read-only
        // destination file is replaced rather than written through
        let temp_dest = temp_path(dest);
        let _ = fs::remove_file(&temp_dest);
        let bytes = fs::copy(source, &temp_dest).map_err(|e| {
            let _ = fs::remove_file(&temp_dest);
            SyncError::CopyError {
                path: source.to_path_buf(),
                source: e,
            }
        })?;

        if self.archive {
            let mtime = fs::metadata(source)
                .and_then(|m| m.modified())
                .map_err(|e| SyncError::CopyError {
                    path: source.to_path_buf(),
                    source: e,
                })?;
            filetime::set_file_mtime(&temp_dest, filetime::FileTime::from_system_time(mtime))
                .map_err(|e| SyncError::CopyError {
                    path: dest.to_path_buf(),
                    source: e,
                })?;
        }

        fs::rename(&temp_dest, dest).map_err(|e| {
            let _ = fs::remove_file(&temp_dest);
            SyncError::CopyError {
                path: dest.to_path_buf(),
                source: e,
            }
        })?;

        tracing::debug!("Copied {} ({} bytes)", dest.display(), bytes);
        Ok(())
    }
}

fn temp_path(dest: &Path) -> PathBuf {
    let mut name = std::ffi::OsString::from(".");
    name.push(dest.file_name().unwrap_or_default());
    name.push(".twoway.tmp");
    dest.with_file_name(name)
}

fn display_relative(relative: &Path, kind: EntryKind) -> String {
    match kind {
        EntryKind::Dir => format!("{}/", relative.display()),
        _ => relative.display().to_string(),
    }
}

fn remove_entry(path: &Path, kind: EntryKind) -> Result<()> {
    let result = match kind {
        EntryKind::Dir => fs::remove_dir_all(path),
        EntryKind::File | EntryKind::Symlink => fs::remove_file(path),
    };
    result.map_err(|e| SyncError::RemoveError {
        path: path.to_path_buf(),
        source: e,
    })?;
    tracing::debug!("Removed {}", path.display());
    Ok(())
}

fn copy_permissions(source: &Path, dest: &Path) -> Result<()> {
    let permissions = fs::metadata(source)
        .map_err(|e| SyncError::CopyError {
            path: source.to_path_buf(),
            source: e,
        })?
        .permissions();
    fs::set_permissions(dest, permissions).map_err(|e| SyncError::CopyError {
        path: dest.to_path_buf(),
        source: e,
    })
}

#[cfg(unix)]
fn copy_symlink(source: &Path, dest: &Path) -> Result<()> {
    let target = fs::read_link(source).map_err(|e| SyncError::CopyError {
        path: source.to_path_buf(),
        source: e,
    })?;
    std::os::unix::fs::symlink(&target, dest).map_err(|e| SyncError::CopyError {
        path: dest.to_path_buf(),
        source: e,
    })
}

#[cfg(not(unix))]
fn copy_symlink(source: &Path, _dest: &Path) -> Result<()> {
    tracing::warn!("Skipping symlink (unsupported on this platform): {}", source.display());
    Ok(())
}

/// Mirror `source` into `destination` according to `options`
///
/// Only an invalid exclude pattern is an `Err`; I/O failures stop the pass
/// and are reported in [`MirrorOutcome::error`] with whatever was already done.
pub fn run_mirror(source: &Path, destination: &Path, options: &OptionSet) -> Result<MirrorOutcome> {
    let excludes = Excludes::new(options.excludes())?;
    let mut mirror = Mirror {
        dest_root: destination,
        dry_run: options.is_dry_run(),
        delete: options.contains(&EngineOption::Delete),
        archive: options.contains(&EngineOption::Archive),
        mtime_tolerance: 1,
        stats: MirrorStats::default(),
        listing: Vec::new(),
        dir_permissions: Vec::new(),
    };

    let error = mirror.run(source, &excludes).err();
    if let Some(ref e) = error {
        tracing::debug!("Native mirror stopped: {}", e);
    }

    Ok(MirrorOutcome {
        stats: mirror.stats,
        listing: mirror.listing,
        error,
        verbose: options.contains(&EngineOption::Verbose),
        dry_run: options.is_dry_run(),
    })
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
