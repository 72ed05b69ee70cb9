use crate::error::{Result, SyncError};
use std::ffi::{OsStr, OsString};
use std::path::{is_separator, Path, PathBuf, MAIN_SEPARATOR_STR};

/// A directory taking part in a sync pass.
///
/// The engine argument always ends with a path separator. rsync reads
/// `src/` as "the contents of src" and `src` as "src itself", so a missing
/// separator would nest one tree inside the other. The only way to build a
/// `SyncPath` is through [`SyncPath::new`], which appends the separator once;
/// nothing downstream reformats it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPath {
    root: PathBuf,
    arg: OsString,
}

impl SyncPath {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let mut root = path.into();
        if root.as_os_str().is_empty() {
            root = PathBuf::from(".");
        }

        let mut arg = root.clone().into_os_string();
        if !ends_with_separator(&arg) {
            arg.push(MAIN_SEPARATOR_STR);
        }

        Self { root, arg }
    }

    /// Filesystem path as given by the user
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Path argument handed to the engine (always separator-terminated)
    pub fn engine_arg(&self) -> &OsStr {
        &self.arg
    }

    /// Resolve to an absolute, symlink-free path for identity checks
    pub fn canonical(&self) -> std::io::Result<PathBuf> {
        self.root.canonicalize()
    }
}

/// Check that both sides exist, are directories, and do not overlap
///
/// A pair where one tree lives inside the other is rejected: with delete
/// mode each pass would prune or recurse into its own counterpart.
pub fn check_pair(source: &SyncPath, destination: &SyncPath) -> Result<()> {
    let source_dir = source.canonical().map_err(|_| SyncError::SourceNotFound {
        path: source.path().to_path_buf(),
    })?;
    let dest_dir = destination
        .canonical()
        .map_err(|_| SyncError::DestinationNotFound {
            path: destination.path().to_path_buf(),
        })?;

    for (dir, original) in [(&source_dir, source), (&dest_dir, destination)] {
        if !dir.is_dir() {
            return Err(SyncError::NotADirectory {
                path: original.path().to_path_buf(),
            });
        }
    }

    if source_dir == dest_dir {
        return Err(SyncError::SamePath { path: source_dir });
    }
    if source_dir.starts_with(&dest_dir) || dest_dir.starts_with(&source_dir) {
        return Err(SyncError::NestedPaths {
            source_dir,
            dest_dir,
        });
    }

    Ok(())
}

fn ends_with_separator(s: &OsStr) -> bool {
    s.to_string_lossy().ends_with(is_separator)
}

impl std::fmt::Display for SyncPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.arg.to_string_lossy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appends_trailing_separator() {
        let path = SyncPath::new("/mnt/storage1/books");
        assert_eq!(
            path.engine_arg(),
            OsStr::new(&format!("/mnt/storage1/books{}", MAIN_SEPARATOR_STR))
        );
        assert_eq!(path.path(), Path::new("/mnt/storage1/books"));
    }

    #[test]
    fn test_keeps_existing_separator() {
        let path = SyncPath::new("/mnt/storage1/books/");
        assert_eq!(path.engine_arg(), OsStr::new("/mnt/storage1/books/"));
    }

    #[test]
    fn test_relative_path() {
        let path = SyncPath::new("docs");
        assert_eq!(path.to_string(), format!("docs{}", MAIN_SEPARATOR_STR));
    }

    #[test]
    fn test_root_is_not_doubled() {
        let path = SyncPath::new("/");
        assert_eq!(path.engine_arg(), OsStr::new("/"));
    }

    #[test]
    fn test_empty_becomes_current_dir() {
        let path = SyncPath::new("");
        assert_eq!(path.path(), Path::new("."));
        assert_eq!(path.to_string(), format!(".{}", MAIN_SEPARATOR_STR));
    }

    #[test]
    fn test_check_pair_accepts_sibling_dirs() {
        let a = tempfile::TempDir::new().unwrap();
        let b = tempfile::TempDir::new().unwrap();
        check_pair(&SyncPath::new(a.path()), &SyncPath::new(b.path())).unwrap();
    }

    #[test]
    fn test_check_pair_missing_source() {
        let b = tempfile::TempDir::new().unwrap();
        let err = check_pair(
            &SyncPath::new("/nonexistent/twoway/a"),
            &SyncPath::new(b.path()),
        )
        .unwrap_err();
        assert!(matches!(err, SyncError::SourceNotFound { .. }));
    }

    #[test]
    fn test_check_pair_missing_destination() {
        let a = tempfile::TempDir::new().unwrap();
        let err = check_pair(
            &SyncPath::new(a.path()),
            &SyncPath::new("/nonexistent/twoway/b"),
        )
        .unwrap_err();
        assert!(matches!(err, SyncError::DestinationNotFound { .. }));
    }

    #[test]
    fn test_check_pair_rejects_file() {
        let a = tempfile::TempDir::new().unwrap();
        let file = a.path().join("file.txt");
        std::fs::write(&file, "content").unwrap();
        let b = tempfile::TempDir::new().unwrap();
        let err = check_pair(&SyncPath::new(&file), &SyncPath::new(b.path())).unwrap_err();
        assert!(matches!(err, SyncError::NotADirectory { .. }));
    }

    #[test]
    fn test_check_pair_rejects_same_and_nested() {
        let a = tempfile::TempDir::new().unwrap();
        let inner = a.path().join("inner");
        std::fs::create_dir(&inner).unwrap();

        let same = check_pair(
            &SyncPath::new(a.path()),
            &SyncPath::new(format!("{}/", a.path().display())),
        )
        .unwrap_err();
        assert!(matches!(same, SyncError::SamePath { .. }));

        let nested = check_pair(&SyncPath::new(a.path()), &SyncPath::new(&inner)).unwrap_err();
        assert!(matches!(nested, SyncError::NestedPaths { .. }));
    }

    #[test]
    fn test_canonical_resolves_trailing_forms_to_same_dir() {
        let temp = tempfile::TempDir::new().unwrap();
        let plain = SyncPath::new(temp.path());
        let slashed = SyncPath::new(format!("{}/", temp.path().display()));
        assert_eq!(plain.canonical().unwrap(), slashed.canonical().unwrap());
    }
}
