use super::{EngineOption, OptionSet, SyncResult, TransferEngine};
use crate::error::{Result, SyncError};
use crate::path::SyncPath;
use async_trait::async_trait;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Runs each directional pass through an external rsync binary
#[derive(Debug, Clone)]
pub struct RsyncEngine {
    program: PathBuf,
}

impl RsyncEngine {
    /// Engine running `program` (`rsync` on PATH by default)
    ///
    /// Nothing is checked here; [`TransferEngine::preflight`] reports a
    /// missing binary before the first pass.
    pub fn new(program: Option<&Path>) -> Self {
        Self {
            program: program.map_or_else(|| PathBuf::from("rsync"), Path::to_path_buf),
        }
    }

    /// Command-line arguments for one pass: options first, then both paths
    pub fn command_args(
        options: &OptionSet,
        source: &SyncPath,
        destination: &SyncPath,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = options
            .iter()
            .map(|option| match option {
                EngineOption::Archive => OsString::from("-a"),
                EngineOption::Verbose => OsString::from("-v"),
                EngineOption::Delete => OsString::from("--delete"),
                EngineOption::DryRun => OsString::from("--dry-run"),
                EngineOption::Exclude(pattern) => OsString::from(format!("--exclude={}", pattern)),
            })
            .collect();
        args.push(source.engine_arg().to_os_string());
        args.push(destination.engine_arg().to_os_string());
        args
    }

    fn unavailable(&self, e: std::io::Error) -> SyncError {
        SyncError::EngineUnavailable {
            engine: self.program.display().to_string(),
            reason: e.to_string(),
        }
    }
}

#[async_trait]
impl TransferEngine for RsyncEngine {
    fn name(&self) -> &str {
        "rsync"
    }

    async fn preflight(&self) -> Result<()> {
        let resolved = which::which(&self.program).map_err(|e| SyncError::EngineUnavailable {
            engine: self.program.display().to_string(),
            reason: e.to_string(),
        })?;
        tracing::debug!("Using rsync at {}", resolved.display());

        let output = Command::new(&resolved)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.unavailable(e))?;

        if !output.status.success() {
            return Err(SyncError::EngineUnavailable {
                engine: resolved.display().to_string(),
                reason: format!("`--version` exited with {}", output.status),
            });
        }

        let version = String::from_utf8_lossy(&output.stdout);
        tracing::debug!(
            "{}",
            version.lines().next().unwrap_or("rsync version unknown")
        );
        Ok(())
    }

    async fn invoke(
        &self,
        source: &SyncPath,
        destination: &SyncPath,
        options: &OptionSet,
    ) -> Result<SyncResult> {
        let args = Self::command_args(options, source, destination);
        tracing::debug!("Running {} {:?}", self.program.display(), args);

        let output = match Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(self.unavailable(e)),
            Err(e) => {
                return Ok(SyncResult::launch_failure(format!(
                    "Failed to launch {}: {}",
                    self.program.display(),
                    e
                )))
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        for line in stdout.lines().filter(|l| !l.is_empty()) {
            tracing::info!(target: "twoway::engine", "{}", line);
        }

        Ok(SyncResult::from_exit(output.status.code(), stdout, stderr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn rsync_available() -> bool {
        which::which("rsync").is_ok()
    }

    #[test]
    fn test_command_args_order() {
        let options = OptionSet::new(true, &["*.tmp".to_string()]);
        let args = RsyncEngine::command_args(
            &options,
            &SyncPath::new("/mnt/a"),
            &SyncPath::new("/mnt/b/"),
        );
        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec!["-a", "-v", "--delete", "--dry-run", "--exclude=*.tmp", "/mnt/a/", "/mnt/b/"]
        );
    }

    #[test]
    fn test_command_args_without_dry_run() {
        let options = OptionSet::new(false, &[]);
        let args = RsyncEngine::command_args(&options, &SyncPath::new("a"), &SyncPath::new("b"));
        assert!(!args.iter().any(|a| a == "--dry-run"));
        assert_eq!(args.len(), 5);
    }

    #[tokio::test]
    async fn test_preflight_missing_binary() {
        let engine = RsyncEngine::new(Some(Path::new("/nonexistent/rsync")));
        let err = engine.preflight().await.unwrap_err();
        assert!(matches!(err, SyncError::EngineUnavailable { .. }));
        assert!(err.is_configuration());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_preflight_rejects_failing_version_check() {
        use std::os::unix::fs::PermissionsExt;

        let bin = TempDir::new().unwrap();
        let script = bin.path().join("not-rsync");
        fs::write(&script, "#!/bin/sh\nexit 1\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let engine = RsyncEngine::new(Some(script.as_path()));
        let err = engine.preflight().await.unwrap_err();
        assert!(matches!(err, SyncError::EngineUnavailable { .. }));
        assert!(err.to_string().contains("--version"));
    }

    #[tokio::test]
    async fn test_invoke_missing_binary_is_unavailable() {
        let source = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let engine = RsyncEngine::new(Some(Path::new("/nonexistent/rsync")));
        let err = engine
            .invoke(
                &SyncPath::new(source.path()),
                &SyncPath::new(dest.path()),
                &OptionSet::new(false, &[]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::EngineUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_invoke_copies_contents() {
        if !rsync_available() {
            eprintln!("rsync not installed, skipping");
            return;
        }
        let source = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        fs::write(source.path().join("x.txt"), "x").unwrap();

        let engine = RsyncEngine::new(None);
        engine.preflight().await.unwrap();
        let result = engine
            .invoke(
                &SyncPath::new(source.path()),
                &SyncPath::new(dest.path()),
                &OptionSet::new(false, &[]),
            )
            .await
            .unwrap();

        assert!(result.success, "stderr: {}", result.stderr);
        assert_eq!(result.exit_code, Some(0));
        // Trailing separator copies contents, not the directory itself
        assert!(dest.path().join("x.txt").exists());
    }

    #[tokio::test]
    async fn test_invoke_failure_is_result_not_error() {
        if !rsync_available() {
            eprintln!("rsync not installed, skipping");
            return;
        }
        let dest = TempDir::new().unwrap();
        let engine = RsyncEngine::new(None);
        let result = engine
            .invoke(
                &SyncPath::new("/nonexistent/source/dir"),
                &SyncPath::new(dest.path()),
                &OptionSet::new(false, &[]),
            )
            .await
            .unwrap();

        assert!(!result.success);
        assert_ne!(result.exit_code, Some(0));
        assert!(!result.stderr.is_empty());
    }
}
