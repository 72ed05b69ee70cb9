use crate::engine::{OptionSet, SyncResult, TransferEngine};
use crate::error::SyncError;
use crate::log::SessionLog;
use crate::path::{self, SyncPath};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_SYNC_FAILED: i32 = 1;
pub const EXIT_CONFIG_ERROR: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Source into destination
    Forward,
    /// Destination back into source
    Reverse,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Forward => write!(f, "Source ➝ Destination"),
            Direction::Reverse => write!(f, "Destination ➝ Source"),
        }
    }
}

/// Why a run ended in `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Bad paths or missing engine; nothing was attempted
    Configuration,
    /// A pass ran and failed
    Pass(Direction),
}

/// Run state machine
///
/// `PendingForward -> PendingReverse -> Done`, with `Failed` absorbing from
/// either pending state. Only a successful forward pass can reach
/// `PendingReverse`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    PendingForward,
    PendingReverse,
    Done,
    Failed(Failure),
}

impl RunState {
    /// Pass to run next, if any
    pub fn pending(self) -> Option<Direction> {
        match self {
            RunState::PendingForward => Some(Direction::Forward),
            RunState::PendingReverse => Some(Direction::Reverse),
            RunState::Done | RunState::Failed(_) => None,
        }
    }

    /// State after the pending pass finished
    pub fn advance(self, pass_succeeded: bool) -> Self {
        match (self, pass_succeeded) {
            (RunState::PendingForward, true) => RunState::PendingReverse,
            (RunState::PendingReverse, true) => RunState::Done,
            (RunState::PendingForward, false) => {
                RunState::Failed(Failure::Pass(Direction::Forward))
            }
            (RunState::PendingReverse, false) => {
                RunState::Failed(Failure::Pass(Direction::Reverse))
            }
            (terminal, _) => terminal,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PassReport {
    pub direction: Direction,
    pub result: SyncResult,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub state: RunState,
    pub passes: Vec<PassReport>,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self.state {
            RunState::Done => EXIT_SUCCESS,
            RunState::Failed(Failure::Configuration) => EXIT_CONFIG_ERROR,
            _ => EXIT_SYNC_FAILED,
        }
    }
}

/// Drives both directional passes through one engine and one session log
///
/// Both passes share one [`OptionSet`]. The reverse pass only starts after
/// the forward pass succeeded; any failure is terminal and nothing is retried
/// or rolled back.
///
/// Known limitation: this is not a merge. If the same file was edited on both
/// sides since the last run, the source side's copy wins, because the forward
/// pass runs first and the reverse pass then finds both copies equal.
pub struct Orchestrator<'a> {
    engine: &'a dyn TransferEngine,
    log: &'a SessionLog,
    options: OptionSet,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        engine: &'a dyn TransferEngine,
        log: &'a SessionLog,
        dry_run: bool,
        exclude: &[String],
    ) -> Self {
        Self {
            engine,
            log,
            options: OptionSet::new(dry_run, exclude),
        }
    }

    pub fn options(&self) -> &OptionSet {
        &self.options
    }

    /// Sync `path_a` and `path_b` in both directions
    pub async fn run(&self, path_a: &SyncPath, path_b: &SyncPath) -> RunOutcome {
        let mode = if self.options.is_dry_run() {
            ", dry run: no changes will be made"
        } else {
            ""
        };
        self.log.info(format!(
            "=== Starting folder synchronization ({} engine{}) ===",
            self.engine.name(),
            mode
        ));

        let mut passes = Vec::new();

        if let Err(e) = self.preflight(path_a, path_b).await {
            self.log.error(format!("Configuration error: {}", e));
            return self.finish(RunState::Failed(Failure::Configuration), passes);
        }

        let mut state = RunState::PendingForward;
        while let Some(direction) = state.pending() {
            let (from, to) = match direction {
                Direction::Forward => (path_a, path_b),
                Direction::Reverse => (path_b, path_a),
            };

            self.log.info(format!("Syncing: {} ➡️ {}", from, to));
            tracing::debug!("{} pass options: {:?}", direction, self.options);

            match self.engine.invoke(from, to, &self.options).await {
                Ok(result) => {
                    if result.success {
                        self.log
                            .info(format!("✔ {} sync completed successfully", direction));
                    } else {
                        self.log.error(failure_message(direction, &result));
                    }
                    state = state.advance(result.success);
                    passes.push(PassReport { direction, result });
                }
                Err(e) if e.is_configuration() && direction == Direction::Forward => {
                    self.log.error(format!("Configuration error: {}", e));
                    state = RunState::Failed(Failure::Configuration);
                }
                // The forward pass already changed the destination
                Err(e) if e.is_configuration() => {
                    self.log.error(format!(
                        "❌ {} sync failed: {}",
                        direction, e
                    ));
                    state = state.advance(false);
                }
                Err(e) => {
                    self.log.error(format!(
                        "❌ {} sync failed with an unexpected error: {}",
                        direction, e
                    ));
                    state = state.advance(false);
                }
            }
        }

        self.finish(state, passes)
    }

    async fn preflight(&self, path_a: &SyncPath, path_b: &SyncPath) -> Result<(), SyncError> {
        path::check_pair(path_a, path_b)?;
        self.engine.preflight().await
    }

    /// Write the single closing record and build the outcome
    fn finish(&self, state: RunState, passes: Vec<PassReport>) -> RunOutcome {
        let saved = self
            .log
            .file_path()
            .map(|p| format!(" 📄 Log saved to: {}", p.display()))
            .unwrap_or_default();

        match state {
            RunState::Done => {
                let preview = if self.options.is_dry_run() {
                    " (dry run, nothing changed)"
                } else {
                    ""
                };
                self.log.info(format!(
                    "✅ Two-way folder synchronization complete{}.{}",
                    preview, saved
                ));
            }
            RunState::Failed(Failure::Pass(Direction::Forward)) => {
                self.log.warn(format!(
                    "Synchronization aborted: reverse pass skipped. The destination may be partially updated; the source was not touched.{}",
                    saved
                ));
            }
            RunState::Failed(Failure::Pass(Direction::Reverse)) => {
                self.log.warn(format!(
                    "Synchronization aborted after the reverse pass failed. Forward pass changes were kept.{}",
                    saved
                ));
            }
            RunState::Failed(Failure::Configuration) => {
                self.log.warn(format!(
                    "Synchronization aborted before any changes were made.{}",
                    saved
                ));
            }
            RunState::PendingForward | RunState::PendingReverse => {
                unreachable!("run finished with a pass still pending")
            }
        }

        RunOutcome { state, passes }
    }
}

fn failure_message(direction: Direction, result: &SyncResult) -> String {
    let status = match result.exit_code {
        Some(code) => format!("with return code {}", code),
        None => "without an exit code".to_string(),
    };
    let stderr = result.stderr.trim();
    if stderr.is_empty() {
        format!("❌ {} sync failed {}", direction, status)
    } else {
        format!("❌ {} sync failed {}: {}", direction, status, stderr)
    }
}
