use crate::config::Profile;
use crate::engine::EngineKind;
use crate::log::ConsoleMode;
use crate::path::SyncPath;
use clap::Parser;
use std::path::PathBuf;

fn parse_sync_path(s: &str) -> Result<SyncPath, String> {
    if s.is_empty() {
        return Err("path must not be empty".to_string());
    }
    Ok(SyncPath::new(s))
}

#[derive(Parser, Debug)]
#[command(name = "twoway")]
#[command(about = "Two-way folder synchronization using rsync", long_about = None)]
#[command(version)]
#[command(after_help = "EXAMPLES:
    # Sync two folders in both directions
    twoway /mnt/storage1/books /mnt/storage2/books

    # Preview without making changes
    twoway /mnt/storage1/books /mnt/storage2/books --dry-run

    # Use the built-in engine instead of rsync
    twoway /data/a /data/b --engine native

    # Leave scratch files alone on both sides
    twoway /data/a /data/b --exclude '*.tmp' --exclude 'cache/'

    # Run a profile from the config file
    twoway --profile books

The source side is authoritative: the forward pass mirrors it into the
destination (deleting destination-only files), then the reverse pass mirrors
the destination back. Each run writes sync_log_<timestamp>.log.")]
pub struct Cli {
    /// Source folder path
    /// Optional when using --profile
    #[arg(value_parser = parse_sync_path)]
    pub source: Option<SyncPath>,

    /// Destination folder path
    /// Optional when using --profile
    #[arg(value_parser = parse_sync_path)]
    pub destination: Option<SyncPath>,

    /// Simulate the sync without making changes
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Engine performing each directional pass [default: rsync]
    #[arg(long, value_enum)]
    pub engine: Option<EngineKind>,

    /// rsync binary to run (name on PATH or full path)
    #[arg(long, env = "TWOWAY_RSYNC")]
    pub rsync_path: Option<PathBuf>,

    /// Exclude files matching pattern on both sides (can be repeated)
    /// Examples: "*.tmp", "cache/", "/build"
    #[arg(long)]
    pub exclude: Vec<String>,

    /// Directory for the session log file [default: current directory]
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (only warnings and errors on the console)
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Print session log records as newline-delimited JSON
    #[arg(long)]
    pub json: bool,

    /// Use named profile from config file
    #[arg(long)]
    pub profile: Option<String>,

    /// List all available profiles
    #[arg(long)]
    pub list_profiles: bool,

    /// Show details of a specific profile
    #[arg(long)]
    pub show_profile: Option<String>,
}

impl Cli {
    /// Fill values the command line left unset from `profile`
    pub fn apply_profile(&mut self, profile: &Profile) -> anyhow::Result<()> {
        if self.source.is_none() {
            self.source = profile
                .source
                .as_deref()
                .map(parse_sync_path)
                .transpose()
                .map_err(|e| anyhow::anyhow!("Profile source: {}", e))?;
        }
        if self.destination.is_none() {
            self.destination = profile
                .destination
                .as_deref()
                .map(parse_sync_path)
                .transpose()
                .map_err(|e| anyhow::anyhow!("Profile destination: {}", e))?;
        }
        if !self.dry_run {
            self.dry_run = profile.dry_run.unwrap_or(false);
        }
        if self.engine.is_none() {
            self.engine = profile.engine;
        }
        if self.rsync_path.is_none() {
            self.rsync_path = profile.rsync_path.clone();
        }
        if self.exclude.is_empty() {
            if let Some(ref excludes) = profile.exclude {
                self.exclude = excludes.clone();
            }
        }
        if self.log_dir.is_none() {
            self.log_dir = profile.log_dir.clone();
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        // --list-profiles and --show-profile don't need source/destination
        if self.list_profiles || self.show_profile.is_some() {
            return Ok(());
        }

        if self.source.is_none() || self.destination.is_none() {
            anyhow::bail!("Source and destination folders are required (or use --profile)");
        }

        crate::engine::native::check_excludes(&self.exclude)?;

        Ok(())
    }

    pub fn engine_kind(&self) -> EngineKind {
        self.engine.unwrap_or_default()
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn console_mode(&self) -> ConsoleMode {
        if self.json {
            ConsoleMode::Json
        } else {
            ConsoleMode::Text { quiet: self.quiet }
        }
    }

    /// Level for diagnostics on stderr (the session log is unaffected)
    ///
    /// A dry run shows the engine's change listing by default, since
    /// reporting what would change is the point of a preview.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet || self.json {
            return tracing::Level::ERROR;
        }

        match self.verbose {
            0 if self.dry_run => tracing::Level::INFO,
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}
