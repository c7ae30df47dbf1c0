//! CLI definition and config loading.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use ms_domain::config::Config;
use ms_domain::error::{Error, Result};

#[derive(Parser)]
#[command(
    name = "meetscribe",
    about = "Calendar-driven meeting recording and transcript intelligence"
)]
pub struct Cli {
    /// Config file (default: ./meetscribe.toml or $MEETSCRIBE_CONFIG).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Poll the calendar and dispatch bots to eligible meetings.
    Poll {
        /// Calendar id override.
        #[arg(long)]
        calendar: Option<String>,
        /// Seconds between poll ticks.
        #[arg(long)]
        poll_seconds: Option<u64>,
        /// Look-ahead window in minutes.
        #[arg(long)]
        window_minutes: Option<i64>,
        /// Look-back window in minutes.
        #[arg(long)]
        lookback_minutes: Option<i64>,
        /// Classify and log, but never create bots or write state.
        #[arg(long)]
        dry_run: bool,
        /// Run one tick and exit.
        #[arg(long)]
        once: bool,
    },
    /// Merge transcript fragments into one ordered record.
    Merge {
        /// Calendar event id.
        #[arg(long, required_unless_present = "all")]
        event_id: Option<String>,
        /// Occurrence start (RFC3339).
        #[arg(long, required_unless_present = "all")]
        event_start: Option<String>,
        /// Re-derive outputs even when they exist.
        #[arg(long)]
        force: bool,
        /// Merge every occurrence found in the transcripts directory.
        #[arg(long)]
        all: bool,
    },
    /// Fetch transcripts for recorded runs as they become available.
    Harvest {
        /// Run one pass and exit.
        #[arg(long)]
        once: bool,
        /// Seconds between passes (continuous mode).
        #[arg(long, default_value_t = 30)]
        poll_seconds: u64,
        /// Only harvest this calendar event id.
        #[arg(long)]
        event_id: Option<String>,
    },
    /// Run the transcript-to-input pipeline for one occurrence.
    Process {
        /// Calendar event id.
        #[arg(long, required_unless_present = "input")]
        event_id: Option<String>,
        /// Occurrence start (RFC3339).
        #[arg(long, required_unless_present = "input")]
        event_start: Option<String>,
        /// Process a transcript text file instead of a merged occurrence.
        #[arg(long)]
        input: Option<PathBuf>,
        /// Meeting id for the pipeline rows (random when omitted).
        #[arg(long)]
        meeting_id: Option<uuid::Uuid>,
        /// Source label stored on chunk rows.
        #[arg(long, default_value = "google_meet")]
        source_label: String,
    },
    /// Configuration helpers.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Print the version.
    Version,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Validate the config file and report issues.
    Validate,
    /// Print the effective configuration.
    Show,
}

/// Load the config from `--config`, `$MEETSCRIBE_CONFIG`, or
/// `./meetscribe.toml`; a missing file yields the defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<(Config, PathBuf)> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var("MEETSCRIBE_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("meetscribe.toml"));

    if !path.exists() {
        if explicit.is_some() {
            return Err(Error::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        return Ok((Config::default(), path));
    }

    let raw = std::fs::read_to_string(&path)?;
    let config: Config = toml::from_str(&raw)
        .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_default_config_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        // Explicit missing path errors; implicit default does not.
        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn config_file_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meetscribe.toml");
        std::fs::write(&path, "[calendar]\npoll_seconds = 20\n").unwrap();

        let (config, loaded_from) = load_config(Some(&path)).unwrap();
        assert_eq!(config.calendar.poll_seconds, 20);
        assert_eq!(loaded_from, path);
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meetscribe.toml");
        std::fs::write(&path, "[calendar\n").unwrap();
        assert!(matches!(
            load_config(Some(&path)),
            Err(Error::Config(_))
        ));
    }
}
