use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ms_calendar::GoogleCalendarClient;
use ms_domain::config::{Config, ConfigSeverity};
use ms_domain::meeting::Occurrence;
use ms_llm::{OpenAiCompatClient, RateLimiter};
use ms_notetaker::HttpNotetakerClient;
use ms_pipeline::Pipeline;
use ms_runner::cli::{Cli, Command, ConfigCommand};
use ms_runner::scheduler::Scheduler;
use ms_state::{ResultsStore, StatePaths};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (config, config_path) = ms_runner::cli::load_config(cli.config.as_deref())?;

    match cli.command {
        // Default to polling when no subcommand is given.
        None => {
            init_tracing();
            validate(&config)?;
            run_poll(config, false, false).await
        }
        Some(Command::Poll {
            calendar,
            poll_seconds,
            window_minutes,
            lookback_minutes,
            dry_run,
            once,
        }) => {
            init_tracing();
            let mut config = config;
            if let Some(calendar) = calendar {
                config.calendar.calendar_id = calendar;
            }
            if let Some(poll_seconds) = poll_seconds {
                config.calendar.poll_seconds = poll_seconds;
            }
            if let Some(window) = window_minutes {
                config.calendar.window_minutes = window;
            }
            if let Some(lookback) = lookback_minutes {
                config.calendar.lookback_minutes = lookback;
            }
            validate(&config)?;
            run_poll(config, dry_run, once).await
        }
        Some(Command::Merge {
            event_id,
            event_start,
            force,
            all,
        }) => {
            init_tracing();
            run_merge(&config, event_id, event_start, force, all)
        }
        Some(Command::Harvest {
            once,
            poll_seconds,
            event_id,
        }) => {
            init_tracing();
            run_harvest(&config, once, poll_seconds, event_id.as_deref()).await
        }
        Some(Command::Process {
            event_id,
            event_start,
            input,
            meeting_id,
            source_label,
        }) => {
            init_tracing();
            validate(&config)?;
            run_process(&config, event_id, event_start, input, meeting_id, &source_label).await
        }
        Some(Command::Config { command }) => match command {
            ConfigCommand::Validate => {
                let issues = config.validate();
                for issue in &issues {
                    eprintln!("{issue}");
                }
                if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
                    std::process::exit(1);
                }
                println!("{} OK", config_path.display());
                Ok(())
            }
            ConfigCommand::Show => {
                println!("{}", toml::to_string_pretty(&config)?);
                Ok(())
            }
        },
        Some(Command::Version) => {
            println!("meetscribe {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,meetscribe=debug")),
        )
        .init();
}

/// Log config issues; abort on errors.
fn validate(config: &Config) -> anyhow::Result<()> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    let errors = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    if errors > 0 {
        anyhow::bail!("config validation failed with {errors} error(s)");
    }
    Ok(())
}

async fn run_poll(config: Config, dry_run: bool, once: bool) -> anyhow::Result<()> {
    tracing::info!(calendar = %config.calendar.calendar_id, "MeetScribe starting");

    let calendar = Arc::new(GoogleCalendarClient::from_config(&config.calendar)?);
    let notetaker = Arc::new(HttpNotetakerClient::from_config(&config.notetaker)?);
    let scheduler = Scheduler::new(calendar, notetaker, &config, dry_run)?;
    scheduler.run(once).await?;

    tracing::info!("scheduler stopped");
    Ok(())
}

fn run_merge(
    config: &Config,
    event_id: Option<String>,
    event_start: Option<String>,
    force: bool,
    all: bool,
) -> anyhow::Result<()> {
    let paths = StatePaths::new(&config.state.path);

    if all {
        let outcomes = ms_notetaker::merge::merge_all(&paths, force)?;
        tracing::info!(merged = outcomes.len(), "merge-all complete");
        return Ok(());
    }

    let occurrence = parse_occurrence(event_id, event_start)?;
    match ms_notetaker::merge::merge_transcripts(&paths, &occurrence, force)? {
        Some(outcome) => {
            tracing::info!(
                json = %outcome.json_path.display(),
                txt = %outcome.txt_path.display(),
                performed = outcome.performed,
                "merge complete"
            );
            Ok(())
        }
        None => {
            anyhow::bail!("no transcript fragments found for {}", occurrence.key())
        }
    }
}

async fn run_harvest(
    config: &Config,
    once: bool,
    poll_seconds: u64,
    event_id: Option<&str>,
) -> anyhow::Result<()> {
    let paths = StatePaths::new(&config.state.path);
    let results = ResultsStore::load(paths.meeting_results())?;
    let api = HttpNotetakerClient::from_config(&config.notetaker)?;

    if once {
        ms_notetaker::harvester::harvest_once(&api, &paths, &results, event_id).await;
        return Ok(());
    }

    tracing::info!(poll_seconds, "transcript harvester running; Ctrl-C to stop");
    loop {
        ms_notetaker::harvester::harvest_once(&api, &paths, &results, event_id).await;
        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_secs(poll_seconds.max(1))) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                return Ok(());
            }
        }
    }
}

async fn run_process(
    config: &Config,
    event_id: Option<String>,
    event_start: Option<String>,
    input: Option<std::path::PathBuf>,
    meeting_id: Option<uuid::Uuid>,
    source_label: &str,
) -> anyhow::Result<()> {
    let paths = StatePaths::new(&config.state.path);

    let transcript_text = match input {
        Some(path) => std::fs::read_to_string(&path)?,
        None => {
            let occurrence = parse_occurrence(event_id, event_start)?;
            // Merge first (no-op when outputs already exist).
            let Some(outcome) = ms_notetaker::merge::merge_transcripts(&paths, &occurrence, false)?
            else {
                anyhow::bail!("no transcript fragments found for {}", occurrence.key());
            };
            std::fs::read_to_string(&outcome.txt_path)?
        }
    };

    let meeting_id = meeting_id.unwrap_or_else(uuid::Uuid::new_v4);
    let limiter = Arc::new(RateLimiter::new(config.llm.rpm_limit, config.llm.tpm_limit));
    let llm = Arc::new(OpenAiCompatClient::from_config(&config.llm, limiter)?);
    let pipeline = Pipeline::new(llm, &config.llm, &config.pipeline);

    let summary = pipeline
        .process_transcript(&paths, meeting_id, &transcript_text, source_label)
        .await?;

    tracing::info!(
        meeting_id = %meeting_id,
        chunks = summary.chunks,
        facts = summary.facts,
        groups = summary.groups,
        inputs = summary.inputs,
        "pipeline complete"
    );
    Ok(())
}

fn parse_occurrence(
    event_id: Option<String>,
    event_start: Option<String>,
) -> anyhow::Result<Occurrence> {
    let event_id = event_id.ok_or_else(|| anyhow::anyhow!("--event-id is required"))?;
    let event_start = event_start.ok_or_else(|| anyhow::anyhow!("--event-start is required"))?;
    let start = chrono::DateTime::parse_from_rfc3339(&event_start)
        .map_err(|e| anyhow::anyhow!("--event-start must be RFC3339: {e}"))?
        .with_timezone(&chrono::Utc);
    Ok(Occurrence::new(event_id, start))
}
