//! Background transcript harvesting.
//!
//! Providers publish transcripts minutes after a meeting ends (or after
//! a bot is kicked), so harvesting is decoupled from supervision: a
//! detached task polls the media endpoint per attempted bot id, and a
//! standalone pass can sweep previously recorded runs for transcripts
//! that arrived late.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use ms_domain::error::Result;
use ms_domain::meeting::Occurrence;
use ms_state::{atomic, HistoryEvent, HistoryLog, ResultsStore, StatePaths};

use crate::client::NotetakerApi;

#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub poll: Duration,
    pub wait: Duration,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Per-supervision background task
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Spawn a detached harvest task for one occurrence's attempted bots.
pub fn spawn_harvest(
    api: Arc<dyn NotetakerApi>,
    paths: StatePaths,
    occurrence: Occurrence,
    bot_ids: Vec<String>,
    config: HarvestConfig,
) {
    tokio::spawn(async move {
        harvest_until_deadline(api.as_ref(), &paths, &occurrence, &bot_ids, &config).await;
    });
}

/// Poll until every bot has a transcript on disk or the deadline passes.
pub async fn harvest_until_deadline(
    api: &dyn NotetakerApi,
    paths: &StatePaths,
    occurrence: &Occurrence,
    bot_ids: &[String],
    config: &HarvestConfig,
) -> usize {
    if bot_ids.is_empty() {
        return 0;
    }

    let history = HistoryLog::new(paths.history_log(occurrence));
    let _ = history.append(HistoryEvent::HarvestStart {
        wait_seconds: config.wait.as_secs(),
        poll_seconds: config.poll.as_secs(),
        bot_ids: bot_ids.to_vec(),
    });

    let deadline = Instant::now() + config.wait;
    let mut remaining: Vec<String> = bot_ids
        .iter()
        .filter(|id| !paths.transcript_fragment(occurrence, id).exists())
        .cloned()
        .collect();
    let mut saved = bot_ids.len() - remaining.len();

    loop {
        let mut still_missing = Vec::new();
        for bot_id in remaining.drain(..) {
            match save_transcript_if_available(api, paths, occurrence, &bot_id).await {
                Ok(Some(path)) => {
                    saved += 1;
                    tracing::info!(bot_id = %bot_id, path = %path.display(), "transcript saved");
                    let _ = history.append(HistoryEvent::HarvestSaved {
                        bot_id,
                        path: path.display().to_string(),
                    });
                }
                Ok(None) => still_missing.push(bot_id),
                Err(err) => {
                    tracing::debug!(bot_id = %bot_id, error = %err, "harvest poll failed");
                    still_missing.push(bot_id);
                }
            }
        }
        remaining = still_missing;

        if remaining.is_empty() {
            return saved;
        }
        if Instant::now() >= deadline {
            tracing::warn!(
                event_id = %occurrence.event_id,
                missing = remaining.len(),
                "transcript not available before harvest deadline"
            );
            let _ = history.append(HistoryEvent::HarvestTimeout);
            return saved;
        }
        tokio::time::sleep(config.poll).await;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Single-bot save
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Download and persist one bot's transcript when published.
///
/// Writes the media-URL sidecar for crash recovery and the transcript
/// content itself; existing files are never overwritten, so reconnect
/// fragments accumulate side by side.
pub async fn save_transcript_if_available(
    api: &dyn NotetakerApi,
    paths: &StatePaths,
    occurrence: &Occurrence,
    bot_id: &str,
) -> Result<Option<std::path::PathBuf>> {
    let transcript_path = paths.transcript_fragment(occurrence, bot_id);
    if transcript_path.exists() {
        return Ok(Some(transcript_path));
    }

    let links = api.media_links(bot_id).await?;
    let Some(transcript) = &links.transcript else {
        return Ok(None);
    };

    let sidecar = paths.media_sidecar(occurrence, bot_id);
    if !sidecar.exists() {
        atomic::write_json(&sidecar, &links)?;
    }

    let content = api.download(&transcript.url).await?;
    atomic::write_text(&transcript_path, &content)?;
    Ok(Some(transcript_path))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Standalone harvest pass
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One sweep over recorded results and history logs: fetch any
/// transcript that became available since the supervised run ended.
///
/// Returns `(checked, saved)` counts.
pub async fn harvest_once(
    api: &dyn NotetakerApi,
    paths: &StatePaths,
    results: &ResultsStore,
    filter_event_id: Option<&str>,
) -> (usize, usize) {
    let mut candidates: Vec<(Occurrence, String)> = Vec::new();

    for result in results.all() {
        if let Some(filter) = filter_event_id {
            if result.event_id != filter {
                continue;
            }
        }
        let occurrence = result.occurrence();
        for bot_id in &result.attempted_bot_ids {
            candidates.push((occurrence.clone(), bot_id.clone()));
        }
        if let Some(final_id) = &result.final_bot_id {
            candidates.push((occurrence.clone(), final_id.clone()));
        }
    }

    // History logs catch runs whose results were lost (e.g. crash before
    // the results store write).
    for (occurrence, bot_id) in scan_history_dir(paths) {
        if let Some(filter) = filter_event_id {
            if occurrence.event_id != filter {
                continue;
            }
        }
        candidates.push((occurrence, bot_id));
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut checked = 0usize;
    let mut saved = 0usize;

    for (occurrence, bot_id) in candidates {
        let key = format!("{}|{bot_id}", occurrence.key());
        if !seen.insert(key) {
            continue;
        }
        if paths.transcript_fragment(&occurrence, &bot_id).exists() {
            continue;
        }
        checked += 1;
        match save_transcript_if_available(api, paths, &occurrence, &bot_id).await {
            Ok(Some(_)) => saved += 1,
            Ok(None) => {}
            Err(err) => {
                tracing::debug!(bot_id = %bot_id, error = %err, "harvest candidate failed");
            }
        }
    }

    tracing::info!(checked, saved, "harvest pass done");
    (checked, saved)
}

/// Walk `history/*.jsonl` and yield every `(occurrence, bot_id)` pair.
fn scan_history_dir(paths: &StatePaths) -> Vec<(Occurrence, String)> {
    let mut out = Vec::new();
    let Ok(entries) = std::fs::read_dir(paths.history_dir()) else {
        return out;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
            continue;
        }
        let log = HistoryLog::new(&path);
        let Some(occurrence) = occurrence_from_log(&log) else {
            continue;
        };
        for bot_id in log.bot_ids() {
            out.push((occurrence.clone(), bot_id));
        }
    }
    out
}

fn occurrence_from_log(log: &HistoryLog) -> Option<Occurrence> {
    for line in log.read_all() {
        if let HistoryEvent::SupervisorStart {
            event_id,
            event_start,
            ..
        } = line.event
        {
            return Some(Occurrence::new(event_id, event_start));
        }
    }
    None
}
