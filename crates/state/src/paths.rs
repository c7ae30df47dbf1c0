//! State directory layout.

use std::path::{Path, PathBuf};

use ms_domain::meeting::Occurrence;

/// Value type locating every durable artifact.
///
/// Threaded through constructors so nothing reaches for a process-global
/// path.
#[derive(Debug, Clone)]
pub struct StatePaths {
    root: PathBuf,
}

impl StatePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `trigger_state.json`: the at-most-once dispatch map.
    pub fn trigger_state(&self) -> PathBuf {
        self.root.join("trigger_state.json")
    }

    /// `active_meeting.json`: the single-active-meeting lock.
    pub fn active_meeting(&self) -> PathBuf {
        self.root.join("active_meeting.json")
    }

    /// `meeting_results.json`: terminal outcome per occurrence.
    pub fn meeting_results(&self) -> PathBuf {
        self.root.join("meeting_results.json")
    }

    pub fn history_dir(&self) -> PathBuf {
        self.root.join("history")
    }

    /// `history/<event_id>__<safe_start>.jsonl`
    pub fn history_log(&self, occurrence: &Occurrence) -> PathBuf {
        self.history_dir().join(format!(
            "{}__{}.jsonl",
            occurrence.event_id,
            occurrence.safe_start()
        ))
    }

    pub fn transcripts_dir(&self) -> PathBuf {
        self.root.join("transcripts")
    }

    /// `transcripts/<event_id>__<safe_start>__<bot_id>.transcript.json`
    pub fn transcript_fragment(&self, occurrence: &Occurrence, bot_id: &str) -> PathBuf {
        self.transcripts_dir().join(format!(
            "{}__{}__{}.transcript.json",
            occurrence.event_id,
            occurrence.safe_start(),
            bot_id
        ))
    }

    /// Media-URL sidecar written alongside a fragment for crash recovery.
    pub fn media_sidecar(&self, occurrence: &Occurrence, bot_id: &str) -> PathBuf {
        self.transcripts_dir().join(format!(
            "{}__{}__{}.media.json",
            occurrence.event_id,
            occurrence.safe_start(),
            bot_id
        ))
    }

    pub fn merged_json(&self, occurrence: &Occurrence) -> PathBuf {
        self.transcripts_dir().join(format!(
            "{}__{}__MERGED.transcript.json",
            occurrence.event_id,
            occurrence.safe_start()
        ))
    }

    pub fn merged_text(&self, occurrence: &Occurrence) -> PathBuf {
        self.transcripts_dir().join(format!(
            "{}__{}__MERGED.txt",
            occurrence.event_id,
            occurrence.safe_start()
        ))
    }

    /// `pipeline/<meeting_id>/`: chunk/fact/input JSONL outputs.
    pub fn pipeline_dir(&self, meeting_id: &str) -> PathBuf {
        self.root.join("pipeline").join(meeting_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn fragment_and_merged_share_prefix() {
        let paths = StatePaths::new("/tmp/ms");
        let occ = Occurrence::new("ev1", Utc.with_ymd_and_hms(2025, 3, 10, 14, 0, 0).unwrap());
        let frag = paths.transcript_fragment(&occ, "bot-a");
        let merged = paths.merged_json(&occ);
        let frag_name = frag.file_name().unwrap().to_string_lossy().into_owned();
        let merged_name = merged.file_name().unwrap().to_string_lossy().into_owned();
        assert!(frag_name.starts_with("ev1__2025-03-10T14-00-00+00-00__"));
        assert!(merged_name.contains("__MERGED."));
    }
}
