mod calendar;
mod llm;
mod notetaker;
mod pipeline;
mod state;

pub use calendar::*;
pub use llm::*;
pub use notetaker::*;
pub use pipeline::*;
pub use state::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub notetaker: NotetakerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the whole tree. Issues with `Error` severity should abort
    /// startup; warnings are logged and tolerated.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        let err = |field: &str, message: String| ConfigIssue {
            severity: ConfigSeverity::Error,
            field: field.to_string(),
            message,
        };
        let warn = |field: &str, message: String| ConfigIssue {
            severity: ConfigSeverity::Warning,
            field: field.to_string(),
            message,
        };

        if self.calendar.poll_seconds == 0 {
            issues.push(err("calendar.poll_seconds", "must be > 0".into()));
        }
        if self.calendar.window_minutes == 0 {
            issues.push(err("calendar.window_minutes", "must be > 0".into()));
        }
        if self.notetaker.join_retry_min_seconds > self.notetaker.join_retry_max_seconds {
            issues.push(err(
                "notetaker.join_retry_min_seconds",
                "must be <= join_retry_max_seconds".into(),
            ));
        }
        if self.notetaker.max_entry_denials == 0 {
            issues.push(warn(
                "notetaker.max_entry_denials",
                "0 means the first denial is terminal".into(),
            ));
        }
        if self.pipeline.overlap_chars >= self.pipeline.max_chars {
            issues.push(err(
                "pipeline.overlap_chars",
                "must be < pipeline.max_chars".into(),
            ));
        }
        if self.pipeline.max_facts_per_call == 0 {
            issues.push(err("pipeline.max_facts_per_call", "must be > 0".into()));
        }
        if self.llm.temperature > 0.2 {
            issues.push(warn(
                "llm.temperature",
                "pipeline nodes expect deterministic output (<= 0.2)".into(),
            ));
        }
        if self.llm.rpm_limit == 0 || self.llm.tpm_limit == 0 {
            issues.push(err("llm.rpm_limit", "rate limits must be > 0".into()));
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let issues = Config::default().validate();
        assert!(
            issues.iter().all(|i| i.severity != ConfigSeverity::Error),
            "default config must not carry errors: {issues:?}"
        );
    }

    #[test]
    fn overlap_ge_max_chars_is_an_error() {
        let mut config = Config::default();
        config.pipeline.overlap_chars = config.pipeline.max_chars;
        let issues = config.validate();
        assert!(issues
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error && i.field == "pipeline.overlap_chars"));
    }

    #[test]
    fn high_temperature_is_a_warning() {
        let mut config = Config::default();
        config.llm.temperature = 0.9;
        let issues = config.validate();
        assert!(issues
            .iter()
            .any(|i| i.severity == ConfigSeverity::Warning && i.field == "llm.temperature"));
    }
}
