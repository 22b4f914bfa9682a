use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Immutable snapshot of one input file.
#[derive(Clone, Debug, Serialize)]
pub struct FileMetadata {
    pub path: PathBuf,
    pub file_name: String,
    pub size: u64,
    pub lines: usize,

    /// blake3 hex over the exact bytes read
    pub content_hash: String,

    /// "YYYY-MM-DD HH:MM:SS"
    pub modified: String,

    #[serde(skip)]
    pub content: String,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum ModelId {
    #[default]
    #[serde(rename = "gemini-1.5-flash-latest")]
    Gemini15FlashLatest,
    #[serde(rename = "gemini-1.5-pro-latest")]
    Gemini15ProLatest,
    #[serde(rename = "gemini-pro")]
    GeminiPro,
}

impl ModelId {
    pub const ALL: [ModelId; 3] = [
        ModelId::Gemini15FlashLatest,
        ModelId::Gemini15ProLatest,
        ModelId::GeminiPro,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelId::Gemini15FlashLatest => "gemini-1.5-flash-latest",
            ModelId::Gemini15ProLatest => "gemini-1.5-pro-latest",
            ModelId::GeminiPro => "gemini-pro",
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        ModelId::ALL
            .into_iter()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = ModelId::ALL.iter().map(|m| m.as_str()).collect();
                format!("unknown model '{}' (expected one of: {})", s, names.join(", "))
            })
    }
}

/// Sampling parameters shared by every job of a batch.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            top_p: 0.9,
            top_k: 32,
            max_output_tokens: 8192,
            timeout_secs: 400,
        }
    }
}

impl GenerationConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(format!("temperature {} outside [0, 2]", self.temperature));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(format!("top_p {} outside [0, 1]", self.top_p));
        }
        if self.top_k < 1 {
            return Err("top_k must be >= 1".to_string());
        }
        if self.max_output_tokens < 1 {
            return Err("max_output_tokens must be >= 1".to_string());
        }
        if self.timeout_secs == 0 {
            return Err("timeout_seconds must be > 0".to_string());
        }
        Ok(())
    }
}

/// The three prompt blocks, in submission order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptSegments {
    pub system: String,
    pub task: String,
    pub output_format: String,
}

impl PromptSegments {
    pub fn as_array(&self) -> [&str; 3] {
        [&self.system, &self.task, &self.output_format]
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum JobStage {
    Reading,
    BuildingPrompt,
    Calling,
    Parsing,
    Writing,
    Succeeded,
    Failed,
}

impl JobStage {
    pub fn label(&self) -> &'static str {
        match self {
            JobStage::Reading => "reading file",
            JobStage::BuildingPrompt => "building prompt",
            JobStage::Calling => "waiting for model",
            JobStage::Parsing => "parsing response",
            JobStage::Writing => "writing report",
            JobStage::Succeeded => "done",
            JobStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStage::Succeeded | JobStage::Failed)
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Success {
        path: PathBuf,
        report_path: PathBuf,
        title: String,
    },
    Failure {
        path: PathBuf,
        kind: ErrorKind,
        description: String,
    },
}

impl JobOutcome {
    pub fn path(&self) -> &PathBuf {
        match self {
            JobOutcome::Success { path, .. } | JobOutcome::Failure { path, .. } => path,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success { .. })
    }
}

/// Completion counter of one batch. `completed` only ever grows.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BatchState {
    total: usize,
    completed: usize,
}

impl BatchState {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn is_done(&self) -> bool {
        self.completed == self.total
    }

    /// Count one terminal outcome. Returns `true` when this call finished the batch.
    pub fn record(&mut self) -> bool {
        if self.completed >= self.total {
            return false;
        }
        self.completed += 1;
        self.completed == self.total
    }
}

/// What the core tells the presentation layer.
#[derive(Clone, Debug)]
pub enum AuditEvent {
    Status {
        path: PathBuf,
        stage: JobStage,
    },
    Finished {
        outcome: JobOutcome,
        completed: usize,
        total: usize,
    },
    BatchComplete {
        total: usize,
        succeeded: usize,
        failed: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_names_parse_case_insensitively() {
        assert_eq!(
            "Gemini-1.5-PRO-latest".parse::<ModelId>().unwrap(),
            ModelId::Gemini15ProLatest
        );
        for m in ModelId::ALL {
            assert_eq!(m.as_str().parse::<ModelId>().unwrap(), m);
        }
        let err = "gpt-4".parse::<ModelId>().unwrap_err();
        assert!(err.contains("gemini-pro"));
    }

    #[test]
    fn generation_defaults_are_valid() {
        let cfg = GenerationConfig::default();
        assert_eq!(cfg.top_k, 32);
        assert_eq!(cfg.max_output_tokens, 8192);
        assert_eq!(cfg.timeout_secs, 400);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn generation_ranges_are_enforced() {
        let base = GenerationConfig::default();
        assert!(GenerationConfig { temperature: 2.5, ..base }.validate().is_err());
        assert!(GenerationConfig { top_p: -0.1, ..base }.validate().is_err());
        assert!(GenerationConfig { top_k: 0, ..base }.validate().is_err());
        assert!(GenerationConfig { max_output_tokens: 0, ..base }.validate().is_err());
        assert!(GenerationConfig { timeout_secs: 0, ..base }.validate().is_err());
        assert!(GenerationConfig { temperature: 2.0, top_p: 1.0, ..base }.validate().is_ok());
    }

    #[test]
    fn batch_state_completes_exactly_once() {
        let mut st = BatchState::new(3);
        assert!(!st.record());
        assert!(!st.record());
        assert!(st.record());
        assert!(st.is_done());
        // extra records never push past total
        assert!(!st.record());
        assert_eq!(st.completed(), 3);
        assert_eq!(st.total(), 3);
    }
}
