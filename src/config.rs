use crate::hw::HwInfo;
use crate::types::{GenerationConfig, ModelId};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "code_audit.yaml";
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const CREDENTIAL_ENV: &str = "GEMINI_API_KEY";
pub const DEFAULT_LOG_FILE: &str = "code_audit.log";

/// Optional on-disk defaults. Every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct YamlConfig {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub max_output_tokens: Option<u32>,
    pub timeout_seconds: Option<u64>,
    pub workers: Option<usize>,
    pub audit_subfolder: Option<String>,
    pub max_filename_length: Option<usize>,
    pub extensions: Option<Vec<String>>,
    pub log_file: Option<PathBuf>,
    pub endpoint: Option<String>,
}

/// Values given on the command line; `None` means "not given".
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub max_output_tokens: Option<u32>,
    pub timeout_seconds: Option<u64>,
    pub workers: Option<usize>,
    pub log_file: Option<PathBuf>,
}

/// Report placement settings used by the writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSettings {
    pub subfolder: String,
    pub max_filename_length: usize,
    pub extension: String,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            subfolder: "code-audit".to_string(),
            max_filename_length: 150,
            extension: "html".to_string(),
        }
    }
}

/// Fully resolved, immutable application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub model: ModelId,
    pub generation: GenerationConfig,
    pub workers: Option<usize>,
    pub report: ReportSettings,
    pub extensions: Vec<String>,
    pub log_file: PathBuf,
    pub endpoint: String,

    /// `None` when the credential env var is unset or blank.
    pub api_key: Option<String>,

    pub hw: HwInfo,
}

/// Missing file => Ok(None). Present but malformed => error.
pub fn load_yaml(path: &Path) -> Result<Option<YamlConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let file = File::open(path).with_context(|| format!("open config {}", path.display()))?;
    let cfg = serde_yaml::from_reader(file)
        .with_context(|| format!("parse config {}", path.display()))?;
    Ok(Some(cfg))
}

pub fn credential_from(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn normalize_extension(e: &str) -> String {
    e.trim().trim_start_matches('.').to_lowercase()
}

impl AppConfig {
    /// defaults < yaml < cli
    pub fn resolve(
        yaml: Option<YamlConfig>,
        cli: &Overrides,
        api_key: Option<String>,
        hw: HwInfo,
    ) -> Result<Self> {
        let yaml = yaml.unwrap_or_default();
        let gen_default = GenerationConfig::default();
        let report_default = ReportSettings::default();

        let model = match cli.model.as_deref().or(yaml.model.as_deref()) {
            Some(name) => name.parse::<ModelId>().map_err(|e| anyhow!(e))?,
            None => ModelId::default(),
        };

        let generation = GenerationConfig {
            temperature: cli
                .temperature
                .or(yaml.temperature)
                .unwrap_or(gen_default.temperature),
            top_p: cli.top_p.or(yaml.top_p).unwrap_or(gen_default.top_p),
            top_k: cli.top_k.or(yaml.top_k).unwrap_or(gen_default.top_k),
            max_output_tokens: cli
                .max_output_tokens
                .or(yaml.max_output_tokens)
                .unwrap_or(gen_default.max_output_tokens),
            timeout_secs: cli
                .timeout_seconds
                .or(yaml.timeout_seconds)
                .unwrap_or(gen_default.timeout_secs),
        };
        generation
            .validate()
            .map_err(|e| anyhow!("invalid generation config: {e}"))?;

        let workers = cli.workers.or(yaml.workers);
        if workers == Some(0) {
            return Err(anyhow!("workers must be >= 1"));
        }

        let max_filename_length = yaml
            .max_filename_length
            .unwrap_or(report_default.max_filename_length);
        if max_filename_length == 0 {
            return Err(anyhow!("max_filename_length must be >= 1"));
        }

        let subfolder = yaml
            .audit_subfolder
            .map(|s| s.trim().to_string())
            .unwrap_or(report_default.subfolder);
        if subfolder.is_empty() || subfolder.contains(['/', '\\']) || subfolder == ".." {
            return Err(anyhow!("audit_subfolder must be a plain folder name"));
        }

        let mut extensions: Vec<String> = yaml
            .extensions
            .unwrap_or_else(|| vec!["py".to_string()])
            .iter()
            .map(|e| normalize_extension(e))
            .filter(|e| !e.is_empty())
            .collect();
        extensions.sort();
        extensions.dedup();

        Ok(Self {
            model,
            generation,
            workers,
            report: ReportSettings {
                subfolder,
                max_filename_length,
                extension: report_default.extension,
            },
            extensions,
            log_file: cli
                .log_file
                .clone()
                .or(yaml.log_file)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE)),
            endpoint: yaml
                .endpoint
                .map(|e| e.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            api_key: credential_from(api_key),
            hw,
        })
    }
}
