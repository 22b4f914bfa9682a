mod app;
mod autotune;
mod client;
mod config;
mod dispatch;
mod error;
mod fs_scan;
mod hw;
mod job;
mod logging;
mod parse;
mod prompt;
mod report;
mod types;

use clap::{Parser, Subcommand};
use config::{AppConfig, Overrides};
use dispatch::CancelToken;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "AI code audit (Rust)")]
struct Cli {
    /// YAML defaults; a missing file is fine.
    #[arg(long, default_value = config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    temperature: Option<f32>,

    #[arg(long)]
    top_p: Option<f32>,

    #[arg(long)]
    top_k: Option<u32>,

    #[arg(long)]
    max_tokens: Option<u32>,

    /// Per-request deadline, seconds.
    #[arg(long)]
    timeout: Option<u64>,

    #[arg(long)]
    workers: Option<usize>,

    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Audit files and folders, one report per file.
    Audit {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Extra review criteria, inline.
        #[arg(long, conflicts_with = "criteria_file")]
        criteria: Option<String>,

        #[arg(long)]
        criteria_file: Option<PathBuf>,

        /// Also write all outcomes as JSON.
        #[arg(long)]
        summary_json: Option<PathBuf>,
    },
    /// Show what would be audited.
    Plan {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    Models,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            model: self.model.clone(),
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            max_output_tokens: self.max_tokens,
            timeout_seconds: self.timeout,
            workers: self.workers,
            log_file: self.log_file.clone(),
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let yaml = config::load_yaml(&cli.config)?;
    let api_key = std::env::var(config::CREDENTIAL_ENV).ok();
    let hw = hw::detect_hw();

    let cfg = AppConfig::resolve(yaml, &cli.overrides(), api_key, hw)?;
    logging::init(&cfg.log_file);

    info!(
        "start: model={}, workers={:?}, cpus={}/{}, config={}",
        cfg.model,
        cfg.workers,
        cfg.hw.logical_cpus,
        cfg.hw.physical_cpus,
        cli.config.display()
    );
    println!(
        "HW: logical={}, physical={}",
        cfg.hw.logical_cpus, cfg.hw.physical_cpus
    );

    match cli.cmd {
        Commands::Models => app::list_models(&cfg),
        Commands::Plan { paths } => app::plan(&cfg, &paths),
        Commands::Audit {
            paths,
            criteria,
            criteria_file,
            summary_json,
        } => {
            let criteria = app::load_criteria(criteria, criteria_file.as_deref())?;
            let cancel = CancelToken::default();
            dispatch::cancel_on_ctrl_c(cancel.clone())?;
            app::audit(&cfg, &paths, criteria, summary_json.as_deref(), cancel)
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let log_file = cli
        .log_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(config::DEFAULT_LOG_FILE));

    let res = run(cli);
    if let Err(e) = &res {
        // config errors happen before the configured log stream exists
        logging::init_if_unset(&log_file);
        error!("fatal: {e:#}");
    }
    res
}
