use crate::client::CompletionService;
use crate::config::ReportSettings;
use crate::error::AuditError;
use crate::types::{GenerationConfig, JobOutcome, JobStage, ModelId};
use crate::{fs_scan, parse, prompt, report};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Everything one job needs besides its path. Shared read-only by the batch.
pub struct JobContext<'a> {
    pub client: &'a dyn CompletionService,
    pub model: ModelId,
    pub generation: GenerationConfig,
    pub criteria: &'a str,
    pub report: &'a ReportSettings,
}

struct Written {
    report_path: PathBuf,
    title: String,
}

fn pipeline(path: &Path, ctx: &JobContext<'_>, notify: &dyn Fn(JobStage)) -> Result<Written, AuditError> {
    notify(JobStage::Reading);
    let meta = fs_scan::read_metadata(path)?;

    notify(JobStage::BuildingPrompt);
    let segments = prompt::build_prompt(&meta, ctx.criteria);

    notify(JobStage::Calling);
    let raw = ctx.client.complete(ctx.model, &ctx.generation, &segments)?;

    notify(JobStage::Parsing);
    let payload = parse::extract_payload(&raw)?;
    let title = parse::extract_title(&payload)
        .unwrap_or_else(|| format!("Code audit report {}", meta.file_name));

    notify(JobStage::Writing);
    let report_path = report::write_report(&payload, path, ctx.report)?;

    Ok(Written { report_path, title })
}

fn panic_message(p: Box<dyn Any + Send>) -> String {
    if let Some(s) = p.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = p.downcast_ref::<String>() {
        s.clone()
    } else {
        "job panicked".to_string()
    }
}

/// Run one file through read → prompt → call → parse → write.
///
/// Never panics and never returns an error: every failure, including a
/// panic inside a stage, becomes a `Failure` outcome. `notify` sees each
/// stage as it starts and then exactly one terminal stage.
pub fn run_job(path: &Path, ctx: &JobContext<'_>, notify: &dyn Fn(JobStage)) -> JobOutcome {
    let result = panic::catch_unwind(AssertUnwindSafe(|| pipeline(path, ctx, notify)))
        .unwrap_or_else(|p| Err(AuditError::Unexpected(panic_message(p))));

    match result {
        Ok(w) => {
            info!("audit ok: {} -> {}", path.display(), w.report_path.display());
            notify(JobStage::Succeeded);
            JobOutcome::Success {
                path: path.to_path_buf(),
                report_path: w.report_path,
                title: w.title,
            }
        }
        Err(e) => {
            let kind = e.kind();
            error!("audit failed: {} [{}] {}", path.display(), kind, e);
            notify(JobStage::Failed);
            JobOutcome::Failure {
                path: path.to_path_buf(),
                kind,
                description: e.to_string(),
            }
        }
    }
}

/// Outcome for a job that never started.
pub fn cancelled(path: &Path) -> JobOutcome {
    debug!("skipping {} (batch cancelled)", path.display());
    let e = AuditError::Cancelled;
    JobOutcome::Failure {
        path: path.to_path_buf(),
        kind: e.kind(),
        description: e.to_string(),
    }
}
