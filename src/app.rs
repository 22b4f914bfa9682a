use crate::client::CompletionClient;
use crate::config::AppConfig;
use crate::dispatch::{BatchReport, BatchSettings, CancelToken, Dispatcher};
use crate::types::{AuditEvent, JobOutcome, ModelId};
use crate::{autotune, fs_scan};

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::thread;
use tracing::{info, warn};

/* =========================
   Helpers
   ========================= */

fn short_name(p: &Path) -> String {
    p.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| p.display().to_string())
}

fn size_kb(bytes: u64) -> f64 {
    bytes as f64 / 1024.0
}

/// Inline text wins over a file; both absent => no extra criteria.
pub fn load_criteria(inline: Option<String>, file: Option<&Path>) -> Result<String> {
    if let Some(s) = inline {
        return Ok(s.trim().to_string());
    }
    match file {
        Some(p) => {
            let s = std::fs::read_to_string(p)
                .with_context(|| format!("read criteria file {}", p.display()))?;
            Ok(s.trim().to_string())
        }
        None => Ok(String::new()),
    }
}

fn discover(cfg: &AppConfig, inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let files = fs_scan::gather_inputs(inputs, &cfg.extensions, &cfg.report.subfolder)?;
    if files.is_empty() {
        return Err(anyhow!(
            "No input files found (extensions: {})",
            cfg.extensions.join(", ")
        ));
    }
    Ok(files)
}

/// Console rendering of batch events. Runs on its own thread.
fn print_event(event: &AuditEvent) {
    match event {
        AuditEvent::Status { path, stage } => {
            if !stage.is_terminal() {
                println!("  [{}] {}", short_name(path), stage.label());
            }
        }
        AuditEvent::Finished {
            outcome,
            completed,
            total,
        } => {
            match outcome {
                JobOutcome::Success {
                    path,
                    report_path,
                    title,
                } => {
                    println!("OK   {} -> {}", short_name(path), report_path.display());
                    println!("     title: {}", title);
                }
                JobOutcome::Failure {
                    path,
                    kind,
                    description,
                } => {
                    println!("FAIL {} [{}] {}", short_name(path), kind, description);
                }
            }
            println!("PROGRESS {}/{}", completed, total);
        }
        AuditEvent::BatchComplete {
            total,
            succeeded,
            failed,
        } => {
            println!(
                "\nBatch complete: total={}, success={}, failed={}",
                total, succeeded, failed
            );
        }
    }
}

#[derive(Serialize)]
struct BatchSummary<'a> {
    model: &'a str,
    total: usize,
    succeeded: usize,
    failed: usize,
    outcomes: &'a [JobOutcome],
}

fn save_summary(path: &Path, model: ModelId, report: &BatchReport) -> Result<()> {
    let summary = BatchSummary {
        model: model.as_str(),
        total: report.outcomes.len(),
        succeeded: report.succeeded,
        failed: report.failed,
        outcomes: &report.outcomes,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let s = serde_json::to_string_pretty(&summary)?;
    std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/* =========================
   Commands
   ========================= */

pub fn list_models(cfg: &AppConfig) -> Result<()> {
    println!("Models:");
    for m in ModelId::ALL {
        let mark = if m == cfg.model { " (default)" } else { "" };
        println!("  - {}{}", m, mark);
    }
    Ok(())
}

/// Look only: show what would be audited, no service calls.
pub fn plan(cfg: &AppConfig, inputs: &[PathBuf]) -> Result<()> {
    let files = discover(cfg, inputs)?;
    let workers = autotune::workers_for_batch(&cfg.hw, cfg.workers, files.len());

    println!("=== AUDIT PLAN ===");
    println!("Model     : {}", cfg.model);
    println!("Workers   : {}", workers);
    println!(
        "Credential: {}",
        if cfg.api_key.is_some() { "present" } else { "MISSING" }
    );
    println!("Files     :");
    for f in &files {
        match fs_scan::read_metadata(f) {
            Ok(m) => println!(
                "  - {} ({:.1} KB, {} lines, mtime={}, hash={})",
                m.path.display(),
                size_kb(m.size),
                m.lines,
                m.modified,
                &m.content_hash[..16]
            ),
            Err(e) => println!("  - {} (unreadable: {})", f.display(), e),
        }
    }
    Ok(())
}

pub fn audit(
    cfg: &AppConfig,
    inputs: &[PathBuf],
    criteria: String,
    summary_json: Option<&Path>,
    cancel: CancelToken,
) -> Result<()> {
    let files = discover(cfg, inputs)?;

    let client = CompletionClient::from_credential(cfg.api_key.as_deref(), &cfg.endpoint);
    if !client.is_available() {
        warn!("no credential; every job will fail as service-unavailable");
        println!(
            "WARNING: {} is not set. AI calls are disabled; jobs will fail.",
            crate::config::CREDENTIAL_ENV
        );
    }

    let workers = autotune::workers_for_batch(&cfg.hw, cfg.workers, files.len());
    let settings = BatchSettings {
        model: cfg.model,
        generation: cfg.generation,
        criteria,
        report: cfg.report.clone(),
    };
    let dispatcher = Dispatcher::new(Arc::new(client), settings, workers)?.with_cancel(cancel);

    println!("=== AUDIT ===");
    println!(
        "Model={}, workers={}, files={}, temperature={}, top_p={}, top_k={}, max_tokens={}, timeout={}s",
        cfg.model,
        dispatcher.workers(),
        files.len(),
        cfg.generation.temperature,
        cfg.generation.top_p,
        cfg.generation.top_k,
        cfg.generation.max_output_tokens,
        cfg.generation.timeout_secs
    );

    let (tx, rx) = mpsc::channel::<AuditEvent>();
    let report = thread::scope(|s| {
        let printer = s.spawn(move || {
            for ev in rx {
                print_event(&ev);
            }
        });
        let report = dispatcher.run(&files, &tx);
        drop(tx);
        let _ = printer.join();
        report
    });

    if let Some(p) = summary_json {
        save_summary(p, cfg.model, &report)?;
        println!("Summary written: {}", p.display());
    }

    info!(
        "audit finished: success={}, failed={}",
        report.succeeded, report.failed
    );

    if report.failed == 0 {
        println!("DONE: success={}", report.succeeded);
        return Ok(());
    }

    println!(
        "DONE WITH ERRORS: success={}, failed={}",
        report.succeeded, report.failed
    );
    for o in report.failures() {
        if let JobOutcome::Failure {
            kind, description, ..
        } = o
        {
            println!("  - {}\n    [{}] {}", o.path().display(), kind, description);
        }
    }
    Err(anyhow!(
        "Audit finished with {} failed file(s).",
        report.failed
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Overrides;
    use crate::dispatch::NullSink;
    use crate::hw::HwInfo;
    use crate::job::tests::{FakeClient, GOOD_REPLY};
    use std::fs;

    fn cfg() -> AppConfig {
        AppConfig::resolve(
            None,
            &Overrides::default(),
            None,
            HwInfo {
                logical_cpus: 2,
                physical_cpus: 1,
            },
        )
        .unwrap()
    }

    #[test]
    fn criteria_sources() {
        let dir = tempfile::tempdir().unwrap();
        let f = dir.path().join("rules.txt");
        fs::write(&f, "\n  no eval()  \n").unwrap();

        assert_eq!(load_criteria(Some(" inline ".into()), Some(&f)).unwrap(), "inline");
        assert_eq!(load_criteria(None, Some(&f)).unwrap(), "no eval()");
        assert_eq!(load_criteria(None, None).unwrap(), "");
        assert!(load_criteria(None, Some(&dir.path().join("nope.txt"))).is_err());
    }

    #[test]
    fn audit_without_credential_fails_every_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.py"), "pass\n").unwrap();

        let err = audit(&cfg(), &[dir.path().to_path_buf()], String::new(), None, CancelToken::default()).unwrap_err();
        assert!(err.to_string().contains("1 failed"));
        assert!(!dir.path().join("code-audit").exists());
    }

    #[test]
    fn empty_input_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("readme.md"), "# hi\n").unwrap();
        assert!(audit(&cfg(), &[dir.path().to_path_buf()], String::new(), None, CancelToken::default()).is_err());
    }

    #[test]
    fn summary_json_lists_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("demo.py");
        fs::write(&src, "pass\n").unwrap();

        let settings = BatchSettings {
            model: ModelId::default(),
            generation: Default::default(),
            criteria: String::new(),
            report: Default::default(),
        };
        let d = Dispatcher::new(Arc::new(FakeClient::ok(GOOD_REPLY)), settings, 1).unwrap();
        let report = d.run(&[src], &NullSink);

        let out = dir.path().join("out/summary.json");
        save_summary(&out, ModelId::default(), &report).unwrap();

        let v: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(v["total"], 1);
        assert_eq!(v["succeeded"], 1);
        assert_eq!(v["outcomes"][0]["status"], "success");
        assert_eq!(v["outcomes"][0]["title"], "Code Audit Report: demo.py");
    }

    #[test]
    fn cancelled_audit_still_writes_summary() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.py"), "pass\n").unwrap();
        fs::write(dir.path().join("b.py"), "pass\n").unwrap();
        let out = dir.path().join("summary.json");

        let token = CancelToken::default();
        token.cancel();
        let err = audit(&cfg(), &[dir.path().to_path_buf()], String::new(), Some(&out), token)
            .unwrap_err();
        assert!(err.to_string().contains("2 failed"));

        let v: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(v["total"], 2);
        assert_eq!(v["failed"], 2);
        assert_eq!(v["outcomes"][0]["kind"], "Cancelled");
        assert_eq!(v["outcomes"][1]["kind"], "Cancelled");
    }

    #[test]
    fn plan_reads_without_calling() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.py"), "pass\n").unwrap();
        plan(&cfg(), &[dir.path().to_path_buf()]).unwrap();
        assert!(!dir.path().join("code-audit").exists());
    }
}
