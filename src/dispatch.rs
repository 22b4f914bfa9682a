use crate::client::CompletionService;
use crate::config::ReportSettings;
use crate::job::{self, JobContext};
use crate::types::{AuditEvent, BatchState, GenerationConfig, JobOutcome, ModelId};
use anyhow::{anyhow, Context, Result};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use tracing::{debug, info, warn};

/// Receives status and outcome events from worker threads.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

impl EventSink for mpsc::Sender<AuditEvent> {
    fn emit(&self, event: AuditEvent) {
        // receiver gone => nobody is watching, the batch still runs
        let _ = self.send(event);
    }
}

#[cfg(test)]
pub struct NullSink;

#[cfg(test)]
impl EventSink for NullSink {
    fn emit(&self, _event: AuditEvent) {}
}

/// Best-effort stop request. Jobs not yet started are skipped; running jobs finish.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Cancel `token` on the first Ctrl-C. Queued jobs are then skipped and the
/// batch still ends with its summary.
pub fn cancel_on_ctrl_c(token: CancelToken) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build signal runtime")?;

    thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || match rt.block_on(tokio::signal::ctrl_c()) {
            Ok(()) => {
                warn!("Ctrl-C received, skipping queued jobs");
                println!("\nCtrl-C: queued files are skipped, running ones finish...");
                token.cancel();
            }
            Err(e) => warn!("cannot listen for Ctrl-C: {}", e),
        })
        .context("spawn Ctrl-C listener")?;
    Ok(())
}

/// Settings shared by every job of every batch run through one dispatcher.
#[derive(Clone, Debug)]
pub struct BatchSettings {
    pub model: ModelId,
    pub generation: GenerationConfig,
    pub criteria: String,
    pub report: ReportSettings,
}

#[derive(Debug)]
pub struct BatchReport {
    /// One per submitted path, in submission order.
    pub outcomes: Vec<JobOutcome>,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn failures(&self) -> impl Iterator<Item = &JobOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }
}

struct Tally {
    state: BatchState,
    succeeded: usize,
    failed: usize,
}

pub struct Dispatcher {
    client: Arc<dyn CompletionService>,
    settings: BatchSettings,
    pool: rayon::ThreadPool,
    workers: usize,
    cancel: CancelToken,
}

impl Dispatcher {
    pub fn new(client: Arc<dyn CompletionService>, settings: BatchSettings, workers: usize) -> Result<Self> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("audit-worker-{i}"))
            .build()
            .map_err(|e| anyhow!("rayon threadpool build failed: {}", e))?;

        Ok(Self {
            client,
            settings,
            pool,
            workers,
            cancel: CancelToken::default(),
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Use an externally owned stop flag instead of the private one.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run one batch to completion.
    ///
    /// Emits `Status` events as jobs move, one `Finished` per path with the
    /// running count, then a single `BatchComplete`. Duplicate paths are
    /// submitted once.
    pub fn run(&self, paths: &[PathBuf], sink: &dyn EventSink) -> BatchReport {
        let mut seen = HashSet::new();
        let paths: Vec<&PathBuf> = paths.iter().filter(|p| seen.insert(*p)).collect();
        let total = paths.len();

        info!(
            "batch start: files={}, workers={}, model={}",
            total, self.workers, self.settings.model
        );

        if total == 0 {
            sink.emit(AuditEvent::BatchComplete {
                total: 0,
                succeeded: 0,
                failed: 0,
            });
            return BatchReport {
                outcomes: Vec::new(),
                succeeded: 0,
                failed: 0,
            };
        }

        let ctx = JobContext {
            client: self.client.as_ref(),
            model: self.settings.model,
            generation: self.settings.generation,
            criteria: &self.settings.criteria,
            report: &self.settings.report,
        };

        let tally = Mutex::new(Tally {
            state: BatchState::new(total),
            succeeded: 0,
            failed: 0,
        });

        let outcomes: Vec<JobOutcome> = self.pool.install(|| {
            paths
                .par_iter()
                .map(|path| {
                    let outcome = if self.cancel.is_cancelled() {
                        job::cancelled(path)
                    } else {
                        job::run_job(path, &ctx, &|stage| {
                            debug!("{}: {}", path.display(), stage.label());
                            sink.emit(AuditEvent::Status {
                                path: path.to_path_buf(),
                                stage,
                            });
                        })
                    };

                    self.record(&tally, &outcome, sink);
                    outcome
                })
                .collect()
        });

        let tally = tally.into_inner().unwrap_or_else(|p| p.into_inner());
        debug_assert!(tally.state.is_done());
        info!(
            "batch done: total={}, success={}, failed={}",
            total, tally.succeeded, tally.failed
        );

        BatchReport {
            outcomes,
            succeeded: tally.succeeded,
            failed: tally.failed,
        }
    }

    /// Count one terminal outcome. Events leave under the lock so observers
    /// see `completed` strictly increasing.
    fn record(&self, tally: &Mutex<Tally>, outcome: &JobOutcome, sink: &dyn EventSink) {
        let mut t = tally.lock().unwrap_or_else(|p| p.into_inner());
        if outcome.is_success() {
            t.succeeded += 1;
        } else {
            t.failed += 1;
        }
        let finished = t.state.record();

        sink.emit(AuditEvent::Finished {
            outcome: outcome.clone(),
            completed: t.state.completed(),
            total: t.state.total(),
        });
        if finished {
            sink.emit(AuditEvent::BatchComplete {
                total: t.state.total(),
                succeeded: t.succeeded,
                failed: t.failed,
            });
        }
    }
}
