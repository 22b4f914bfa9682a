use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing::warn;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_LOG_LEVEL: &str = "info";

fn open_log_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Install the process-wide subscriber. Call once, from `main`.
///
/// Lines are appended to `log_file`; when it cannot be opened the log goes
/// to stderr instead and the first line says why.
pub fn init(log_file: &Path) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_target(false);

    match open_log_file(log_file) {
        Ok(file) => {
            let _ = builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        Err(e) => {
            let _ = builder.with_writer(std::io::stderr).try_init();
            warn!(
                "cannot open log file {}: {}; logging to stderr",
                log_file.display(),
                e
            );
        }
    }
}

/// `init` unless a subscriber is already installed.
pub fn init_if_unset(log_file: &Path) {
    if !tracing::dispatcher::has_been_set() {
        init(log_file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    #[test]
    fn log_file_is_appended() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("audit.log");
        fs::write(&p, "old\n").unwrap();

        let mut f = open_log_file(&p).unwrap();
        writeln!(f, "new").unwrap();
        assert_eq!(fs::read_to_string(&p).unwrap(), "old\nnew\n");
    }

    #[test]
    fn unopenable_log_file_falls_back_and_second_init_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        // a directory cannot be opened for append
        assert!(open_log_file(dir.path()).is_err());

        init_if_unset(dir.path());
        assert!(tracing::dispatcher::has_been_set());

        let late = dir.path().join("late.log");
        init_if_unset(&late);
        assert!(!late.exists());
    }
}
