use crate::config::ReportSettings;
use crate::error::AuditError;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};
use time::{OffsetDateTime, UtcOffset};

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

const FORBIDDEN: &[char] = &['\\', '/', '*', '?', ':', '"', '<', '>', '|'];
const EMPTY_NAME: &str = "audit_report";
/// Common file-system limit on one name component, in bytes.
const MAX_NAME_BYTES: usize = 255;

/// Unique suffix for in-flight temp files.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Make `name` safe as a file-name component.
///
/// Drops `\ / * ? : " < > |` and control characters, turns whitespace runs
/// into `_`, cuts to `max_len` chars. Applying it twice changes nothing.
pub fn sanitize_filename(name: &str, max_len: usize) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !FORBIDDEN.contains(c) && !(c.is_control() && !c.is_whitespace()))
        .collect();
    let cleaned = WHITESPACE.replace_all(&cleaned, "_");

    let base = if cleaned.is_empty() {
        EMPTY_NAME
    } else {
        &*cleaned
    };
    base.chars().take(max_len.max(1)).collect()
}

fn now_local() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    UtcOffset::current_local_offset()
        .map(|off| now.to_offset(off))
        .unwrap_or(now)
}

/// YYYYMMDD_HHMMSS
pub fn timestamp(t: OffsetDateTime) -> String {
    format!(
        "{:04}{:02}{:02}_{:02}{:02}{:02}",
        t.year(),
        t.month() as u8,
        t.day(),
        t.hour(),
        t.minute(),
        t.second()
    )
}

/// Longest prefix of `s` within `max` bytes, cut on a char boundary.
fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// `{sanitized stem}_audit_{YYYYMMDD_HHMMSS}.{ext}`, at most 255 bytes.
pub fn report_file_name(original: &Path, settings: &ReportSettings, at: OffsetDateTime) -> String {
    let stem = original
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let stem = sanitize_filename(&stem, settings.max_filename_length);
    let suffix = format!("_audit_{}.{}", timestamp(at), settings.extension);
    let stem = truncate_bytes(&stem, MAX_NAME_BYTES.saturating_sub(suffix.len()));
    format!("{}{}", stem, suffix)
}

pub fn audit_dir(original: &Path, settings: &ReportSettings) -> PathBuf {
    original
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(&settings.subfolder)
}

/// Write the payload next to the original, under the audit subfolder.
///
/// The bytes land in a temp sibling first and are renamed into place, so a
/// failed write leaves no report behind. Same-second name clashes: last
/// rename wins.
pub fn write_report(payload: &str, original: &Path, settings: &ReportSettings) -> Result<PathBuf, AuditError> {
    write_report_at(payload, original, settings, now_local())
}

pub fn write_report_at(
    payload: &str,
    original: &Path,
    settings: &ReportSettings,
    at: OffsetDateTime,
) -> Result<PathBuf, AuditError> {
    let dir = audit_dir(original, settings);
    fs::create_dir_all(&dir).map_err(|source| AuditError::IoWrite {
        path: dir.clone(),
        source,
    })?;

    let dest = dir.join(report_file_name(original, settings, at));
    let tmp = dir.join(format!(
        ".audit-{}-{}.part",
        std::process::id(),
        TMP_SEQ.fetch_add(1, Ordering::Relaxed)
    ));

    let io_err = |source| AuditError::IoWrite {
        path: dest.clone(),
        source,
    };

    if let Err(e) = fs::write(&tmp, payload.as_bytes()) {
        let _ = fs::remove_file(&tmp);
        return Err(io_err(e));
    }
    if let Err(e) = replace_file(&tmp, &dest) {
        let _ = fs::remove_file(&tmp);
        return Err(io_err(e));
    }

    Ok(std::path::absolute(&dest).unwrap_or(dest))
}

fn replace_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        // some platforms refuse to rename over an existing file
        Err(_) if to.exists() => {
            fs::remove_file(to)?;
            fs::rename(from, to)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn settings() -> ReportSettings {
        ReportSettings::default()
    }

    #[test]
    fn sanitize_strips_and_collapses() {
        assert_eq!(sanitize_filename("my  file:v2?", 150), "my_filev2");
        assert_eq!(sanitize_filename("a\\b/c*d?e:f\"g<h>i|j", 150), "abcdefghij");
        assert_eq!(sanitize_filename(" lead\t\ntrail ", 150), "_lead_trail_");
        assert_eq!(sanitize_filename("???", 150), EMPTY_NAME);
        assert_eq!(sanitize_filename("abcdef", 3), "abc");
        assert_eq!(sanitize_filename("ação çé", 3), "açã");
    }

    #[test]
    fn sanitize_is_idempotent_and_bounded() {
        let long = "long name ".repeat(40);
        let inputs: [&str; 8] = [
            "plain",
            "with spaces  and\ttabs",
            "x/y\\z::**",
            "   ",
            "",
            "日本語 ファイル 名前",
            "\u{7}bell\u{0}nul",
            long.as_str(),
        ];
        for max in [1, 5, 12, 150] {
            for raw in inputs {
                let once = sanitize_filename(raw, max);
                let twice = sanitize_filename(&once, max);
                assert_eq!(once, twice, "input {raw:?} max {max}");
                assert!(once.chars().count() <= max);
                assert!(!once.contains(FORBIDDEN));
                assert!(!once.chars().any(char::is_whitespace));
            }
        }
    }

    #[test]
    fn report_name_layout() {
        let at = datetime!(2024-03-05 07:08:09 UTC);
        let name = report_file_name(Path::new("/proj/my module.py"), &settings(), at);
        assert_eq!(name, "my_module_audit_20240305_070809.html");
    }

    #[test]
    fn long_multibyte_name_fits_one_component() {
        let dir = tempfile::tempdir().unwrap();
        // 243 bytes, a legal name on common file systems
        let src = dir.path().join(format!("{}.py", "日".repeat(80)));
        fs::write(&src, "pass\n").unwrap();

        let at = datetime!(2024-01-01 00:00:00 UTC);
        let out = write_report_at("<!DOCTYPE html><html></html>", &src, &settings(), at).unwrap();

        let name = out.file_name().unwrap().to_str().unwrap();
        assert!(name.len() <= MAX_NAME_BYTES, "{} bytes", name.len());
        assert_eq!(name, format!("{}_audit_20240101_000000.html", "日".repeat(76)));
    }

    #[test]
    fn byte_cut_respects_char_boundaries() {
        assert_eq!(truncate_bytes("abc", 10), "abc");
        assert_eq!(truncate_bytes("日本", 4), "日");
        assert_eq!(truncate_bytes("日本", 2), "");
    }

    #[test]
    fn writes_under_audit_subfolder() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("job.py");
        fs::write(&src, "pass\n").unwrap();

        let at = datetime!(2024-01-01 00:00:00 UTC);
        let out = write_report_at("<!DOCTYPE html><html></html>", &src, &settings(), at).unwrap();

        assert_eq!(out.parent().unwrap(), dir.path().join("code-audit"));
        assert_eq!(fs::read_to_string(&out).unwrap(), "<!DOCTYPE html><html></html>");

        // only the report, no leftover temp files
        let entries: Vec<_> = fs::read_dir(dir.path().join("code-audit")).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn same_second_collision_last_writer_wins() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("dup.py");
        let at = datetime!(2024-01-01 12:00:00 UTC);

        let first = write_report_at("first", &src, &settings(), at).unwrap();
        let second = write_report_at("second", &src, &settings(), at).unwrap();
        assert_eq!(first, second);
        assert_eq!(fs::read_to_string(&second).unwrap(), "second");
    }

    #[test]
    fn unwritable_destination_is_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        // a file squatting on the subfolder name blocks create_dir_all
        fs::write(dir.path().join("code-audit"), "not a dir").unwrap();
        let err = write_report("x", &dir.path().join("a.py"), &settings()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::IoWriteFailure);
    }
}
