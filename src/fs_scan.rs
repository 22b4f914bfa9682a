use crate::error::AuditError;
use crate::types::FileMetadata;
use anyhow::{anyhow, Context, Result};
use std::{
    collections::HashSet,
    ffi::OsStr,
    fs,
    path::{Path, PathBuf},
};
use time::{OffsetDateTime, UtcOffset};
use walkdir::WalkDir;

/// Editor lock / temp files (~$foo, .#foo)
fn is_temp_file(p: &Path) -> bool {
    p.file_name()
        .and_then(|s| s.to_str())
        .map(|s| s.starts_with("~$") || s.starts_with(".#"))
        .unwrap_or(false)
}

fn has_extension(p: &Path, extensions: &[String]) -> bool {
    let ext = p
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase();
    extensions.iter().any(|e| *e == ext)
}

/// Expand file/dir arguments into a de-duplicated list of absolute file paths.
///
/// Files given explicitly are taken as-is. Directories are walked for files
/// with a matching extension; folders named `skip_dir` (previous reports)
/// are not entered. First-seen order is kept.
pub fn gather_inputs(args: &[PathBuf], extensions: &[String], skip_dir: &str) -> Result<Vec<PathBuf>> {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut out = Vec::new();

    let mut push = |p: PathBuf| {
        if seen.insert(p.clone()) {
            out.push(p);
        }
    };

    for arg in args {
        let abs = std::path::absolute(arg).with_context(|| format!("resolve {}", arg.display()))?;
        if !abs.exists() {
            return Err(anyhow!("Input not found: {}", abs.display()));
        }

        if abs.is_file() {
            push(abs);
            continue;
        }

        let mut found = Vec::new();
        let walker = WalkDir::new(&abs)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| !(e.file_type().is_dir() && e.file_name() == OsStr::new(skip_dir)));
        for entry in walker {
            let entry = entry?;
            let p = entry.path();
            if !entry.file_type().is_file() || is_temp_file(p) || !has_extension(p, extensions) {
                continue;
            }
            found.push(p.to_path_buf());
        }
        found.sort();
        for p in found {
            push(p);
        }
    }

    Ok(out)
}

/// Decode as UTF-8, dropping invalid byte sequences.
fn decode_lossy_drop(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        s.push_str(chunk.valid());
    }
    s
}

fn format_mtime(t: std::time::SystemTime) -> String {
    let utc = OffsetDateTime::from(t);
    let local = UtcOffset::current_local_offset()
        .map(|off| utc.to_offset(off))
        .unwrap_or(utc);

    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        local.year(),
        local.month() as u8,
        local.day(),
        local.hour(),
        local.minute(),
        local.second()
    )
}

/// Read one input file into an immutable metadata record.
pub fn read_metadata(p: &Path) -> std::result::Result<FileMetadata, AuditError> {
    let io_err = |source| AuditError::IoRead {
        path: p.to_path_buf(),
        source,
    };

    let bytes = fs::read(p).map_err(io_err)?;
    let meta = fs::metadata(p).map_err(io_err)?;
    let modified = meta.modified().map(format_mtime).map_err(io_err)?;

    let content = decode_lossy_drop(&bytes);
    let file_name = p
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| p.display().to_string());

    Ok(FileMetadata {
        path: std::path::absolute(p).unwrap_or_else(|_| p.to_path_buf()),
        file_name,
        size: bytes.len() as u64,
        lines: content.lines().count(),
        content_hash: blake3::hash(&bytes).to_hex().to_string(),
        modified,
        content,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn metadata_of_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("sample.py");
        fs::write(&p, "import os\n\nprint(os.getcwd())\n").unwrap();

        let m = read_metadata(&p).unwrap();
        assert_eq!(m.file_name, "sample.py");
        assert_eq!(m.size, 30);
        assert_eq!(m.lines, 3);
        assert_eq!(m.content_hash.len(), 64);
        assert_eq!(m.modified.len(), 19);
        assert!(m.path.is_absolute());

        // same bytes => same hash
        let again = read_metadata(&p).unwrap();
        assert_eq!(m.content_hash, again.content_hash);
    }

    #[test]
    fn invalid_utf8_is_dropped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("bin.py");
        fs::write(&p, b"ab\xff\xfecd\n").unwrap();

        let m = read_metadata(&p).unwrap();
        assert_eq!(m.content, "abcd\n");
        assert_eq!(m.size, 7);
        assert_eq!(m.content_hash, blake3::hash(b"ab\xff\xfecd\n").to_hex().to_string());
    }

    #[test]
    fn missing_file_is_a_read_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_metadata(&dir.path().join("nope.py")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoReadFailure);
    }

    #[test]
    fn gather_walks_dirs_filters_and_dedups() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("pkg")).unwrap();
        fs::create_dir_all(root.join("code-audit")).unwrap();
        fs::write(root.join("a.py"), "x").unwrap();
        fs::write(root.join("pkg/b.PY"), "x").unwrap();
        fs::write(root.join("pkg/notes.txt"), "x").unwrap();
        fs::write(root.join("pkg/~$lock.py"), "x").unwrap();
        fs::write(root.join("code-audit/old.py"), "x").unwrap();

        let exts = vec!["py".to_string()];
        let args = vec![root.join("a.py"), root.to_path_buf(), root.join("pkg/notes.txt")];
        let got = gather_inputs(&args, &exts, "code-audit").unwrap();

        let names: Vec<String> = got
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(names, vec!["a.py", "pkg/b.PY", "pkg/notes.txt"]);
    }

    #[test]
    fn gather_rejects_missing_argument() {
        let dir = tempfile::tempdir().unwrap();
        let args = vec![dir.path().join("ghost.py")];
        assert!(gather_inputs(&args, &["py".to_string()], "code-audit").is_err());
    }
}
