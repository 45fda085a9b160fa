//! File persistence helpers shared by the ledger and the pipeline stages.
//!
//! - `write_atomic`: write to a temp file in the target directory, fsync,
//!   then rename into place. Readers never observe a partial file.
//! - `append_line`: append one line under an exclusive advisory lock so
//!   concurrent writers never interleave partial lines.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::warn;

/// How `write_atomic` treats an existing file at the target path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace the target (stage outputs)
    Replace,

    /// Fail if the target exists (append-only records)
    CreateNew,
}

/// Atomically write `bytes` to `path`.
pub fn write_atomic(path: &Path, bytes: &[u8], mode: WriteMode) -> io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".tmp-")
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;

    // On error the NamedTempFile is dropped and its file removed.
    persist(tmp, path, mode)
}

fn persist(tmp: NamedTempFile, path: &Path, mode: WriteMode) -> io::Result<()> {
    let result = match mode {
        WriteMode::Replace => tmp.persist(path),
        WriteMode::CreateNew => tmp.persist_noclobber(path),
    };
    result.map(|_| ()).map_err(|e| e.error)
}

/// Atomically write `value` as pretty JSON.
pub fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
    mode: WriteMode,
) -> io::Result<()> {
    let mut bytes = serde_json::to_vec_pretty(value).map_err(io::Error::from)?;
    bytes.push(b'\n');
    write_atomic(path, &bytes, mode)
}

/// Append a single line (newline added) under an exclusive file lock.
pub fn append_line(path: &Path, line: &str) -> io::Result<()> {
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.lock_exclusive()?;

    // Single write so the line lands whole; the lock is released on drop.
    let mut buf = Vec::with_capacity(line.len() + 1);
    buf.extend_from_slice(line.as_bytes());
    buf.push(b'\n');
    file.write_all(&buf)?;
    file.flush()
}

/// Read an NDJSON file, skipping blank lines. Lines that fail to parse are
/// logged and skipped; the count of skipped lines is returned alongside.
pub fn read_ndjson<T: DeserializeOwned>(path: &Path) -> io::Result<(Vec<T>, usize)> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut items = Vec::new();
    let mut skipped = 0;

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(item) => items.push(item),
            Err(e) => {
                skipped += 1;
                warn!(path = %path.display(), line = idx + 1, error = %e, "Skipping malformed line");
            }
        }
    }

    Ok((items, skipped))
}

/// Read a whole JSON document.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> io::Result<T> {
    let content = fs::read(path)?;
    serde_json::from_slice(&content).map_err(io::Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_replace() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out").join("file.json");

        write_atomic(&path, b"first", WriteMode::Replace).unwrap();
        write_atomic(&path, b"second", WriteMode::Replace).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_write_atomic_create_new_refuses_overwrite() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("record.json");

        write_atomic(&path, b"original", WriteMode::CreateNew).unwrap();
        let err = write_atomic(&path, b"clobber", WriteMode::CreateNew).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read_to_string(&path).unwrap(), "original");
    }

    #[test]
    fn test_append_line_and_read_ndjson() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("log.jsonl");

        append_line(&path, r#"{"n":1}"#).unwrap();
        append_line(&path, "not json").unwrap();
        append_line(&path, r#"{"n":2}"#).unwrap();

        let (items, skipped): (Vec<serde_json::Value>, usize) = read_ndjson(&path).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(skipped, 1);
        assert_eq!(items[1]["n"], 2);
    }

    #[test]
    fn test_concurrent_appends_do_not_interleave() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("log.jsonl");
        let payload = "x".repeat(4096);

        std::thread::scope(|s| {
            for worker in 0..8 {
                let path = &path;
                let payload = &payload;
                s.spawn(move || {
                    for i in 0..25 {
                        let line = serde_json::json!({"w": worker, "i": i, "p": payload}).to_string();
                        append_line(path, &line).unwrap();
                    }
                });
            }
        });

        let (items, skipped): (Vec<serde_json::Value>, usize) = read_ndjson(&path).unwrap();
        assert_eq!(skipped, 0);
        assert_eq!(items.len(), 200);
    }
}
