use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Read a file to string, replacing invalid UTF-8 sequences with the replacement character.
///
/// # Errors
/// Returns an error if the file cannot be read.
pub fn read_to_string_lossy(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Atomically write bytes to a file by writing to a temp file then renaming.
///
/// Missing parent directories are created. The file will either have the old
/// contents or the new contents, never a partial write.
///
/// # Errors
/// Returns an error if the directory, write or rename fails.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)?;
    }

    // Same directory as the target so the rename stays on one filesystem
    let mut temp_path = parent.to_path_buf();
    temp_path.push(format!(
        ".{}.tmp.{}.{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("file"),
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    {
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    match fs::rename(&temp_path, path) {
        Ok(()) => Ok(()),
        Err(e) => {
            // On Windows, rename can fail if target exists. Try copy + remove as fallback.
            if cfg!(windows) {
                fs::copy(&temp_path, path)?;
                let _ = fs::remove_file(&temp_path);
                Ok(())
            } else {
                let _ = fs::remove_file(&temp_path);
                Err(e)
            }
        }
    }
}

/// Write `bytes` to `path` unless the file already holds exactly those bytes.
///
/// Returns `true` when the file was (re)written. An unchanged file keeps its
/// modification time.
///
/// # Errors
/// Returns an error if the existing file cannot be read or the write fails.
pub fn write_if_changed(path: &Path, bytes: &[u8]) -> io::Result<bool> {
    match fs::read(path) {
        Ok(existing) if existing == bytes => return Ok(false),
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    atomic_write(path, bytes)?;
    Ok(true)
}

/// Whether `source` was modified after `target`.
///
/// A missing target counts as older than any source.
///
/// # Errors
/// Returns an error if the source metadata cannot be read.
pub fn is_newer(source: &Path, target: &Path) -> io::Result<bool> {
    let source_mtime = fs::metadata(source)?.modified()?;
    let target_mtime = match fs::metadata(target) {
        Ok(meta) => meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e),
    };
    Ok(source_mtime > target_mtime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::{tempdir, NamedTempFile};

    #[test]
    fn test_read_to_string_lossy_valid_utf8() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();
        file.flush().unwrap();

        let content = read_to_string_lossy(file.path()).unwrap();
        assert_eq!(content, "hello world");
    }

    #[test]
    fn test_read_to_string_lossy_invalid_utf8() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[0x48, 0x65, 0x6c, 0x6c, 0x6f, 0x80, 0x81])
            .unwrap();
        file.flush().unwrap();

        let content = read_to_string_lossy(file.path()).unwrap();
        assert!(content.starts_with("Hello"));
        assert!(content.contains('\u{FFFD}'));
    }

    #[test]
    fn test_atomic_write_creates_parents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/deeper/test.txt");

        atomic_write(&path, b"hello").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello");

        atomic_write(&path, b"world").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "world");
    }

    #[test]
    fn test_atomic_write_no_temp_left_on_success() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.txt");

        atomic_write(&path, b"content").unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].as_ref().unwrap().file_name().to_str().unwrap(),
            "test.txt"
        );
    }

    #[test]
    fn test_write_if_changed_skips_identical_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.css");

        assert!(write_if_changed(&path, b"a{}").unwrap());
        let before = fs::metadata(&path).unwrap().modified().unwrap();
        std::thread::sleep(Duration::from_millis(20));

        assert!(!write_if_changed(&path, b"a{}").unwrap());
        let after = fs::metadata(&path).unwrap().modified().unwrap();
        assert_eq!(before, after);

        assert!(write_if_changed(&path, b"b{}").unwrap());
        assert_eq!(fs::read(&path).unwrap(), b"b{}");
    }

    #[test]
    fn test_is_newer_missing_target() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.png");
        fs::write(&source, b"png").unwrap();

        assert!(is_newer(&source, &dir.path().join("missing.png")).unwrap());
    }

    #[test]
    fn test_is_newer_after_target_written() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.png");
        let target = dir.path().join("b.png");
        fs::write(&source, b"png").unwrap();
        std::thread::sleep(Duration::from_millis(20));
        fs::write(&target, b"png").unwrap();

        assert!(!is_newer(&source, &target).unwrap());
    }
}
