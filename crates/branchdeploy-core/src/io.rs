use crate::error::Result;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically write `data` to `path` using a tempfile in the same directory.
/// A reader in a later phase never observes a half-written file.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Append text to a file, creating it if it doesn't exist.
pub fn append_text(path: &Path, text: &str) -> Result<()> {
    let mut f = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    f.write_all(text.as_bytes())?;
    Ok(())
}

/// Read a file and trim surrounding whitespace. `None` if the file is absent.
pub fn read_trimmed(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content.trim().to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/name");
        atomic_write(&path, b"data").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "data");
    }

    #[test]
    fn atomic_write_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("name");
        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
    }

    #[test]
    fn append_text_accumulates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out");
        append_text(&path, "a=1\n").unwrap();
        append_text(&path, "b=2\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a=1\nb=2\n");
    }

    #[test]
    fn read_trimmed_missing_is_none() {
        let dir = TempDir::new().unwrap();
        assert_eq!(read_trimmed(&dir.path().join("nope")).unwrap(), None);
        std::fs::write(dir.path().join("x"), "  value\n").unwrap();
        assert_eq!(read_trimmed(&dir.path().join("x")).unwrap().as_deref(), Some("value"));
    }
}
