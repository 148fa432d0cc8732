use std::path::Path;

use crate::errors::ScanError;

/// Atomic file write: write to temp, then rename
pub async fn atomic_write(path: &Path, content: &str) -> Result<(), ScanError> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_atomic_write_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw_findings.json");
        atomic_write(&path, "[]").await.unwrap();
        atomic_write(&path, "[1]").await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "[1]");
        assert!(!dir.path().join("raw_findings.tmp").exists());
    }
}
