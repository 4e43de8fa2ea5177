//! File-backed storage for reference markup documents.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use tracing::debug;

/// Reduce an uploaded filename to its final path component.
pub fn safe_filename(name: &str) -> Result<String> {
    let normalized = name.replace('\\', "/");
    let last = normalized.rsplit('/').next().unwrap_or("").trim();
    anyhow::ensure!(
        !last.is_empty() && last != "." && last != "..",
        "invalid markup filename: {:?}",
        name
    );
    Ok(last.to_string())
}

/// `file://` URL for an absolute path, as a browser driver expects it.
pub fn file_url(path: &Path) -> String {
    let p = path.to_string_lossy().replace('\\', "/");
    if p.starts_with('/') {
        format!("file://{}", p)
    } else {
        format!("file:///{}", p)
    }
}

/// Durable keyed storage: one file per markup document under `dir`.
pub struct MarkupStore {
    dir: PathBuf,
    /// Gives every in-flight write its own temp file.
    writes: AtomicU64,
}

impl MarkupStore {
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create markup dir {:?}", dir))?;
        let dir = std::fs::canonicalize(dir)
            .with_context(|| format!("Failed to resolve markup dir {:?}", dir))?;
        Ok(Self {
            dir,
            writes: AtomicU64::new(0),
        })
    }

    /// Absolute path of the file stored under `filename`.
    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    /// Write `content` under `filename`, replacing any previous content.
    /// The file appears atomically (temp file + rename).
    pub async fn write(&self, filename: &str, content: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(filename);
        let seq = self.writes.fetch_add(1, Ordering::Relaxed);
        let tmp = self.dir.join(format!(".{}.{}.tmp", filename, seq));
        tokio::fs::write(&tmp, content)
            .await
            .with_context(|| format!("Failed to write {:?}", tmp))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e)
                .with_context(|| format!("Failed to move markup into place at {:?}", path));
        }
        debug!(filename, size = content.len(), "markup stored");
        Ok(path)
    }

    /// Read a stored document; `None` when nothing is stored under `filename`.
    pub async fn read(&self, filename: &str) -> Result<Option<String>> {
        match tokio::fs::read(self.path_for(filename)).await {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read markup {}", filename)),
        }
    }
}
