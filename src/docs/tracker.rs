use tokio::sync::RwLock;

/// Snapshot of the tracked reference markup document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedReference {
    pub filename: String,
    /// Increases by one on every `set`; first reference is version 1.
    pub version: u64,
}

#[derive(Default)]
struct Slot {
    current: Option<TrackedReference>,
    version: u64,
}

/// Most recently ingested reference markup document. Single slot, most
/// recent wins, no history.
///
/// Callers write the markup to storage before calling `set`, so a reader
/// never observes a filename whose content is still being written.
#[derive(Default)]
pub struct ArtifactTracker {
    slot: RwLock<Slot>,
}

impl ArtifactTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point the tracker at `filename`; returns the new version.
    pub async fn set(&self, filename: &str) -> u64 {
        let mut slot = self.slot.write().await;
        slot.version += 1;
        let version = slot.version;
        slot.current = Some(TrackedReference {
            filename: filename.to_string(),
            version,
        });
        version
    }

    pub async fn get(&self) -> Option<TrackedReference> {
        self.slot.read().await.current.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_starts_unset() {
        let tracker = ArtifactTracker::new();
        assert_eq!(tracker.get().await, None);
    }

    #[tokio::test]
    async fn test_most_recent_wins() {
        let tracker = ArtifactTracker::new();
        assert_eq!(tracker.set("a.html").await, 1);
        assert_eq!(tracker.set("b.html").await, 2);
        assert_eq!(tracker.set("a.html").await, 3);
        let current = tracker.get().await.unwrap();
        assert_eq!(current.filename, "a.html");
        assert_eq!(current.version, 3);
    }

    #[tokio::test]
    async fn test_concurrent_sets_yield_distinct_versions() {
        let tracker = Arc::new(ArtifactTracker::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(async move {
                tracker.set(&format!("page{}.html", i)).await
            }));
        }
        let mut versions = Vec::new();
        for h in handles {
            versions.push(h.await.unwrap());
        }
        versions.sort_unstable();
        assert_eq!(versions, (1..=16).collect::<Vec<u64>>());

        let last = tracker.get().await.unwrap();
        assert_eq!(last.version, 16);
    }
}
