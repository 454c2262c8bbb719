//! Content-addressed deduplication index
//!
//! Maps a [`ContentDigest`] to the single canonical file holding that content.
//! Each digest owns a once-cell: the first worker to register a digest runs
//! placement inside the cell while concurrent workers with the same digest
//! wait and then receive the same canonical path. A failed placement leaves
//! the cell empty so a later job can try again.
//!
//! # Examples
//!
//! ```rust,no_run
//! use classroom_sync::app::dedup::DedupIndex;
//! use classroom_sync::app::digest::ContentDigest;
//! use std::path::PathBuf;
//!
//! let index = DedupIndex::new();
//! let digest = ContentDigest::of(b"lesson");
//! let first = index.register(digest, PathBuf::from("/tmp/a.pdf"));
//! let second = index.register(digest, PathBuf::from("/tmp/b.pdf"));
//! assert!(first.is_new());
//! assert_eq!(second.path(), first.path());
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::OnceCell;
use tracing::debug;

use crate::app::digest::ContentDigest;

/// Outcome of registering a digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// The caller's path became canonical
    Inserted(PathBuf),
    /// The digest already had a canonical path
    Existing(PathBuf),
}

impl Registration {
    pub fn path(&self) -> &Path {
        match self {
            Self::Inserted(path) | Self::Existing(path) => path,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }

    pub fn into_path(self) -> PathBuf {
        match self {
            Self::Inserted(path) | Self::Existing(path) => path,
        }
    }
}

/// Snapshot of one index entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupEntry {
    pub path: PathBuf,
    pub ref_count: u64,
}

#[derive(Debug, Default)]
struct Slot {
    canonical: OnceCell<PathBuf>,
    refs: AtomicU64,
}

/// Digest → canonical path index shared by all workers
#[derive(Debug, Default)]
pub struct DedupIndex {
    slots: Mutex<HashMap<ContentDigest, Arc<Slot>>>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<ContentDigest, Arc<Slot>>> {
        // Critical sections never panic midway, so a poisoned map is still consistent
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn slot(&self, digest: ContentDigest) -> Arc<Slot> {
        self.slots().entry(digest).or_default().clone()
    }

    /// Canonical path for a digest, if one has been placed
    pub fn lookup(&self, digest: &ContentDigest) -> Option<PathBuf> {
        self.slots()
            .get(digest)
            .and_then(|slot| slot.canonical.get().cloned())
    }

    /// Full entry for a digest
    pub fn entry(&self, digest: &ContentDigest) -> Option<DedupEntry> {
        let slot = self.slots().get(digest)?.clone();
        let path = slot.canonical.get()?.clone();
        Some(DedupEntry {
            path,
            ref_count: slot.refs.load(Ordering::SeqCst),
        })
    }

    /// Insert `path` as canonical if the digest is absent
    ///
    /// Otherwise returns the existing canonical path. Either way the reference
    /// count is incremented.
    pub fn register(&self, digest: ContentDigest, path: PathBuf) -> Registration {
        let slot = self.slot(digest);
        let outcome = match slot.canonical.set(path.clone()) {
            Ok(()) => Registration::Inserted(path),
            // Either already set, or a placement is in flight; an in-flight
            // placement that later fails leaves the caller's path unused
            Err(_) => match slot.canonical.get() {
                Some(existing) => Registration::Existing(existing.clone()),
                None => Registration::Existing(path),
            },
        };
        slot.refs.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    /// Register a digest, running `place` only if no canonical path exists yet
    ///
    /// Concurrent callers with the same digest wait for the first placement
    /// and share its result. If `place` fails, its error is returned and the
    /// digest stays unplaced.
    pub async fn register_with<F, Fut, E>(
        &self,
        digest: ContentDigest,
        place: F,
    ) -> Result<Registration, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<PathBuf, E>>,
    {
        let slot = self.slot(digest);
        let mut placed_here = false;
        let flag = &mut placed_here;

        let path = slot
            .canonical
            .get_or_try_init(move || async move {
                let path = place().await?;
                *flag = true;
                Ok::<_, E>(path)
            })
            .await?
            .clone();

        let refs = slot.refs.fetch_add(1, Ordering::SeqCst) + 1;
        if placed_here {
            debug!("Placed {} at {}", digest.short(), path.display());
            Ok(Registration::Inserted(path))
        } else {
            debug!("Digest {} already stored ({} refs)", digest.short(), refs);
            Ok(Registration::Existing(path))
        }
    }

    /// Load previously recorded digests, skipping files no longer on disk
    ///
    /// Returns the number of digests that became canonical.
    pub async fn seed<I>(&self, known: I) -> usize
    where
        I: IntoIterator<Item = (ContentDigest, PathBuf)>,
    {
        let mut seeded = 0;
        for (digest, path) in known {
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                debug!("Skipping seed for {}: {} missing", digest.short(), path.display());
                continue;
            }
            if self.register(digest, path).is_new() {
                seeded += 1;
            }
        }
        seeded
    }

    /// Forget every entry
    pub fn clear(&self) {
        self.slots().clear();
    }

    /// Number of digests with a canonical path
    pub fn len(&self) -> usize {
        self.slots()
            .values()
            .filter(|slot| slot.canonical.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_register_and_lookup() {
        let index = DedupIndex::new();
        let digest = ContentDigest::of(b"one");
        assert!(index.lookup(&digest).is_none());

        let first = index.register(digest, PathBuf::from("a.pdf"));
        let second = index.register(digest, PathBuf::from("b.pdf"));

        assert_eq!(first, Registration::Inserted(PathBuf::from("a.pdf")));
        assert_eq!(second, Registration::Existing(PathBuf::from("a.pdf")));
        assert_eq!(index.lookup(&digest), Some(PathBuf::from("a.pdf")));
        assert_eq!(index.entry(&digest).unwrap().ref_count, 2);
        assert_eq!(index.len(), 1);
    }

    /// Test single placement under contention
    ///
    /// Many tasks registering the same digest concurrently must run placement
    /// exactly once and all observe the same canonical path.
    #[tokio::test]
    async fn test_concurrent_register_with_places_once() {
        let index = Arc::new(DedupIndex::new());
        let placements = Arc::new(AtomicU32::new(0));
        let digest = ContentDigest::of(b"shared");

        let mut handles = Vec::new();
        for i in 0..16 {
            let index = index.clone();
            let placements = placements.clone();
            handles.push(tokio::spawn(async move {
                index
                    .register_with(digest, || async move {
                        placements.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Ok::<_, std::io::Error>(PathBuf::from(format!("copy_{}.pdf", i)))
                    })
                    .await
                    .unwrap()
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        assert_eq!(placements.load(Ordering::SeqCst), 1);
        assert_eq!(results.iter().filter(|r| r.is_new()).count(), 1);
        let canonical = results[0].path().to_path_buf();
        assert!(results.iter().all(|r| r.path() == canonical));
        assert_eq!(index.entry(&digest).unwrap().ref_count, 16);
    }

    #[tokio::test]
    async fn test_failed_placement_can_be_retried() {
        let index = DedupIndex::new();
        let digest = ContentDigest::of(b"flaky");

        let failed = index
            .register_with(digest, || async { Err::<PathBuf, _>("disk full") })
            .await;
        assert_eq!(failed, Err("disk full"));
        assert!(index.lookup(&digest).is_none());

        let placed = index
            .register_with(digest, || async { Ok::<_, &str>(PathBuf::from("ok.pdf")) })
            .await
            .unwrap();
        assert!(placed.is_new());
        assert_eq!(index.entry(&digest).unwrap().ref_count, 1);
    }

    #[tokio::test]
    async fn test_seed_skips_missing_files() {
        let temp_dir = TempDir::new().unwrap();
        let present = temp_dir.path().join("present.pdf");
        tokio::fs::write(&present, b"x").await.unwrap();

        let index = DedupIndex::new();
        let a = ContentDigest::of(b"a");
        let b = ContentDigest::of(b"b");
        let seeded = index
            .seed(vec![
                (a, present.clone()),
                (a, present.clone()),
                (b, temp_dir.path().join("gone.pdf")),
            ])
            .await;

        assert_eq!(seeded, 1);
        assert_eq!(index.lookup(&a), Some(present));
        assert!(index.lookup(&b).is_none());
        assert_eq!(index.entry(&a).unwrap().ref_count, 2);
    }

    #[tokio::test]
    async fn test_clear_then_seed_drops_deleted_files() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("notes.pdf");
        tokio::fs::write(&path, b"x").await.unwrap();

        let index = DedupIndex::new();
        let digest = ContentDigest::of(b"notes");
        assert_eq!(index.seed(vec![(digest, path.clone())]).await, 1);

        tokio::fs::remove_file(&path).await.unwrap();
        index.clear();
        assert_eq!(index.seed(vec![(digest, path)]).await, 0);
        assert!(index.lookup(&digest).is_none());
        assert!(index.is_empty());
    }
}
