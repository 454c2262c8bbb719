//! File placement and naming
//!
//! Finalized payloads land at
//! `root/{course name or Uncategorized}/{category}/{sanitized file name}`.
//! Each candidate name is claimed with an exclusive create, so two workers
//! that compute the same name never overwrite each other; the loser moves on
//! to the next numeric suffix. Content is written to a temporary file in the
//! same directory and renamed over the claimed name, so a reader never sees a
//! partially written file under its final name.
//!
//! # Module Organization
//!
//! - [`naming`] - sanitization, categories and suffix candidates

pub mod naming;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::constants::naming as limits;
use crate::errors::{PlacementError, PlacementResult};

pub use naming::{base_file_name, course_dir_name, file_name_for_plan, Category};

/// Writes payloads into the category-organized download tree
#[derive(Debug, Clone)]
pub struct FilePlacer {
    root: PathBuf,
    max_suffix: u32,
}

impl FilePlacer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_suffix: limits::MAX_COLLISION_SUFFIX,
        }
    }

    /// Lower the suffix ceiling (used to exercise exhaustion)
    pub fn with_max_suffix(mut self, max_suffix: u32) -> Self {
        self.max_suffix = max_suffix;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Target directory for a course and category
    pub fn directory_for(&self, course_name: Option<&str>, category: Category) -> PathBuf {
        self.root
            .join(course_dir_name(course_name))
            .join(category.dir_name())
    }

    /// Write `bytes` under a fresh, collision-free name
    ///
    /// # Errors
    ///
    /// * `PlacementError::CollisionExhausted` if every suffix up to the ceiling is taken
    /// * `PlacementError::Io` for filesystem failures
    pub async fn place(
        &self,
        course_name: Option<&str>,
        file_name: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> PlacementResult<PathBuf> {
        let base = base_file_name(file_name, mime_type);
        let category = Category::classify(mime_type, &base);
        let directory = self.directory_for(course_name, category);

        fs::create_dir_all(&directory)
            .await
            .map_err(|source| PlacementError::Io {
                path: directory.clone(),
                source,
            })?;

        let target = self.claim(&directory, &base).await?;

        if let Err(e) = self.write_over(&directory, &target, bytes).await {
            // Release the claim so the name can be reused
            let _ = fs::remove_file(&target).await;
            return Err(e);
        }

        info!("Saved {} ({} bytes)", target.display(), bytes.len());
        Ok(target)
    }

    /// Reserve the first free candidate name with an exclusive create
    async fn claim(&self, directory: &Path, base: &str) -> PlacementResult<PathBuf> {
        for n in 0..=self.max_suffix {
            let candidate = directory.join(naming::candidate_name(base, n));
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
                .await
            {
                Ok(_) => {
                    if n > 0 {
                        debug!("Name collision on {}, using suffix {}", base, n);
                    }
                    return Ok(candidate);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(source) => {
                    return Err(PlacementError::Io {
                        path: candidate,
                        source,
                    })
                }
            }
        }

        Err(PlacementError::CollisionExhausted {
            directory: directory.to_path_buf(),
            base_name: base.to_string(),
            attempts: self.max_suffix + 1,
        })
    }

    async fn write_over(&self, directory: &Path, target: &Path, bytes: &[u8]) -> PlacementResult<()> {
        let temp_path = directory.join(format!(
            "{}{:016x}.tmp",
            limits::TEMP_FILE_PREFIX,
            fastrand::u64(..)
        ));
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| PlacementError::Io { path, source }
        };

        let result = async {
            let mut file = fs::File::create(&temp_path).await.map_err(io_err(&temp_path))?;
            file.write_all(bytes).await.map_err(io_err(&temp_path))?;
            file.sync_all().await.map_err(io_err(&temp_path))?;
            drop(file);
            fs::rename(&temp_path, target).await.map_err(io_err(target))
        }
        .await;

        if result.is_err() {
            let _ = fs::remove_file(&temp_path).await;
        }
        result
    }
}
