//! In-memory stand-ins for the classroom service and the file host

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Semaphore;

use classroom_sync::app::client::{ClassroomSource, FileHost, HostedBytes, RemoteFile};
use classroom_sync::app::models::{Course, DateRange, Material};
use classroom_sync::app::orchestrator::{Orchestrator, OrchestratorConfig};
use classroom_sync::app::queue::RetryPolicy;
use classroom_sync::app::rate::RateGate;
use classroom_sync::app::store::MetadataStore;
use classroom_sync::app::sync_run::{ProgressSnapshot, RunStatus};
use classroom_sync::app::worker::WorkerConfig;
use classroom_sync::errors::{ClientError, ClientResult, FetchError, FetchResult};

#[derive(Debug, Default)]
pub struct FakeClassroom {
    courses: Vec<Course>,
    materials: HashMap<String, Vec<Material>>,
    failing_courses: HashSet<String>,
}

impl FakeClassroom {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn course(mut self, course: Course, materials: Vec<Material>) -> Self {
        self.materials.insert(course.id.clone(), materials);
        self.courses.push(course);
        self
    }

    /// Listing materials of `course_id` fails with a server error
    pub fn failing(mut self, course_id: &str) -> Self {
        self.failing_courses.insert(course_id.to_string());
        self
    }
}

#[async_trait]
impl ClassroomSource for FakeClassroom {
    async fn list_courses(&self, _active_only: bool) -> ClientResult<Vec<Course>> {
        Ok(self.courses.clone())
    }

    async fn get_course(&self, course_id: &str) -> ClientResult<Course> {
        self.courses
            .iter()
            .find(|c| c.id == course_id)
            .cloned()
            .ok_or_else(|| ClientError::Status {
                status: 404,
                url: format!("courses/{}", course_id),
                reason: None,
            })
    }

    async fn list_materials(&self, course_id: &str, _range: &DateRange) -> ClientResult<Vec<Material>> {
        if self.failing_courses.contains(course_id) {
            return Err(ClientError::Status {
                status: 503,
                url: format!("courses/{}/courseWork", course_id),
                reason: None,
            });
        }
        Ok(self.materials.get(course_id).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Clone)]
struct HostedFile {
    name: String,
    mime_type: String,
    bytes: Vec<u8>,
}

/// File host serving fixed payloads, with injectable failures
#[derive(Debug)]
pub struct FakeHost {
    files: HashMap<String, HostedFile>,
    denied: HashSet<String>,
    transient: Mutex<HashMap<String, u32>>,
    calls: Mutex<HashMap<String, usize>>,
    total_calls: AtomicUsize,
    hold: Option<Arc<Semaphore>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            files: HashMap::new(),
            denied: HashSet::new(),
            transient: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            total_calls: AtomicUsize::new(0),
            hold: None,
        }
    }

    pub fn file(mut self, file_id: &str, name: &str, mime_type: &str, bytes: &[u8]) -> Self {
        self.files.insert(
            file_id.to_string(),
            HostedFile {
                name: name.to_string(),
                mime_type: mime_type.to_string(),
                bytes: bytes.to_vec(),
            },
        );
        self
    }

    pub fn denied(mut self, file_id: &str) -> Self {
        self.denied.insert(file_id.to_string());
        self
    }

    /// The next `failures` transfers of `file_id` fail transiently
    pub fn flaky(self, file_id: &str, failures: u32) -> Self {
        self.transient
            .lock()
            .unwrap()
            .insert(file_id.to_string(), failures);
        self
    }

    /// Transfers wait for a permit from `hold`
    pub fn held_by(mut self, hold: Arc<Semaphore>) -> Self {
        self.hold = Some(hold);
        self
    }

    pub fn calls_for(&self, file_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(file_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    async fn transfer(&self, file_id: &str, mime_type: Option<String>) -> FetchResult<HostedBytes> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        *self
            .calls
            .lock()
            .unwrap()
            .entry(file_id.to_string())
            .or_default() += 1;

        if let Some(hold) = &self.hold {
            let _permit = hold.acquire().await;
        }

        if self.denied.contains(file_id) {
            return Err(FetchError::PermissionDenied {
                file_id: file_id.to_string(),
            });
        }

        {
            let mut transient = self.transient.lock().unwrap();
            if let Some(remaining) = transient.get_mut(file_id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(FetchError::Transient {
                        file_id: file_id.to_string(),
                        reason: "HTTP 503".to_string(),
                    });
                }
            }
        }

        let file = self.files.get(file_id).ok_or_else(|| FetchError::NotFound {
            file_id: file_id.to_string(),
        })?;
        Ok(HostedBytes {
            bytes: file.bytes.clone(),
            mime_type: Some(mime_type.unwrap_or_else(|| file.mime_type.clone())),
        })
    }
}

#[async_trait]
impl FileHost for FakeHost {
    async fn metadata(&self, file_id: &str) -> FetchResult<RemoteFile> {
        let file = self.files.get(file_id).ok_or_else(|| FetchError::NotFound {
            file_id: file_id.to_string(),
        })?;
        Ok(RemoteFile {
            id: file_id.to_string(),
            name: file.name.clone(),
            mime_type: file.mime_type.clone(),
            size: Some(file.bytes.len() as u64),
            web_view_link: None,
        })
    }

    async fn download(&self, file_id: &str) -> FetchResult<HostedBytes> {
        self.transfer(file_id, None).await
    }

    async fn export(&self, file_id: &str, mime_type: &str) -> FetchResult<HostedBytes> {
        self.transfer(file_id, Some(mime_type.to_string())).await
    }
}

/// Orchestrator over fakes, an in-memory store and a temporary download root
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub host: Arc<FakeHost>,
    pub store: MetadataStore,
    pub root: PathBuf,
    _dir: TempDir,
}

impl Harness {
    pub async fn new(classroom: FakeClassroom, host: FakeHost) -> Self {
        Self::with_workers(classroom, host, 4).await
    }

    pub async fn with_workers(classroom: FakeClassroom, host: FakeHost, workers: usize) -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("materials");
        let store = MetadataStore::in_memory().await.unwrap();
        let host = Arc::new(host);

        let orchestrator = build(Arc::new(classroom), host.clone(), store.clone(), &root, workers);
        Self {
            orchestrator,
            host,
            store,
            root,
            _dir: dir,
        }
    }

    /// A second orchestrator sharing this harness's store and download root
    pub fn restarted(&self, classroom: FakeClassroom) -> Orchestrator {
        build(
            Arc::new(classroom),
            self.host.clone(),
            self.store.clone(),
            &self.root,
            4,
        )
    }

    /// Every regular file under the download root, sorted
    pub fn files_on_disk(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        collect_files(&self.root, &mut files);
        files.sort();
        files
    }

    /// Poll progress until `predicate` holds
    pub async fn wait_for<F>(&self, predicate: F) -> ProgressSnapshot
    where
        F: Fn(&ProgressSnapshot) -> bool,
    {
        for _ in 0..500 {
            let snapshot = self.orchestrator.status().await;
            if predicate(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("progress never reached the expected state");
    }

    pub async fn wait_until_running(&self) -> ProgressSnapshot {
        self.wait_for(|s| s.status == Some(RunStatus::Running) && s.current_file_name.is_some())
            .await
    }
}

fn build(
    classroom: Arc<FakeClassroom>,
    host: Arc<FakeHost>,
    store: MetadataStore,
    root: &Path,
    workers: usize,
) -> Orchestrator {
    let config = OrchestratorConfig::new(root).with_worker_config(WorkerConfig {
        worker_count: workers,
        fetch_timeout: Duration::from_secs(5),
        retry: RetryPolicy::immediate(3),
    });
    Orchestrator::new(classroom, host, store, RateGate::unlimited(), config).unwrap()
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, files);
        } else {
            files.push(path);
        }
    }
}
