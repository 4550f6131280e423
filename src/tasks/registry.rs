use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub type TaskId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Starting,
    Downloading,
    Extracting,
    Uploading,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// Progress of one background job, as served to polling clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub status: TaskStatus,
    pub progress: u8,
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
}

struct TaskEntry {
    record: TaskRecord,
    cancel: CancellationToken,
    finished_at: Option<Instant>,
}

/// In-memory map of background jobs.
///
/// Terminal records are sticky: once a task is completed, failed, or
/// cancelled, no mutator touches it again. Progress only moves forward.
/// Finished entries are evicted after the retention window.
pub struct TaskRegistry {
    tasks: Mutex<HashMap<TaskId, TaskEntry>>,
    retention: Duration,
}

impl TaskRegistry {
    pub fn new(retention: Duration) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            retention,
        }
    }

    /// Create a record in `starting` state and return its cancellation token.
    pub fn register(
        &self,
        id: &str,
        file_name: &str,
        file_id: Option<String>,
    ) -> CancellationToken {
        let cancel = CancellationToken::new();
        let entry = TaskEntry {
            record: TaskRecord {
                status: TaskStatus::Starting,
                progress: 0,
                file_name: file_name.to_string(),
                error: None,
                file_id,
            },
            cancel: cancel.clone(),
            finished_at: None,
        };
        self.lock().insert(id.to_string(), entry);
        cancel
    }

    pub fn get(&self, id: &str) -> Option<TaskRecord> {
        self.lock().get(id).map(|entry| entry.record.clone())
    }

    pub fn cancel_token(&self, id: &str) -> Option<CancellationToken> {
        self.lock().get(id).map(|entry| entry.cancel.clone())
    }

    /// Move a live task into a non-terminal phase.
    pub fn set_status(&self, id: &str, status: TaskStatus) {
        self.update(id, |entry| entry.record.status = status);
    }

    pub fn set_file_name(&self, id: &str, file_name: &str) {
        self.update(id, |entry| entry.record.file_name = file_name.to_string());
    }

    /// Raise progress; regressions are ignored.
    pub fn advance_progress(&self, id: &str, progress: u8) {
        self.update(id, |entry| {
            if progress > entry.record.progress {
                entry.record.progress = progress;
            }
        });
    }

    pub fn complete(&self, id: &str, file_id: Option<String>) {
        self.update(id, |entry| {
            entry.record.status = TaskStatus::Completed;
            entry.record.progress = 100;
            if file_id.is_some() {
                entry.record.file_id = file_id;
            }
            entry.finished_at = Some(Instant::now());
        });
    }

    pub fn fail(&self, id: &str, error: impl Into<String>) {
        self.update(id, |entry| {
            entry.record.status = TaskStatus::Failed;
            entry.record.error = Some(error.into());
            entry.finished_at = Some(Instant::now());
        });
    }

    /// Cancel a task. `None` for an unknown id; `Some(false)` when the task
    /// had already finished; `Some(true)` when the token was fired.
    pub fn cancel(&self, id: &str) -> Option<bool> {
        let mut tasks = self.lock();
        let entry = tasks.get_mut(id)?;
        if entry.record.status.is_terminal() {
            return Some(false);
        }
        entry.cancel.cancel();
        entry.record.status = TaskStatus::Cancelled;
        entry.finished_at = Some(Instant::now());
        Some(true)
    }

    /// Drop finished entries older than the retention window.
    pub fn sweep(&self) -> usize {
        let retention = self.retention;
        let mut tasks = self.lock();
        let before = tasks.len();
        tasks.retain(|_, entry| match entry.finished_at {
            Some(finished_at) => finished_at.elapsed() < retention,
            None => true,
        });
        before - tasks.len()
    }

    fn update<F: FnOnce(&mut TaskEntry)>(&self, id: &str, f: F) {
        let mut tasks = self.lock();
        if let Some(entry) = tasks.get_mut(id)
            && !entry.record.status.is_terminal()
        {
            f(entry);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TaskId, TaskEntry>> {
        self.tasks.lock().expect("task registry lock poisoned")
    }
}

/// Periodically evict finished task records.
pub fn spawn_sweeper(registry: Arc<TaskRegistry>) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            tick.tick().await;
            let evicted = registry.sweep();
            if evicted > 0 {
                debug!(evicted, "evicted finished task records");
            }
        }
    });
}
