// src/registry.rs

//! Shared table of running processes.
//!
//! The registry is the only state shared between concurrent calls. It is
//! owned by the service and handed to every execution; there is no global
//! instance. Handles are fully built before insertion and the map is guarded
//! by a read/write lock, so readers never observe a partial entry.
//!
//! Executions register through [`ProcessRegistry::register`], which returns a
//! [`Registration`] guard. Dropping the guard removes the entry, which makes
//! removal happen exactly once on every exit path.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

/// Live handle for one started process.
#[derive(Debug)]
pub struct RunningProcess {
    pub id: String,
    pub tool: String,
    pub args: Vec<String>,
    pub started_at: DateTime<Utc>,
    started: Instant,
    cancel: Notify,
}

impl RunningProcess {
    pub fn new(id: impl Into<String>, tool: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            id: id.into(),
            tool: tool.into(),
            args,
            started_at: Utc::now(),
            started: Instant::now(),
            cancel: Notify::new(),
        }
    }

    /// Ask the owning execution to stop. Fire-and-forget; a request made
    /// before the execution starts listening is not lost.
    pub fn request_cancel(&self) {
        self.cancel.notify_one();
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        self.cancel.notified().await;
    }

    pub fn info(&self) -> ProcessInfo {
        ProcessInfo {
            process_id: self.id.clone(),
            tool: self.tool.clone(),
            args: self.args.clone(),
            started_at: self.started_at,
            duration_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}

/// Point-in-time view of a running process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInfo {
    pub process_id: String,
    pub tool: String,
    pub args: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Structured answer to a cancel request. An unknown id is not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOutcome {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
    inner: Arc<RwLock<HashMap<String, Arc<RunningProcess>>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: RunningProcess) -> Arc<RunningProcess> {
        let handle = Arc::new(handle);
        self.write().insert(handle.id.clone(), Arc::clone(&handle));
        handle
    }

    /// Remove `id`; absent ids are a no-op.
    pub fn remove(&self, id: &str) -> Option<Arc<RunningProcess>> {
        self.write().remove(id)
    }

    pub fn lookup(&self, id: &str) -> Option<Arc<RunningProcess>> {
        self.read().get(id).cloned()
    }

    pub fn list_all(&self) -> Vec<Arc<RunningProcess>> {
        self.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Insert `handle` and tie its removal to the returned guard.
    pub fn register(&self, handle: RunningProcess) -> Registration {
        let handle = self.insert(handle);
        Registration {
            registry: self.clone(),
            handle,
        }
    }

    /// Snapshot of every running process, oldest first.
    pub fn snapshot(&self) -> Vec<ProcessInfo> {
        let mut infos: Vec<ProcessInfo> = self.read().values().map(|p| p.info()).collect();
        infos.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.process_id.cmp(&b.process_id))
        });
        infos
    }

    pub fn cancel(&self, id: &str) -> CancelOutcome {
        match self.lookup(id) {
            Some(process) => {
                process.request_cancel();
                CancelOutcome {
                    success: true,
                    message: format!("process {id} cancelled"),
                }
            }
            None => CancelOutcome {
                success: false,
                message: format!("process {id} not found"),
            },
        }
    }

    /// Request cancellation of everything currently registered. Returns how
    /// many processes were signalled.
    pub fn cancel_all(&self) -> usize {
        let processes = self.list_all();
        for process in &processes {
            process.request_cancel();
        }
        processes.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<RunningProcess>>> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<RunningProcess>>> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Keeps a process registered for as long as it lives.
#[derive(Debug)]
pub struct Registration {
    registry: ProcessRegistry,
    handle: Arc<RunningProcess>,
}

impl Registration {
    pub fn handle(&self) -> &RunningProcess {
        &self.handle
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.registry.remove(&self.handle.id).is_some() {
            debug!(process_id = %self.handle.id, "process unregistered");
        }
    }
}
