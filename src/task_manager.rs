// Named task supervision on top of tokio: spawn, await, abort, and fault reporting.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::TransportError;

#[derive(Debug, Clone)]
pub struct TaskManagerConfig {
    /// How long `cancel_task` waits for an aborted task to unwind.
    pub cancel_timeout: Duration,
    /// How long `shutdown` waits for each remaining task.
    pub shutdown_timeout: Duration,
}

impl Default for TaskManagerConfig {
    fn default() -> Self {
        Self {
            cancel_timeout: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug)]
pub struct TaskData {
    pub id: Uuid,
    pub name: String,
    pub created_at: Instant,
}

/// A task that ended with an error.
#[derive(Debug, Clone)]
pub struct TaskFault {
    pub task_id: Uuid,
    pub name: String,
    pub error: String,
}

type TaskResult = Result<(), TransportError>;
type TaskTable = Arc<RwLock<HashMap<Uuid, TaskData>>>;

pub struct TaskManager {
    tasks: TaskTable,
    task_handles: Arc<RwLock<HashMap<Uuid, JoinHandle<TaskResult>>>>,
    config: TaskManagerConfig,
    shutdown_tx: broadcast::Sender<()>,
    fault_tx: broadcast::Sender<TaskFault>,
}

impl TaskManager {
    pub fn new(config: TaskManagerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);
        let (fault_tx, _) = broadcast::channel(64);

        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            task_handles: Arc::new(RwLock::new(HashMap::new())),
            config,
            shutdown_tx,
            fault_tx,
        }
    }

    pub fn config(&self) -> &TaskManagerConfig {
        &self.config
    }

    pub async fn create_task<F, Fut>(
        &self,
        name: impl Into<String>,
        future: F,
    ) -> Result<TaskHandle, TaskError>
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        let name = name.into();
        let task_id = Uuid::new_v4();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        // Registered before spawning so the task can always remove its own entry.
        {
            let mut tasks = self.tasks.write().await;
            tasks.insert(
                task_id,
                TaskData {
                    id: task_id,
                    name: name.clone(),
                    created_at: Instant::now(),
                },
            );
        }

        let context = TaskContext {
            id: task_id,
            name: name.clone(),
        };

        let tasks = Arc::clone(&self.tasks);
        let fault_tx = self.fault_tx.clone();
        let task_name = name.clone();
        let handle = tokio::spawn(async move {
            info!("Task '{}' ({}) started", task_name, task_id);

            let result = tokio::select! {
                result = future(context) => result,
                _ = shutdown_rx.recv() => {
                    info!("Task '{}' ({}) shutting down due to global shutdown", task_name, task_id);
                    Ok(())
                }
            };

            match &result {
                Ok(()) => info!("Task '{}' ({}) completed", task_name, task_id),
                Err(e) => {
                    error!("Task '{}' ({}) failed: {}", task_name, task_id, e);
                    let _ = fault_tx.send(TaskFault {
                        task_id,
                        name: task_name.clone(),
                        error: e.to_string(),
                    });
                }
            }

            if tasks.write().await.remove(&task_id).is_some() {
                debug!("Cleaned up task '{}' ({})", task_name, task_id);
            }

            result
        });

        self.task_handles.write().await.insert(task_id, handle);

        Ok(TaskHandle { id: task_id, name })
    }

    /// Wait for a task to finish and return its outcome.
    pub async fn wait_for_task(
        &self,
        handle: &TaskHandle,
        timeout_duration: Option<Duration>,
    ) -> Result<(), TaskError> {
        let join_handle = self
            .task_handles
            .write()
            .await
            .remove(&handle.id)
            .ok_or(TaskError::NotFound)?;

        let joined = match timeout_duration {
            Some(dur) => timeout(dur, join_handle)
                .await
                .map_err(|_| TaskError::Timeout)?,
            None => join_handle.await,
        };

        joined
            .map_err(TaskError::JoinError)?
            .map_err(|e| TaskError::Failed(e.to_string()))
    }

    /// Abort a task and wait (bounded by the configured cancel timeout) for it to unwind.
    pub async fn cancel_task(&self, handle: &TaskHandle) -> Result<(), TaskError> {
        let join_handle = self.task_handles.write().await.remove(&handle.id);

        if let Some(join_handle) = join_handle {
            join_handle.abort();
            if timeout(self.config.cancel_timeout, join_handle).await.is_err() {
                warn!("Task '{}' did not cancel within timeout", handle.name);
            }
        }

        // An aborted task never reaches its own cleanup.
        if self.tasks.write().await.remove(&handle.id).is_some() {
            debug!("Cancelled task '{}' ({})", handle.name, handle.id);
        }

        Ok(())
    }

    pub async fn current_tasks(&self) -> Vec<TaskInfo> {
        let tasks = self.tasks.read().await;
        tasks
            .values()
            .map(|task| TaskInfo {
                id: task.id,
                name: task.name.clone(),
                created_at: task.created_at,
            })
            .collect()
    }

    /// Faults reported by tasks created after this call.
    pub fn subscribe_faults(&self) -> broadcast::Receiver<TaskFault> {
        self.fault_tx.subscribe()
    }

    pub async fn shutdown(&self) -> Result<(), TaskError> {
        info!("Shutting down task manager");
        let _ = self.shutdown_tx.send(());

        let task_handles: Vec<_> = {
            let mut task_handles = self.task_handles.write().await;
            task_handles.drain().map(|(_, handle)| handle).collect()
        };

        for handle in task_handles {
            if timeout(self.config.shutdown_timeout, handle).await.is_err() {
                warn!("Task did not shut down within timeout");
            }
        }

        Ok(())
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new(TaskManagerConfig::default())
    }
}

#[derive(Debug, Clone)]
pub struct TaskContext {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct TaskHandle {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub id: Uuid,
    pub name: String,
    pub created_at: Instant,
}

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Task timed out")]
    Timeout,
    #[error("Join error: {0}")]
    JoinError(tokio::task::JoinError),
    #[error("Task not found")]
    NotFound,
    #[error("Task failed: {0}")]
    Failed(String),
}
