//! Manages the lifecycle of all spawned tasks in the application.
use futures::future::join_all;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info};

/// A centralized manager for all spawned tasks.
///
/// This struct is responsible for:
/// - Spawning long-lived service tasks and awaiting them at shutdown.
/// - Spawning detached fetch tasks and aborting whatever is still running
///   at shutdown.
#[derive(Clone, Debug)]
pub struct TaskManager {
    handles: Arc<Mutex<Vec<(&'static str, JoinHandle<()>)>>>,
    detached: Arc<Mutex<Vec<AbortHandle>>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl TaskManager {
    /// Creates a new `TaskManager`.
    pub fn new(shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            handles: Arc::new(Mutex::new(Vec::new())),
            detached: Arc::new(Mutex::new(Vec::new())),
            shutdown_rx,
        }
    }

    /// Spawns a service task that must observe the shutdown signal and is
    /// awaited by [`TaskManager::shutdown`].
    pub fn spawn<F>(&self, name: &'static str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        debug!(task_name = name, "Spawning task");
        let handle = tokio::spawn(future);
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name, handle));
    }

    /// Spawns a fire-and-forget task.
    ///
    /// Dropping the returned handle detaches the task; it keeps running until
    /// it finishes or [`TaskManager::shutdown`] aborts it.
    pub fn spawn_detached<F, T>(&self, future: F) -> JoinHandle<T>
    where
        F: std::future::Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let handle = tokio::spawn(future);
        let mut detached = self.detached.lock().unwrap_or_else(PoisonError::into_inner);
        detached.retain(|h| !h.is_finished());
        detached.push(handle.abort_handle());
        handle
    }

    /// Number of detached tasks that have not finished yet.
    pub fn detached_running(&self) -> usize {
        self.detached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|h| !h.is_finished())
            .count()
    }

    /// Returns a clone of the shutdown receiver.
    pub fn get_shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Aborts detached tasks, then waits for all service tasks to complete.
    pub async fn shutdown(self) {
        let aborted: Vec<AbortHandle> = self
            .detached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in &aborted {
            handle.abort();
        }
        debug!(count = aborted.len(), "Aborted detached tasks.");

        let handles = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect::<Vec<_>>();
        info!(
            "TaskManager shutting down. Waiting for {} tasks to complete...",
            handles.len()
        );

        let task_names: Vec<&'static str> = handles.iter().map(|(name, _)| *name).collect();
        debug!(tasks = ?task_names, "Awaiting all tasks.");

        let results = join_all(handles.into_iter().map(|(_, handle)| handle)).await;

        let mut panics = Vec::new();
        for (task_name, result) in task_names.into_iter().zip(results) {
            match result {
                Ok(_) => {
                    debug!(task_name, "Task shut down gracefully.");
                }
                Err(e) => {
                    error!(task_name, "Task panicked during shutdown.");
                    panics.push((task_name, e));
                }
            }
        }

        if !panics.is_empty() {
            error!(
                "{} tasks panicked during shutdown: {:?}",
                panics.len(),
                panics
            );
        } else {
            info!("All tasks shut down gracefully.");
        }
    }
}
