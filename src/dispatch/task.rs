//! Task dispatcher and the task store abstraction.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{info, warn};

use crate::models::intent::TaskDescriptor;
use crate::Result;

/// Identifier assigned by the task store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(pub String);

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A task to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    /// Short title.
    pub title: String,
    /// Background and goal.
    pub description: String,
    /// Concrete steps, possibly empty.
    pub steps: Vec<String>,
    /// Link back to the originating conversation.
    pub source_url: Option<String>,
}

/// External task tracker.
pub trait TaskStore: Send + Sync {
    /// Create a task and return its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Notion`](crate::AppError::Notion) (or another
    /// store-specific kind) when creation fails.
    fn create_task(&self, task: NewTask)
        -> Pin<Box<dyn Future<Output = Result<TaskId>> + Send + '_>>;
}

/// Creates follow-up tasks in the configured store.
#[derive(Clone)]
pub struct TaskDispatcher {
    store: Arc<dyn TaskStore>,
}

impl TaskDispatcher {
    /// Create a dispatcher over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    /// Create a task with no steps.
    ///
    /// # Errors
    ///
    /// Returns the store's error unchanged.
    pub async fn create_task(
        &self,
        title: &str,
        description: &str,
        source_url: Option<&str>,
    ) -> Result<TaskId> {
        self.submit(NewTask {
            title: title.to_owned(),
            description: description.to_owned(),
            steps: Vec::new(),
            source_url: source_url.map(str::to_owned),
        })
        .await
    }

    /// Create a task from a pipeline descriptor.
    ///
    /// # Errors
    ///
    /// Returns the store's error unchanged.
    pub async fn create_from_descriptor(
        &self,
        descriptor: &TaskDescriptor,
        source_url: Option<&str>,
    ) -> Result<TaskId> {
        self.submit(NewTask {
            title: descriptor.title.clone(),
            description: descriptor.description.clone(),
            steps: descriptor.steps.clone(),
            source_url: source_url.map(str::to_owned),
        })
        .await
    }

    async fn submit(&self, task: NewTask) -> Result<TaskId> {
        let title = task.title.clone();
        match self.store.create_task(task).await {
            Ok(id) => {
                info!(task_id = %id, title, "task created");
                Ok(id)
            }
            Err(err) => {
                warn!(%err, title, "task not created");
                Err(err)
            }
        }
    }
}
