//! ⏳ Async Task Wrapper: submit a migration, get a descriptor, come back later.
//!
//! 📡 A migration can take minutes. The caller shouldn't have to sit in the
//! `await` with it. [`TaskManager::submit`] spawns the job on the tokio runtime and
//! hands back a [`TaskDescriptor`]: poll its progress, subscribe to the event
//! stream, or `wait()` for the result.
//!
//! 🔒 One live task per [`TaskContext`]. Two migrations of the same project racing
//! each other is how issues end up on two workflows at once, so the second submit
//! is refused with [`MigrationError::TaskAlreadyRunning`].
//!
//! 🚫 No cancellation. Once a migration starts it runs to completion or termination.
//! Half an issue migrated is worse than a slow progress bar.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::common::{ProjectId, SchemeId};
use crate::error::MigrationError;
use crate::progress::{ProgressEvent, RecordingSink, SharedSink};

/// 🎯 What a task works on. At most one live task per context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskContext {
    Project(ProjectId),
    Scheme(SchemeId),
}

impl fmt::Display for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskContext::Project(id) => write!(f, "project {id}"),
            TaskContext::Scheme(id) => write!(f, "workflow scheme {id}"),
        }
    }
}

/// 📋 Type-erased view of a task, for lookups by context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSummary {
    pub id: u64,
    pub context: TaskContext,
    pub description: String,
    pub progress: Option<ProgressEvent>,
}

#[derive(Debug)]
struct TaskEntry {
    id: u64,
    description: String,
    sink: Arc<RecordingSink>,
    finished: Arc<AtomicBool>,
}

/// 🏭 Spawns migration jobs and remembers what is running where.
#[derive(Debug, Default, Clone)]
pub struct TaskManager {
    tasks: Arc<Mutex<BTreeMap<TaskContext, TaskEntry>>>,
    next_id: Arc<AtomicU64>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 🚀 Spawn `job` for `context`. The job gets the sink to report progress into.
    ///
    /// Fails with [`MigrationError::TaskAlreadyRunning`] when an unfinished task
    /// already owns the context. Finished tasks are replaced.
    pub async fn submit<T, F>(
        &self,
        context: TaskContext,
        description: impl Into<String>,
        job: F,
    ) -> Result<TaskDescriptor<T>>
    where
        T: Send + 'static,
        F: FnOnce(SharedSink) -> BoxFuture<'static, Result<T>> + Send + 'static,
    {
        let description = description.into();
        let mut tasks = self.tasks.lock().await;
        if let Some(existing) = tasks.get(&context) {
            if !existing.finished.load(Ordering::SeqCst) {
                return Err(MigrationError::TaskAlreadyRunning(context.to_string()).into());
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        // -- 📬 unbounded: a slow listener lags behind, it never loses the 100%
        let (tx, rx) = async_channel::unbounded();
        let sink = Arc::new(RecordingSink::forwarding_to(tx.clone()));
        let finished = Arc::new(AtomicBool::new(false));
        tasks.insert(
            context,
            TaskEntry {
                id,
                description: description.clone(),
                sink: Arc::clone(&sink),
                finished: Arc::clone(&finished),
            },
        );
        drop(tasks);

        info!("⏳ Task {} submitted for {}: {}", id, context, description);
        let job_sink: SharedSink = sink.clone();
        let done = Arc::clone(&finished);
        let handle = tokio::spawn(async move {
            let result = job(job_sink).await;
            done.store(true, Ordering::SeqCst);
            // -- 📪 subscribers drain what is buffered, then see the channel end
            tx.close();
            match &result {
                Ok(_) => info!("🏁 Task {} for {} finished", id, context),
                Err(err) => error!("💀 Task {} for {} failed: {:#}", id, context, err),
            }
            result
        });

        Ok(TaskDescriptor {
            id,
            context,
            description,
            sink,
            finished,
            events: rx,
            handle,
        })
    }

    /// 🔎 The unfinished task owning `context`, if any.
    pub async fn live_task(&self, context: TaskContext) -> Option<TaskSummary> {
        let tasks = self.tasks.lock().await;
        tasks
            .get(&context)
            .filter(|entry| !entry.finished.load(Ordering::SeqCst))
            .map(|entry| TaskSummary {
                id: entry.id,
                context,
                description: entry.description.clone(),
                progress: entry.sink.latest(),
            })
    }
}

/// 🎫 Handle on a submitted task.
pub struct TaskDescriptor<T> {
    id: u64,
    context: TaskContext,
    description: String,
    sink: Arc<RecordingSink>,
    finished: Arc<AtomicBool>,
    events: async_channel::Receiver<ProgressEvent>,
    handle: JoinHandle<Result<T>>,
}

impl<T> fmt::Debug for TaskDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDescriptor")
            .field("id", &self.id)
            .field("context", &self.context)
            .field("description", &self.description)
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl<T> TaskDescriptor<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn context(&self) -> TaskContext {
        self.context
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// 📍 Latest progress event, `None` before the job reported anything.
    pub fn progress(&self) -> Option<ProgressEvent> {
        self.sink.latest()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// 📡 A stream of progress events. Ends once the job finishes and the buffer drains.
    pub fn subscribe(&self) -> async_channel::Receiver<ProgressEvent> {
        self.events.clone()
    }

    /// ⏳ Wait for the job's result. A panicking job surfaces as an error.
    pub async fn wait(self) -> Result<T> {
        self.handle
            .await
            .with_context(|| format!("💀 Task {} for {} panicked", self.id, self.context))?
    }
}
