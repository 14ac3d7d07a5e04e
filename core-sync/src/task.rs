//! # Background Tasks
//!
//! Runs long operations on the tokio runtime so interactive threads never
//! block on network or disk I/O.
//!
//! Every submitted operation yields zero or more [`TaskEvent::Progress`]
//! events followed by exactly one terminal event, [`TaskEvent::Completed`]
//! or [`TaskEvent::Failed`]. A panic inside the operation is reported as
//! `Failed`. Tasks cannot be cancelled; dropping the [`TaskHandle`] only
//! stops observing them.
//!
//! ```rust,ignore
//! let runner = TaskRunner::new(runtime.handle().clone());
//!
//! let handle = runner.submit(move |progress| async move {
//!     coordinator
//!         .download_file(&id, "report.pdf", &dir, &|p| progress.report(p))
//!         .await
//! });
//!
//! // From a plain thread
//! let path = handle.wait_blocking()?;
//! ```

use core_runtime::events::{CoreEvent, EventBus, TaskEvent as LifecycleEvent};
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

/// Unique task identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(Uuid);

impl TaskId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Observable state change of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent<T> {
    /// Completion percentage, 0 to 100
    Progress(u8),
    Completed(T),
    Failed(String),
}

impl<T> TaskEvent<T> {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskEvent::Progress(_))
    }
}

/// Terminal failure as seen by [`TaskHandle::wait`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("{0}")]
    Failed(String),

    /// The runtime went away before the task finished.
    #[error("Task ended without reporting a result")]
    Lost,
}

type EventSender<T> = Arc<Mutex<Option<mpsc::UnboundedSender<TaskEvent<T>>>>>;

/// Sends progress for the task it was handed to.
///
/// Cloneable and usable from any thread. Reports made after the task has
/// finished are dropped.
#[derive(Clone)]
pub struct ProgressReporter {
    sink: Arc<dyn Fn(u8) + Send + Sync>,
}

impl ProgressReporter {
    fn new<T: Send + 'static>(sender: EventSender<T>) -> Self {
        Self {
            sink: Arc::new(move |percent| {
                let guard = sender.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(tx) = guard.as_ref() {
                    let _ = tx.send(TaskEvent::Progress(percent.min(100)));
                }
            }),
        }
    }

    /// A reporter that discards everything.
    pub fn noop() -> Self {
        Self {
            sink: Arc::new(|_| {}),
        }
    }

    pub fn report(&self, percent: u8) {
        (self.sink)(percent);
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter").finish_non_exhaustive()
    }
}

/// Executes operations on a tokio runtime.
#[derive(Clone)]
pub struct TaskRunner {
    handle: Handle,
    event_bus: Option<EventBus>,
}

impl TaskRunner {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            event_bus: None,
        }
    }

    /// Runner bound to the runtime of the calling context, if there is one.
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }

    /// Announce task lifecycle on `event_bus` as well.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn submit<T, E, F, Fut>(&self, operation: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
        F: FnOnce(ProgressReporter) -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    {
        self.submit_named("task", operation)
    }

    /// Like [`submit`](Self::submit), with a label used in logs and events.
    pub fn submit_named<T, E, F, Fut>(&self, label: &str, operation: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
        F: FnOnce(ProgressReporter) -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    {
        let id = TaskId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let sender: EventSender<T> = Arc::new(Mutex::new(Some(tx)));
        let reporter = ProgressReporter::new(Arc::clone(&sender));
        let label = label.to_string();
        let event_bus = self.event_bus.clone();

        announce(
            &event_bus,
            LifecycleEvent::Started {
                task_id: id.to_string(),
                label: label.clone(),
            },
        );

        let span = tracing::debug_span!("task", %id, label = %label);
        self.handle.spawn(
            async move {
                let outcome = AssertUnwindSafe(async move { operation(reporter).await })
                    .catch_unwind()
                    .await;

                let terminal = match outcome {
                    Ok(Ok(value)) => {
                        debug!("Task completed");
                        announce(
                            &event_bus,
                            LifecycleEvent::Completed {
                                task_id: id.to_string(),
                            },
                        );
                        TaskEvent::Completed(value)
                    }
                    Ok(Err(e)) => fail(&event_bus, id, e.to_string()),
                    Err(panic) => fail(&event_bus, id, panic_message(panic.as_ref())),
                };

                // Taking the sender closes the progress path before the
                // terminal event goes out.
                let tx = sender.lock().unwrap_or_else(PoisonError::into_inner).take();
                if let Some(tx) = tx {
                    let _ = tx.send(terminal);
                }
            }
            .instrument(span),
        );

        TaskHandle {
            id,
            events: rx,
            handle: self.handle.clone(),
        }
    }
}

fn fail<T>(event_bus: &Option<EventBus>, id: TaskId, message: String) -> TaskEvent<T> {
    warn!(error = %message, "Task failed");
    announce(
        event_bus,
        LifecycleEvent::Failed {
            task_id: id.to_string(),
            message: message.clone(),
        },
    );
    TaskEvent::Failed(message)
}

fn announce(event_bus: &Option<EventBus>, event: LifecycleEvent) {
    if let Some(bus) = event_bus {
        let _ = bus.emit(CoreEvent::Task(event));
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("Task panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("Task panicked: {}", message)
    } else {
        "Task panicked".to_string()
    }
}

/// Observes one submitted task.
pub struct TaskHandle<T> {
    id: TaskId,
    events: mpsc::UnboundedReceiver<TaskEvent<T>>,
    handle: Handle,
}

impl<T: Send + 'static> TaskHandle<T> {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Next event in order; `None` once the terminal event was taken.
    pub async fn next_event(&mut self) -> Option<TaskEvent<T>> {
        self.events.recv().await
    }

    /// Skip progress and wait for the outcome.
    pub async fn wait(mut self) -> Result<T, TaskError> {
        while let Some(event) = self.events.recv().await {
            if let Some(outcome) = Self::outcome(event) {
                return outcome;
            }
        }
        Err(TaskError::Lost)
    }

    /// Blocking variant of [`wait`](Self::wait) for threads outside the
    /// runtime.
    ///
    /// # Panics
    ///
    /// When called from within an async context.
    pub fn wait_blocking(mut self) -> Result<T, TaskError> {
        while let Some(event) = self.events.blocking_recv() {
            if let Some(outcome) = Self::outcome(event) {
                return outcome;
            }
        }
        Err(TaskError::Lost)
    }

    /// Deliver every remaining event to `callback` from the runtime.
    pub fn on_event<F>(self, mut callback: F)
    where
        F: FnMut(TaskEvent<T>) + Send + 'static,
    {
        let TaskHandle {
            mut events, handle, ..
        } = self;
        handle.spawn(async move {
            while let Some(event) = events.recv().await {
                let terminal = event.is_terminal();
                callback(event);
                if terminal {
                    break;
                }
            }
        });
    }

    fn outcome(event: TaskEvent<T>) -> Option<Result<T, TaskError>> {
        match event {
            TaskEvent::Progress(_) => None,
            TaskEvent::Completed(value) => Some(Ok(value)),
            TaskEvent::Failed(message) => Some(Err(TaskError::Failed(message))),
        }
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle").field("id", &self.id).finish()
    }
}
