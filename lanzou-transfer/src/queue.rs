use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt;
use lanzou_core::{RemoteApi, Session};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::{QueueConfig, validate_concurrency};
use crate::error::{QueueError, TaskError};
use crate::event::{Subscribers, Subscription, TaskEvent};
use crate::paths::check_depth;
use crate::task::{TaskId, TaskStatus, TransferRequest, TransferTask};
use crate::worker::{FolderCache, Job, Outcome, ProgressSink};

/// Bounded pool of transfer workers fed from a FIFO backlog.
///
/// Handles are cheap to clone and all talk to the same queue. Every public
/// call returns without waiting on the network; results arrive as
/// [`TaskEvent`]s and in [`TransferQueue::snapshot`].
pub struct TransferQueue<A: RemoteApi> {
    shared: Arc<Shared<A>>,
}

impl<A: RemoteApi> Clone for TransferQueue<A> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

struct Shared<A> {
    api: Arc<A>,
    session: Session,
    chunk_size: usize,
    max_folder_depth: usize,
    runtime: Handle,
    folders: FolderCache,
    state: Mutex<QueueState>,
    /// Pending plus running task count, for `wait_idle`.
    active: watch::Sender<usize>,
}

struct QueueState {
    next_id: u64,
    concurrency: usize,
    running: usize,
    closed: bool,
    backlog: VecDeque<TaskId>,
    tasks: BTreeMap<TaskId, TaskEntry>,
    subscribers: Subscribers,
}

struct TaskEntry {
    task: TransferTask,
    request: TransferRequest,
    cancel: CancellationToken,
}

impl<A: RemoteApi> TransferQueue<A> {
    /// Must be called from inside a tokio runtime; workers are spawned onto it.
    pub fn new(api: A, session: Session, config: QueueConfig) -> Result<Self, QueueError> {
        Self::with_api(Arc::new(api), session, config)
    }

    pub fn with_api(api: Arc<A>, session: Session, config: QueueConfig) -> Result<Self, QueueError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| QueueError::NoRuntime)?;
        let (active, _) = watch::channel(0);
        Ok(Self {
            shared: Arc::new(Shared {
                api,
                session,
                chunk_size: config.chunk_size,
                max_folder_depth: config.max_folder_depth,
                runtime,
                folders: FolderCache::default(),
                state: Mutex::new(QueueState {
                    next_id: 1,
                    concurrency: config.concurrency,
                    running: 0,
                    closed: false,
                    backlog: VecDeque::new(),
                    tasks: BTreeMap::new(),
                    subscribers: Subscribers::default(),
                }),
                active,
            }),
        })
    }

    pub fn api(&self) -> &A {
        &self.shared.api
    }

    pub fn session(&self) -> &Session {
        &self.shared.session
    }

    /// Queues a batch and returns the new task ids in submission order.
    ///
    /// The batch is checked as a whole: one upload nested deeper than the
    /// configured limit rejects every request and nothing is queued.
    pub fn submit<I>(&self, requests: I) -> Result<Vec<TaskId>, QueueError>
    where
        I: IntoIterator<Item = TransferRequest>,
    {
        let requests: Vec<TransferRequest> = requests.into_iter().collect();
        let mut guard = self.shared.lock();
        let state = &mut *guard;
        if state.closed {
            return Err(QueueError::QueueClosed);
        }
        for request in &requests {
            check_depth(request, self.shared.max_folder_depth)?;
        }

        let ids = requests
            .into_iter()
            .map(|request| state.enqueue(request))
            .collect::<Vec<_>>();
        tracing::debug!(count = ids.len(), "queued transfers");
        self.shared.dispatch(state);
        self.shared.publish_active(state);
        Ok(ids)
    }

    /// Changes the worker limit. Running tasks are never interrupted; a
    /// lower limit takes effect as they finish.
    pub fn set_concurrency(&self, concurrency: usize) -> Result<(), QueueError> {
        validate_concurrency(concurrency)?;
        let mut guard = self.shared.lock();
        let state = &mut *guard;
        state.concurrency = concurrency;
        tracing::debug!(concurrency, "transfer concurrency changed");
        self.shared.dispatch(state);
        self.shared.publish_active(state);
        Ok(())
    }

    /// Cancels a pending task outright or asks a running one to stop at its
    /// next chunk. Finished tasks are left alone.
    pub fn cancel(&self, id: TaskId) -> Result<(), QueueError> {
        let mut guard = self.shared.lock();
        let state = &mut *guard;
        let entry = state
            .tasks
            .get_mut(&id)
            .ok_or(QueueError::UnknownTask(id))?;
        match entry.task.status {
            TaskStatus::Pending => {
                entry.cancel.cancel();
                entry.task.transition(TaskStatus::Cancelled);
                state.backlog.retain(|queued| *queued != id);
                state.subscribers.publish(TaskEvent::StatusChanged {
                    id,
                    status: TaskStatus::Cancelled,
                    error: None,
                });
                tracing::info!(task = %id, "pending transfer cancelled");
                self.shared.publish_active(state);
            }
            TaskStatus::Running => {
                entry.cancel.cancel();
                tracing::info!(task = %id, "cancellation requested");
            }
            _ => {}
        }
        Ok(())
    }

    pub fn subscribe(&self) -> Subscription {
        self.shared.lock().subscribers.add()
    }

    /// Stops accepting work, cancels the backlog and signals running tasks.
    pub fn shutdown(&self) {
        let mut guard = self.shared.lock();
        let state = &mut *guard;
        if state.closed {
            return;
        }
        state.closed = true;
        while let Some(id) = state.backlog.pop_front() {
            if let Some(entry) = state.tasks.get_mut(&id) {
                entry.cancel.cancel();
                if entry.task.transition(TaskStatus::Cancelled) {
                    state.subscribers.publish(TaskEvent::StatusChanged {
                        id,
                        status: TaskStatus::Cancelled,
                        error: None,
                    });
                }
            }
        }
        for entry in state.tasks.values() {
            if entry.task.status == TaskStatus::Running {
                entry.cancel.cancel();
            }
        }
        tracing::info!(running = state.running, "transfer queue shut down");
        self.shared.publish_active(state);
    }

    /// Resolves once no task is pending or running.
    pub async fn wait_idle(&self) {
        let mut active = self.shared.active.subscribe();
        // The sender lives in `shared`, so this only ends on idle.
        let _ = active.wait_for(|count| *count == 0).await;
    }

    pub fn task(&self, id: TaskId) -> Option<TransferTask> {
        self.shared
            .lock()
            .tasks
            .get(&id)
            .map(|entry| entry.task.clone())
    }

    /// All tracked tasks ordered by id.
    pub fn snapshot(&self) -> Vec<TransferTask> {
        self.shared
            .lock()
            .tasks
            .values()
            .map(|entry| entry.task.clone())
            .collect()
    }

    /// Forgets a finished task and hands back its final record.
    pub fn acknowledge(&self, id: TaskId) -> Result<TransferTask, QueueError> {
        let mut state = self.shared.lock();
        let entry = state.tasks.get(&id).ok_or(QueueError::UnknownTask(id))?;
        if !entry.task.is_terminal() {
            return Err(QueueError::TaskStillActive(id));
        }
        state
            .tasks
            .remove(&id)
            .map(|entry| entry.task)
            .ok_or(QueueError::UnknownTask(id))
    }

    /// Queues the request behind a failed or cancelled task again under a
    /// new id. The old record stays until acknowledged.
    pub fn retry(&self, id: TaskId) -> Result<TaskId, QueueError> {
        let mut guard = self.shared.lock();
        let state = &mut *guard;
        if state.closed {
            return Err(QueueError::QueueClosed);
        }
        let entry = state.tasks.get(&id).ok_or(QueueError::UnknownTask(id))?;
        let status = entry.task.status;
        if !matches!(status, TaskStatus::Failed | TaskStatus::Cancelled) {
            return Err(QueueError::NotRetryable(id, status));
        }
        let request = entry.request.clone();
        check_depth(&request, self.shared.max_folder_depth)?;

        let new_id = state.enqueue(request);
        tracing::info!(task = %id, retry = %new_id, "transfer resubmitted");
        self.shared.dispatch(state);
        self.shared.publish_active(state);
        Ok(new_id)
    }

    pub fn concurrency(&self) -> usize {
        self.shared.lock().concurrency
    }

    pub fn running_count(&self) -> usize {
        self.shared.lock().running
    }

    pub fn pending_count(&self) -> usize {
        self.shared.lock().backlog.len()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }
}

impl QueueState {
    fn enqueue(&mut self, request: TransferRequest) -> TaskId {
        let id = TaskId::new(self.next_id);
        self.next_id += 1;
        let task = TransferTask::new(id, &request);
        self.tasks.insert(
            id,
            TaskEntry {
                task,
                request,
                cancel: CancellationToken::new(),
            },
        );
        self.backlog.push_back(id);
        self.subscribers.publish(TaskEvent::StatusChanged {
            id,
            status: TaskStatus::Pending,
            error: None,
        });
        id
    }
}

impl<A: RemoteApi> Shared<A> {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_active(&self, state: &QueueState) {
        self.active.send_replace(state.backlog.len() + state.running);
    }

    /// Starts backlog heads while free slots remain.
    fn dispatch(self: &Arc<Self>, state: &mut QueueState) {
        while state.running < state.concurrency {
            let Some(id) = state.backlog.pop_front() else {
                break;
            };
            let Some(entry) = state.tasks.get_mut(&id) else {
                continue;
            };
            if !entry.task.transition(TaskStatus::Running) {
                continue;
            }
            state.running += 1;
            state.subscribers.publish(TaskEvent::StatusChanged {
                id,
                status: TaskStatus::Running,
                error: None,
            });
            tracing::debug!(task = %id, path = %entry.task.local_path.display(), "transfer started");

            let request = entry.request.clone();
            let cancel = entry.cancel.clone();
            self.runtime
                .spawn(Arc::clone(self).run_task(id, request, cancel));
        }
    }

    async fn run_task(self: Arc<Self>, id: TaskId, request: TransferRequest, cancel: CancellationToken) {
        let job = Job {
            api: &*self.api,
            session: &self.session,
            cancel: &cancel,
            folders: &self.folders,
            chunk_size: self.chunk_size,
            sink: TaskReporter {
                shared: Arc::clone(&self),
                id,
            },
        };
        let result = AssertUnwindSafe(job.run(&request)).catch_unwind().await;
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(panic) => Err(TaskError::Aborted(panic_message(panic.as_ref()))),
        };
        self.finish(id, outcome, &cancel);
    }

    fn finish(self: &Arc<Self>, id: TaskId, outcome: Result<Outcome, TaskError>, cancel: &CancellationToken) {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.running = state.running.saturating_sub(1);

        if let Some(entry) = state.tasks.get_mut(&id) {
            let (status, error) = match outcome {
                Ok(Outcome::Completed { .. }) if cancel.is_cancelled() => {
                    (TaskStatus::Cancelled, None)
                }
                Ok(Outcome::Completed { remote_file }) => {
                    entry.task.remote_file = remote_file;
                    (TaskStatus::Completed, None)
                }
                Ok(Outcome::Cancelled) => (TaskStatus::Cancelled, None),
                Err(err) => (TaskStatus::Failed, Some(err)),
            };
            if entry.task.transition(status) {
                entry.task.error = error.clone();
                match &error {
                    Some(err) => tracing::warn!(task = %id, error = %err, "transfer failed"),
                    None => tracing::info!(task = %id, status = %status, "transfer finished"),
                }
                state
                    .subscribers
                    .publish(TaskEvent::StatusChanged { id, status, error });
            }
        }

        self.dispatch(state);
        self.publish_active(state);
    }
}

/// Routes worker progress into the task record and out to subscribers.
struct TaskReporter<A> {
    shared: Arc<Shared<A>>,
    id: TaskId,
}

impl<A> Clone for TaskReporter<A> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            id: self.id,
        }
    }
}

impl<A: RemoteApi> ProgressSink for TaskReporter<A> {
    fn size_known(&self, size: u64) {
        let mut guard = self.shared.lock();
        let state = &mut *guard;
        let Some(entry) = state.tasks.get_mut(&self.id) else {
            return;
        };
        if !entry.task.record_size(size) {
            tracing::debug!(task = %self.id, size, progress = entry.task.progress, "size below progress ignored");
            return;
        }
        state
            .subscribers
            .publish(TaskEvent::SizeKnown { id: self.id, size });
    }

    fn advanced(&self, transferred: u64) {
        let mut guard = self.shared.lock();
        let state = &mut *guard;
        let Some(entry) = state.tasks.get_mut(&self.id) else {
            return;
        };
        if entry.task.record_progress(transferred) {
            state.subscribers.publish(TaskEvent::Progress {
                id: self.id,
                transferred: entry.task.progress,
                total: entry.task.size,
            });
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
