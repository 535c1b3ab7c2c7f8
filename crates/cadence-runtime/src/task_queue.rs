#![forbid(unsafe_code)]

//! Sequential execution of asynchronous tasks.
//!
//! An [`AsyncQueue`] runs its tasks one at a time, in order, publishing
//! progress through observables. A failing task is recorded as
//! [`TaskResult::Rejected`] and the queue moves on.
//!
//! # Invariants
//!
//! 1. Task `i + 1` is not started before task `i` has settled.
//! 2. `result` has one entry per task from construction on; entry `i` moves
//!    from `Pending` to a terminal state exactly once.
//! 3. When all tasks have settled, `active_index == tasks.len()` and
//!    `is_finished == true`. An empty queue is finished at construction.
//!
//! # Failure Modes
//!
//! - **Cancelled**: after [`cancel`](AsyncQueue::cancel) the running task's
//!   future is dropped on the next poll. Unstarted entries stay `Pending` and
//!   `is_finished` stays `false`.
//! - **Spawn failure**: [`AsyncQueue::spawn`] fails with
//!   [`QueueError::Spawn`] if the executor refuses the driver future.
//!
//! # Example
//!
//! ```
//! use cadence_runtime::task_queue::{AsyncQueue, TaskResult, task};
//! use futures::executor::LocalPool;
//!
//! let mut pool = LocalPool::new();
//! let queue = AsyncQueue::spawn(
//!     vec![
//!         task(|| async { Ok::<_, String>(1) }),
//!         task(|| async { Err("boom".to_string()) }),
//!     ],
//!     &pool.spawner(),
//! )
//! .unwrap();
//!
//! pool.run_until_stalled();
//! assert!(queue.is_finished().get());
//! assert!(queue.result().get()[1].is_rejected());
//! ```

use std::fmt;
use std::future::Future;
use std::rc::Rc;

use cadence_core::Observable;
use futures::future::{AbortHandle, Abortable, FutureExt, LocalBoxFuture};
use futures::task::{LocalSpawn, LocalSpawnExt, SpawnError};

/// A deferred asynchronous unit of work.
pub type Task<T, E> = Box<dyn FnOnce() -> LocalBoxFuture<'static, Result<T, E>>>;

/// Box an async closure as a [`Task`].
pub fn task<T, E, F, Fut>(f: F) -> Task<T, E>
where
    F: FnOnce() -> Fut + 'static,
    Fut: Future<Output = Result<T, E>> + 'static,
{
    Box::new(move || f().boxed_local())
}

/// Outcome of one queued task.
pub enum TaskResult<T, E> {
    /// Not settled yet.
    Pending,
    /// Resolved with a value.
    Fulfilled(T),
    /// Failed with an error.
    Rejected(Rc<E>),
}

impl<T, E> TaskResult<T, E> {
    /// Whether the task has not settled.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Whether the task resolved.
    #[must_use]
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Self::Fulfilled(_))
    }

    /// Whether the task failed.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// The resolved value, if any.
    #[must_use]
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Fulfilled(v) => Some(v),
            _ => None,
        }
    }

    /// The error, if the task failed.
    #[must_use]
    pub fn error(&self) -> Option<&E> {
        match self {
            Self::Rejected(e) => Some(e),
            _ => None,
        }
    }
}

impl<T: Clone, E> Clone for TaskResult<T, E> {
    fn clone(&self) -> Self {
        match self {
            Self::Pending => Self::Pending,
            Self::Fulfilled(v) => Self::Fulfilled(v.clone()),
            Self::Rejected(e) => Self::Rejected(Rc::clone(e)),
        }
    }
}

impl<T: PartialEq, E: PartialEq> PartialEq for TaskResult<T, E> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Pending, Self::Pending) => true,
            (Self::Fulfilled(a), Self::Fulfilled(b)) => a == b,
            (Self::Rejected(a), Self::Rejected(b)) => a == b,
            _ => false,
        }
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Debug for TaskResult<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("Pending"),
            Self::Fulfilled(v) => f.debug_tuple("Fulfilled").field(v).finish(),
            Self::Rejected(e) => f.debug_tuple("Rejected").field(&**e).finish(),
        }
    }
}

/// Errors from starting a queue.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The executor refused the driver future.
    #[error("failed to spawn task queue: {0}")]
    Spawn(#[from] SpawnError),
}

/// Callbacks for queue progress.
pub struct QueueOptions<E> {
    on_finished: Option<Box<dyn FnOnce()>>,
    on_error: Option<Box<dyn FnMut(usize, &E)>>,
}

impl<E> Default for QueueOptions<E> {
    fn default() -> Self {
        Self {
            on_finished: None,
            on_error: None,
        }
    }
}

impl<E> fmt::Debug for QueueOptions<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueOptions")
            .field("on_finished", &self.on_finished.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl<E> QueueOptions<E> {
    /// Run `f` once every task has settled.
    #[must_use]
    pub fn on_finished(mut self, f: impl FnOnce() + 'static) -> Self {
        self.on_finished = Some(Box::new(f));
        self
    }

    /// Run `f` with the index and error of every rejected task.
    #[must_use]
    pub fn on_error(mut self, f: impl FnMut(usize, &E) + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }
}

/// Handle to a sequential task queue.
pub struct AsyncQueue<T, E> {
    active_index: Observable<usize>,
    result: Observable<Vec<TaskResult<T, E>>>,
    is_finished: Observable<bool>,
    abort: AbortHandle,
}

impl<T: fmt::Debug + Clone + 'static, E: fmt::Debug + 'static> fmt::Debug for AsyncQueue<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncQueue")
            .field("active_index", &self.active_index.get())
            .field("result", &self.result.get())
            .field("is_finished", &self.is_finished.get())
            .field("cancelled", &self.abort.is_aborted())
            .finish()
    }
}

impl<T: Clone + 'static, E: 'static> AsyncQueue<T, E> {
    /// Start `tasks` on `spawner`.
    pub fn spawn<S>(tasks: Vec<Task<T, E>>, spawner: &S) -> Result<Self, QueueError>
    where
        S: LocalSpawn + ?Sized,
    {
        Self::spawn_with(tasks, QueueOptions::default(), spawner)
    }

    /// Start `tasks` on `spawner` with progress callbacks.
    pub fn spawn_with<S>(
        tasks: Vec<Task<T, E>>,
        options: QueueOptions<E>,
        spawner: &S,
    ) -> Result<Self, QueueError>
    where
        S: LocalSpawn + ?Sized,
    {
        let (queue, driver) = Self::with_options(tasks, options);
        spawner.spawn_local(driver)?;
        Ok(queue)
    }

    /// Build a queue and the future that drives it. Nothing runs until the
    /// future is polled.
    pub fn new(tasks: Vec<Task<T, E>>) -> (Self, LocalBoxFuture<'static, ()>) {
        Self::with_options(tasks, QueueOptions::default())
    }

    /// [`new`](Self::new) with progress callbacks.
    pub fn with_options(
        tasks: Vec<Task<T, E>>,
        options: QueueOptions<E>,
    ) -> (Self, LocalBoxFuture<'static, ()>) {
        let len = tasks.len();
        let queue = Self {
            active_index: Observable::new(0),
            result: Observable::new((0..len).map(|_| TaskResult::Pending).collect()),
            is_finished: Observable::new(len == 0),
            abort: AbortHandle::new_pair().0,
        };
        let QueueOptions {
            on_finished,
            mut on_error,
        } = options;

        if len == 0 {
            if let Some(f) = on_finished {
                f();
            }
            return (queue, futures::future::ready(()).boxed_local());
        }

        let (abort, registration) = AbortHandle::new_pair();
        let queue = Self { abort, ..queue };

        let active = queue.active_index.clone();
        let result = queue.result.clone();
        let finished = queue.is_finished.clone();
        let driver = async move {
            for (index, task) in tasks.into_iter().enumerate() {
                active.set(index);
                let outcome = task().await;
                match outcome {
                    Ok(value) => {
                        tracing::debug!(index, "queued task fulfilled");
                        store(&result, index, TaskResult::Fulfilled(value));
                    }
                    Err(error) => {
                        tracing::debug!(index, "queued task rejected");
                        let error = Rc::new(error);
                        store(&result, index, TaskResult::Rejected(Rc::clone(&error)));
                        if let Some(f) = on_error.as_mut() {
                            f(index, &error);
                        }
                    }
                }
            }
            active.set(len);
            finished.set(true);
            tracing::debug!(tasks = len, "task queue finished");
            if let Some(f) = on_finished {
                f();
            }
        };
        let driver = Abortable::new(driver, registration).map(|_| ()).boxed_local();
        (queue, driver)
    }

    /// Index of the running task; `len` once finished.
    #[must_use]
    pub fn active_index(&self) -> &Observable<usize> {
        &self.active_index
    }

    /// One outcome per task, in task order.
    #[must_use]
    pub fn result(&self) -> &Observable<Vec<TaskResult<T, E>>> {
        &self.result
    }

    /// `true` once every task has settled.
    #[must_use]
    pub fn is_finished(&self) -> &Observable<bool> {
        &self.is_finished
    }

    /// Stop the queue. The running task is dropped and no further task starts.
    pub fn cancel(&self) {
        if !self.abort.is_aborted() {
            tracing::debug!(active = self.active_index.get(), "task queue cancelled");
        }
        self.abort.abort();
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.abort.is_aborted()
    }
}

fn store<T: Clone + 'static, E: 'static>(
    result: &Observable<Vec<TaskResult<T, E>>>,
    index: usize,
    outcome: TaskResult<T, E>,
) {
    result.update(move |entries| {
        if let Some(slot) = entries.get_mut(index) {
            *slot = outcome;
        }
    });
}
