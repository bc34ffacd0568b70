// Copyright 2025 the rheo authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use rheo_core::executor::{Task, Worker, WorkerFactory};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Worker running each scheduled tick as a task on a Tokio runtime.
pub struct TokioWorker {
    handle: tokio::runtime::Handle,
    disposed: AtomicBool,
}

impl TokioWorker {
    /// Bind a worker to the given runtime handle.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Arc<Self> {
        Arc::new(Self {
            handle,
            disposed: AtomicBool::new(false),
        })
    }

    /// Bind a worker to the ambient runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime context.
    #[must_use]
    pub fn current() -> Arc<Self> {
        Self::new(tokio::runtime::Handle::current())
    }
}

impl Worker for TokioWorker {
    fn schedule(&self, task: Arc<dyn Task>) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        self.handle.spawn(async move {
            task.run();
        });
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }
}

/// A factory producing one [`TokioWorker`] per subscription, bound to the
/// runtime that is current when the factory is created.
///
/// # Panics
///
/// Panics when called outside a Tokio runtime context.
#[must_use]
pub fn tokio_factory() -> WorkerFactory {
    let handle = tokio::runtime::Handle::current();
    Arc::new(move || TokioWorker::new(handle.clone()) as Arc<dyn Worker>)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct CountingTask(AtomicUsize);

    impl Task for CountingTask {
        fn run(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn scheduled_tasks_run() {
        let worker = TokioWorker::current();
        let task = Arc::new(CountingTask(AtomicUsize::new(0)));

        worker.schedule(task.clone());
        worker.schedule(task.clone());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(task.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn disposed_workers_drop_tasks() {
        let worker = TokioWorker::current();
        let task = Arc::new(CountingTask(AtomicUsize::new(0)));

        worker.dispose();
        worker.schedule(task.clone());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(task.0.load(Ordering::SeqCst), 0);
    }
}
