// Copyright 2025 the rheo authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! A worker cranked by hand, for deterministic boundary tests.

use parking_lot::Mutex;
use rheo_core::executor::{Task, Worker, WorkerFactory};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Worker that queues scheduled tasks until the test runs them.
pub struct ManualWorker {
    tasks: Mutex<VecDeque<Arc<dyn Task>>>,
    disposals: AtomicUsize,
}

impl ManualWorker {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tasks: Mutex::new(VecDeque::new()),
            disposals: AtomicUsize::new(0),
        })
    }

    /// A factory handing out this very worker for every subscription.
    #[must_use]
    pub fn factory(self: &Arc<Self>) -> WorkerFactory {
        let worker = Arc::clone(self);
        Arc::new(move || worker.clone() as Arc<dyn Worker>)
    }

    /// Number of tasks waiting to run.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Run the oldest pending task; returns whether one ran.
    pub fn run_one(&self) -> bool {
        let task = self.tasks.lock().pop_front();
        match task {
            Some(task) => {
                task.run();
                true
            }
            None => false,
        }
    }

    /// Run pending tasks until none are left; returns how many ran.
    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        while self.run_one() {
            ran += 1;
        }
        ran
    }

    /// How many times `dispose` was called.
    #[must_use]
    pub fn disposals(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }
}

impl Worker for ManualWorker {
    fn schedule(&self, task: Arc<dyn Task>) {
        self.tasks.lock().push_back(task);
    }

    fn dispose(&self) {
        self.disposals.fetch_add(1, Ordering::SeqCst);
    }
}
