// Copyright 2025 the rheo authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use parking_lot::Mutex;
use rheo_core::executor::{Task, Worker, WorkerFactory};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Worker running tasks on the calling thread through a trampoline.
///
/// A task scheduled while another is running is queued and executed by the
/// thread already inside the trampoline, so `schedule` never recurses.
pub struct ImmediateWorker {
    queue: Mutex<VecDeque<Arc<dyn Task>>>,
    running: AtomicBool,
    disposed: AtomicBool,
}

impl ImmediateWorker {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(VecDeque::new()),
            running: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        })
    }
}

impl Worker for ImmediateWorker {
    fn schedule(&self, task: Arc<dyn Task>) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        self.queue.lock().push_back(task);
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        loop {
            loop {
                let next = self.queue.lock().pop_front();
                match next {
                    Some(task) => task.run(),
                    None => break,
                }
            }
            self.running.store(false, Ordering::SeqCst);
            // A task may have been enqueued between the final pop and the
            // store; reclaim the trampoline unless another thread already did.
            if self.queue.lock().is_empty() || self.running.swap(true, Ordering::SeqCst) {
                break;
            }
        }
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.queue.lock().clear();
    }
}

/// A factory producing one [`ImmediateWorker`] per subscription.
#[must_use]
pub fn immediate_factory() -> WorkerFactory {
    Arc::new(|| ImmediateWorker::new() as Arc<dyn Worker>)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Recording {
        order: Mutex<Vec<usize>>,
    }

    struct Tagged {
        recording: Arc<Recording>,
        tag: usize,
        reschedule: Option<(Arc<ImmediateWorker>, Arc<dyn Task>)>,
    }

    impl Task for Tagged {
        fn run(&self) {
            self.recording.order.lock().push(self.tag);
            if let Some((worker, task)) = &self.reschedule {
                worker.schedule(task.clone());
            }
        }
    }

    #[test]
    fn nested_schedules_are_trampolined_in_order() {
        let worker = ImmediateWorker::new();
        let recording = Arc::new(Recording {
            order: Mutex::new(Vec::new()),
        });

        let second: Arc<dyn Task> = Arc::new(Tagged {
            recording: recording.clone(),
            tag: 2,
            reschedule: None,
        });
        let first = Arc::new(Tagged {
            recording: recording.clone(),
            tag: 1,
            reschedule: Some((worker.clone(), second)),
        });

        worker.schedule(first);
        assert_eq!(*recording.order.lock(), vec![1, 2]);
    }

    #[test]
    fn disposed_workers_drop_tasks() {
        struct Counting(AtomicUsize);
        impl Task for Counting {
            fn run(&self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let worker = ImmediateWorker::new();
        let task = Arc::new(Counting(AtomicUsize::new(0)));
        worker.dispose();
        worker.schedule(task.clone());
        assert_eq!(task.0.load(Ordering::SeqCst), 0);
    }
}
