//! Single-owner job queue.
//!
//! Stands in for the UI-affinity thread: background workers never mutate
//! presentation state directly; they post closures here and the owning
//! thread drains them in post order. Timers are scheduled cancellable
//! callbacks delivered through the same queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

type Job = Box<dyn FnOnce() + Send>;

/// Handle for posting work onto the dispatcher from any thread.
#[derive(Clone)]
pub struct DispatchHandle {
    tx: Sender<Job>,
}

impl DispatchHandle {
    /// Queue a closure to run on the owning thread. Posts after the
    /// dispatcher is gone are silently dropped.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) {
        let _ = self.tx.send(Box::new(job));
    }
}

/// Cancellation guard for a scheduled timer. Cancelling is cooperative:
/// a timer that already fired is unaffected.
pub struct TimerGuard {
    canceled: Arc<AtomicBool>,
}

impl TimerGuard {
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }
}

/// Owns the queue; drained only by the thread holding this value.
pub struct Dispatcher {
    tx: Sender<Job>,
    rx: Receiver<Job>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }

    pub fn handle(&self) -> DispatchHandle {
        DispatchHandle {
            tx: self.tx.clone(),
        }
    }

    /// Run every queued job, in post order, until the queue is empty.
    /// Returns how many jobs ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Block for the next job (with a timeout) and run it.
    pub fn run_one(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(job) => {
                job();
                true
            }
            Err(_) => false,
        }
    }

    /// Schedule a callback to be posted after `delay`, unless the returned
    /// guard cancels it first.
    pub fn schedule(
        &self,
        delay: Duration,
        job: impl FnOnce() + Send + 'static,
    ) -> TimerGuard {
        let canceled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&canceled);
        let handle = self.handle();
        thread::spawn(move || {
            thread::sleep(delay);
            if !flag.load(Ordering::SeqCst) {
                handle.post(job);
            }
        });
        TimerGuard { canceled }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn jobs_run_in_post_order() {
        let dispatcher = Dispatcher::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = Arc::clone(&order);
            dispatcher.handle().post(move || order.lock().unwrap().push(i));
        }

        assert_eq!(dispatcher.run_until_idle(), 3);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn background_threads_marshal_back_to_the_owner() {
        let dispatcher = Dispatcher::new();
        let handle = dispatcher.handle();
        let value = Arc::new(Mutex::new(0));

        let worker_value = Arc::clone(&value);
        let worker = thread::spawn(move || {
            // Simulate background work producing a result.
            handle.post(move || *worker_value.lock().unwrap() = 42);
        });
        worker.join().unwrap();

        assert!(dispatcher.run_one(Duration::from_secs(1)));
        assert_eq!(*value.lock().unwrap(), 42);
    }

    #[test]
    fn run_until_idle_on_empty_queue_is_zero() {
        let dispatcher = Dispatcher::new();
        assert_eq!(dispatcher.run_until_idle(), 0);
    }

    #[test]
    fn scheduled_timer_fires_through_the_queue() {
        let dispatcher = Dispatcher::new();
        let fired = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&fired);
        dispatcher.schedule(Duration::from_millis(20), move || {
            flag.store(true, Ordering::SeqCst);
        });

        assert!(dispatcher.run_one(Duration::from_secs(2)));
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn canceled_timer_never_fires() {
        let dispatcher = Dispatcher::new();
        let fired = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&fired);
        let guard = dispatcher.schedule(Duration::from_millis(50), move || {
            flag.store(true, Ordering::SeqCst);
        });
        guard.cancel();

        assert!(!dispatcher.run_one(Duration::from_millis(200)));
        assert!(!fired.load(Ordering::SeqCst));
    }
}
