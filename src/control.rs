//! Control Thread Queue
//!
//! Worker threads never touch project state directly. They post tasks onto a
//! [`ControlQueue`], and the single consumer on the control thread runs them
//! with exclusive access to its context (usually the `Project`).

use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use tracing::trace;

/// A unit of work to run on the control thread.
pub type ControlTask<C> = Box<dyn FnOnce(&mut C) + Send + 'static>;

/// Sending half, handed to worker threads.
pub struct ControlPoster<C> {
    sender: Sender<ControlTask<C>>,
}

impl<C> Clone for ControlPoster<C> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<C> ControlPoster<C> {
    /// Queue a task. Returns false if the queue is gone.
    pub fn post(&self, task: impl FnOnce(&mut C) + Send + 'static) -> bool {
        self.sender.send(Box::new(task)).is_ok()
    }
}

/// Single-consumer queue of tasks for the control thread.
pub struct ControlQueue<C> {
    sender: Sender<ControlTask<C>>,
    receiver: Receiver<ControlTask<C>>,
}

impl<C> Default for ControlQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> ControlQueue<C> {
    pub fn new() -> Self {
        let (sender, receiver) = channel::unbounded();
        Self { sender, receiver }
    }

    pub fn poster(&self) -> ControlPoster<C> {
        ControlPoster {
            sender: self.sender.clone(),
        }
    }

    /// Number of tasks waiting.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Run every queued task. Returns how many ran.
    pub fn pump(&self, ctx: &mut C) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.receiver.try_recv() {
            task(ctx);
            ran += 1;
        }
        if ran > 0 {
            trace!(tasks = ran, "pumped control queue");
        }
        ran
    }

    /// Wait up to `timeout` for at least one task, then run everything queued.
    pub fn pump_timeout(&self, ctx: &mut C, timeout: Duration) -> usize {
        match self.receiver.recv_timeout(timeout) {
            Ok(task) => {
                task(ctx);
                1 + self.pump(ctx)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_tasks_run_on_consumer_in_order() {
        let queue: ControlQueue<Vec<u32>> = ControlQueue::new();
        let poster = queue.poster();

        let worker = thread::spawn(move || {
            for i in 0..5 {
                assert!(poster.post(move |log: &mut Vec<u32>| log.push(i)));
            }
        });
        worker.join().unwrap();

        let mut log = Vec::new();
        assert_eq!(queue.pending(), 5);
        assert_eq!(queue.pump(&mut log), 5);
        assert_eq!(log, vec![0, 1, 2, 3, 4]);
        assert_eq!(queue.pump(&mut log), 0);
    }

    #[test]
    fn test_pump_timeout_waits_for_worker() {
        let queue: ControlQueue<u32> = ControlQueue::new();
        let poster = queue.poster();

        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            poster.post(|n: &mut u32| *n += 1);
        });

        let mut n = 0;
        assert_eq!(queue.pump_timeout(&mut n, Duration::from_secs(5)), 1);
        assert_eq!(n, 1);
        assert_eq!(queue.pump_timeout(&mut n, Duration::from_millis(10)), 0);
    }
}
