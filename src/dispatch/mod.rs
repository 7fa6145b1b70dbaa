//! # Asynchronous dispatch pool.
//!
//! Async publishes enqueue an erased job on a bounded MPMC channel; a fixed
//! pool of worker threads drains it and runs the ordinary synchronous
//! publish path. Handler failures are already isolated there, so a worker
//! never dies to user code.
//!
//! ## Rules
//! - Enqueueing blocks only when the queue is full (bounded backpressure).
//! - No ordering is guaranteed between jobs drained by different workers.
//! - Shutdown closes the channel; workers finish their current job, observe
//!   the disconnect, and exit. Queued-but-undrained jobs are dropped.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::message::{AnyMessage, MessageType};
use crate::publish::Publisher;

/// One erased async publish.
pub(crate) enum Job {
    One(AnyMessage),
    Two(AnyMessage, AnyMessage),
    Three(AnyMessage, AnyMessage, AnyMessage),
    Array(Vec<AnyMessage>, MessageType),
}

pub(crate) struct Dispatcher {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawns `threads` named workers over a queue of `capacity` jobs.
    pub(crate) fn start(publisher: Arc<Publisher>, threads: usize, capacity: usize) -> Self {
        let (sender, receiver) = bounded::<Job>(capacity);

        let mut workers = Vec::with_capacity(threads);
        for worker in 0..threads {
            let receiver: Receiver<Job> = receiver.clone();
            let publisher = publisher.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("bus-dispatch-{worker}"))
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        run(&publisher, job);
                    }
                });
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => log::error!("failed to spawn dispatch worker {worker}: {err}"),
            }
        }

        Self {
            sender: Some(sender),
            workers,
        }
    }

    /// Hands out a sender for one enqueue, or `None` after shutdown. The
    /// clone is short-lived: callers drop it right after sending so worker
    /// threads can observe the disconnect.
    pub(crate) fn sender(&self) -> Option<Sender<Job>> {
        self.sender.clone()
    }

    /// True while jobs are queued and not yet picked up by a worker.
    pub(crate) fn has_pending(&self) -> bool {
        self.sender
            .as_ref()
            .map(|sender| !sender.is_empty())
            .unwrap_or(false)
    }

    /// Closes the queue and joins every worker. Idempotent.
    pub(crate) fn shutdown(&mut self) {
        drop(self.sender.take());
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("dispatch worker terminated by panic");
            }
        }
    }
}

fn run(publisher: &Publisher, job: Job) {
    match job {
        Job::One(message) => publisher.publish_one(&message),
        Job::Two(first, second) => publisher.publish_two(&first, &second),
        Job::Three(first, second, third) => publisher.publish_three(&first, &second, &third),
        Job::Array(elements, element_ty) => publisher.publish_array(&elements, element_ty),
    }
}
