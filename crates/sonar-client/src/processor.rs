//! Serial job processor.
//!
//! Every state change in a session happens on this one thread, in queue
//! order. Jobs may be delayed; due jobs run before newer immediate ones.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::errors::{CacheError, SonarError};
use crate::request::{Request, RequestSink};
use crate::sync::lock;

const PROCESSOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::processor");

/// Work items executed by the processor.
#[derive(Debug)]
pub(crate) enum Job {
    Login { user: String, password: String },
    ChangePassword { current: String, new: String },
    Request(Request),
    ProcessMessages,
    Flush,
    Quit,
    Disconnect,
    Fail(SonarError),
}

impl Job {
    const fn label(&self) -> &'static str {
        match self {
            Self::Login { .. } => "login",
            Self::ChangePassword { .. } => "change_password",
            Self::Request(_) => "request",
            Self::ProcessMessages => "process_messages",
            Self::Flush => "flush",
            Self::Quit => "quit",
            Self::Disconnect => "disconnect",
            Self::Fail(_) => "fail",
        }
    }
}

/// Executes jobs on behalf of the processor.
#[cfg_attr(test, mockall::automock)]
pub(crate) trait JobRunner: Send + Sync {
    /// Runs one job.
    fn run(&self, job: Job) -> Result<(), SonarError>;

    /// Handles an error returned by [`JobRunner::run`].
    fn fail(&self, error: SonarError);
}

enum Command {
    Run(Job),
    RunAt(Job, Instant),
    Stop,
}

struct Delayed {
    due: Instant,
    sequence: u64,
    job: Job,
}

impl PartialEq for Delayed {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Delayed {}

impl PartialOrd for Delayed {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Delayed {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due
            .cmp(&other.due)
            .then(self.sequence.cmp(&other.sequence))
    }
}

/// Handle to the processor thread.
pub(crate) struct Processor {
    sender: Sender<Command>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Processor {
    /// Spawns the processor thread.
    pub(crate) fn start(runner: Arc<dyn JobRunner>) -> Result<Self, SonarError> {
        let (sender, receiver) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("sonar-processor".to_owned())
            .spawn(move || run_queue(&receiver, runner.as_ref()))
            .map_err(|source| SonarError::Spawn {
                name: "processor",
                source,
            })?;
        Ok(Self {
            sender,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Queues a job for immediate execution.
    pub(crate) fn queue(&self, job: Job) -> Result<(), CacheError> {
        self.sender
            .send(Command::Run(job))
            .map_err(|_| CacheError::Disconnected)
    }

    /// Queues a job to run once `delay` has elapsed.
    pub(crate) fn queue_after(&self, job: Job, delay: Duration) -> Result<(), CacheError> {
        self.sender
            .send(Command::RunAt(job, Instant::now() + delay))
            .map_err(|_| CacheError::Disconnected)
    }

    /// Asks the thread to stop after the jobs already queued.
    pub(crate) fn stop(&self) {
        let _ = self.sender.send(Command::Stop);
    }

    /// Waits for the thread to exit.
    ///
    /// Calling this from the processor thread itself returns immediately.
    pub(crate) fn join(&self) -> Result<(), SonarError> {
        let handle = lock(&self.handle).take();
        match handle {
            Some(handle) if handle.thread().id() == thread::current().id() => {
                *lock(&self.handle) = Some(handle);
                Ok(())
            }
            Some(handle) => handle
                .join()
                .map_err(|_| SonarError::ThreadPanic { name: "processor" }),
            None => Ok(()),
        }
    }
}

impl RequestSink for Processor {
    fn submit(&self, request: Request) -> Result<(), CacheError> {
        self.queue(Job::Request(request))
    }
}

fn run_queue(receiver: &Receiver<Command>, runner: &dyn JobRunner) {
    let mut delayed: BinaryHeap<Reverse<Delayed>> = BinaryHeap::new();
    let mut sequence = 0_u64;
    loop {
        let now = Instant::now();
        while let Some(Reverse(next)) = delayed.peek()
            && next.due <= now
        {
            if let Some(Reverse(entry)) = delayed.pop() {
                execute(runner, entry.job);
            }
        }

        let command = match delayed.peek() {
            Some(Reverse(next)) => receiver.recv_timeout(next.due.saturating_duration_since(now)),
            None => receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match command {
            Ok(Command::Run(job)) => execute(runner, job),
            Ok(Command::RunAt(job, due)) => {
                sequence += 1;
                delayed.push(Reverse(Delayed { due, sequence, job }));
            }
            Err(RecvTimeoutError::Timeout) => {}
            Ok(Command::Stop) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!(target: PROCESSOR_TARGET, dropped = delayed.len(), "processor stopped");
}

fn execute(runner: &dyn JobRunner, job: Job) {
    trace!(target: PROCESSOR_TARGET, job = job.label(), "running job");
    if let Err(error) = runner.run(job) {
        runner.fail(error);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::channel;

    use mockall::Sequence;
    use rstest::rstest;

    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    /// Runner that forwards job labels to a channel.
    struct ForwardingRunner {
        seen: Mutex<Sender<&'static str>>,
    }

    impl JobRunner for ForwardingRunner {
        fn run(&self, job: Job) -> Result<(), SonarError> {
            let _ = lock(&self.seen).send(job.label());
            Ok(())
        }

        fn fail(&self, _error: SonarError) {}
    }

    fn forwarding() -> (Processor, Receiver<&'static str>) {
        let (sender, receiver) = channel();
        let runner = Arc::new(ForwardingRunner {
            seen: Mutex::new(sender),
        });
        (Processor::start(runner).expect("start processor"), receiver)
    }

    #[rstest]
    fn jobs_run_in_queue_order() {
        let (processor, seen) = forwarding();
        processor.queue(Job::ProcessMessages).expect("queue");
        processor.queue(Job::Flush).expect("queue");
        processor.queue(Job::Quit).expect("queue");
        let labels: Vec<_> = (0..3).filter_map(|_| seen.recv_timeout(WAIT).ok()).collect();
        assert_eq!(labels, ["process_messages", "flush", "quit"]);
        processor.stop();
        processor.join().expect("join");
    }

    #[rstest]
    fn delayed_jobs_wait_for_their_deadline() {
        let (processor, seen) = forwarding();
        let started = Instant::now();
        processor
            .queue_after(Job::Flush, Duration::from_millis(80))
            .expect("queue delayed");
        processor.queue(Job::ProcessMessages).expect("queue");
        assert_eq!(seen.recv_timeout(WAIT), Ok("process_messages"));
        assert_eq!(seen.recv_timeout(WAIT), Ok("flush"));
        assert!(started.elapsed() >= Duration::from_millis(80));
        processor.stop();
        processor.join().expect("join");
    }

    #[rstest]
    fn errors_are_routed_to_fail() {
        let mut runner = MockJobRunner::new();
        let mut order = Sequence::new();
        runner
            .expect_run()
            .times(1)
            .in_sequence(&mut order)
            .returning(|_| Err(SonarError::EndOfStream));
        runner
            .expect_fail()
            .withf(|error| matches!(error, SonarError::EndOfStream))
            .times(1)
            .in_sequence(&mut order)
            .return_const(());
        let processor = Processor::start(Arc::new(runner)).expect("start processor");
        processor.queue(Job::Disconnect).expect("queue");
        processor.stop();
        processor.join().expect("join");
    }

    #[rstest]
    fn stopped_processor_rejects_requests() {
        let (processor, _seen) = forwarding();
        processor.stop();
        processor.join().expect("join");
        let result = processor.submit(Request::Enumerate(crate::name::Name::of_type("widget")));
        assert_eq!(result, Err(CacheError::Disconnected));
    }
}
