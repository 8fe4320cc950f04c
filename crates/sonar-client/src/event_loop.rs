//! Socket readiness loop.
//!
//! The loop only moves bytes between the socket and the TLS engine. Decoded
//! plaintext is handed to the processor, which owns every state change.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, trace};

use crate::conduit::Conduit;
use crate::errors::SonarError;
use crate::processor::{Job, Processor};

const EVENT_LOOP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::event_loop");

/// Upper bound on one wait, so a closed session is noticed promptly.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[cfg(not(unix))]
const FALLBACK_INTERVAL: Duration = Duration::from_millis(25);

/// Readiness reported by one wait.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Readiness {
    readable: bool,
    writable: bool,
}

/// Starts the event loop thread for `conduit`.
pub(crate) fn spawn(
    conduit: Arc<Conduit>,
    processor: Arc<Processor>,
    flush_delay: Duration,
) -> Result<JoinHandle<()>, SonarError> {
    thread::Builder::new()
        .name("sonar-event-loop".to_owned())
        .spawn(move || run(&conduit, &processor, flush_delay))
        .map_err(|source| SonarError::Spawn {
            name: "event loop",
            source,
        })
}

fn run(conduit: &Conduit, processor: &Processor, flush_delay: Duration) {
    debug!(target: EVENT_LOOP_TARGET, "event loop started");
    while !conduit.is_closed() {
        let outcome = wait(conduit, conduit.wants_write())
            .and_then(|ready| step(conduit, processor, ready, flush_delay));
        match outcome {
            Ok(true) => {}
            Ok(false) => break,
            Err(failure) => {
                // A dead processor means the session is already gone.
                let _ = processor.queue(Job::Fail(failure));
                break;
            }
        }
    }
    debug!(target: EVENT_LOOP_TARGET, "event loop stopped");
}

/// Services one readiness report. Returns `false` when the peer has gone.
fn step(
    conduit: &Conduit,
    processor: &Processor,
    ready: Readiness,
    flush_delay: Duration,
) -> Result<bool, SonarError> {
    if ready.readable {
        let outcome = conduit.on_readable()?;
        if outcome.plaintext {
            processor.queue(Job::ProcessMessages)?;
        }
        if outcome.closed {
            processor.queue(Job::Fail(SonarError::EndOfStream))?;
            return Ok(false);
        }
    }
    if ready.writable && conduit.on_writable()? {
        trace!(target: EVENT_LOOP_TARGET, "wrote to server");
        processor.queue_after(Job::Flush, flush_delay)?;
    }
    Ok(true)
}

#[cfg(unix)]
fn wait(conduit: &Conduit, want_write: bool) -> Result<Readiness, SonarError> {
    use std::io;

    let mut events = libc::POLLIN;
    if want_write {
        events |= libc::POLLOUT;
    }
    let mut fds = [
        libc::pollfd {
            fd: conduit.socket_fd(),
            events,
            revents: 0,
        },
        libc::pollfd {
            fd: conduit.waker().fd(),
            events: libc::POLLIN,
            revents: 0,
        },
    ];
    let timeout = libc::c_int::try_from(POLL_INTERVAL.as_millis()).unwrap_or(libc::c_int::MAX);
    // SAFETY: `fds` is a valid, exclusively borrowed array for the duration
    // of the call and its length matches the count passed in.
    let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout) };
    if rc < 0 {
        let error = io::Error::last_os_error();
        if error.kind() == io::ErrorKind::Interrupted {
            return Ok(Readiness::default());
        }
        return Err(SonarError::io("failed to poll socket", error));
    }
    let [socket, waker] = fds;
    if waker.revents != 0 {
        conduit.waker().drain();
    }
    Ok(Readiness {
        readable: socket.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0,
        writable: socket.revents & (libc::POLLOUT | libc::POLLERR) != 0,
    })
}

#[cfg(not(unix))]
fn wait(_conduit: &Conduit, want_write: bool) -> Result<Readiness, SonarError> {
    thread::sleep(FALLBACK_INTERVAL);
    Ok(Readiness {
        readable: true,
        writable: want_write,
    })
}

/// Wakes the event loop from another thread.
#[cfg(unix)]
pub(crate) struct Waker {
    reader: std::os::unix::net::UnixStream,
    writer: std::os::unix::net::UnixStream,
}

#[cfg(unix)]
impl Waker {
    pub(crate) fn new() -> Result<Self, SonarError> {
        let (reader, writer) = std::os::unix::net::UnixStream::pair()
            .map_err(|error| SonarError::io("failed to create wakeup channel", error))?;
        reader
            .set_nonblocking(true)
            .and_then(|()| writer.set_nonblocking(true))
            .map_err(|error| SonarError::io("failed to configure wakeup channel", error))?;
        Ok(Self { reader, writer })
    }

    /// Interrupts a pending wait. A full channel already guarantees a wakeup.
    pub(crate) fn wake(&self) {
        use std::io::Write;
        let _ = (&self.writer).write(&[1]);
    }

    pub(crate) fn drain(&self) {
        use std::io::Read;
        let mut sink = [0_u8; 64];
        while matches!((&self.reader).read(&mut sink), Ok(count) if count > 0) {}
    }

    pub(crate) fn fd(&self) -> std::os::fd::RawFd {
        use std::os::fd::AsRawFd;
        self.reader.as_raw_fd()
    }
}

/// Wakes the event loop from another thread.
#[cfg(not(unix))]
pub(crate) struct Waker;

#[cfg(not(unix))]
impl Waker {
    pub(crate) fn new() -> Result<Self, SonarError> {
        Ok(Self)
    }

    pub(crate) fn wake(&self) {}
}
