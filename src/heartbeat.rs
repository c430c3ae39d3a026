//! Liveness heartbeat.
//!
//! The device stops its heater if it does not hear from the host for a while.
//! A background thread writes [`HEARTBEAT_TOKEN`] every `interval` while
//! enabled, taking the same lock as foreground commands so tokens never land
//! inside a command frame.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::port::{Transport, write_frame};
use crate::proto::command::HEARTBEAT_TOKEN;

/// Serial handle shared between the foreground and the heartbeat thread.
/// `None` once the channel has been closed.
pub type SharedLink = Arc<Mutex<Option<Box<dyn Transport>>>>;

#[derive(Debug)]
pub struct HeartbeatState {
    enabled: AtomicBool,
    terminated: AtomicBool,
    interval: Duration,
}

impl HeartbeatState {
    fn new(interval: Duration) -> Self {
        Self {
            enabled: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            interval,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

pub struct Heartbeat {
    state: Arc<HeartbeatState>,
    link: SharedLink,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Heartbeat {
    /// Created paused; nothing is written until [`Heartbeat::start`].
    pub fn new(link: SharedLink, interval: Duration) -> Self {
        Self {
            state: Arc::new(HeartbeatState::new(interval)),
            link,
            thread: Mutex::new(None),
        }
    }

    pub fn state(&self) -> &HeartbeatState {
        &self.state
    }

    /// Spawn the writer thread and enable it. No-op without a link, if
    /// already running, or after termination.
    pub fn start(&self) -> std::io::Result<()> {
        if self.state.is_terminated() {
            return Ok(());
        }
        if self.link.lock().is_none() {
            debug!("heartbeat start skipped: no link");
            return Ok(());
        }
        let mut slot = self.thread.lock();
        if slot.is_some() {
            return Ok(());
        }
        let state = Arc::clone(&self.state);
        let link = Arc::clone(&self.link);
        state.enabled.store(true, Ordering::Release);
        let handle = thread::Builder::new()
            .name("heartbeat".into())
            .spawn(move || run(state, link))?;
        *slot = Some(handle);
        debug!(interval = ?self.state.interval, "heartbeat started");
        Ok(())
    }

    pub fn pause(&self) {
        self.state.enabled.store(false, Ordering::Release);
    }

    pub fn resume(&self) {
        self.state.enabled.store(true, Ordering::Release);
    }

    /// Ask the thread to exit at its next wakeup. Does not wait for it.
    /// Returns `false` if termination had already been requested.
    pub fn terminate(&self) -> bool {
        let first = !self.state.terminated.swap(true, Ordering::AcqRel);
        // Detach; the thread exits on its own.
        drop(self.thread.lock().take());
        first
    }
}

fn run(state: Arc<HeartbeatState>, link: SharedLink) {
    while !state.is_terminated() {
        {
            let mut guard = link.lock();
            if state.is_enabled() {
                match guard.as_mut() {
                    Some(port) => {
                        if let Err(e) = write_frame(&mut **port, HEARTBEAT_TOKEN) {
                            warn!(error = %e, "heartbeat write failed, stopping");
                            return;
                        }
                    }
                    None => break,
                }
            }
        }
        thread::sleep(state.interval);
    }
    debug!("heartbeat exited");
}
