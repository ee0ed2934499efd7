//! Lifecycle state machine shared by listeners and the servers built on them.
//!
//! ```text
//! STOPPED --start--> RUNNING --stop--> STOPPING --complete_stop--> STOPPED
//! ```
//!
//! The error flag is orthogonal: it records that a start attempt failed and
//! blocks further starts until cleared.

use std::fmt;

use tracing::debug;

use super::error::StateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Status {
    #[default]
    Stopped,
    Running,
    Stopping,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Stopped => "stopped",
            Status::Running => "running",
            Status::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Default)]
pub struct Lifecycle {
    status: Status,
    errored: bool,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_errored(&self) -> bool {
        self.errored
    }

    /// Check whether a start may proceed without changing state.
    ///
    /// Returns `Ok(false)` when the start is a no-op (already running, or
    /// draining and therefore not restartable yet).
    pub fn can_start(&self) -> Result<bool, StateError> {
        if self.errored {
            return Err(StateError::Errored);
        }
        match self.status {
            Status::Stopped => Ok(true),
            Status::Running => {
                debug!("start ignored: already running");
                Ok(false)
            }
            Status::Stopping => {
                debug!("start ignored: still stopping");
                Ok(false)
            }
        }
    }

    /// STOPPED -> RUNNING. Returns false if this was a no-op.
    pub fn start(&mut self) -> Result<bool, StateError> {
        let proceed = self.can_start()?;
        if proceed {
            self.status = Status::Running;
        }
        Ok(proceed)
    }

    /// RUNNING -> STOPPING. Returns false if this was a no-op.
    pub fn stop(&mut self) -> bool {
        match self.status {
            Status::Running => {
                self.status = Status::Stopping;
                true
            }
            Status::Stopped | Status::Stopping => {
                debug!(status = %self.status, "stop ignored");
                false
            }
        }
    }

    /// STOPPING -> STOPPED, once every connection has drained.
    pub fn complete_stop(&mut self) -> bool {
        if self.status == Status::Stopping {
            self.status = Status::Stopped;
            true
        } else {
            debug!(status = %self.status, "complete_stop ignored");
            false
        }
    }

    /// Record that a start attempt failed.
    pub fn fail(&mut self) {
        self.errored = true;
    }

    pub fn clear_error(&mut self) {
        self.errored = false;
    }
}
