use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{ColloquyError, Result};

/// Wall-clock bound shared by every step of one turn.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    started: Instant,
    at: Option<Instant>,
}

impl Deadline {
    pub(crate) fn start(timeout: Option<Duration>) -> Self {
        let started = Instant::now();
        Self {
            started,
            at: timeout.map(|t| started + t),
        }
    }

    pub(crate) fn expired(&self) -> ColloquyError {
        ColloquyError::TurnTimeout {
            elapsed_ms: u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Fails once the deadline has been reached. A zero timeout is already expired.
    pub(crate) fn check(&self) -> Result<()> {
        match self.at {
            Some(at) if Instant::now() >= at => Err(self.expired()),
            _ => Ok(()),
        }
    }

    /// Await `fut`, giving up when the deadline passes.
    pub(crate) async fn bound<F: Future>(&self, fut: F) -> Result<F::Output> {
        match self.at {
            None => Ok(fut.await),
            Some(at) => tokio::time::timeout_at(at, fut)
                .await
                .map_err(|_| self.expired()),
        }
    }
}
