//! Poller state machine.
//!
//! `Idle -> Priming -> Running -> Idle`. Each start opens a new session with
//! its own cancellation token and generation number; work belonging to an
//! older session is recognised and dropped. The fetch loop itself lives in
//! [`crate::service`], which owns the gateway and the window and publishes
//! state changes.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    /// Fetching the id pool.
    Priming,
    /// Timer active.
    Running,
}

/// Outcome of one poll tick, broadcast to anyone listening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent {
    Appended { id: String, evicted: Option<String> },
    /// The tick failed; polling carries on.
    Failed { error: String, transient: bool },
}

/// Ticket for one polling session.
#[derive(Debug, Clone)]
pub struct PollSession {
    generation: u64,
    token: CancellationToken,
}

impl PollSession {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

pub struct Poller {
    state: PollerState,
    generation: u64,
    token: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

impl Default for Poller {
    fn default() -> Self {
        Self::new()
    }
}

impl Poller {
    pub fn new() -> Self {
        Self {
            state: PollerState::Idle,
            generation: 0,
            token: None,
            handle: None,
        }
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    /// Idle -> Priming. `None` when a session is already priming or running.
    pub fn begin(&mut self) -> Option<PollSession> {
        if self.state != PollerState::Idle {
            return None;
        }
        self.generation += 1;
        let token = CancellationToken::new();
        self.token = Some(token.clone());
        self.state = PollerState::Priming;
        debug!(generation = self.generation, "Poller priming");
        Some(PollSession {
            generation: self.generation,
            token,
        })
    }

    /// Whether results produced for `session` may still be applied.
    pub fn is_current(&self, session: &PollSession) -> bool {
        session.generation == self.generation
            && !session.token.is_cancelled()
            && self.state != PollerState::Idle
    }

    /// Priming failed: back to Idle if `session` is still the active one.
    /// Returns whether the state changed.
    pub fn fail_priming(&mut self, session: &PollSession) -> bool {
        if session.generation != self.generation || self.state != PollerState::Priming {
            return false;
        }
        session.token.cancel();
        self.token = None;
        self.state = PollerState::Idle;
        true
    }

    /// Priming -> Running with the spawned timer task. Returns false (and
    /// aborts `handle`) if the session was stopped in the meantime.
    pub fn mark_running(&mut self, session: &PollSession, handle: JoinHandle<()>) -> bool {
        if !self.is_current(session) || self.state != PollerState::Priming {
            handle.abort();
            return false;
        }
        self.handle = Some(handle);
        self.state = PollerState::Running;
        info!(generation = self.generation, "Poller running");
        true
    }

    /// Cancel the active session, if any. Safe to call repeatedly.
    /// Returns whether anything was stopped.
    pub fn stop(&mut self) -> bool {
        if self.state == PollerState::Idle {
            return false;
        }
        if let Some(token) = self.token.take() {
            token.cancel();
        }
        // The loop exits on cancellation; dropping the handle just detaches it
        self.handle.take();
        info!(generation = self.generation, from = ?self.state, "Poller stopped");
        self.state = PollerState::Idle;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_only_from_idle() {
        let mut poller = Poller::new();
        let session = poller.begin().unwrap();
        assert_eq!(poller.state(), PollerState::Priming);
        assert!(poller.begin().is_none());
        assert!(poller.is_current(&session));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut poller = Poller::new();
        assert!(!poller.stop());
        let session = poller.begin().unwrap();
        assert!(poller.stop());
        assert!(!poller.stop());
        assert_eq!(poller.state(), PollerState::Idle);
        assert!(session.is_cancelled());
        assert!(!poller.is_current(&session));
    }

    #[test]
    fn test_fail_priming_returns_to_idle() {
        let mut poller = Poller::new();
        let session = poller.begin().unwrap();
        assert!(poller.fail_priming(&session));
        assert!(!poller.fail_priming(&session));
        assert_eq!(poller.state(), PollerState::Idle);
        assert!(poller.begin().is_some());
    }

    #[test]
    fn test_stale_session_ignored() {
        let mut poller = Poller::new();
        let old = poller.begin().unwrap();
        poller.stop();
        let current = poller.begin().unwrap();

        assert!(!poller.fail_priming(&old));
        assert_eq!(poller.state(), PollerState::Priming);
        assert!(!poller.is_current(&old));
        assert!(poller.is_current(&current));
    }

    #[tokio::test]
    async fn test_mark_running_after_stop_aborts() {
        let mut poller = Poller::new();
        let session = poller.begin().unwrap();
        poller.stop();

        let handle = tokio::spawn(std::future::pending::<()>());
        assert!(!poller.mark_running(&session, handle));
        assert_eq!(poller.state(), PollerState::Idle);
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let mut poller = Poller::new();
        let session = poller.begin().unwrap();
        let handle = tokio::spawn(async {});
        assert!(poller.mark_running(&session, handle));
        assert_eq!(poller.state(), PollerState::Running);
        assert!(poller.stop());
        assert_eq!(poller.state(), PollerState::Idle);
    }
}
