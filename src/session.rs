// src/session.rs

//! Session controller
//!
//! Serializes every state-changing call against one package directory and
//! ties a session to the host process lifecycle:
//!
//! ```text
//! NoSession --start--> Active --reconcile--> Active --end--> NoSession
//! ```
//!
//! Host liveness is polled by the caller and fed in through
//! [`Session::observe_host`]; once the host has been seen running, the
//! running -> stopped edge restores everything.

use crate::activation::{ActivationEngine, ActivationReport, RecoveryOutcome, SessionLock};
use crate::error::{Error, Result};
use crate::resolver::KeepSet;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NoSession,
    Active {
        /// The host has been observed running during this session
        host_seen_running: bool,
    },
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }
}

/// Exclusive handle on a package directory
pub struct Session {
    engine: ActivationEngine,
    state: SessionState,
    recovered: Option<RecoveryOutcome>,
    _lock: SessionLock,
}

impl Session {
    /// Take the session lock, recover any interrupted pass, and pick up an
    /// existing session from its manifest
    pub fn open(engine: ActivationEngine, lock_path: &Path) -> Result<Self> {
        let lock = SessionLock::acquire(lock_path)?;
        let recovered = engine.recover()?;

        let state = if engine.has_session() {
            info!("Resuming active session");
            SessionState::Active {
                host_seen_running: false,
            }
        } else {
            SessionState::NoSession
        };

        Ok(Self {
            engine,
            state,
            recovered,
            _lock: lock,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn engine(&self) -> &ActivationEngine {
        &self.engine
    }

    /// What recovery did when the session was opened
    pub fn recovered(&self) -> Option<&RecoveryOutcome> {
        self.recovered.as_ref()
    }

    /// Cold disable everything outside `keep` and enter `Active`
    pub fn start(&mut self, keep: &KeepSet) -> Result<ActivationReport> {
        if self.state.is_active() {
            return Err(Error::SessionError(
                "session already active".to_string(),
            ));
        }

        let report = self.engine.disable_unrelated(keep)?;
        self.state = SessionState::Active {
            host_seen_running: false,
        };
        Ok(report)
    }

    /// Move an active session toward a new keep set
    pub fn reconcile(&mut self, keep: &KeepSet) -> Result<ActivationReport> {
        if !self.state.is_active() {
            return Err(Error::SessionError("no active session".to_string()));
        }
        self.engine.reconcile(keep)
    }

    /// Restore everything and leave `Active`
    ///
    /// Ending without an active session is a no-op.
    pub fn end(&mut self) -> Result<ActivationReport> {
        let report = self.engine.restore_all()?;
        if !self.engine.has_session() {
            self.state = SessionState::NoSession;
        }
        Ok(report)
    }

    /// Feed in one host liveness observation
    ///
    /// Returns the restore report when this observation ended the session.
    pub fn observe_host(&mut self, running: bool) -> Result<Option<ActivationReport>> {
        let SessionState::Active { host_seen_running } = self.state else {
            return Ok(None);
        };

        match (host_seen_running, running) {
            (false, true) => {
                info!("Host is running");
                self.state = SessionState::Active {
                    host_seen_running: true,
                };
                Ok(None)
            }
            (true, false) => {
                info!("Host stopped, restoring packages");
                self.end().map(Some)
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::PackageState;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, ActivationEngine) {
        let dir = TempDir::new().unwrap();
        let addon = dir.path().join("AddonPackages");
        fs::create_dir_all(&addon).unwrap();
        for name in ["A.P.1.var", "B.P.1.var"] {
            fs::write(addon.join(name), b"x").unwrap();
        }
        let engine = ActivationEngine::new(
            &addon,
            dir.path().join("manifest.json"),
            dir.path().join("manifest.journal"),
        );
        (dir, engine)
    }

    fn keep_a() -> KeepSet {
        ["A.P.1.var"].into_iter().collect()
    }

    #[test]
    fn test_state_machine() {
        let (dir, engine) = setup();
        let mut session = Session::open(engine, &dir.path().join("s.lock")).unwrap();
        assert_eq!(session.state(), SessionState::NoSession);
        assert!(session.reconcile(&keep_a()).is_err());

        session.start(&keep_a()).unwrap();
        assert!(session.state().is_active());
        assert!(session.start(&keep_a()).is_err());
        assert_eq!(session.reconcile(&keep_a()).unwrap().counts(), (0, 0));

        let report = session.end().unwrap();
        assert_eq!(report.restored, vec!["B.P.1.var"]);
        assert_eq!(session.state(), SessionState::NoSession);
    }

    #[test]
    fn test_host_stop_edge_restores() {
        let (dir, engine) = setup();
        let mut session = Session::open(engine, &dir.path().join("s.lock")).unwrap();
        session.start(&keep_a()).unwrap();

        // Not yet seen running: a "stopped" observation does nothing
        assert!(session.observe_host(false).unwrap().is_none());
        assert!(session.observe_host(true).unwrap().is_none());
        assert!(session.observe_host(true).unwrap().is_none());
        assert_eq!(
            session.engine().state_of("B.P.1.var"),
            PackageState::Disabled
        );

        let report = session.observe_host(false).unwrap().unwrap();
        assert_eq!(report.restored, vec!["B.P.1.var"]);
        assert_eq!(session.state(), SessionState::NoSession);
        assert!(session.observe_host(false).unwrap().is_none());
    }

    #[test]
    fn test_open_resumes_and_excludes_others() {
        let (dir, engine) = setup();
        let lock_path = dir.path().join("s.lock");

        {
            let mut session = Session::open(engine.clone(), &lock_path).unwrap();
            session.start(&keep_a()).unwrap();
            assert!(Session::open(engine.clone(), &lock_path).is_err());
        }

        let session = Session::open(engine, &lock_path).unwrap();
        assert!(session.state().is_active());
        assert!(session.recovered().is_none());
    }
}
