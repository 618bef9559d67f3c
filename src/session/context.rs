// src/session/context.rs

//! Lifecycle wrapper that gives one pipeline run exclusive use of a session.

use crate::error::{AppError, Result};
use crate::session::BrowsingSession;

/// Lifecycle of a browsing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Browser started, not yet logged in
    Open,
    /// Credentials installed and verified
    Authenticated,
    /// Owned by a running pipeline
    Active,
    /// Shut down; no further use
    Closed,
}

/// A session plus its lifecycle state. Owned by exactly one pipeline run.
pub struct SessionContext<S> {
    session: S,
    state: SessionState,
}

impl<S: BrowsingSession> SessionContext<S> {
    /// Wrap a freshly started session.
    pub fn new(session: S) -> Self {
        Self {
            session,
            state: SessionState::Open,
        }
    }

    /// Wrap a session that has already been authenticated.
    pub fn authenticated(session: S) -> Self {
        Self {
            session,
            state: SessionState::Authenticated,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(
            self.state,
            SessionState::Authenticated | SessionState::Active
        )
    }

    pub fn mark_authenticated(&mut self) {
        if self.state == SessionState::Open {
            self.state = SessionState::Authenticated;
        }
    }

    /// Hand the session to a run.
    pub fn activate(&mut self) -> Result<()> {
        match self.state {
            SessionState::Authenticated => {
                self.state = SessionState::Active;
                Ok(())
            }
            SessionState::Active => Err(AppError::session("session is already in use")),
            SessionState::Open => Err(AppError::session("session is not authenticated")),
            SessionState::Closed => Err(AppError::session("session is closed")),
        }
    }

    /// Shut the browser down. Idempotent.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.state = SessionState::Closed;
        self.session.shutdown().await
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    pub fn into_inner(self) -> S {
        self.session
    }
}
