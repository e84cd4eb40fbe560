// SPDX-License-Identifier: GPL-3.0-only

//! Session lifecycle states

use crate::errors::{SessionError, SessionResult};

/// Lifecycle of a capture session
///
/// ```text
/// Idle ──start──▶ Acquiring ──ok──▶ Streaming ──stop──▶ Stopped
///   ▲                 │                                    │
///   └────failure──────┘◀──────────────start────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// Constructed, no stream requested yet
    #[default]
    Idle,
    /// Stream requested, waiting for the device
    Acquiring,
    /// Stream live and attached
    Streaming,
    /// Stream released
    Stopped,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Acquiring => "acquiring",
            SessionState::Streaming => "streaming",
            SessionState::Stopped => "stopped",
        }
    }

    /// Whether a new acquisition may begin from this state
    pub fn can_start(&self) -> bool {
        matches!(self, SessionState::Idle | SessionState::Stopped)
    }

    pub(crate) fn ensure(&self, allowed: bool, operation: &'static str) -> SessionResult<()> {
        if allowed {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                operation,
                state: *self,
            })
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
