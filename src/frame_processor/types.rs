// SPDX-License-Identifier: GPL-3.0-only

//! Result types for frame analysis

/// Outcome of one decode attempt that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrOutcome {
    /// A code was found and read
    Decoded(String),
    /// The frame contains no recognizable code
    NotFound,
}

impl QrOutcome {
    /// Decoded text, if any
    pub fn text(&self) -> Option<&str> {
        match self {
            QrOutcome::Decoded(text) => Some(text),
            QrOutcome::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, QrOutcome::Decoded(_))
    }
}
