// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the capture session
//!
//! Asynchronous failures reach callers through the `error` and `qrReadError`
//! events; synchronous guard failures are returned directly as [`SessionError`].

use std::fmt;

/// Result type alias using SessionError
pub type SessionResult<T> = Result<T, SessionError>;

/// Session-level error classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No media acquisition primitive is available in this environment
    NotSupported,
    /// The device refused access (includes the user denying permission)
    AcquisitionDenied(String),
    /// Stream acquisition failed for any other reason
    AcquisitionFailed(String),
    /// Audio filter graph could not be wired; video keeps running
    AudioNotSupported(String),
    /// `take_snapshot` was called while snapshots are disabled
    SnapshotDisabled,
    /// Operation is not valid in the current lifecycle state
    InvalidState {
        operation: &'static str,
        state: crate::session::SessionState,
    },
}

impl SessionError {
    /// Stable classification name, matching the event payload taxonomy
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::NotSupported => "NOT_SUPPORTED",
            SessionError::AcquisitionDenied(_) => "ACQUISITION_DENIED",
            SessionError::AcquisitionFailed(_) => "ACQUISITION_FAILED",
            SessionError::AudioNotSupported(_) => "AUDIO_NOT_SUPPORTED",
            SessionError::SnapshotDisabled => "SNAPSHOT_DISABLED",
            SessionError::InvalidState { .. } => "INVALID_STATE",
        }
    }

    /// Whether retrying `start` can reasonably succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SessionError::AcquisitionDenied(_) | SessionError::AcquisitionFailed(_)
        )
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::NotSupported => write!(f, "Media capture is not supported"),
            SessionError::AcquisitionDenied(msg) => write!(f, "Camera access denied: {}", msg),
            SessionError::AcquisitionFailed(msg) => {
                write!(f, "Failed to acquire camera stream: {}", msg)
            }
            SessionError::AudioNotSupported(msg) => write!(f, "Audio not supported: {}", msg),
            SessionError::SnapshotDisabled => write!(f, "Snapshots are disabled"),
            SessionError::InvalidState { operation, state } => {
                write!(f, "Cannot {} while session is {}", operation, state)
            }
        }
    }
}

impl std::error::Error for SessionError {}

/// Errors raised by a QR decoder for a single frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The bitmap has no pixels
    EmptyImage,
    /// A code was located but its content could not be read
    Corrupt(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::EmptyImage => write!(f, "Image has no pixels"),
            DecodeError::Corrupt(msg) => write!(f, "Error decoding QR code: {}", msg),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Audio graph wiring errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    /// A required audio element is missing on this system
    ElementMissing(String),
    /// The stream carries no audio track
    NoAudioTrack,
    /// The graph failed to start
    StartFailed(String),
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioError::ElementMissing(name) => write!(f, "Audio element missing: {}", name),
            AudioError::NoAudioTrack => write!(f, "Stream has no audio track"),
            AudioError::StartFailed(msg) => write!(f, "Audio graph failed to start: {}", msg),
        }
    }
}

impl std::error::Error for AudioError {}

impl From<AudioError> for SessionError {
    fn from(err: AudioError) -> Self {
        SessionError::AudioNotSupported(err.to_string())
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An option key that is not recognized
    UnknownOption(String),
    /// Malformed configuration document
    Parse(String),
    /// Config file could not be read
    Io(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnknownOption(key) => write!(f, "Unknown option: {}", key),
            ConfigError::Parse(msg) => write!(f, "Invalid configuration: {}", msg),
            ConfigError::Io(msg) => write!(f, "Failed to read configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}
