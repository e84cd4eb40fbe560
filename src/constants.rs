// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Default period between QR poll ticks
pub const DEFAULT_QR_INTERVAL: Duration = Duration::from_millis(1000);

/// Shortest accepted poll period (a zero period is clamped to this)
pub const MIN_QR_INTERVAL: Duration = Duration::from_millis(1);

/// Largest width or height accepted for a snapshot surface
pub const MAX_SNAPSHOT_DIMENSION: u32 = 8192;

/// Application directory name under the user's config dir
pub const APP_DIR: &str = "qrcam";

/// Config file name inside [`APP_DIR`]
pub const CONFIG_FILE: &str = "config.json";

/// QR decoding constants
pub mod qr {
    /// Frames larger than this (in either dimension) are downscaled before decoding
    pub const MAX_DECODE_DIMENSION: u32 = 640;
}

/// GStreamer pipeline constants
pub mod pipeline {
    /// Maximum buffers queued in the appsink before old frames are dropped
    pub const MAX_BUFFERS: u32 = 2;

    /// Video capture pipeline, always delivering RGBA to the appsink
    pub const VIDEO_CAPTURE: &str =
        "autovideosrc ! videoconvert ! video/x-raw,format=RGBA ! appsink name=sink";

    /// Microphone branch added to the capture pipeline when audio is requested
    pub const AUDIO_CAPTURE: &str =
        "autoaudiosrc name=mic ! audioconvert ! tee name=mic_tee ! queue ! fakesink sync=false";

    /// Name of the tee the audio filter graph branches from
    pub const MIC_TEE: &str = "mic_tee";

    /// Low-pass cutoff of the audio filter graph, in Hz
    pub const AUDIO_CUTOFF_HZ: &str = "350";

    /// Element factories that must exist for video capture
    pub const REQUIRED_VIDEO_ELEMENTS: [&str; 3] = ["autovideosrc", "videoconvert", "appsink"];

    /// Element factories that must exist for the microphone branch
    pub const REQUIRED_AUDIO_CAPTURE_ELEMENTS: [&str; 3] = ["autoaudiosrc", "tee", "fakesink"];

    /// Element factories that must exist for the audio filter graph
    pub const REQUIRED_AUDIO_FILTER_ELEMENTS: [&str; 2] = ["audiocheblimit", "autoaudiosink"];
}

/// Timing constants
pub mod timing {
    /// Frame counter modulo for periodic logging
    pub const FRAME_LOG_INTERVAL: u64 = 30;

    /// Pipeline state change timeout on stop
    pub const STOP_TIMEOUT_SECS: u64 = 2;

    /// Pipeline playing state timeout on start
    pub const START_TIMEOUT_SECS: u64 = 5;
}
