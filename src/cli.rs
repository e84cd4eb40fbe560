// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for camera operations
//!
//! This module provides command-line functionality for:
//! - Scanning QR codes from the live feed
//! - Probing whether a camera can be opened

use qrcam::backends::camera::gst::HeadlessTarget;
use qrcam::{
    Config, EventKind, OptionOverrides, Session, SessionError, SessionEvent, SessionState, handler,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};

/// Options for [`scan`]
pub struct ScanArgs {
    pub interval_ms: Option<u64>,
    pub height: Option<u32>,
    pub audio: bool,
    pub timeout: Option<u64>,
    pub once: bool,
}

/// Build a session on the GStreamer platform forwarding `kinds` into a channel
fn session_with_events(
    config: &Config,
    overrides: OptionOverrides,
    kinds: &[EventKind],
) -> (Session, mpsc::UnboundedReceiver<SessionEvent>) {
    let session = Session::builder(Arc::new(HeadlessTarget::new()))
        .options(config.session)
        .overrides(overrides)
        .build();

    let (sender, receiver) = mpsc::unbounded_channel();
    for kind in kinds {
        let sender = sender.clone();
        session.on(
            *kind,
            handler(move |event| {
                let _ = sender.send(event.clone());
            }),
        );
    }

    (session, receiver)
}

/// Wait until `deadline`, or forever without one
async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Print every QR code seen by the default camera
pub async fn scan(config: &Config, args: ScanArgs) -> Result<(), Box<dyn std::error::Error>> {
    let interval = Duration::from_millis(args.interval_ms.unwrap_or(config.qr_interval_ms));
    let overrides = if args.audio {
        OptionOverrides::default().audio(true)
    } else {
        OptionOverrides::default()
    };

    let (session, mut events) = session_with_events(
        config,
        overrides,
        &[
            EventKind::Start,
            EventKind::Error,
            EventKind::QrReadSuccess,
            EventKind::QrReadError,
        ],
    );

    session.start(args.height.or(config.height))?;
    println!("Opening camera...");

    let deadline = args.timeout.map(|secs| Instant::now() + Duration::from_secs(secs));
    let timeout = wait_until(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(timeout, ctrl_c);

    let result = loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SessionEvent::Start) => {
                    println!("Scanning every {} ms (Ctrl-C to quit)", interval.as_millis());
                    session.start_qr_polling(interval);
                }
                Some(SessionEvent::Error(SessionError::AudioNotSupported(msg))) => {
                    eprintln!("Audio disabled: {}", msg);
                }
                Some(SessionEvent::Error(e)) => break Err(e.into()),
                Some(SessionEvent::QrReadSuccess(text)) => {
                    println!("{}", text);
                    if args.once {
                        break Ok(());
                    }
                }
                Some(SessionEvent::QrReadError(e)) => debug!(error = %e, "Unreadable code"),
                Some(_) => {}
                None => break Ok(()),
            },
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break Ok(());
            }
            _ = &mut timeout => {
                println!("Timed out");
                break Ok(());
            }
        }
    };

    if session.state() == SessionState::Streaming {
        session.stop()?;
    }
    result
}

/// Open the default camera, wait for the first frame and close it again
pub async fn probe(config: &Config, timeout: u64) -> Result<(), Box<dyn std::error::Error>> {
    let (session, mut events) = session_with_events(
        config,
        OptionOverrides::default(),
        &[EventKind::Start, EventKind::Error],
    );

    session.start(config.height)?;

    let outcome = tokio::time::timeout(Duration::from_secs(timeout), async {
        loop {
            match events.recv().await {
                Some(SessionEvent::Start) => return Ok(()),
                Some(SessionEvent::Error(SessionError::AudioNotSupported(_))) => {}
                Some(SessionEvent::Error(e)) => return Err(e),
                Some(_) => {}
                None => return Ok(()),
            }
        }
    })
    .await;

    if session.state() == SessionState::Streaming {
        session.stop()?;
    }

    match outcome {
        Ok(Ok(())) => {
            println!("Camera OK");
            Ok(())
        }
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(format!("No frame within {} seconds", timeout).into()),
    }
}
