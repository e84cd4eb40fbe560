// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the capture session lifecycle

use image::RgbaImage;
use qrcam::backends::camera::{MediaStream, VideoElement};
use qrcam::testing::{
    Acquisition, FakeAudioGraph, FakeMediaDevices, FakePlatform, FakeTarget, ScriptedDecoder,
    solid_frame,
};
use qrcam::{
    DecodeError, EventKind, OptionOverrides, QrDecoder, QrOutcome, Session, SessionError,
    SessionEvent, SessionState, handler,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

struct Harness {
    session: Session,
    platform: Arc<FakePlatform>,
    target: Arc<FakeTarget>,
    decoder: Arc<ScriptedDecoder>,
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl Harness {
    fn new(platform: FakePlatform, overrides: OptionOverrides) -> Self {
        Self::with_decoder(platform, overrides, ScriptedDecoder::default())
    }

    fn with_decoder(
        platform: FakePlatform,
        overrides: OptionOverrides,
        decoder: ScriptedDecoder,
    ) -> Self {
        let platform = Arc::new(platform);
        let target = Arc::new(FakeTarget::default());
        let decoder = Arc::new(decoder);
        let session = Session::builder(target.clone())
            .overrides(overrides)
            .platform(platform.clone())
            .decoder(decoder.clone())
            .build();

        let events = Arc::new(Mutex::new(Vec::new()));
        for kind in EventKind::ALL {
            let events = Arc::clone(&events);
            session.on(
                kind,
                handler(move |event| events.lock().unwrap().push(event.clone())),
            );
        }

        Self {
            session,
            platform,
            target,
            decoder,
            events,
        }
    }

    fn count(&self, kind: EventKind) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.kind() == kind)
            .count()
    }

    fn errors(&self) -> Vec<SessionError> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                SessionEvent::Error(e) => Some(e.clone()),
                _ => None,
            })
            .collect()
    }

    /// Start and wait for the acquisition to settle
    async fn start(&self, height: Option<u32>) {
        self.session
            .start(height)
            .expect("start should be accepted")
            .await
            .expect("acquisition task panicked");
    }
}

fn gray_platform() -> FakePlatform {
    FakePlatform::granting(Some(solid_frame(64, 48, [128, 128, 128, 255])))
}

#[test]
fn test_handlers_run_in_registration_order() {
    let h = Harness::new(gray_platform(), OptionOverrides::default());
    let order = Arc::new(Mutex::new(Vec::new()));

    let first = {
        let order = Arc::clone(&order);
        handler(move |_| order.lock().unwrap().push("a"))
    };
    let second = {
        let order = Arc::clone(&order);
        handler(move |_| order.lock().unwrap().push("b"))
    };
    h.session.on(EventKind::Snapshot, first.clone());
    h.session.on(EventKind::Snapshot, second);

    h.session.take_snapshot(Some(8), Some(8)).unwrap();
    assert_eq!(*order.lock().unwrap(), vec!["a", "b"]);

    h.session.off(EventKind::Snapshot, &first);
    h.session.take_snapshot(Some(8), Some(8)).unwrap();
    assert_eq!(*order.lock().unwrap(), vec!["a", "b", "b"]);
}

#[test]
fn test_snapshot_with_explicit_size_without_stream() {
    let h = Harness::new(gray_platform(), OptionOverrides::default());

    let still = h.session.take_snapshot(Some(320), Some(240)).unwrap();

    assert_eq!((still.width(), still.height()), (320, 240));
    assert_eq!(h.session.snapshot_count(), 1);
    assert_eq!(h.count(EventKind::Snapshot), 1);
    match &h.events.lock().unwrap()[0] {
        SessionEvent::Snapshot(emitted) => assert_eq!(emitted.id(), still.id()),
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn test_snapshot_disabled() {
    let h = Harness::new(
        gray_platform(),
        OptionOverrides::default().snapshots(false),
    );

    let result = h.session.take_snapshot(Some(320), Some(240));

    assert_eq!(result.unwrap_err(), SessionError::SnapshotDisabled);
    assert_eq!(h.session.snapshot_count(), 0);
    assert_eq!(h.count(EventKind::Snapshot), 0);
}

#[test]
fn test_set_options_toggles_snapshots() {
    let h = Harness::new(gray_platform(), OptionOverrides::default());
    h.session
        .set_options(OptionOverrides::default().snapshots(false));
    assert!(h.session.take_snapshot(None, None).is_err());
    assert!(!h.session.options().snapshots);
    assert!(!h.session.options().audio);

    h.session.set_options(OptionOverrides::default().snapshots(true));
    assert!(h.session.take_snapshot(None, None).is_ok());
}

#[test]
fn test_unsupported_platform() {
    let h = Harness::new(FakePlatform::unsupported(), OptionOverrides::default());

    let result = h.session.start(Some(480));

    assert_eq!(result.unwrap_err(), SessionError::NotSupported);
    assert_eq!(h.errors(), vec![SessionError::NotSupported]);
    assert!(!h.session.has_stream());
    assert!(h.platform.elements().is_empty());
    assert_eq!(h.target.attach_calls(), 0);
    assert_eq!(h.session.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_start_emits_start_once() {
    let h = Harness::new(gray_platform(), OptionOverrides::default());

    h.start(Some(480)).await;
    assert_eq!(h.session.state(), SessionState::Streaming);
    assert_eq!(h.count(EventKind::Start), 0);

    let element = h.platform.last_element().unwrap();
    assert_eq!(element.height(), Some(480));
    assert_eq!(element.play_count(), 1);
    assert_eq!(h.target.attached_count(), 1);

    element.fire_ready();
    element.fire_ready();

    assert_eq!(h.count(EventKind::Start), 1);
    assert_eq!(h.count(EventKind::Error), 0);
}

#[tokio::test]
async fn test_start_binds_stream_url() {
    let h = Harness::new(gray_platform(), OptionOverrides::default());

    h.start(None).await;

    let element = h.platform.last_element().unwrap();
    let stream = h.platform.devices().unwrap().last_stream().unwrap();
    let url = element.source_url().unwrap();
    assert_eq!(h.platform.created_urls(), vec![url.clone()]);
    assert!(url.as_str().contains(stream.id()));
    assert_eq!(element.height(), None);
}

#[tokio::test]
async fn test_start_requests_video_only_by_default() {
    let h = Harness::new(gray_platform(), OptionOverrides::default());

    h.start(None).await;

    let requests = h.platform.devices().unwrap().requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].video);
    assert!(!requests[0].audio);
}

#[tokio::test]
async fn test_acquisition_denied() {
    let devices = Arc::new(FakeMediaDevices::new(Acquisition::Deny(
        "user refused".to_string(),
    )));
    let h = Harness::new(
        FakePlatform::with_devices(Some(devices)),
        OptionOverrides::default(),
    );

    h.start(Some(480)).await;

    assert_eq!(
        h.errors(),
        vec![SessionError::AcquisitionDenied("user refused".to_string())]
    );
    assert_eq!(h.session.state(), SessionState::Idle);
    assert!(!h.session.has_stream());
    assert!(h.platform.elements().is_empty());
    assert_eq!(h.count(EventKind::Start), 0);
}

#[tokio::test]
async fn test_retry_after_failure() {
    let devices = Arc::new(FakeMediaDevices::new(Acquisition::Fail("busy".to_string())));
    let h = Harness::new(
        FakePlatform::with_devices(Some(devices.clone())),
        OptionOverrides::default(),
    );

    h.start(None).await;
    assert!(matches!(
        h.errors().as_slice(),
        [SessionError::AcquisitionFailed(_)]
    ));

    devices.set_answer(Acquisition::Grant(None));
    h.start(None).await;
    assert_eq!(h.session.state(), SessionState::Streaming);
    assert_eq!(devices.requests().len(), 2);
}

#[tokio::test]
async fn test_start_rejected_while_acquiring_or_streaming() {
    let h = Harness::new(gray_platform(), OptionOverrides::default());

    let pending = h.session.start(None).unwrap();
    assert_eq!(h.session.state(), SessionState::Acquiring);
    assert!(matches!(
        h.session.start(None),
        Err(SessionError::InvalidState {
            operation: "start",
            state: SessionState::Acquiring
        })
    ));
    assert!(h.session.stop().is_err());

    pending.await.unwrap();
    assert!(matches!(
        h.session.start(None),
        Err(SessionError::InvalidState { .. })
    ));
    assert_eq!(h.platform.devices().unwrap().requests().len(), 1);
}

#[test]
fn test_stop_before_start_is_rejected() {
    let h = Harness::new(gray_platform(), OptionOverrides::default());

    let result = h.session.stop();

    assert!(matches!(
        result,
        Err(SessionError::InvalidState {
            operation: "stop",
            state: SessionState::Idle
        })
    ));
    assert_eq!(h.count(EventKind::Stop), 0);
}

#[tokio::test]
async fn test_stop_releases_everything() {
    let h = Harness::new(gray_platform(), OptionOverrides::default());
    h.start(Some(240)).await;
    h.platform.last_element().unwrap().fire_ready();
    h.session.start_qr_polling(Duration::from_millis(100));

    h.session.stop().unwrap();

    let stream = h.platform.devices().unwrap().last_stream().unwrap();
    let element = h.platform.last_element().unwrap();
    assert!(stream.is_stopped());
    assert!(element.is_removed());
    assert!(!h.session.is_qr_polling());
    assert!(!h.session.has_stream());
    assert_eq!(h.target.attached_count(), 0);
    assert_eq!(h.target.detach_calls(), 1);
    assert_eq!(h.platform.revoked_urls(), h.platform.created_urls());
    assert_eq!(h.session.state(), SessionState::Stopped);
    assert_eq!(h.count(EventKind::Stop), 1);

    assert!(h.session.stop().is_err());
    assert_eq!(h.count(EventKind::Stop), 1);
}

#[tokio::test]
async fn test_ready_after_stop_is_ignored() {
    let h = Harness::new(gray_platform(), OptionOverrides::default());
    h.start(None).await;
    h.session.stop().unwrap();

    h.platform.last_element().unwrap().fire_ready();

    assert_eq!(h.count(EventKind::Start), 0);
}

#[tokio::test]
async fn test_restart_after_stop() {
    let h = Harness::new(gray_platform(), OptionOverrides::default());
    h.start(None).await;
    h.platform.last_element().unwrap().fire_ready();
    h.session.stop().unwrap();

    h.start(None).await;
    h.platform.last_element().unwrap().fire_ready();

    assert_eq!(h.session.state(), SessionState::Streaming);
    assert_eq!(h.platform.elements().len(), 2);
    assert_eq!(h.count(EventKind::Start), 2);
    assert_eq!(h.target.attached_count(), 1);
}

#[tokio::test]
async fn test_snapshot_uses_live_frame() {
    let platform = FakePlatform::granting(Some(solid_frame(64, 48, [255, 0, 0, 255])));
    let h = Harness::new(platform, OptionOverrides::default());
    h.start(None).await;

    let native = h.session.take_snapshot(None, None).unwrap();
    let scaled = h.session.take_snapshot(Some(32), None).unwrap();

    assert_eq!((native.width(), native.height()), (64, 48));
    assert_eq!(native.image().get_pixel(10, 10).0, [255, 0, 0, 255]);
    assert_eq!((scaled.width(), scaled.height()), (32, 48));
    assert_eq!(h.session.snapshot_count(), 2);
    assert_eq!(h.session.snapshots()[0].id(), native.id());
}

#[tokio::test]
async fn test_audio_wired_when_requested() {
    let platform = gray_platform().with_audio(FakeAudioGraph::default());
    let h = Harness::new(platform, OptionOverrides::default().audio(true));

    h.start(None).await;

    let audio = h.platform.audio().unwrap();
    assert!(h.platform.devices().unwrap().requests()[0].audio);
    assert_eq!(audio.connects(), 1);
    assert_eq!(h.count(EventKind::Error), 0);

    h.session.stop().unwrap();
    assert_eq!(audio.disconnects(), 1);
}

#[tokio::test]
async fn test_audio_failure_keeps_video() {
    let platform = gray_platform().with_audio(FakeAudioGraph::failing());
    let h = Harness::new(platform, OptionOverrides::default().audio(true));

    h.start(None).await;
    h.platform.last_element().unwrap().fire_ready();

    assert!(matches!(
        h.errors().as_slice(),
        [SessionError::AudioNotSupported(_)]
    ));
    assert_eq!(h.session.state(), SessionState::Streaming);
    assert_eq!(h.count(EventKind::Start), 1);
    assert_eq!(h.target.attached_count(), 1);
}

#[tokio::test]
async fn test_audio_without_graph() {
    let h = Harness::new(gray_platform(), OptionOverrides::default().audio(true));

    h.start(None).await;

    assert!(matches!(
        h.errors().as_slice(),
        [SessionError::AudioNotSupported(_)]
    ));
    assert!(h.session.has_stream());
}

#[tokio::test(start_paused = true)]
async fn test_qr_polling_cadence() {
    let h = Harness::new(gray_platform(), OptionOverrides::default());
    h.start(None).await;

    h.session.start_qr_polling(Duration::from_millis(100));
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert!(h.session.stop_qr_polling());

    let attempts = h.decoder.attempts();
    assert!(attempts > 0);
    assert!(attempts <= 3);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(h.decoder.attempts(), attempts);
    assert!(!h.session.is_qr_polling());
}

#[tokio::test(start_paused = true)]
async fn test_qr_polling_reports_results() {
    let decoder = ScriptedDecoder::new([
        Ok(QrOutcome::NotFound),
        Ok(QrOutcome::Decoded("https://example.org".to_string())),
        Err(DecodeError::Corrupt("bad format".to_string())),
    ]);
    let h = Harness::with_decoder(gray_platform(), OptionOverrides::default(), decoder);
    h.start(None).await;

    h.session.start_qr_polling(Duration::from_millis(50));
    tokio::time::sleep(Duration::from_millis(175)).await;
    h.session.stop_qr_polling();

    let events = h.events.lock().unwrap().clone();
    let qr: Vec<_> = events
        .iter()
        .filter(|event| {
            matches!(
                event.kind(),
                EventKind::QrReadSuccess | EventKind::QrReadError
            )
        })
        .collect();
    assert_eq!(qr.len(), 2);
    assert!(matches!(qr[0], SessionEvent::QrReadSuccess(text) if text == "https://example.org"));
    assert!(matches!(
        qr[1],
        SessionEvent::QrReadError(DecodeError::Corrupt(_))
    ));
    assert_eq!(h.decoder.sizes()[0], (64, 48));
}

#[tokio::test(start_paused = true)]
async fn test_qr_polling_without_frame_is_idle() {
    let h = Harness::new(FakePlatform::granting(None), OptionOverrides::default());
    h.start(None).await;

    h.session.start_qr_polling(Duration::from_millis(100));
    tokio::time::sleep(Duration::from_millis(350)).await;

    assert_eq!(h.decoder.attempts(), 0);
    assert!(h.session.is_qr_polling());
    h.session.stop_qr_polling();
}

#[tokio::test(start_paused = true)]
async fn test_qr_polling_restart_replaces_loop() {
    let h = Harness::new(gray_platform(), OptionOverrides::default());
    h.start(None).await;

    assert!(!h.session.start_qr_polling(Duration::from_millis(100)));
    assert!(h.session.start_qr_polling(Duration::from_millis(100)));
    tokio::time::sleep(Duration::from_millis(250)).await;

    // Only one loop is running, so two ticks in 250ms
    assert_eq!(h.decoder.attempts(), 2);
    h.session.stop_qr_polling();
    assert!(!h.session.stop_qr_polling());
}

#[tokio::test(start_paused = true)]
async fn test_stop_halts_polling() {
    let h = Harness::new(gray_platform(), OptionOverrides::default());
    h.start(None).await;
    h.session.start_qr_polling(Duration::from_millis(100));
    tokio::time::sleep(Duration::from_millis(150)).await;

    h.session.stop().unwrap();
    let attempts = h.decoder.attempts();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(h.decoder.attempts(), attempts);
    assert_eq!(h.count(EventKind::Stop), 1);
}

#[test]
fn test_oversized_snapshot_is_capped() {
    let h = Harness::new(gray_platform(), OptionOverrides::default());

    let still = h.session.take_snapshot(Some(u32::MAX), Some(2)).unwrap();

    assert_eq!(
        (still.width(), still.height()),
        (qrcam::constants::MAX_SNAPSHOT_DIMENSION, 2)
    );
}

#[tokio::test(start_paused = true)]
async fn test_qr_polling_ignores_snapshot_option() {
    let decoder = ScriptedDecoder::new([Ok(QrOutcome::Decoded("ticket-42".to_string()))]);
    let h = Harness::with_decoder(
        gray_platform(),
        OptionOverrides::default().snapshots(false),
        decoder,
    );
    h.start(None).await;

    h.session.start_qr_polling(Duration::from_millis(100));
    tokio::time::sleep(Duration::from_millis(250)).await;
    h.session.stop_qr_polling();

    assert_eq!(h.decoder.attempts(), 2);
    assert_eq!(h.count(EventKind::QrReadSuccess), 1);
    assert_eq!(h.session.snapshot_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_decode_error_does_not_stop_polling() {
    let decoder = ScriptedDecoder::new([
        Err(DecodeError::Corrupt("bad format".to_string())),
        Ok(QrOutcome::Decoded("after error".to_string())),
    ]);
    let h = Harness::with_decoder(gray_platform(), OptionOverrides::default(), decoder);
    h.start(None).await;

    h.session.start_qr_polling(Duration::from_millis(100));
    tokio::time::sleep(Duration::from_millis(250)).await;

    let kinds: Vec<_> = h
        .events
        .lock()
        .unwrap()
        .iter()
        .map(SessionEvent::kind)
        .filter(|kind| matches!(kind, EventKind::QrReadSuccess | EventKind::QrReadError))
        .collect();
    assert_eq!(kinds, vec![EventKind::QrReadError, EventKind::QrReadSuccess]);
    assert!(h.session.is_qr_polling());
    h.session.stop_qr_polling();
}

#[tokio::test(start_paused = true)]
async fn test_stop_halts_polling_in_any_state() {
    let h = Harness::new(gray_platform(), OptionOverrides::default());
    h.session.start_qr_polling(Duration::from_millis(100));
    assert!(h.session.is_qr_polling());

    assert!(h.session.stop().is_err());

    assert!(!h.session.is_qr_polling());
    assert_eq!(h.count(EventKind::Stop), 0);
}

/// Decoder that parks its first call until released
struct GatedDecoder {
    entered: Mutex<Option<mpsc::Sender<()>>>,
    release: Mutex<mpsc::Receiver<()>>,
    finished: AtomicBool,
}

impl QrDecoder for GatedDecoder {
    fn decode(&self, _image: &RgbaImage) -> Result<QrOutcome, DecodeError> {
        let entered = self.entered.lock().unwrap().take();
        if let Some(entered) = entered {
            let _ = entered.send(());
            let _ = self.release.lock().unwrap().recv();
            self.finished.store(true, Ordering::SeqCst);
        }
        Ok(QrOutcome::NotFound)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropping_session_during_decode_releases_stream() {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let decoder = Arc::new(GatedDecoder {
        entered: Mutex::new(Some(entered_tx)),
        release: Mutex::new(release_rx),
        finished: AtomicBool::new(false),
    });
    let platform = Arc::new(gray_platform());
    let target = Arc::new(FakeTarget::default());
    let session = Session::builder(target.clone())
        .platform(platform.clone())
        .decoder(decoder.clone())
        .build();

    session.start(None).unwrap().await.unwrap();
    session.start_qr_polling(Duration::from_millis(10));
    tokio::task::spawn_blocking(move || entered_rx.recv())
        .await
        .unwrap()
        .unwrap();

    // The tick now holds the last reference to the session internals
    drop(session);
    release_tx.send(()).unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while target.detach_calls() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("session teardown did not complete");

    assert!(decoder.finished.load(Ordering::SeqCst));
    let stream = platform.devices().unwrap().last_stream().unwrap();
    assert!(stream.is_stopped());
    assert!(platform.last_element().unwrap().is_removed());
    assert_eq!(platform.revoked_urls().len(), 1);
}
