// SPDX-License-Identifier: GPL-3.0-only

//! Recurring timer driving QR decode attempts
//!
//! Each tick runs in two phases: `sample` (frame extraction and decode) runs
//! under a tick lock that [`QrPoller::stop`] also takes, and `publish`
//! (event delivery) runs outside it. Once `stop` returns no further sample
//! can start, and handlers are free to stop the poller from `publish`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

/// What one sample produced
#[derive(Debug)]
pub enum TickOutcome<T> {
    /// Hand the value to `publish`
    Publish(T),
    /// Nothing to report this tick
    Idle,
    /// End the loop
    Stop,
}

/// Controller for a poll loop running on the Tokio runtime
pub struct QrPoller {
    task: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    tick_lock: Arc<Mutex<()>>,
    interval: Duration,
    name: String,
}

impl QrPoller {
    /// Start a poll loop ticking every `interval`
    ///
    /// The first tick fires one full interval after the call.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn start<T, S, P>(name: &str, interval: Duration, mut sample: S, mut publish: P) -> Self
    where
        T: Send + 'static,
        S: FnMut() -> TickOutcome<T> + Send + 'static,
        P: FnMut(T) + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let tick_lock = Arc::new(Mutex::new(()));
        let task_stop = Arc::clone(&stop_signal);
        let task_lock = Arc::clone(&tick_lock);
        let task_name = name.to_string();

        info!(name = %name, interval_ms = interval.as_millis(), "Starting poll loop");

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let outcome = {
                    let _tick = task_lock.lock().unwrap_or_else(|e| e.into_inner());
                    if task_stop.load(Ordering::SeqCst) {
                        break;
                    }
                    trace!(name = %task_name, "Poll tick");
                    sample()
                };

                match outcome {
                    TickOutcome::Publish(value) => {
                        if task_stop.load(Ordering::SeqCst) {
                            break;
                        }
                        publish(value);
                    }
                    TickOutcome::Idle => {}
                    TickOutcome::Stop => {
                        debug!(name = %task_name, "Loop requested stop");
                        break;
                    }
                }
            }

            debug!(name = %task_name, "Poll loop exiting");
        });

        Self {
            task: Some(task),
            stop_signal,
            tick_lock,
            interval,
            name: name.to_string(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Check if the loop is still running
    pub fn is_running(&self) -> bool {
        !self.stop_signal.load(Ordering::SeqCst)
            && self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Cancel the loop
    ///
    /// Waits for an in-flight sample to finish; no sample starts afterwards.
    /// Must not be called from inside `sample`.
    pub fn stop(&mut self) {
        {
            let _tick = self.tick_lock.lock().unwrap_or_else(|e| e.into_inner());
            self.stop_signal.store(true, Ordering::SeqCst);
        }
        self.cancel();
    }

    /// Cancel the loop without waiting for an in-flight sample
    ///
    /// Safe to call from inside `sample`. A sample already running finishes,
    /// but its result is discarded and no further sample starts.
    pub fn cancel(&mut self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            debug!(name = %self.name, "Stopping poll loop");
            task.abort();
        }
    }
}

impl Drop for QrPoller {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for QrPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QrPoller")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn counting(counter: &Arc<AtomicU32>) -> impl FnMut() -> TickOutcome<u32> + Send + 'static {
        let counter = Arc::clone(counter);
        move || TickOutcome::Publish(counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_after_one_interval() {
        let samples = Arc::new(AtomicU32::new(0));
        let _poller = QrPoller::start("test", Duration::from_millis(100), counting(&samples), |_| {});

        tokio::time::sleep(Duration::from_millis(99)).await;
        assert_eq!(samples.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(samples.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_sampling() {
        let samples = Arc::new(AtomicU32::new(0));
        let mut poller =
            QrPoller::start("test", Duration::from_millis(100), counting(&samples), |_| {});

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(poller.is_running());
        poller.stop();
        let at_stop = samples.load(Ordering::SeqCst);
        assert_eq!(at_stop, 3);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(samples.load(Ordering::SeqCst), at_stop);
        assert!(!poller.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sample_can_end_loop() {
        let published = Arc::new(AtomicU32::new(0));
        let sink = Arc::clone(&published);
        let mut ticks = 0;
        let poller = QrPoller::start(
            "test",
            Duration::from_millis(10),
            move || {
                ticks += 1;
                if ticks > 2 {
                    TickOutcome::Stop
                } else {
                    TickOutcome::Publish(ticks)
                }
            },
            move |_| {
                sink.fetch_add(1, Ordering::SeqCst);
            },
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(published.load(Ordering::SeqCst), 2);
        assert!(!poller.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_ticks_publish_nothing() {
        let published = Arc::new(AtomicU32::new(0));
        let sink = Arc::clone(&published);
        let _poller = QrPoller::start(
            "test",
            Duration::from_millis(10),
            || TickOutcome::<()>::Idle,
            move |_| {
                sink.fetch_add(1, Ordering::SeqCst);
            },
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(published.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_does_not_wait_for_tick_lock() {
        let samples = Arc::new(AtomicU32::new(0));
        let mut poller =
            QrPoller::start("test", Duration::from_millis(10), counting(&samples), |_| {});

        // Held as if a sample were running on this thread
        let lock = Arc::clone(&poller.tick_lock);
        let tick = lock.lock().unwrap();
        poller.cancel();
        assert!(!poller.is_running());
        drop(tick);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(samples.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_loop() {
        let samples = Arc::new(AtomicU32::new(0));
        let poller = QrPoller::start("test", Duration::from_millis(10), counting(&samples), |_| {});
        tokio::time::sleep(Duration::from_millis(25)).await;
        drop(poller);
        let at_drop = samples.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(samples.load(Ordering::SeqCst), at_drop);
    }
}
