//! Press-and-hold capture gesture.
//!
//! `press` starts a ticker task that ramps progress from 0 to 100; reaching
//! 100 renders a synthetic frame and hands it to the [`CaptureSink`].
//! `release` aborts the ticker and discards the partial ramp. The controller
//! owns at most one ticker at a time.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::generator::generate_synthetic_capture;
use crate::models::{CapturedImage, ScanState, ScanStatus};

/// Receives the frame produced by a completed hold
pub trait CaptureSink: Send + Sync {
    fn on_capture(&self, image: CapturedImage);
}

impl CaptureSink for UnboundedSender<CapturedImage> {
    fn on_capture(&self, image: CapturedImage) {
        // a dropped receiver means nobody is waiting for the frame any more
        let _ = self.send(image);
    }
}

/// Ramp speed of the gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanTiming {
    pub tick: Duration,
    pub step: u8,
}

impl ScanTiming {
    /// Time a hold needs to reach 100 %
    pub fn hold_duration(&self) -> Duration {
        let ticks = 100u32.div_ceil(u32::from(self.step.max(1)));
        self.tick * ticks
    }
}

impl Default for ScanTiming {
    /// +2 every 50 ms: a full scan takes 2.5 s
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(50),
            step: 2,
        }
    }
}

#[derive(Default)]
struct ControllerState {
    progress: u8,
    ticker: Option<JoinHandle<()>>,
    /// Bumped on every press and release so a stale ticker never emits
    generation: u64,
}

pub struct CaptureController {
    timing: ScanTiming,
    sink: Arc<dyn CaptureSink>,
    state: Arc<Mutex<ControllerState>>,
}

impl CaptureController {
    pub fn new(timing: ScanTiming, sink: Arc<dyn CaptureSink>) -> Self {
        Self {
            timing,
            sink,
            state: Arc::new(Mutex::new(ControllerState::default())),
        }
    }

    /// Start a hold. An active hold is cancelled first. Must be called
    /// inside a tokio runtime.
    pub fn press(&self) {
        let mut state = lock(&self.state);
        if let Some(ticker) = state.ticker.take() {
            ticker.abort();
            debug!("Restarting scan, previous hold cancelled");
        }
        state.generation += 1;
        state.progress = 0;

        let generation = state.generation;
        let ticker = tokio::spawn(run_ticker(
            self.timing,
            generation,
            Arc::clone(&self.state),
            Arc::clone(&self.sink),
        ));
        state.ticker = Some(ticker);
        info!("Scan started");
    }

    /// End a hold. Before completion this discards the ramp and emits
    /// nothing; after completion it is a no-op.
    pub fn release(&self) {
        let mut state = lock(&self.state);
        state.generation += 1;
        state.progress = 0;
        if let Some(ticker) = state.ticker.take() {
            ticker.abort();
            info!("Scan released before completion, no capture taken");
        }
    }

    pub fn status(&self) -> ScanStatus {
        let state = lock(&self.state);
        ScanStatus {
            state: if state.ticker.is_some() {
                ScanState::Scanning
            } else {
                ScanState::Idle
            },
            progress: state.progress,
        }
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        if let Some(ticker) = lock(&self.state).ticker.take() {
            ticker.abort();
        }
    }
}

async fn run_ticker(
    timing: ScanTiming,
    generation: u64,
    state: Arc<Mutex<ControllerState>>,
    sink: Arc<dyn CaptureSink>,
) {
    let mut interval = tokio::time::interval_at(Instant::now() + timing.tick, timing.tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        {
            let mut state = lock(&state);
            if state.generation != generation {
                return;
            }
            state.progress = state.progress.saturating_add(timing.step).min(100);
            if state.progress < 100 {
                continue;
            }
            state.progress = 0;
            state.ticker = None;
        }

        info!("Scan complete, capturing frame");
        sink.on_capture(generate_synthetic_capture());
        return;
    }
}

// A poisoned lock only means another holder panicked mid-update; the state
// is plain data and stays usable.
fn lock(state: &Mutex<ControllerState>) -> MutexGuard<'_, ControllerState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
