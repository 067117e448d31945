use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use log::error;

use super::session_error::{SessionError, TerminalState};
use super::status::{EncodeCounters, StatusSnapshot};
use crate::shared::media_type::{MediaType, PerMedia};

/// Presentation-time bookkeeping shared by the producers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimingState {
    pub audio_pts_offset: Option<f64>,
    pub last_video_in_pts: Option<f64>,
    pub discontinuity_pts_offset: Option<f64>,
    pub last_audio_in_pts: Option<f64>,
    pub samples_since_last_pts: u64,
}

struct HotState {
    failed: bool,
    finished: bool,
    expect: PerMedia<bool>,
    reported_fps: Option<f32>,
    timing: TimingState,
    counters: EncodeCounters,
    started_at: Instant,
}

/// Handle over the part of a session the producer threads touch
/// concurrently. Clones share the same state.
///
/// Everything else on the session (stream allocation, codec opening,
/// frame writes) is unlocked and must not be called concurrently for the
/// same media type.
#[derive(Clone)]
pub struct SessionHints {
    state: Arc<Mutex<HotState>>,
}

impl SessionHints {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HotState {
                failed: false,
                finished: false,
                expect: PerMedia::default(),
                reported_fps: None,
                timing: TimingState::default(),
                counters: EncodeCounters::default(),
                started_at: Instant::now(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(state: &HotState) -> Result<(), SessionError> {
        let terminal = if state.failed {
            TerminalState::Failed
        } else if state.finished {
            TerminalState::Finished
        } else {
            return Ok(());
        };
        error!("Called a function on a {terminal} encoding context. Bailing out.");
        Err(SessionError::Terminated(terminal))
    }

    pub(crate) fn guard(&self) -> Result<(), SessionError> {
        Self::check(&self.lock())
    }

    /// Frame rate the video pipeline detected, used when auto fps is on.
    pub fn set_video_fps(&self, fps: f32) {
        self.lock().reported_fps = Some(fps);
    }

    pub fn set_audio_pts(&self, pts: f64) {
        let mut state = self.lock();
        state.timing.last_audio_in_pts = Some(pts);
        state.timing.samples_since_last_pts = 0;
    }

    /// Announces that a producer will allocate a stream of this kind before
    /// the header is written.
    pub fn declare_expected_stream(&self, media: MediaType) -> Result<(), SessionError> {
        let mut state = self.lock();
        Self::check(&state)?;
        *state.expect.get_mut(media) = true;
        Ok(())
    }

    pub fn signal_discontinuity(&self) -> Result<(), SessionError> {
        let mut state = self.lock();
        Self::check(&state)?;
        state.timing.audio_pts_offset = None;
        state.timing.last_video_in_pts = None;
        state.timing.discontinuity_pts_offset = None;
        Ok(())
    }

    pub fn did_fail(&self) -> bool {
        self.lock().failed
    }

    pub fn status(&self, fraction: f32) -> Result<StatusSnapshot, SessionError> {
        let state = self.lock();
        Self::check(&state)?;
        let elapsed = state.started_at.elapsed().as_secs_f64();
        Ok(StatusSnapshot::compute(&state.counters, elapsed, fraction))
    }

    pub fn timing(&self) -> TimingState {
        self.lock().timing.clone()
    }

    pub fn update_timing<R>(&self, update: impl FnOnce(&mut TimingState) -> R) -> R {
        update(&mut self.lock().timing)
    }

    pub fn counters(&self) -> EncodeCounters {
        self.lock().counters.clone()
    }

    /// Latches failure; true if this call set it.
    pub(crate) fn mark_failed(&self) -> bool {
        let mut state = self.lock();
        !std::mem::replace(&mut state.failed, true)
    }

    pub(crate) fn mark_finished(&self) {
        self.lock().finished = true;
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.lock().finished
    }

    pub(crate) fn expects(&self, media: MediaType) -> bool {
        *self.lock().expect.get(media)
    }

    pub(crate) fn reported_fps(&self) -> Option<f32> {
        self.lock().reported_fps
    }

    pub(crate) fn record_video(&self, bytes: u64) {
        let mut state = self.lock();
        state.counters.video_bytes += bytes;
        state.counters.frames += 1;
    }

    pub(crate) fn record_audio(&self, bytes: u64, seconds: f64) {
        let mut state = self.lock();
        state.counters.audio_bytes += bytes;
        state.counters.audio_seconds += seconds;
    }

    pub(crate) fn set_output_size(&self, size: Option<u64>) {
        self.lock().counters.output_size = size;
    }

    pub(crate) fn restart_clock(&self) {
        self.lock().started_at = Instant::now();
    }
}
