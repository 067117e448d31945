use crate::shared::constants::{BYTES_PER_MEGABYTE, MIN_PROGRESS_FRACTION, MIN_STATUS_ELAPSED_SECS};

/// Running totals of what a session has handed to the container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodeCounters {
    pub video_bytes: u64,
    pub audio_bytes: u64,
    pub frames: u64,
    pub audio_seconds: f64,
    /// Size of the output I/O handle, once one is open.
    pub output_size: Option<u64>,
}

impl EncodeCounters {
    fn output_bytes(&self) -> u64 {
        self.output_size
            .unwrap_or(self.video_bytes + self.audio_bytes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatusRate {
    /// Average video frames per wall-clock second.
    Fps(f64),
    /// Audio seconds encoded per wall-clock second.
    Speed(f64),
    Idle,
}

/// Progress extrapolated from the counters and a completion estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusSnapshot {
    pub minutes_remaining: f64,
    pub megabytes: f64,
    pub rate: StatusRate,
}

impl StatusSnapshot {
    /// `fraction` is the caller's estimate of the share of work done.
    pub fn compute(counters: &EncodeCounters, elapsed_secs: f64, fraction: f32) -> Self {
        let fraction = (fraction as f64).max(MIN_PROGRESS_FRACTION);
        let elapsed = elapsed_secs.max(MIN_STATUS_ELAPSED_SECS);

        let minutes_remaining = elapsed / 60.0 * (1.0 - fraction) / fraction;
        let megabytes = counters.output_bytes() as f64 / BYTES_PER_MEGABYTE / fraction;
        let rate = if counters.frames > 0 {
            StatusRate::Fps(counters.frames as f64 / elapsed)
        } else if counters.audio_seconds > 0.0 {
            StatusRate::Speed(counters.audio_seconds / elapsed)
        } else {
            StatusRate::Idle
        };

        Self {
            minutes_remaining,
            megabytes,
            rate,
        }
    }
}

impl std::fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.rate {
            StatusRate::Fps(fps) => write!(
                f,
                "{{{:.1}min {:.1}fps {:.1}MB}}",
                self.minutes_remaining, fps, self.megabytes
            ),
            StatusRate::Speed(x) => write!(
                f,
                "{{{:.1}min {:.2}x {:.1}MB}}",
                self.minutes_remaining, x, self.megabytes
            ),
            StatusRate::Idle => write!(
                f,
                "{{{:.1}min {:.1}MB}}",
                self.minutes_remaining, self.megabytes
            ),
        }
    }
}
