use std::time::{Duration, Instant};

const ALPHA: f32 = 0.125;
const MIN_SAMPLE_GAP: Duration = Duration::from_millis(1);

/// Smoothed arrival rate of inbound keyframe messages, in Hz.
#[derive(Debug, Clone)]
pub struct RateMeter {
    initial: f32,
    rate: f32,
    last_arrival: Option<Instant>,
}

impl RateMeter {
    pub fn new(initial: f32) -> Self {
        Self {
            initial,
            rate: initial,
            last_arrival: None,
        }
    }

    pub fn record(&mut self, now: Instant) {
        if let Some(last) = self.last_arrival {
            let gap = now.saturating_duration_since(last);
            if gap < MIN_SAMPLE_GAP {
                return;
            }
            let sample = 1.0 / gap.as_secs_f32();
            self.rate = (1.0 - ALPHA) * self.rate + ALPHA * sample;
        }
        self.last_arrival = Some(now);
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    pub fn reset(&mut self) {
        self.rate = self.initial;
        self.last_arrival = None;
    }
}
