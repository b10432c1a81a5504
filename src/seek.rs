//! Graduated seeking: pull a playing video onto a remote clock by nudging its
//! playback rate instead of jump-cutting.
//!
//! Writing the position repeatedly stutters on most decoders, so small gaps
//! are closed by ramping the rate a little above or below 1, holding it for
//! as long as the gap needs, then dropping back to 1. Large gaps (or an
//! explicit instant seek) are a plain position jump.

use std::time::Duration;

use tracing::{debug, trace};

use crate::surface::Playhead;
use crate::timer::{TimerId, TimerQueue};

/// Gaps below this are left alone.
pub const INSTANT_THRESHOLD: f64 = 0.1;
/// Gaps at or above this are closed with a hard jump.
pub const GRADUAL_THRESHOLD: f64 = 5.0;
pub const RAMP_INTERVAL: Duration = Duration::from_millis(10);
pub const RAMP_STEP: f64 = 0.01;

const HIGH_DIFF: f64 = 3.0;
const MEDIUM_DIFF: f64 = 0.3;

/// Catch-up rates for (high, medium, low) gaps.
const FAST_RATES: (f64, f64, f64) = (1.2, 1.1, 1.05);
const SLOW_RATES: (f64, f64, f64) = (0.8, 0.9, 0.95);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeekOutcome {
    /// Close enough already.
    Ignored,
    /// Position was set directly.
    Jumped,
    /// Rate is ramping towards `target_rate`.
    Ramping { target_rate: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeekTimer {
    RampTick,
    ResetRate,
}

#[derive(Debug, Clone, Copy)]
enum SeekPhase {
    Ramping { tick: TimerId },
    Holding { reset: TimerId },
}

#[derive(Debug, Clone, Copy)]
struct SeekState {
    target_rate: f64,
    step: f64,
    catch_up: Duration,
    phase: SeekPhase,
}

#[derive(Debug, Default)]
pub struct SeekSynchronizer {
    timers: TimerQueue<SeekTimer>,
    state: Option<SeekState>,
}

impl SeekSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jumps straight to `seconds`. The playback rate is left alone.
    pub fn instant_seek<P: Playhead + ?Sized>(&mut self, playhead: &mut P, seconds: f64) {
        self.reset_timers();
        playhead.set_position(seconds);
    }

    pub fn gradual_seek<P: Playhead + ?Sized>(
        &mut self,
        now: Duration,
        playhead: &mut P,
        seconds: f64,
    ) -> SeekOutcome {
        let diff = seconds - playhead.position();
        self.reset_timers();

        if diff.abs() < INSTANT_THRESHOLD {
            trace!(diff, "seek target already reached");
            return SeekOutcome::Ignored;
        }

        if diff.abs() >= GRADUAL_THRESHOLD {
            debug!(diff, target = seconds, "gap too large for a graduated seek, jumping");
            playhead.set_position(seconds);
            return SeekOutcome::Jumped;
        }

        let target_rate = target_rate(diff);
        let step = if diff > 0.0 { RAMP_STEP } else { -RAMP_STEP };

        let ramp_ms = (target_rate - playhead.playback_rate()).abs() / RAMP_STEP
            * RAMP_INTERVAL.as_millis() as f64;
        let catch_up_ms = (diff / (target_rate - 1.0) * 1000.0 - ramp_ms).max(0.0);

        let tick = self.timers.schedule(now, RAMP_INTERVAL, SeekTimer::RampTick);
        self.state = Some(SeekState {
            target_rate,
            step,
            catch_up: Duration::from_secs_f64(catch_up_ms / 1000.0),
            phase: SeekPhase::Ramping { tick },
        });

        debug!(diff, target_rate, catch_up_ms, "starting graduated seek");
        SeekOutcome::Ramping { target_rate }
    }

    /// Cancels the ramp interval and the pending rate reset.
    pub fn reset_timers(&mut self) {
        if let Some(state) = self.state.take() {
            let pending = match state.phase {
                SeekPhase::Ramping { tick } => tick,
                SeekPhase::Holding { reset } => reset,
            };
            self.timers.cancel(pending);
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.is_some()
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.next_deadline()
    }

    pub fn advance<P: Playhead + ?Sized>(&mut self, now: Duration, playhead: &mut P) {
        while let Some((_, due, timer)) = self.timers.pop_due(now) {
            match timer {
                SeekTimer::RampTick => self.ramp_tick(due, playhead),
                SeekTimer::ResetRate => {
                    trace!("catch-up finished, playback rate back to 1");
                    playhead.set_playback_rate(1.0);
                    self.state = None;
                }
            }
        }
    }

    fn ramp_tick<P: Playhead + ?Sized>(&mut self, due: Duration, playhead: &mut P) {
        let Some(state) = self.state.as_mut() else {
            return;
        };

        let rate = round2(playhead.playback_rate() + state.step);
        playhead.set_playback_rate(rate);

        let reached = if state.step > 0.0 {
            rate >= state.target_rate
        } else {
            rate <= state.target_rate
        };

        if reached {
            playhead.set_playback_rate(state.target_rate);
            let reset = self.timers.schedule(due, state.catch_up, SeekTimer::ResetRate);
            state.phase = SeekPhase::Holding { reset };
        } else {
            let tick = self.timers.schedule(due, RAMP_INTERVAL, SeekTimer::RampTick);
            state.phase = SeekPhase::Ramping { tick };
        }
    }
}

/// Picks the catch-up rate for a signed gap in seconds.
pub fn target_rate(diff: f64) -> f64 {
    let (high, medium, low) = if diff > 0.0 { FAST_RATES } else { SLOW_RATES };
    let gap = diff.abs();

    if gap > HIGH_DIFF {
        high
    } else if gap > MEDIUM_DIFF {
        medium
    } else {
        low
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
