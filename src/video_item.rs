//! One video on the surface together with the timers that act on it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::error::SurfaceError;
use crate::seek::{SeekOutcome, SeekSynchronizer};
use crate::surface::{Playhead, VideoLayer, VisualLayer};
use crate::timer::{earliest, TimerId, TimerQueue};
use crate::transition::FadeItem;

pub const FORWARD_RATE: f64 = 2.0;
pub const REWIND_INTERVAL: Duration = Duration::from_millis(100);
pub const REWIND_STEP: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VideoTimer {
    RewindTick,
}

pub struct VideoItem<V> {
    layer: V,
    path: PathBuf,
    seek: SeekSynchronizer,
    timers: TimerQueue<VideoTimer>,
    rewind: Option<TimerId>,
}

pub fn clamp_volume(volume: f64) -> f64 {
    volume.clamp(0.0, 1.0)
}

impl<V: VideoLayer> VideoItem<V> {
    pub fn new(mut layer: V, path: impl Into<PathBuf>) -> Self {
        layer.pause();
        layer.set_position(0.0);
        layer.set_playback_rate(1.0);

        Self {
            layer,
            path: path.into(),
            seek: SeekSynchronizer::new(),
            timers: TimerQueue::new(),
            rewind: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layer(&self) -> &V {
        &self.layer
    }

    pub fn is_seeking(&self) -> bool {
        self.seek.is_active()
    }

    pub fn is_rewinding(&self) -> bool {
        self.rewind.is_some()
    }

    /// Starts or resumes playback at normal speed. A video that already ran
    /// to its end stays where it is.
    pub fn play(&mut self) -> Result<(), SurfaceError> {
        if self.layer.has_ended() {
            return Ok(());
        }

        self.clear_timers();
        self.layer.set_playback_rate(1.0);
        self.layer.play()
    }

    pub fn pause(&mut self) {
        self.layer.pause();
        self.clear_timers();
    }

    pub fn fwd(&mut self) {
        self.clear_timers();
        self.layer.set_playback_rate(FORWARD_RATE);
    }

    /// Pauses and steps the playhead back every [`REWIND_INTERVAL`] until
    /// another command takes over.
    pub fn rew(&mut self, now: Duration) {
        self.clear_timers();
        self.layer.pause();
        self.rewind = Some(self.timers.schedule(now, REWIND_INTERVAL, VideoTimer::RewindTick));
    }

    pub fn seek(&mut self, now: Duration, seconds: f64, instant: bool) -> SeekOutcome {
        self.cancel_rewind();
        if instant {
            self.seek.instant_seek(&mut self.layer, seconds);
            SeekOutcome::Jumped
        } else {
            self.seek.gradual_seek(now, &mut self.layer, seconds)
        }
    }

    pub fn mute(&mut self) {
        self.layer.set_muted(true);
    }

    pub fn unmute(&mut self) {
        self.layer.set_muted(false);
    }

    pub fn set_volume(&mut self, volume: f64) {
        self.layer.set_volume(clamp_volume(volume));
    }

    fn cancel_rewind(&mut self) {
        if let Some(id) = self.rewind.take() {
            self.timers.cancel(id);
        }
    }

    fn clear_timers(&mut self) {
        self.cancel_rewind();
        self.seek.reset_timers();
    }

    fn rewind_tick(&mut self, due: Duration) {
        let position = self.layer.position();
        if position >= REWIND_STEP {
            self.layer.set_position(position - REWIND_STEP);
        }
        self.rewind = Some(self.timers.schedule(due, REWIND_INTERVAL, VideoTimer::RewindTick));
    }
}

impl<V: VideoLayer> FadeItem for VideoItem<V> {
    fn attach(&mut self) {
        self.layer.attach();
    }

    fn detach(&mut self) {
        self.layer.detach();
    }

    fn set_opacity(&mut self, opacity: f32) {
        self.layer.set_opacity(opacity);
    }

    fn begin_fade_out(&mut self) {
        self.clear_timers();
    }

    fn end_fade_out(&mut self) {
        debug!(path = %self.path.display(), "video faded out");
        self.layer.pause();
    }

    fn has_finished(&self) -> bool {
        self.layer.has_ended()
    }

    fn next_deadline(&self) -> Option<Duration> {
        earliest(self.timers.next_deadline(), self.seek.next_deadline())
    }

    fn advance(&mut self, now: Duration) {
        while let Some((_, due, VideoTimer::RewindTick)) = self.timers.pop_due(now) {
            self.rewind_tick(due);
        }
        self.seek.advance(now, &mut self.layer);
    }
}
