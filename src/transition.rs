//! Crossfade lifecycle for one media category.
//!
//! A manager holds at most one active item (fading in or fully visible) and
//! at most one retiring item (fading out). Items move through
//! `Created -> Visible -> FadingOut -> Removed`; the fade-out timer is the
//! only thing that detaches a retiring item, unless a newer retirement
//! forces the older one out early.

use std::time::Duration;

use tracing::{debug, trace};

use crate::timer::{earliest, TimerId, TimerQueue};

/// Delay between inserting an item and starting its fade-in, so the
/// insertion at opacity 0 is rendered first.
pub const SETTLE_DELAY: Duration = Duration::from_millis(50);

/// What the manager needs from an item it fades.
pub trait FadeItem {
    fn attach(&mut self);
    fn detach(&mut self);
    fn set_opacity(&mut self, opacity: f32);

    /// Called once when fade-out starts. Items cancel their own timers here.
    fn begin_fade_out(&mut self) {}

    /// Called right before the item is detached.
    fn end_fade_out(&mut self) {}

    /// An active item that reports `true` is faded out on the next advance.
    fn has_finished(&self) -> bool {
        false
    }

    fn next_deadline(&self) -> Option<Duration> {
        None
    }

    fn advance(&mut self, _now: Duration) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Visible,
    FadingOut,
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FadeTimer {
    Settle(u64),
    FadedOut(u64),
}

struct Slot<T> {
    id: u64,
    item: T,
    lifecycle: Lifecycle,
    timer: Option<TimerId>,
}

pub struct Crossfade<T: FadeItem> {
    label: &'static str,
    fade: Duration,
    timers: TimerQueue<FadeTimer>,
    next_id: u64,
    active: Option<Slot<T>>,
    retiring: Option<Slot<T>>,
    removed: u64,
}

impl<T: FadeItem> Crossfade<T> {
    pub fn new(label: &'static str, fade: Duration) -> Self {
        Self {
            label,
            fade,
            timers: TimerQueue::new(),
            next_id: 0,
            active: None,
            retiring: None,
            removed: 0,
        }
    }

    /// Makes `item` the active item, retiring whatever was active before.
    pub fn show(&mut self, now: Duration, mut item: T) {
        if let Some(previous) = self.active.take() {
            self.retire(now, previous);
        }

        let id = self.next_id;
        self.next_id += 1;

        item.attach();
        let timer = self.timers.schedule(now, SETTLE_DELAY, FadeTimer::Settle(id));
        self.active = Some(Slot {
            id,
            item,
            lifecycle: Lifecycle::Created,
            timer: Some(timer),
        });
        debug!(category = self.label, item = id, "item inserted");
    }

    /// Fades out the active item without a replacement.
    pub fn hide(&mut self, now: Duration) {
        if let Some(active) = self.active.take() {
            self.retire(now, active);
        }
    }

    pub fn active(&self) -> Option<&T> {
        self.active.as_ref().map(|slot| &slot.item)
    }

    pub fn active_mut(&mut self) -> Option<&mut T> {
        self.active.as_mut().map(|slot| &mut slot.item)
    }

    pub fn active_lifecycle(&self) -> Option<Lifecycle> {
        self.active.as_ref().map(|slot| slot.lifecycle)
    }

    pub fn retiring_lifecycle(&self) -> Option<Lifecycle> {
        self.retiring.as_ref().map(|slot| slot.lifecycle)
    }

    /// Number of items currently in the visual tree.
    pub fn attached(&self) -> usize {
        self.active.iter().count() + self.retiring.iter().count()
    }

    /// Number of items whose removal has completed.
    pub fn removed(&self) -> u64 {
        self.removed
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        let items = earliest(
            self.active.as_ref().and_then(|slot| slot.item.next_deadline()),
            self.retiring.as_ref().and_then(|slot| slot.item.next_deadline()),
        );
        earliest(self.timers.next_deadline(), items)
    }

    pub fn advance(&mut self, now: Duration) {
        if let Some(slot) = self.active.as_mut() {
            slot.item.advance(now);
        }

        while let Some((_, due, timer)) = self.timers.pop_due(now) {
            match timer {
                FadeTimer::Settle(id) => self.fade_in(id),
                FadeTimer::FadedOut(id) => {
                    if self.retiring.as_ref().is_some_and(|slot| slot.id == id) {
                        if let Some(slot) = self.retiring.take() {
                            self.remove(slot);
                        }
                    }
                }
            }
            trace!(category = self.label, ?due, ?timer, "fade timer fired");
        }

        if self.active.as_ref().is_some_and(|slot| slot.item.has_finished()) {
            debug!(category = self.label, "active item finished");
            self.hide(now);
        }
    }

    fn fade_in(&mut self, id: u64) {
        let Some(slot) = self.active.as_mut().filter(|slot| slot.id == id) else {
            return;
        };
        slot.timer = None;
        slot.item.set_opacity(1.0);
        slot.lifecycle = Lifecycle::Visible;
    }

    fn retire(&mut self, now: Duration, mut slot: Slot<T>) {
        // Only one item may be fading out; an older one is finished off now.
        if let Some(mut older) = self.retiring.take() {
            if let Some(timer) = older.timer.take() {
                self.timers.cancel(timer);
            }
            debug!(category = self.label, item = older.id, "cutting short previous fade-out");
            self.remove(older);
        }

        if let Some(timer) = slot.timer.take() {
            self.timers.cancel(timer);
        }

        slot.item.begin_fade_out();
        slot.item.set_opacity(0.0);
        slot.lifecycle = Lifecycle::FadingOut;
        slot.timer = Some(self.timers.schedule(now, self.fade, FadeTimer::FadedOut(slot.id)));
        debug!(category = self.label, item = slot.id, "fading out");
        self.retiring = Some(slot);
    }

    fn remove(&mut self, mut slot: Slot<T>) {
        slot.item.end_fade_out();
        slot.item.detach();
        slot.lifecycle = Lifecycle::Removed;
        self.removed += 1;
        debug!(category = self.label, item = slot.id, "item removed");
    }
}
