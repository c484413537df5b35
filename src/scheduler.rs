use crate::action::CompletionCode;
use crate::protocol::Tag;
use crate::tags::TagSlot;
use crate::time::TimeProvider;
use crate::wiring::{StopFlag, Wiring};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Wakes the scheduler thread out of its tick wait.
#[derive(Default)]
struct Gate {
    woken: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    fn wake(&self) {
        *self.woken.lock() = true;
        self.cond.notify_all();
    }

    fn wait(&self, timeout: Duration) {
        let mut woken = self.woken.lock();
        if !*woken {
            self.cond.wait_for(&mut woken, timeout);
        }
        *woken = false;
    }
}

/// Owns the tag table: assigns free tags to new submissions and times
/// out, resubmits, or retires the actions already in flight.
///
/// Both phases of a tick run under one tag-table guard so the sweep and
/// the promotion observe a consistent slot state and response pairing
/// cannot free a slot mid-promotion.
pub struct RetryScheduler {
    wiring: Arc<Wiring>,
    time: Arc<dyn TimeProvider>,
    action_delta: Duration,
    tick_delta: Duration,
    gate: Gate,
}

impl RetryScheduler {
    pub fn new(
        wiring: Arc<Wiring>,
        time: Arc<dyn TimeProvider>,
        action_delta: Duration,
        tick_delta: Duration,
    ) -> Self {
        Self {
            wiring,
            time,
            action_delta,
            tick_delta,
            gate: Gate::default(),
        }
    }

    /// Nudges the scheduler to run a tick ahead of its timer, e.g. right
    /// after a submission.
    pub fn wake(&self) {
        self.gate.wake();
    }

    /// Runs ticks until a stop is requested.
    pub fn run(&self, stop: &StopFlag) {
        while !stop.is_stopping() {
            self.gate.wait(self.tick_delta);
            if stop.is_stopping() {
                break;
            }
            self.tick();
        }
    }

    /// One scheduling pass: sweep deadlines, then promote submissions.
    pub fn tick(&self) {
        let now = self.time.now();
        let mut slots = self.wiring.tags.guard();

        // Phase A: sweep in-flight actions whose response is overdue.
        for (idx, slot) in slots.iter_mut().enumerate() {
            let expired = match &*slot {
                TagSlot::Waiting(action) => action
                    .submitted
                    .is_some_and(|submitted| now >= submitted + self.action_delta),
                _ => false,
            };
            if !expired {
                continue;
            }
            let TagSlot::Waiting(mut action) = std::mem::take(slot) else {
                continue;
            };
            if action.num >= action.max {
                debug!("tag {} out of retries after {} transmissions", idx, action.num);
                action.completion = CompletionCode::TimedOut;
                if let Err(err) = self.wiring.completions.push(action) {
                    self.wiring.retire(err.into_inner());
                }
            } else {
                action.num += 1;
                action.submitted = Some(now);
                *slot = TagSlot::Sending;
                if let Err(err) = self.wiring.tx_messages.push(action) {
                    *slot = TagSlot::Vacant;
                    self.wiring.retire(err.into_inner());
                }
            }
        }

        // Phase B: hand free tags to waiting submissions, lowest first.
        for (idx, slot) in slots.iter_mut().enumerate() {
            if !slot.is_vacant() {
                continue;
            }
            let Some(mut action) = self.wiring.submissions.try_pop() else {
                break;
            };
            action.num = 1;
            action.submitted = Some(now);
            if let Some(request) = action.request.as_mut() {
                request.tag = Tag(idx as u8);
            }
            if let Some(callback) = action.on_submitted.take() {
                callback(&action);
            }
            *slot = TagSlot::Sending;
            if let Err(err) = self.wiring.tx_messages.push(action) {
                *slot = TagSlot::Vacant;
                self.wiring.retire(err.into_inner());
            }
        }
    }
}
