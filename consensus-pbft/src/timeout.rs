//! View-change timing.
//!
//! One timer, two duties. While the replica follows a leader, the armed
//! timer measures leader silence: any admitted message from the current
//! leader resets it, and expiry starts the view-change path. While a view
//! change is assembling, the same timer paces the quorum check — expiry
//! either completes the transition or escalates to the next view.

use std::time::{Duration, Instant};

/// What the armed timer is currently measuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerDuty {
    /// Waiting on the current leader to show signs of life.
    LeaderSilence,
    /// Waiting for VIEW_CHANGE votes to assemble a quorum.
    ViewChangeAssembly,
}

/// A cancellable one-shot timer with a fixed duration.
#[derive(Debug)]
pub struct ViewTimer {
    timeout: Duration,
    deadline: Option<Instant>,
    duty: Option<TimerDuty>,
}

impl ViewTimer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
            duty: None,
        }
    }

    /// Arm (or re-arm) the timer for the given duty.
    pub fn arm(&mut self, duty: TimerDuty) {
        self.deadline = Some(Instant::now() + self.timeout);
        self.duty = Some(duty);
    }

    /// Push the deadline out without changing the duty. No-op when idle.
    pub fn reset(&mut self) {
        if self.deadline.is_some() {
            self.deadline = Some(Instant::now() + self.timeout);
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
        self.duty = None;
    }

    /// The duty whose deadline has passed, if any. The timer stays armed;
    /// the caller decides whether to re-arm or cancel.
    pub fn expired(&self) -> Option<TimerDuty> {
        let deadline = self.deadline?;
        if Instant::now() >= deadline {
            self.duty
        } else {
            None
        }
    }

    /// Time until the deadline; `None` when idle.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn duty(&self) -> Option<TimerDuty> {
        self.duty
    }
}
