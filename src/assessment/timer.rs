use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

pub type CompletionCallback = Box<dyn FnMut() + Send>;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TimerState {
    pub total_seconds: u64,
    pub elapsed_seconds: u64,
    pub remaining_seconds: u64,
    pub display: String,
    pub is_running: bool,
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Inactive, or less than a whole second accumulated.
    Idle,
    Ticked { remaining: u64 },
    Completed,
}

/// Frame-driven countdown.
///
/// Remaining time is derived from the wall-clock gap between consecutive
/// frames, measured from the instant the countdown was activated. Sub-second
/// remainders carry into the next frame and across a hold, so dropped or
/// throttled frames never make the countdown run slow. The completion callback
/// fires once per arming, at the frame where remaining time reaches zero.
pub struct CountdownTimer {
    total_seconds: u64,
    remaining_seconds: u64,
    active: bool,
    completed: bool,
    last_frame: Option<Instant>,
    carry: Duration,
    on_complete: Option<CompletionCallback>,
}

impl CountdownTimer {
    pub fn new(total_seconds: u64) -> Self {
        Self {
            total_seconds,
            remaining_seconds: total_seconds,
            active: false,
            completed: false,
            last_frame: None,
            carry: Duration::ZERO,
            on_complete: None,
        }
    }

    pub fn with_completion(mut self, callback: impl FnMut() + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    pub fn set_on_complete(&mut self, callback: impl FnMut() + Send + 'static) {
        self.on_complete = Some(Box::new(callback));
    }

    /// Starts or holds the countdown at `now`. Time spent inactive is never
    /// counted; time since the last frame before a hold is kept as carry.
    pub fn set_active(&mut self, active: bool, now: Instant) {
        if active == self.active {
            return;
        }
        if active {
            if self.completed || self.remaining_seconds == 0 {
                return;
            }
            info!("⏱️ Countdown running with {}s remaining", self.remaining_seconds);
            self.last_frame = Some(now);
        } else {
            if let Some(last) = self.last_frame.take() {
                self.carry += now.saturating_duration_since(last);
            }
            info!("⏸️ Countdown held at {}s", self.remaining_seconds);
        }
        self.active = active;
    }

    /// Re-arms with a new total. Only allowed while inactive.
    pub fn rearm(&mut self, total_seconds: u64) -> bool {
        if self.active || total_seconds == 0 {
            return false;
        }
        self.total_seconds = total_seconds;
        self.remaining_seconds = total_seconds;
        self.completed = false;
        self.last_frame = None;
        self.carry = Duration::ZERO;
        debug!("Countdown re-armed with {}s", total_seconds);
        true
    }

    pub fn on_frame(&mut self, now: Instant) -> FrameOutcome {
        if !self.active || self.remaining_seconds == 0 {
            return FrameOutcome::Idle;
        }

        if let Some(last) = self.last_frame.replace(now) {
            self.carry += now.saturating_duration_since(last);
        }
        let whole = self.carry.as_secs();
        if whole == 0 {
            return FrameOutcome::Idle;
        }
        self.carry -= Duration::from_secs(whole);
        self.remaining_seconds = self.remaining_seconds.saturating_sub(whole);

        if self.remaining_seconds > 0 {
            return FrameOutcome::Ticked {
                remaining: self.remaining_seconds,
            };
        }

        self.active = false;
        self.completed = true;
        self.last_frame = None;
        self.carry = Duration::ZERO;
        info!("⏰ Countdown reached zero after {}s", self.total_seconds);
        if let Some(callback) = self.on_complete.as_mut() {
            callback();
        }
        FrameOutcome::Completed
    }

    pub fn total_seconds(&self) -> u64 {
        self.total_seconds
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.remaining_seconds
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.total_seconds - self.remaining_seconds
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn display(&self) -> String {
        format_clock(self.remaining_seconds)
    }

    pub fn state(&self) -> TimerState {
        TimerState {
            total_seconds: self.total_seconds,
            elapsed_seconds: self.elapsed_seconds(),
            remaining_seconds: self.remaining_seconds,
            display: self.display(),
            is_running: self.active,
            completed: self.completed,
        }
    }
}

/// `MM:SS`, or `H:MM:SS` from one hour up.
pub fn format_clock(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(59), "00:59");
        assert_eq!(format_clock(61), "01:01");
        assert_eq!(format_clock(3600), "1:00:00");
        assert_eq!(format_clock(3725), "1:02:05");
    }

    #[test]
    fn test_inactive_timer_ignores_frames() {
        let mut timer = CountdownTimer::new(10);
        let start = Instant::now();
        assert_eq!(timer.on_frame(start), FrameOutcome::Idle);
        assert_eq!(timer.on_frame(start + Duration::from_secs(5)), FrameOutcome::Idle);
        assert_eq!(timer.remaining_seconds(), 10);
    }

    #[test]
    fn test_first_frame_counts_from_activation() {
        let mut timer = CountdownTimer::new(10);
        let start = Instant::now();
        timer.set_active(true, start);
        assert_eq!(
            timer.on_frame(start + Duration::from_millis(1000)),
            FrameOutcome::Ticked { remaining: 9 }
        );
    }

    #[test]
    fn test_sub_second_carry_survives_a_hold() {
        let mut timer = CountdownTimer::new(10);
        let start = Instant::now();
        timer.set_active(true, start);
        assert_eq!(timer.on_frame(start + Duration::from_millis(600)), FrameOutcome::Idle);
        timer.set_active(false, start + Duration::from_millis(900));

        timer.set_active(true, start + Duration::from_secs(5));
        assert_eq!(
            timer.on_frame(start + Duration::from_millis(5200)),
            FrameOutcome::Ticked { remaining: 9 }
        );
    }

    #[test]
    fn test_zero_total_never_activates() {
        let mut timer = CountdownTimer::new(0);
        timer.set_active(true, Instant::now());
        assert!(!timer.is_active());
        assert!(!timer.rearm(0));
    }
}
